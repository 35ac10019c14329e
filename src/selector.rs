//! Maps a `--component` value to the services to launch.

use crate::config::{EnvConfig, SupervisorSettings, ALL_COMPONENTS};
use crate::error::{Error, Result};
use crate::service::ServiceDescriptor;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Builds [`ServiceDescriptor`]s from settings.
///
/// Selection has no side effects and depends only on the settings, so the
/// same component always yields the same ordered list.
pub struct Selector<'a> {
    settings: &'a SupervisorSettings,
    work_dir: PathBuf,
    environment: BTreeMap<String, String>,
}

impl<'a> Selector<'a> {
    pub fn new(settings: &'a SupervisorSettings, work_dir: &Path) -> Self {
        Self {
            settings,
            work_dir: work_dir.to_path_buf(),
            environment: BTreeMap::new(),
        }
    }

    /// Pass `env` to every selected service. `PYTHONPATH` defaults to the
    /// work dir so `main.py` can import the project packages.
    pub fn with_environment(mut self, env: &EnvConfig) -> Self {
        let mut environment = env.vars().clone();
        environment
            .entry("PYTHONPATH".to_string())
            .or_insert_with(|| self.work_dir.to_string_lossy().into_owned());
        self.environment = environment;
        self
    }

    /// `all` selects every service in declared order; a service name selects
    /// that one service.
    pub fn select(&self, component: &str) -> Result<Vec<ServiceDescriptor>> {
        if component == ALL_COMPONENTS {
            return Ok(self
                .settings
                .services
                .iter()
                .map(|spec| self.describe(spec))
                .collect());
        }

        match self.settings.services.iter().find(|s| s.name == component) {
            Some(spec) => Ok(vec![self.describe(spec)]),
            None => Err(Error::UnknownComponent {
                name: component.to_string(),
                available: self.settings.service_names(),
            }),
        }
    }

    fn describe(&self, spec: &crate::config::ServiceSpec) -> ServiceDescriptor {
        let logs_dir = SupervisorSettings::resolve(&self.work_dir, &self.settings.logs_dir);
        ServiceDescriptor {
            name: spec.name.clone(),
            launch_command: spec.render_command(self.settings.interpreter_or_default()),
            port: spec.port,
            log_path: logs_dir.join(format!("{}.log", spec.name)),
            pid_path: logs_dir.join(format!("{}.pid", spec.name)),
            work_dir: self.work_dir.clone(),
            environment: self.environment.clone(),
        }
    }
}
