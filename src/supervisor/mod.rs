//! The run: select, check, bring up dependencies, launch, wait, tear down.

pub mod coordinator;
pub mod signals;

pub use coordinator::{Coordinator, ShutdownReport, ShutdownStep, StepOutcome};
pub use signals::spawn_signal_listener;

use crate::config::{EnvConfig, SupervisorSettings};
use crate::container::{ContainerManager, ContainerRuntime, DependencyReport};
use crate::docker::DockerClient;
use crate::error::{Error, Result};
use crate::output::UserOutput;
use crate::preflight::Preflight;
use crate::selector::Selector;
use crate::service::{Launcher, ServiceDescriptor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What happened to each selected service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Started { pid: u32 },
    /// Not spawned: port taken or a previous instance still alive.
    Skipped(String),
    Failed(String),
    /// Not attempted because shutdown was requested first.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub launches: Vec<(String, LaunchOutcome)>,
    pub dependencies: Option<DependencyReport>,
    pub shutdown: ShutdownReport,
}

impl RunSummary {
    pub fn started(&self) -> impl Iterator<Item = &str> {
        self.launches
            .iter()
            .filter(|(_, o)| matches!(o, LaunchOutcome::Started { .. }))
            .map(|(n, _)| n.as_str())
    }
}

pub struct Supervisor<'a> {
    settings: SupervisorSettings,
    work_dir: PathBuf,
    runtime: Arc<dyn ContainerRuntime>,
    out: &'a dyn UserOutput,
}

impl<'a> Supervisor<'a> {
    pub fn new(settings: SupervisorSettings, work_dir: &Path, out: &'a dyn UserOutput) -> Self {
        let runtime: Arc<dyn ContainerRuntime> =
            Arc::new(DockerClient::with_binary(settings.container_runtime.clone()));
        Self {
            settings,
            work_dir: work_dir.to_path_buf(),
            runtime,
            out,
        }
    }

    /// Use another container runtime (tests substitute an in-memory one).
    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    fn env_path(&self) -> PathBuf {
        SupervisorSettings::resolve(&self.work_dir, &self.settings.env_file)
    }

    /// Run `component` until `shutdown` is cancelled, then tear down.
    ///
    /// Errors are returned only for problems found before anything was
    /// started. Per-service launch problems are reported and the run goes
    /// on; teardown problems end up in the summary.
    pub async fn run(
        &self,
        component: &str,
        setup: bool,
        shutdown: CancellationToken,
    ) -> Result<RunSummary> {
        // Validates the component before any side effect
        let targets = Selector::new(&self.settings, &self.work_dir).select(component)?;

        Preflight::run(&self.settings, &self.work_dir, self.out).await?;

        if setup {
            crate::setup::run_setup(&self.settings, &self.work_dir, self.out).await?;
        }

        let env_path = self.env_path();
        let env = EnvConfig::load(&env_path)?;
        self.print_banner(&targets, &env);

        let coordinator = Coordinator::new(
            Some(self.runtime.clone()),
            self.settings.timings.stop_timeout,
        );
        let mut summary = RunSummary {
            launches: Vec::new(),
            dependencies: None,
            shutdown: ShutdownReport::default(),
        };

        let env = match self.ensure_dependencies(&env, &env_path, &coordinator, &shutdown).await {
            Some(report) => {
                let env = report.env.clone();
                summary.dependencies = Some(report);
                env
            }
            None => env,
        };

        if !shutdown.is_cancelled() {
            let descriptors = Selector::new(&self.settings, &self.work_dir)
                .with_environment(&env)
                .select(component)?;
            summary.launches = self.launch_all(&descriptors, &coordinator, &shutdown).await;
        }

        let started = summary.started().count();
        if !shutdown.is_cancelled() {
            if started == 0 {
                self.out.warning("No services are running; nothing to supervise.");
            } else {
                self.out.blank();
                self.out.success(&format!(
                    "{} service(s) running. Press Ctrl+C to stop.",
                    started
                ));
                shutdown.cancelled().await;
            }
        }

        summary.shutdown = self.teardown(&coordinator).await;
        Ok(summary)
    }

    /// Ensure containers and persist any degrade rewrite. `None` when no
    /// containers are configured.
    async fn ensure_dependencies(
        &self,
        env: &EnvConfig,
        env_path: &Path,
        coordinator: &Coordinator,
        shutdown: &CancellationToken,
    ) -> Option<DependencyReport> {
        if self.settings.containers.is_empty() || shutdown.is_cancelled() {
            return None;
        }

        self.out.status("Checking dependency containers...");
        let manager = ContainerManager::new(
            self.runtime.clone(),
            self.settings.timings.readiness_interval,
        );

        let report = tokio::select! {
            report = manager.ensure_all(&self.settings.containers, env) => report,
            _ = shutdown.cancelled() => {
                for name in manager.started_containers() {
                    coordinator.track_container(name);
                }
                return None;
            }
        };

        for name in report.started_here() {
            coordinator.track_container(name);
        }

        for status in &report.containers {
            let line = format!("  {} ({}): {}", status.name, status.kind, status.state);
            if status.needs_fallback() {
                self.out.warning(&line);
            } else {
                self.out.status(&line);
            }
        }

        if !report.degraded.is_empty() {
            for kind in &report.degraded {
                self.out.warning(&format!(
                    "{} unavailable: {} set to '{}'",
                    kind,
                    kind.env_key(),
                    kind.fallback_value()
                ));
            }
            if let Err(e) = report.env.persist_rewrites(env_path) {
                // Services still get the rewritten values through their environment
                self.out.warning(&format!(
                    "Could not update {}: {}",
                    env_path.display(),
                    e
                ));
            }
        }

        if report.started_here().next().is_some() {
            self.pause(self.settings.timings.dependency_settle, shutdown).await;
        }

        Some(report)
    }

    async fn launch_all(
        &self,
        descriptors: &[ServiceDescriptor],
        coordinator: &Coordinator,
        shutdown: &CancellationToken,
    ) -> Vec<(String, LaunchOutcome)> {
        let launcher = Launcher::new(self.settings.timings.launch_grace);
        let mut outcomes = Vec::with_capacity(descriptors.len());

        for (i, descriptor) in descriptors.iter().enumerate() {
            if i > 0 {
                self.pause(self.settings.timings.launch_pacing, shutdown).await;
            }
            if shutdown.is_cancelled() {
                outcomes.push((descriptor.name.clone(), LaunchOutcome::Cancelled));
                continue;
            }

            self.out.status(&format!("Starting {}...", descriptor.name));
            // Not raced against the shutdown token: an interrupted launch
            // would leave a running process nobody tracks.
            let outcome = match launcher.start(descriptor).await {
                Ok(handle) => {
                    self.out.success(&format!(
                        "  {} started (PID {}), log: {}",
                        descriptor.name,
                        handle.pid,
                        descriptor.log_path.display()
                    ));
                    let pid = handle.pid;
                    coordinator.track_process(handle);
                    LaunchOutcome::Started { pid }
                }
                Err(e @ (Error::PortInUse { .. } | Error::AlreadyRunning { .. })) => {
                    self.out.warning(&format!("  Skipping {}: {}", descriptor.name, e));
                    if let Some(hint) = e.suggestion() {
                        self.out.warning(&format!("  Hint: {}", hint));
                    }
                    LaunchOutcome::Skipped(e.to_string())
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    self.out.error(&format!("  {}", e));
                    LaunchOutcome::Failed(e.to_string())
                }
            };
            outcomes.push((descriptor.name.clone(), outcome));
        }
        outcomes
    }

    async fn teardown(&self, coordinator: &Coordinator) -> ShutdownReport {
        let has_work = !coordinator.tracked_processes().is_empty()
            || !coordinator.tracked_containers().is_empty();
        if has_work {
            self.out.blank();
            self.out.status("Stopping...");
        }

        let report = coordinator.shutdown().await;
        for step in report.failures() {
            self.out.warning(&format!("  {}: {:?}", step.target, step.outcome));
        }
        if has_work {
            self.out.success("Stopped.");
        }
        report
    }

    /// Sleep unless shutdown is requested first.
    async fn pause(&self, duration: Duration, shutdown: &CancellationToken) {
        if duration.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = shutdown.cancelled() => {}
        }
    }

    fn print_banner(&self, targets: &[ServiceDescriptor], env: &EnvConfig) {
        let out = self.out;
        out.section("AI Call Center System - Local Development");
        out.status(&format!("Project directory: {}", self.work_dir.display()));
        out.status(&format!("Environment:       {}", env.environment_name()));
        out.status(&format!(
            "Logs:              {}",
            SupervisorSettings::resolve(&self.work_dir, &self.settings.logs_dir).display()
        ));

        let urls: Vec<(&str, &str)> = targets
            .iter()
            .filter_map(|t| {
                self.settings
                    .services
                    .iter()
                    .find(|s| s.name == t.name)
                    .and_then(|s| s.url.as_deref())
                    .map(|url| (t.name.as_str(), url))
            })
            .collect();
        if !urls.is_empty() {
            out.blank();
            out.status("Services:");
            for (name, url) in urls {
                out.status(&format!("  {:<12} {}", name, url));
            }
        }
        out.blank();
        out.status("Stop: Ctrl+C");
        out.status(&"=".repeat(60));
    }
}
