use super::duration::{parse_duration_string, serde_str};
use crate::container::ContainerDescriptor;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Looked up in the work dir when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "supervisor.yaml";

/// Reserved component name selecting every service.
pub const ALL_COMPONENTS: &str = "all";

/// Delays and bounds used across a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// How long a launched process must survive to count as started.
    #[serde(with = "serde_str")]
    pub launch_grace: Duration,
    /// SIGTERM-to-SIGKILL window during teardown.
    #[serde(with = "serde_str")]
    pub stop_timeout: Duration,
    /// Pause between consecutive launches.
    #[serde(with = "serde_str")]
    pub launch_pacing: Duration,
    /// Pause after dependency containers are ensured.
    #[serde(with = "serde_str")]
    pub dependency_settle: Duration,
    #[serde(with = "serde_str")]
    pub readiness_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            launch_grace: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(5),
            launch_pacing: Duration::from_secs(2),
            dependency_settle: Duration::from_secs(3),
            readiness_interval: Duration::from_secs(1),
        }
    }
}

impl Timings {
    /// Apply `RUN_LOCAL_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; unparseable values are config errors.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let fields: [(&str, &mut Duration); 5] = [
            ("RUN_LOCAL_LAUNCH_GRACE", &mut self.launch_grace),
            ("RUN_LOCAL_STOP_TIMEOUT", &mut self.stop_timeout),
            ("RUN_LOCAL_LAUNCH_PACING", &mut self.launch_pacing),
            ("RUN_LOCAL_DEPENDENCY_SETTLE", &mut self.dependency_settle),
            ("RUN_LOCAL_READINESS_INTERVAL", &mut self.readiness_interval),
        ];
        for (key, slot) in fields {
            let Some(raw) = lookup(key) else { continue };
            *slot = parse_duration_string(&raw).ok_or_else(|| {
                Error::Config(format!(
                    "{}='{}' is not a duration (expected e.g. 500ms, 2s, 1m)",
                    key, raw
                ))
            })?;
            tracing::debug!("{} overridden to {:?}", key, slot);
        }
        Ok(())
    }
}

/// One launchable service as declared in config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    /// Shell command template; `{python}` and `{port}` are substituted.
    pub command: String,
    #[serde(default)]
    pub port: Option<u16>,
    /// Shown in the startup banner.
    #[serde(default)]
    pub url: Option<String>,
}

impl ServiceSpec {
    fn new(name: &str, command: &str, port: Option<u16>, url: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            port,
            url: url.map(String::from),
        }
    }

    /// The command with the interpreter path (shell-escaped) and port filled in.
    pub fn render_command(&self, interpreter: &str) -> String {
        let python = shell_escape::escape(interpreter.into());
        let rendered = self.command.replace("{python}", &python);
        match self.port {
            Some(port) => rendered.replace("{port}", &port.to_string()),
            None => rendered,
        }
    }
}

/// Everything the supervisor reads from config.
///
/// `Default` is the call-center project layout; `supervisor.yaml` overrides
/// any subset of fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub logs_dir: PathBuf,
    pub env_file: PathBuf,
    /// Copied to `env_file` by `--setup` when the latter is missing.
    pub env_template: PathBuf,
    /// `None` skips the interpreter version check.
    pub interpreter: Option<String>,
    pub min_interpreter_version: String,
    pub required_files: Vec<PathBuf>,
    pub optional_tools: Vec<String>,
    pub setup_directories: Vec<PathBuf>,
    /// Run by `--setup`; `{python}` is substituted.
    pub install_command: Option<String>,
    pub container_runtime: String,
    pub services: Vec<ServiceSpec>,
    pub containers: Vec<ContainerDescriptor>,
    pub timings: Timings,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            env_file: PathBuf::from(".env"),
            env_template: PathBuf::from(".env.example"),
            interpreter: Some("python3".to_string()),
            min_interpreter_version: "3.8".to_string(),
            required_files: vec![PathBuf::from("main.py")],
            optional_tools: ["docker", "pg_isready", "redis-cli"]
                .map(String::from)
                .to_vec(),
            setup_directories: ["logs", "static", "templates", "data"]
                .map(PathBuf::from)
                .to_vec(),
            install_command: Some("{python} -m pip install -r requirements.txt".to_string()),
            container_runtime: "docker".to_string(),
            services: vec![
                ServiceSpec::new("agents", "{python} main.py system", None, None),
                ServiceSpec::new(
                    "api",
                    "{python} main.py api --reload --port {port}",
                    Some(8000),
                    Some("http://localhost:8000"),
                ),
                ServiceSpec::new(
                    "dashboard",
                    "{python} main.py dashboard",
                    Some(8501),
                    Some("http://localhost:8501"),
                ),
            ],
            containers: vec![ContainerDescriptor::postgres(), ContainerDescriptor::redis()],
            timings: Timings::default(),
        }
    }
}

impl SupervisorSettings {
    /// Load settings for `work_dir`.
    ///
    /// An explicit path must exist. Otherwise `supervisor.yaml` in the work
    /// dir is used when present, and the built-in defaults when not.
    /// Environment timing overrides are applied last.
    pub fn load(work_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit {
            Some(path) => {
                let path = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    work_dir.join(path)
                };
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Self::from_file(&path)?
            }
            None => {
                let path = work_dir.join(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    tracing::debug!(
                        "No {} in {}, using defaults",
                        DEFAULT_CONFIG_FILE,
                        work_dir.display()
                    );
                    Self::default()
                }
            }
        };
        settings.timings.apply_env_overrides()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings = Self::from_yaml(&contents).map_err(|e| match e {
            Error::Yaml(inner) => Error::Config(format!("{}: {}", path.display(), inner)),
            other => other,
        })?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document means "all defaults"
        let settings: Self = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for service in &self.services {
            validate_name("service", &service.name)?;
            if service.name == ALL_COMPONENTS {
                return Err(Error::Config(format!(
                    "'{}' is reserved and cannot name a service",
                    ALL_COMPONENTS
                )));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate service name '{}'",
                    service.name
                )));
            }
            if service.command.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Service '{}' has an empty command",
                    service.name
                )));
            }
        }

        let mut seen = HashSet::new();
        for container in &self.containers {
            validate_name("container", &container.name)?;
            if !seen.insert(container.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate container name '{}'",
                    container.name
                )));
            }
        }

        if self.container_runtime.trim().is_empty() {
            return Err(Error::Config("container_runtime must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    /// `path` resolved against `work_dir` unless already absolute.
    pub fn resolve(work_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            work_dir.join(path)
        }
    }

    /// The interpreter used for `{python}`, `python3` when unset.
    pub fn interpreter_or_default(&self) -> &str {
        self.interpreter.as_deref().unwrap_or("python3")
    }
}

/// Names become file names (`<name>.log`) and container names.
fn validate_name(what: &str, name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.');
    if !ok {
        return Err(Error::Config(format!(
            "Invalid {} name '{}' (use letters, digits, '-', '_' or '.')",
            what, name
        )));
    }
    Ok(())
}
