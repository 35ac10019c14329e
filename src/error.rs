// thiserror's generated code for struct variants trips unused_assignments
// even though the fields are read by Display.
#![allow(unused_assignments)]

use crate::docker::DockerError;
use miette::Diagnostic;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(run_local::config::error))]
    Config(String),

    #[error("Precondition failed: {0}")]
    #[diagnostic(
        code(run_local::precondition),
        help("Run from the project root and check the interpreter version")
    )]
    Precondition(String),

    #[error("Unknown component '{name}' (expected one of: {})", .available.join(", "))]
    #[diagnostic(
        code(run_local::component::unknown),
        help("Use --component all, or one of the declared service names")
    )]
    UnknownComponent { name: String, available: Vec<String> },

    #[error("Port {port} for service '{service}' is already in use{}",
        .holder.as_ref().map(|h| format!(" by {}", h)).unwrap_or_default()
    )]
    #[diagnostic(
        code(run_local::port::in_use),
        help("Find what's using the port with: lsof -i :{port}")
    )]
    PortInUse {
        service: String,
        port: u16,
        holder: Option<String>,
    },

    #[error("Service '{service}' is already running (PID {pid})")]
    #[diagnostic(code(run_local::service::already_running))]
    AlreadyRunning { service: String, pid: u32 },

    #[error("Service '{service}' failed to start: {detail}")]
    #[diagnostic(
        code(run_local::service::startup_failed),
        help("Inspect the service log for the crash output")
    )]
    StartupFailed {
        service: String,
        log_path: PathBuf,
        detail: String,
    },

    #[error("Process error: {0}")]
    #[diagnostic(
        code(run_local::process::error),
        help("Check that the command exists and is executable")
    )]
    Process(String),

    #[error("Setup failed: {0}")]
    #[diagnostic(code(run_local::setup::failed))]
    Setup(String),

    #[error("Container runtime error: {0}")]
    #[diagnostic(
        code(run_local::docker::error),
        help("Check that Docker is running with `docker ps`")
    )]
    Docker(#[from] DockerError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid PID {pid}: {reason}")]
    InvalidPid { pid: u32, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::UnknownComponent { available, .. } => Some(format!(
                "Valid components: all, {}",
                available.join(", ")
            )),
            Error::PortInUse { port, .. } => Some(format!(
                "Port {} is already in use. Stop the other listener or change the service port in supervisor.yaml.",
                port
            )),
            Error::AlreadyRunning { service, pid } => Some(format!(
                "A previous run left '{}' alive. Stop PID {} or remove its pid file if it is not yours.",
                service, pid
            )),
            Error::StartupFailed { log_path, .. } => Some(format!(
                "See the full output in {}",
                log_path.display()
            )),
            Error::Precondition(_) => Some(
                "run-local must be started from the project root (the directory containing main.py)"
                    .to_string(),
            ),
            Error::Config(_) | Error::Yaml(_) => {
                Some("Check supervisor.yaml and the .env file for typos".to_string())
            }
            Error::Docker(_) => Some("Check that Docker is running: docker ps".to_string()),
            Error::Process(_) => {
                Some("Check that the command exists and is executable".to_string())
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

/// Validates and converts a u32 PID to nix::unistd::Pid for signalling.
/// Rejects PID 0 (process group), PID 1 (init) and values > i32::MAX.
pub fn validate_pid(pid: u32, service_name: &str) -> Result<nix::unistd::Pid> {
    if pid == 0 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID 0 is invalid for service '{}' (refers to process group, not a process)",
                service_name
            ),
        });
    }
    if pid == 1 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "refusing to signal PID 1 (init) for service '{}'",
                service_name
            ),
        });
    }
    if pid > i32::MAX as u32 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID {} exceeds i32::MAX for service '{}'",
                pid, service_name
            ),
        });
    }
    Ok(nix::unistd::Pid::from_raw(pid as i32))
}

/// Read-only variant of [`validate_pid`]: PID 1 is allowed for existence checks.
pub fn validate_pid_for_check(pid: u32) -> Option<nix::unistd::Pid> {
    if pid == 0 || pid > i32::MAX as u32 {
        return None;
    }
    Some(nix::unistd::Pid::from_raw(pid as i32))
}

#[cfg(target_os = "linux")]
fn clock_ticks_per_sec() -> u64 {
    nix::unistd::sysconf(nix::unistd::SysconfVar::CLK_TCK)
        .ok()
        .flatten()
        .map(|v| v as u64)
        .unwrap_or(100)
}

/// Check whether `pid` still belongs to the process we launched at
/// `expected_start`.
///
/// Returns false only when the pid was clearly recycled by a different
/// process; when the start time cannot be determined the pid is trusted.
pub fn validate_pid_start_time(pid: u32, expected_start: chrono::DateTime<chrono::Utc>) -> bool {
    #[cfg(target_os = "linux")]
    {
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) else {
            return true;
        };
        // comm may contain spaces, so parse after the closing paren
        let Some(close_paren) = stat.rfind(')') else {
            return true;
        };
        let fields: Vec<&str> = stat[close_paren + 2..].split_whitespace().collect();
        let Some(starttime_jiffies) = fields.get(19).and_then(|s| s.parse::<u64>().ok()) else {
            return true;
        };
        let Some(uptime_secs) = std::fs::read_to_string("/proc/uptime")
            .ok()
            .and_then(|s| s.split_whitespace().next().and_then(|v| v.parse::<f64>().ok()))
        else {
            return true;
        };

        let expected_age = chrono::Utc::now().signed_duration_since(expected_start);
        let process_age_secs =
            uptime_secs - (starttime_jiffies as f64 / clock_ticks_per_sec() as f64);
        let expected_age_secs = expected_age.num_seconds() as f64;

        if (process_age_secs - expected_age_secs).abs() > 60.0 {
            tracing::warn!(
                "PID {} appears to be reused: process age {:.0}s vs expected {:.0}s",
                pid,
                process_age_secs,
                expected_age_secs
            );
            return false;
        }
    }

    #[cfg(target_os = "macos")]
    {
        use chrono::TimeZone;
        if let Ok(output) = std::process::Command::new("ps")
            .args(["-o", "lstart=", "-p", &pid.to_string()])
            .output()
        {
            let lstart = String::from_utf8_lossy(&output.stdout);
            if let Ok(started) =
                chrono::NaiveDateTime::parse_from_str(lstart.trim(), "%a %b %e %H:%M:%S %Y")
            {
                // ps lstart is local time
                if let Some(started_utc) = chrono::Local
                    .from_local_datetime(&started)
                    .earliest()
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                {
                    if (started_utc - expected_start).num_seconds().abs() > 60 {
                        tracing::warn!(
                            "PID {} appears to be reused: started at {} vs expected {}",
                            pid,
                            started_utc,
                            expected_start
                        );
                        return false;
                    }
                }
            }
        }
    }

    true
}
