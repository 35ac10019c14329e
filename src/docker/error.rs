use std::time::Duration;
use thiserror::Error;

/// Failure of one container runtime CLI invocation.
#[derive(Error, Debug)]
pub enum DockerError {
    #[error("Timed out running '{command}' after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("'{command}' failed{}: {stderr}",
        .exit_code.map(|c| format!(" (exit code {})", c)).unwrap_or_default()
    )]
    CommandFailed {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    /// The binary could not be run at all (missing from PATH, not executable).
    #[error("Failed to execute '{command}': {source}")]
    ExecFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// `start` named a container that does not exist.
    #[error("No such container: {container}")]
    ContainerNotFound { container: String },
}

impl DockerError {
    pub fn timeout(cmd: impl Into<String>, dur: Duration) -> Self {
        DockerError::Timeout {
            command: cmd.into(),
            timeout: dur,
        }
    }

    /// From a finished command with a non-zero status.
    pub fn failed(cmd: impl Into<String>, output: &std::process::Output) -> Self {
        DockerError::CommandFailed {
            command: cmd.into(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code(),
        }
    }

    pub fn exec_failed(cmd: impl Into<String>, err: std::io::Error) -> Self {
        DockerError::ExecFailed {
            command: cmd.into(),
            source: err,
        }
    }
}
