//! Centralized container runtime CLI client.
//!
//! All `docker` invocations go through [`DockerClient`], which provides
//! consistent timeout handling, error mapping to [`DockerError`], and a single
//! point where the runtime command is constructed.

use super::DockerError;
use std::collections::BTreeMap;
use std::process::Output;
use std::time::Duration;

/// Timeout for short inspection and lifecycle commands.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// `docker run` may pull the image first.
const RUN_TIMEOUT: Duration = Duration::from_secs(300);

/// Arguments for creating a detached container.
#[derive(Debug, Clone)]
pub struct RunSpec<'a> {
    pub name: &'a str,
    pub image: &'a str,
    pub host_port: u16,
    pub container_port: u16,
    pub env: &'a BTreeMap<String, String>,
}

impl RunSpec<'_> {
    /// Everything after the runtime binary, e.g. `["run", "-d", "--name", ...]`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.to_string(),
        ];
        for (key, value) in self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push("-p".to_string());
        args.push(format!("{}:{}", self.host_port, self.container_port));
        args.push(self.image.to_string());
        args
    }
}

/// Client for container runtime CLI operations.
///
/// Defaults to `docker`; any CLI-compatible runtime (e.g. `podman`) works.
#[derive(Debug, Clone)]
pub struct DockerClient {
    binary: String,
}

impl DockerClient {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    async fn run(&self, args: &[&str], timeout: Duration) -> Result<Output, DockerError> {
        let result = tokio::time::timeout(
            timeout,
            tokio::process::Command::new(&self.binary)
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let cmd_str = format!("{} {}", self.binary, args.join(" "));

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(DockerError::exec_failed(cmd_str, e)),
            Err(_) => Err(DockerError::timeout(cmd_str, timeout)),
        }
    }

    async fn run_success(&self, args: &[&str], timeout: Duration) -> Result<Output, DockerError> {
        let output = self.run(args, timeout).await?;
        if output.status.success() {
            Ok(output)
        } else {
            let cmd_str = format!("{} {}", self.binary, args.join(" "));
            Err(DockerError::failed(cmd_str, &output))
        }
    }

    // ========================================================================
    // Availability
    // ========================================================================

    /// True if the runtime binary can be executed at all.
    pub async fn is_installed(&self) -> bool {
        matches!(
            self.run(&["--version"], Duration::from_secs(5)).await,
            Ok(o) if o.status.success()
        )
    }

    /// True if the daemon answers `info`.
    pub async fn daemon_healthy(&self, timeout: Duration) -> bool {
        matches!(
            self.run(&["info", "--format", "{{.ServerVersion}}"], timeout).await,
            Ok(o) if o.status.success()
        )
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Whether a container with exactly this name exists (running or not).
    pub async fn container_exists(&self, name: &str) -> Result<bool, DockerError> {
        let filter = format!("name=^/?{}$", name);
        let output = self
            .run_success(
                &["ps", "-a", "--filter", &filter, "--format", "{{.Names}}"],
                COMMAND_TIMEOUT,
            )
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .any(|line| line.trim() == name))
    }

    /// Whether the named container is running. Missing containers are not.
    pub async fn is_running(&self, name: &str) -> bool {
        match self
            .run(&["inspect", "-f", "{{.State.Running}}", name], COMMAND_TIMEOUT)
            .await
        {
            Ok(o) if o.status.success() => String::from_utf8_lossy(&o.stdout).trim() == "true",
            _ => false,
        }
    }

    // ========================================================================
    // Container lifecycle
    // ========================================================================

    /// Resume an existing, stopped container.
    pub async fn start(&self, name: &str) -> Result<(), DockerError> {
        let output = self.run(&["start", name], COMMAND_TIMEOUT).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No such container") {
            return Err(DockerError::ContainerNotFound {
                container: name.to_string(),
            });
        }
        Err(DockerError::failed(format!("{} start", self.binary), &output))
    }

    /// Create and start a detached container. Returns the container ID.
    pub async fn run_detached(&self, spec: &RunSpec<'_>) -> Result<String, DockerError> {
        let args = spec.to_args();
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_success(&arg_refs, RUN_TIMEOUT).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Stop (not remove) a container. Already-stopped or missing is fine.
    pub async fn stop(&self, name: &str) -> Result<(), DockerError> {
        let output = self.run(&["stop", name], COMMAND_TIMEOUT).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No such container") || stderr.contains("is not running") {
            return Ok(());
        }
        Err(DockerError::failed(format!("{} stop", self.binary), &output))
    }

    /// Run a command inside a running container.
    pub async fn exec(
        &self,
        container: &str,
        cmd: &[String],
        timeout: Duration,
    ) -> Result<Output, DockerError> {
        let mut args = vec!["exec", container];
        args.extend(cmd.iter().map(String::as_str));
        self.run(&args, timeout).await
    }
}

impl Default for DockerClient {
    fn default() -> Self {
        Self::new()
    }
}
