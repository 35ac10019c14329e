use super::HealthChecker;
use crate::container::ContainerRuntime;
use crate::error::Result;
use crate::port::is_port_open;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Runs a command on the host; exit status 0 means ready.
pub struct CommandChecker {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandChecker {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }
}

#[async_trait]
impl HealthChecker for CommandChecker {
    async fn check(&self) -> Result<bool> {
        let Some((program, args)) = self.argv.split_first() else {
            return Ok(false);
        };
        let result = tokio::time::timeout(
            self.timeout,
            Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status(),
        )
        .await;

        match result {
            Ok(Ok(status)) => Ok(status.success()),
            Ok(Err(_)) | Err(_) => Ok(false),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn describe(&self) -> String {
        format!("command `{}`", self.argv.join(" "))
    }
}

/// Runs a command inside a container through the runtime.
pub struct ContainerExecChecker {
    runtime: Arc<dyn ContainerRuntime>,
    container: String,
    argv: Vec<String>,
    timeout: Duration,
}

impl ContainerExecChecker {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        container: impl Into<String>,
        argv: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            container: container.into(),
            argv,
            timeout,
        }
    }
}

#[async_trait]
impl HealthChecker for ContainerExecChecker {
    async fn check(&self) -> Result<bool> {
        match self
            .runtime
            .exec(&self.container, &self.argv, self.timeout)
            .await
        {
            Ok(ready) => Ok(ready),
            Err(_) => Ok(false),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn describe(&self) -> String {
        format!("{}: exec `{}`", self.container, self.argv.join(" "))
    }
}

/// Ready once something listens on the host port.
pub struct PortChecker {
    port: u16,
}

impl PortChecker {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl HealthChecker for PortChecker {
    async fn check(&self) -> Result<bool> {
        Ok(is_port_open(self.port))
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(100)
    }

    fn describe(&self) -> String {
        format!("port {}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[tokio::test]
    async fn host_command_exit_status() {
        let ok = CommandChecker::new(vec!["true".to_string()], Duration::from_secs(5));
        assert!(ok.check().await.unwrap());

        let failing = CommandChecker::new(vec!["false".to_string()], Duration::from_secs(5));
        assert!(!failing.check().await.unwrap());

        let missing = CommandChecker::new(
            vec!["definitely-not-a-real-binary-xyz".to_string()],
            Duration::from_secs(5),
        );
        assert!(!missing.check().await.unwrap());

        let empty = CommandChecker::new(Vec::new(), Duration::from_secs(5));
        assert!(!empty.check().await.unwrap());
    }

    #[tokio::test]
    async fn host_command_times_out() {
        let slow = CommandChecker::new(
            vec!["sleep".to_string(), "5".to_string()],
            Duration::from_millis(50),
        );
        let start = std::time::Instant::now();
        assert!(!slow.check().await.unwrap());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn port_checker_sees_listener() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(PortChecker::new(port).check().await.unwrap());
        drop(listener);
        assert!(!PortChecker::new(port).check().await.unwrap());
    }
}
