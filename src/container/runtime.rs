use super::ContainerDescriptor;
use crate::docker::{check_daemon_with_retry, DockerClient, DockerError, RunSpec};
use async_trait::async_trait;
use std::time::Duration;

/// The container operations the manager and the teardown need.
///
/// Implemented by [`DockerClient`]; tests substitute an in-memory runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime binary present and daemon answering.
    async fn available(&self) -> bool;

    async fn is_running(&self, name: &str) -> bool;

    /// A container of this name exists, running or stopped.
    async fn exists(&self, name: &str) -> Result<bool, DockerError>;

    /// Resume a stopped container.
    async fn start(&self, name: &str) -> Result<(), DockerError>;

    /// Create and start a detached container from the descriptor.
    async fn create(&self, desc: &ContainerDescriptor) -> Result<(), DockerError>;

    /// Stop without removing.
    async fn stop(&self, name: &str) -> Result<(), DockerError>;

    /// Run `argv` inside the container; true on exit status 0.
    async fn exec(&self, name: &str, argv: &[String], timeout: Duration)
        -> Result<bool, DockerError>;
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn available(&self) -> bool {
        if !self.is_installed().await {
            tracing::debug!("{} is not installed", self.binary());
            return false;
        }
        check_daemon_with_retry(self, 3, Duration::from_secs(10)).await
    }

    async fn is_running(&self, name: &str) -> bool {
        DockerClient::is_running(self, name).await
    }

    async fn exists(&self, name: &str) -> Result<bool, DockerError> {
        self.container_exists(name).await
    }

    async fn start(&self, name: &str) -> Result<(), DockerError> {
        DockerClient::start(self, name).await
    }

    async fn create(&self, desc: &ContainerDescriptor) -> Result<(), DockerError> {
        let id = self
            .run_detached(&RunSpec {
                name: &desc.name,
                image: &desc.image,
                host_port: desc.host_port,
                container_port: desc.container_port,
                env: &desc.env,
            })
            .await?;
        tracing::debug!("Created container {} ({})", desc.name, id);
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), DockerError> {
        DockerClient::stop(self, name).await
    }

    async fn exec(
        &self,
        name: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<bool, DockerError> {
        let output = DockerClient::exec(self, name, argv, timeout).await?;
        Ok(output.status.success())
    }
}
