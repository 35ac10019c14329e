use super::{ContainerDescriptor, ContainerRuntime, DependencyKind, ReadinessProbe};
use crate::config::EnvConfig;
use crate::docker::DockerError;
use crate::healthcheck::{
    check_with_retry, CommandChecker, ContainerExecChecker, HealthChecker, PortChecker,
};
use crate::port::is_port_open;
use crate::service::LifecycleState;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Upper bound for one readiness probe invocation.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of ensuring one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub name: String,
    pub kind: DependencyKind,
    pub state: LifecycleState,
    /// This run started or resumed the container, so teardown stops it.
    pub started_here: bool,
}

impl ContainerStatus {
    pub fn needs_fallback(&self) -> bool {
        matches!(
            self.state,
            LifecycleState::NotStarted | LifecycleState::Failed
        )
    }
}

/// Result of [`ContainerManager::ensure_all`].
#[derive(Debug, Clone)]
pub struct DependencyReport {
    pub containers: Vec<ContainerStatus>,
    /// Kinds whose `.env` keys were pointed at the fallback.
    pub degraded: Vec<DependencyKind>,
    /// The configuration services should be launched with.
    pub env: EnvConfig,
}

impl DependencyReport {
    /// Containers teardown should stop, in start order.
    pub fn started_here(&self) -> impl Iterator<Item = &str> {
        self.containers
            .iter()
            .filter(|c| c.started_here)
            .map(|c| c.name.as_str())
    }
}

pub struct ContainerManager {
    runtime: Arc<dyn ContainerRuntime>,
    readiness_interval: Duration,
    available: OnceCell<bool>,
    started: Mutex<Vec<String>>,
}

impl ContainerManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, readiness_interval: Duration) -> Self {
        Self {
            runtime,
            readiness_interval,
            available: OnceCell::new(),
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        Arc::clone(&self.runtime)
    }

    /// Containers this manager created or resumed so far, in order.
    ///
    /// Recorded as soon as the runtime command succeeds, before readiness
    /// polling, so an interrupted `ensure_all` still knows what to stop.
    pub fn started_containers(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    /// Probed once per manager; a daemon that comes up mid-run is not noticed.
    async fn runtime_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async { self.runtime.available().await })
            .await
    }

    /// Bring `desc` to `Running` if possible.
    ///
    /// `NotStarted` means the runtime is unusable and `Failed` means a runtime
    /// command failed; both call for the fallback. `Starting` means the
    /// container was launched but never passed its readiness probe.
    #[tracing::instrument(skip(self, desc), fields(container = %desc.name))]
    pub async fn ensure_container(&self, desc: &ContainerDescriptor) -> LifecycleState {
        self.ensure(desc).await.state
    }

    async fn ensure(&self, desc: &ContainerDescriptor) -> ContainerStatus {
        let status = |state: LifecycleState, started_here: bool| ContainerStatus {
            name: desc.name.clone(),
            kind: desc.fallback,
            state,
            started_here,
        };

        let available = self.runtime_available().await;

        if available && self.runtime.is_running(&desc.name).await {
            tracing::info!("Container {} already running", desc.name);
            return status(LifecycleState::Running, false);
        }

        if is_port_open(desc.host_port) {
            tracing::info!(
                "Port {} already serving, using the existing {} instead of {}",
                desc.host_port,
                desc.fallback,
                desc.name
            );
            return status(LifecycleState::Running, false);
        }

        if !available {
            tracing::warn!(
                "Container runtime unavailable; {} will use its fallback",
                desc.fallback
            );
            return status(LifecycleState::NotStarted, false);
        }

        if let Err(e) = self.launch(desc).await {
            tracing::warn!("Could not start container {}: {}", desc.name, e);
            return status(LifecycleState::Failed, false);
        }
        self.started.lock().push(desc.name.clone());

        if self.wait_ready(desc).await {
            tracing::info!("Container {} is ready", desc.name);
            status(LifecycleState::Running, true)
        } else {
            tracing::warn!(
                "Container {} not ready after {} attempts; continuing anyway",
                desc.name,
                desc.readiness_attempts
            );
            status(LifecycleState::Starting, true)
        }
    }

    /// Resume when a container of this name exists, create otherwise.
    async fn launch(&self, desc: &ContainerDescriptor) -> Result<(), DockerError> {
        if self.runtime.exists(&desc.name).await? {
            tracing::info!("Resuming existing container {}", desc.name);
            match self.runtime.start(&desc.name).await {
                // Removed between the lookup and the start
                Err(DockerError::ContainerNotFound { .. }) => {}
                other => return other,
            }
        }
        tracing::info!("Creating container {} from {}", desc.name, desc.image);
        self.runtime.create(desc).await
    }

    async fn wait_ready(&self, desc: &ContainerDescriptor) -> bool {
        let checker: Box<dyn HealthChecker> = match &desc.readiness {
            ReadinessProbe::Exec { command } => Box::new(ContainerExecChecker::new(
                self.runtime(),
                desc.name.clone(),
                command.clone(),
                PROBE_TIMEOUT,
            )),
            ReadinessProbe::Command { command } => {
                Box::new(CommandChecker::new(command.clone(), PROBE_TIMEOUT))
            }
            ReadinessProbe::Port => Box::new(PortChecker::new(desc.host_port)),
        };
        check_with_retry(
            checker.as_ref(),
            desc.readiness_attempts,
            self.readiness_interval,
        )
        .await
    }

    /// Ensure every descriptor in order and fold the degrade transform over
    /// `env` for each one that could not be brought up.
    #[tracing::instrument(skip_all, fields(count = descs.len()))]
    pub async fn ensure_all(
        &self,
        descs: &[ContainerDescriptor],
        env: &EnvConfig,
    ) -> DependencyReport {
        let mut containers = Vec::with_capacity(descs.len());
        for desc in descs {
            containers.push(self.ensure(desc).await);
        }

        let mut degraded: Vec<DependencyKind> = Vec::new();
        for status in containers.iter().filter(|c| c.needs_fallback()) {
            if !degraded.contains(&status.kind) {
                degraded.push(status.kind);
            }
        }

        let env = degraded
            .iter()
            .fold(env.clone(), |acc, kind| acc.degrade(*kind));

        DependencyReport {
            containers,
            degraded,
            env,
        }
    }
}
