use crate::container::ContainerRuntime;
use crate::error::validate_pid_start_time;
use crate::service::{
    is_pid_alive, pidfile, stop_process, LifecycleState, ProcessHandle, StopOutcome,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What one teardown step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Stopped,
    /// Needed SIGKILL after the stop timeout.
    Killed,
    /// Nothing left to stop.
    AlreadyGone,
    /// The pid now belongs to an unrelated process; it was not signalled.
    PidReused,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownStep {
    /// e.g. `process api (PID 4121)` or `container callcenter_redis_dev`
    pub target: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub steps: Vec<ShutdownStep>,
}

impl ShutdownReport {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ShutdownStep> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
    }
}

/// The teardown stack: every resource a run acquired, released once.
///
/// Processes are stopped newest first, then containers newest first. Each
/// step is isolated; a failure is logged and recorded, never propagated.
pub struct Coordinator {
    runtime: Option<Arc<dyn ContainerRuntime>>,
    stop_timeout: Duration,
    processes: Mutex<Vec<ProcessHandle>>,
    containers: Mutex<Vec<String>>,
    shutdown_started: AtomicBool,
}

impl Coordinator {
    /// `runtime` stops tracked containers; without one they are left alone.
    pub fn new(runtime: Option<Arc<dyn ContainerRuntime>>, stop_timeout: Duration) -> Self {
        Self {
            runtime,
            stop_timeout,
            processes: Mutex::new(Vec::new()),
            containers: Mutex::new(Vec::new()),
            shutdown_started: AtomicBool::new(false),
        }
    }

    pub fn track_process(&self, handle: ProcessHandle) {
        tracing::debug!("Tracking '{}' (PID {})", handle.name(), handle.pid);
        self.processes.lock().push(handle);
    }

    pub fn track_container(&self, name: impl Into<String>) {
        let name = name.into();
        tracing::debug!("Tracking container {}", name);
        self.containers.lock().push(name);
    }

    pub fn tracked_processes(&self) -> Vec<ProcessHandle> {
        self.processes.lock().clone()
    }

    pub fn tracked_containers(&self) -> Vec<String> {
        self.containers.lock().clone()
    }

    /// Release everything tracked. Runs once; later calls return an empty
    /// report.
    pub async fn shutdown(&self) -> ShutdownReport {
        if self
            .shutdown_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Shutdown already in progress or completed, skipping");
            return ShutdownReport::default();
        }

        let mut report = ShutdownReport::default();

        let processes = std::mem::take(&mut *self.processes.lock());
        for handle in processes.into_iter().rev() {
            report.steps.push(self.stop_service(handle).await);
        }

        let containers = std::mem::take(&mut *self.containers.lock());
        for name in containers.into_iter().rev() {
            report.steps.push(self.stop_container(&name).await);
        }

        report
    }

    async fn stop_service(&self, mut handle: ProcessHandle) -> ShutdownStep {
        let target = format!("process {} (PID {})", handle.name(), handle.pid);
        handle.transition(LifecycleState::Stopping);

        let mut outcome = if is_pid_alive(handle.pid)
            && !validate_pid_start_time(handle.pid, handle.started_at)
        {
            tracing::warn!(
                "PID {} no longer belongs to '{}', not signalling it",
                handle.pid,
                handle.name()
            );
            StepOutcome::PidReused
        } else {
            match stop_process(handle.name(), handle.pid, self.stop_timeout).await {
                Ok(StopOutcome::Terminated) => StepOutcome::Stopped,
                Ok(StopOutcome::Killed) => StepOutcome::Killed,
                Ok(StopOutcome::AlreadyExited) => StepOutcome::AlreadyGone,
                Err(e) => {
                    tracing::warn!("Failed to stop '{}': {}", handle.name(), e);
                    StepOutcome::Failed(e.to_string())
                }
            }
        };

        if let Err(e) = pidfile::remove_pid_file(&handle.descriptor.pid_path) {
            tracing::warn!("Failed to remove pid file for '{}': {}", handle.name(), e);
            if !matches!(outcome, StepOutcome::Failed(_)) {
                outcome = StepOutcome::Failed(format!("pid file not removed: {}", e));
            }
        }

        handle.transition(LifecycleState::Stopped);
        tracing::info!("{}: {:?}", target, outcome);
        ShutdownStep { target, outcome }
    }

    async fn stop_container(&self, name: &str) -> ShutdownStep {
        let target = format!("container {}", name);
        let outcome = match &self.runtime {
            Some(runtime) => match runtime.stop(name).await {
                Ok(()) => StepOutcome::Stopped,
                Err(e) => {
                    tracing::warn!("Failed to stop container {}: {}", name, e);
                    StepOutcome::Failed(e.to_string())
                }
            },
            None => StepOutcome::Failed("no container runtime".to_string()),
        };
        tracing::info!("{}: {:?}", target, outcome);
        ShutdownStep { target, outcome }
    }
}
