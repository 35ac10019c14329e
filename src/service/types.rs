use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Lifecycle of a launched service or a dependency container.
///
/// ```text
/// NotStarted ──► Starting ──► Running ──► Stopping ──► Stopped
///                   │            │           ▲
///                   ▼            ▼           │
///                 Failed ◄───────┘───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NotStarted,
    Starting,
    Running,
    Failed,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::NotStarted => write!(f, "not started"),
            LifecycleState::Starting => write!(f, "starting"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Failed => write!(f, "failed"),
            LifecycleState::Stopping => write!(f, "stopping"),
            LifecycleState::Stopped => write!(f, "stopped"),
        }
    }
}

impl LifecycleState {
    /// Check a transition against the state machine above.
    ///
    /// ```
    /// use run_local::service::LifecycleState;
    ///
    /// assert!(LifecycleState::NotStarted.is_valid_transition(LifecycleState::Starting));
    /// assert!(!LifecycleState::NotStarted.is_valid_transition(LifecycleState::Running));
    /// ```
    pub fn is_valid_transition(&self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, to) {
            (NotStarted, Starting) => true,
            (Starting, Running) | (Starting, Failed) => true,
            (Running, Stopping) | (Running, Failed) => true,
            (Failed, Stopping) => true,
            (Stopping, Stopped) => true,
            (s1, s2) if *s1 == s2 => true,
            _ => false,
        }
    }
}

/// Everything needed to launch one service. Built by the selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    /// Shell command line for `bash -c`; `exec`ed when it is a simple command.
    pub launch_command: String,
    pub port: Option<u16>,
    pub log_path: PathBuf,
    pub pid_path: PathBuf,
    pub work_dir: PathBuf,
    /// Extra environment on top of the inherited one (the `.env` values).
    pub environment: BTreeMap<String, String>,
}

/// A process this run launched.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub descriptor: ServiceDescriptor,
    pub pid: u32,
    pub state: LifecycleState,
    pub started_at: DateTime<Utc>,
}

impl ProcessHandle {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Move to `to`, refusing transitions the state machine does not allow.
    pub fn transition(&mut self, to: LifecycleState) -> bool {
        if self.state.is_valid_transition(to) {
            self.state = to;
            true
        } else {
            tracing::debug!(
                "Ignoring invalid transition {} -> {} for '{}'",
                self.state,
                to,
                self.descriptor.name
            );
            false
        }
    }
}
