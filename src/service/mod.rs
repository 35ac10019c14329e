//! Service processes: descriptors, pid records, launching and stopping.

pub mod launcher;
pub mod pidfile;
pub mod process;
mod types;

pub use launcher::Launcher;
pub use process::{is_pid_alive, stop_process, StopOutcome};
pub use types::{LifecycleState, ProcessHandle, ServiceDescriptor};
