//! Readiness checks for dependency containers.

mod checker;
mod command;

pub use checker::{check_with_retry, HealthChecker};
pub use command::{CommandChecker, ContainerExecChecker, PortChecker};
