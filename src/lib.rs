//! # run-local
//!
//! Local development supervisor for the call-center services.
//!
//! A run selects services, checks the project and interpreter, makes sure the
//! database and cache containers are up (or rewrites `.env` to file-backed
//! fallbacks when no container runtime is available), launches each service
//! with its output in `logs/<name>.log` and its pid in `logs/<name>.pid`, then
//! waits for Ctrl+C and stops everything it started.
//!
//! ```no_run
//! use run_local::{output::CliOutput, Supervisor, SupervisorSettings};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), run_local::Error> {
//! let work_dir = std::path::Path::new(".");
//! let settings = SupervisorSettings::load(work_dir, None)?;
//! let token = CancellationToken::new();
//! let _listener = run_local::supervisor::spawn_signal_listener(token.clone());
//!
//! let summary = Supervisor::new(settings, work_dir, &CliOutput)
//!     .run("api", false, token)
//!     .await?;
//! assert!(summary.shutdown.failures().next().is_none());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod container;
pub mod docker;
pub mod error;
pub mod healthcheck;
pub mod logging;
pub mod output;
pub mod port;
pub mod preflight;
pub mod selector;
pub mod service;
pub mod setup;
pub mod supervisor;

pub use config::{EnvConfig, SupervisorSettings, Timings};
pub use error::{Error, Result};
pub use selector::Selector;
pub use supervisor::{Coordinator, ShutdownReport, Supervisor};
