//! `<logs>/<name>.pid` records.
//!
//! The file holds the decimal pid and nothing else. It is the only launcher
//! state that outlives the supervisor, so a leftover file is reconciled
//! before its service is launched again.

use super::process::is_pid_alive;
use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::Path;

pub fn write_pid(path: &Path, pid: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{}\n", pid))?;
    Ok(())
}

/// The recorded pid. Missing files and unparseable contents read as `None`.
pub fn read_pid(path: &Path) -> Result<Option<u32>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let pid = contents.trim().parse::<u32>().ok();
            if pid.is_none() {
                tracing::warn!("Ignoring malformed pid file {}", path.display());
            }
            Ok(pid)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remove the record; already gone is fine.
pub fn remove_pid_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Make `path` safe to claim for `service`.
///
/// A live recorded pid refuses the launch; a dead or malformed record is
/// removed.
pub fn reconcile(service: &str, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    match read_pid(path)? {
        Some(pid) if is_pid_alive(pid) => Err(Error::AlreadyRunning {
            service: service.to_string(),
            pid,
        }),
        stale => {
            tracing::info!(
                "Removing stale pid file for '{}'{}",
                service,
                stale.map(|p| format!(" (PID {})", p)).unwrap_or_default()
            );
            remove_pid_file(path)
        }
    }
}
