//! Diagnostics: `tracing` to stderr and to a run log under the logs directory.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Supervisor diagnostics, next to the service logs.
pub const RUN_LOG_FILE: &str = "run-local.log";

/// Append-only log file opened on the first write.
///
/// Nothing touches the filesystem until an event is actually logged, so a run
/// rejected during argument or component validation leaves no `logs/`
/// directory behind.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Write for &RunLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut slot = self.file.lock();
        if slot.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let opened = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            *slot = Some(opened);
        }
        match slot.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.lock().as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for RunLog {
    type Writer = &'a RunLog;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}

/// Install the global subscriber: `RUST_LOG` (default `info`) filters both
/// stderr and, when given, the run log.
pub fn init(run_log: Option<RunLog>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = run_log.map(|log| fmt::layer().with_ansi(false).with_writer(log));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_is_created_on_first_write_and_appended() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join(RUN_LOG_FILE);
        let log = RunLog::new(&path);
        assert!(!dir.path().join("logs").exists());

        (&log).write_all(b"first\n").unwrap();
        (&log).write_all(b"second\n").unwrap();
        (&log).flush().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");

        let again = RunLog::new(&path);
        (&again).write_all(b"third\n").unwrap();
        assert_eq!(
            std::fs::read_to_string(again.path()).unwrap(),
            "first\nsecond\nthird\n"
        );
    }
}
