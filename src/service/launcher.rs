use super::pidfile;
use super::process::is_pid_alive;
use super::{LifecycleState, ProcessHandle, ServiceDescriptor};
use crate::error::{Error, Result};
use crate::port::PortConflict;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::oneshot;

/// Lines of log output attached to a startup failure.
const FAILURE_TAIL_LINES: usize = 20;

/// Starts service processes and verifies they survive the grace period.
#[derive(Debug, Clone)]
pub struct Launcher {
    launch_grace: Duration,
}

impl Launcher {
    pub fn new(launch_grace: Duration) -> Self {
        Self { launch_grace }
    }

    /// Launch `descriptor` and return a handle once it has stayed alive for
    /// the grace period.
    ///
    /// Nothing is spawned and no pid file is written when the port is taken
    /// or a live previous instance holds the pid file. A process that dies
    /// during the grace period loses its pid file; its log is kept.
    #[tracing::instrument(skip(self, descriptor), fields(service = %descriptor.name))]
    pub async fn start(&self, descriptor: &ServiceDescriptor) -> Result<ProcessHandle> {
        pidfile::reconcile(&descriptor.name, &descriptor.pid_path)?;

        if let Some(port) = descriptor.port {
            if let Some(conflict) = PortConflict::check(port) {
                return Err(Error::PortInUse {
                    service: descriptor.name.clone(),
                    port,
                    holder: conflict.holder_description(),
                });
            }
        }

        if let Some(parent) = descriptor.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stdout_log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&descriptor.log_path)?;
        let stderr_log = stdout_log.try_clone()?;

        tracing::debug!(
            "Spawning '{}' in {}: {}",
            descriptor.name,
            descriptor.work_dir.display(),
            descriptor.launch_command
        );

        // The command line comes from trusted config and is meant to be
        // parsed by the shell, so it is not escaped here.
        let mut child = Command::new("bash")
            .arg("-c")
            .arg(shell_line(&descriptor.launch_command))
            .current_dir(&descriptor.work_dir)
            .envs(&descriptor.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_log))
            .stderr(Stdio::from(stderr_log))
            .kill_on_drop(false)
            .process_group(0)
            .spawn()
            .map_err(|e| {
                Error::Process(format!("failed to spawn '{}': {}", descriptor.name, e))
            })?;

        let Some(pid) = child.id() else {
            return Err(Error::Process(format!(
                "'{}' exited before its pid could be read",
                descriptor.name
            )));
        };
        let started_at = Utc::now();

        if let Err(e) = pidfile::write_pid(&descriptor.pid_path, pid) {
            let _ = child.start_kill();
            return Err(e);
        }

        let exit_rx = spawn_reaper(descriptor.name.clone(), child);

        let mut handle = ProcessHandle {
            descriptor: descriptor.clone(),
            pid,
            state: LifecycleState::NotStarted,
            started_at,
        };
        handle.transition(LifecycleState::Starting);

        tokio::time::sleep(self.launch_grace).await;

        let exit_status = exit_rx.await_now();
        if exit_status.is_some() || !is_pid_alive(pid) {
            handle.transition(LifecycleState::Failed);
            if let Err(e) = pidfile::remove_pid_file(&descriptor.pid_path) {
                tracing::warn!("Could not remove pid file for '{}': {}", descriptor.name, e);
            }

            let mut detail = match exit_status {
                Some(status) => format!(
                    "exited with {} within {:?}",
                    status,
                    self.launch_grace
                ),
                None => format!("exited within {:?}", self.launch_grace),
            };
            let tail = log_tail(&descriptor.log_path, FAILURE_TAIL_LINES);
            if !tail.is_empty() {
                detail.push_str("\n--- last log lines ---\n");
                detail.push_str(&tail);
            }
            return Err(Error::StartupFailed {
                service: descriptor.name.clone(),
                log_path: descriptor.log_path.clone(),
                detail,
            });
        }

        handle.transition(LifecycleState::Running);
        tracing::info!("Started '{}' (PID {})", descriptor.name, pid);
        Ok(handle)
    }
}

/// The line handed to `bash -c`.
///
/// A simple command is `exec`ed so the recorded pid is the service itself.
/// Anything with shell operators (`cd api && uvicorn ...`) runs as written;
/// bash then leads the process group and teardown still reaches the service
/// through the group.
fn shell_line(command: &str) -> String {
    let command = command.trim();
    let compound = command
        .chars()
        .any(|c| matches!(c, ';' | '&' | '|' | '\n' | '(' | ')' | '{' | '}'));
    if compound {
        command.to_string()
    } else {
        format!("exec {}", command)
    }
}

/// Exit status of a reaped child, if it has exited yet.
struct ExitWatch(oneshot::Receiver<ExitStatus>);

impl ExitWatch {
    fn await_now(mut self) -> Option<ExitStatus> {
        self.0.try_recv().ok()
    }
}

/// Await the child in the background so an exited service never lingers as
/// a zombie and pid liveness checks stay truthful.
fn spawn_reaper(name: String, mut child: tokio::process::Child) -> ExitWatch {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                tracing::debug!("'{}' exited: {}", name, status);
                let _ = tx.send(status);
            }
            Err(e) => tracing::debug!("Failed to wait for '{}': {}", name, e),
        }
    });
    ExitWatch(rx)
}

/// Last `lines` lines of the log, reading at most the final 16 KiB.
pub fn log_tail(path: &Path, lines: usize) -> String {
    const MAX_BYTES: u64 = 16 * 1024;

    let Ok(mut file) = std::fs::File::open(path) else {
        return String::new();
    };
    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    if len > MAX_BYTES && file.seek(SeekFrom::Start(len - MAX_BYTES)).is_err() {
        return String::new();
    }
    let mut buf = Vec::new();
    if file.read_to_end(&mut buf).is_err() {
        return String::new();
    }
    let text = String::from_utf8_lossy(&buf);
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
