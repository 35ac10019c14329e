//! Liveness checks and signalling for launched process groups.

use crate::error::{validate_pid, validate_pid_for_check, Result};
use nix::sys::signal::{self, killpg, Signal};
use nix::unistd::Pid;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing to signal.
    AlreadyExited,
    /// Exited within the timeout after SIGTERM.
    Terminated,
    /// Needed SIGKILL.
    Killed,
}

/// True if `pid` names a live, non-zombie process.
///
/// Signal 0 alone reports zombies as alive, so on Linux the `/proc` state
/// letter is consulted as well.
pub fn is_pid_alive(pid: u32) -> bool {
    let Some(nix_pid) = validate_pid_for_check(pid) else {
        return false;
    };
    if signal::kill(nix_pid, None).is_err() {
        return false;
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            if let Some(line) = status.lines().find(|l| l.starts_with("State:")) {
                // "State:\tZ (zombie)"
                let state = line
                    .trim_start_matches("State:")
                    .trim_start()
                    .chars()
                    .next();
                return !matches!(state, Some('Z' | 'X' | 'x'));
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        if let Ok(output) = std::process::Command::new("ps")
            .args(["-p", &pid.to_string(), "-o", "stat="])
            .output()
        {
            if output.status.success() {
                let stat = String::from_utf8_lossy(&output.stdout);
                return !stat.trim().starts_with('Z');
            }
        }
    }

    true
}

/// Process group of `pid`, if it leads its own group.
///
/// Services are spawned with `process_group(0)`, so a group equal to our own
/// means the pid is not one of ours and group signalling would hit the
/// supervisor itself.
pub fn own_process_group(pid: u32) -> Option<Pid> {
    let nix_pid = validate_pid_for_check(pid)?;
    let pgid = nix::unistd::getpgid(Some(nix_pid)).ok()?;
    if pgid.as_raw() <= 0 || pgid == nix::unistd::getpgrp() {
        return None;
    }
    Some(pgid)
}

fn send(pid: Pid, pgid: Option<Pid>, sig: Signal) -> nix::Result<()> {
    match pgid {
        Some(group) => killpg(group, sig).or_else(|_| signal::kill(pid, sig)),
        None => signal::kill(pid, sig),
    }
}

/// True while any live member of `pgid` exists. Without a group only the
/// leader was signalled, so there is nothing more to watch.
///
/// `killpg` with signal 0 also counts zombies, so on Linux the members'
/// `/proc` state is checked the same way [`is_pid_alive`] does.
fn group_alive(pgid: Option<Pid>) -> bool {
    let Some(group) = pgid else {
        return false;
    };
    if killpg(group, None).is_err() {
        return false;
    }

    #[cfg(target_os = "linux")]
    {
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return true;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(pid) = name.to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) else {
                continue;
            };
            // "<pid> (<comm>) <state> <ppid> <pgrp> ..."; comm may hold spaces
            let Some(close_paren) = stat.rfind(')') else {
                continue;
            };
            let mut fields = stat[close_paren + 1..].split_whitespace();
            let state = fields.next();
            let pgrp = fields.nth(1).and_then(|p| p.parse::<i32>().ok());
            if pgrp == Some(group.as_raw()) && !matches!(state, Some("Z" | "X" | "x")) {
                return true;
            }
        }
        false
    }

    #[cfg(not(target_os = "linux"))]
    {
        true
    }
}

/// SIGTERM the service's process group, wait up to `timeout` for the leader
/// and every other group member to exit, then SIGKILL the group.
///
/// A leader that exits while a child ignores SIGTERM (a reload worker still
/// holding the port) does not count as terminated.
pub async fn stop_process(service: &str, pid: u32, timeout: Duration) -> Result<StopOutcome> {
    let nix_pid = validate_pid(pid, service)?;
    if !is_pid_alive(pid) {
        return Ok(StopOutcome::AlreadyExited);
    }

    let pgid = own_process_group(pid);
    if let Err(e) = send(nix_pid, pgid, Signal::SIGTERM) {
        if e == nix::errno::Errno::ESRCH {
            return Ok(StopOutcome::AlreadyExited);
        }
        return Err(crate::Error::Process(format!(
            "failed to signal '{}' (PID {}): {}",
            service, pid, e
        )));
    }

    let polls = (timeout.as_millis() / POLL_INTERVAL.as_millis()).max(1);
    for _ in 0..polls {
        tokio::time::sleep(POLL_INTERVAL).await;
        if !is_pid_alive(pid) && !group_alive(pgid) {
            return Ok(StopOutcome::Terminated);
        }
    }

    if is_pid_alive(pid) {
        tracing::warn!(
            "'{}' (PID {}) did not exit within {:?} of SIGTERM, sending SIGKILL",
            service,
            pid,
            timeout
        );
    } else {
        tracing::warn!(
            "'{}' (PID {}) exited but its process group outlived SIGTERM, sending SIGKILL",
            service,
            pid
        );
    }
    let _ = send(nix_pid, pgid, Signal::SIGKILL);
    for _ in 0..10 {
        tokio::time::sleep(POLL_INTERVAL).await;
        if !is_pid_alive(pid) && !group_alive(pgid) {
            break;
        }
    }
    Ok(StopOutcome::Killed)
}
