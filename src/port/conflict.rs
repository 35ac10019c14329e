use std::net::TcpListener;
use std::process::Command;

/// True if some listener already holds `port` on the local host.
///
/// Binding both loopback and the wildcard address is required: on macOS a
/// bind to 127.0.0.1 can succeed while 0.0.0.0 is taken. The probe listeners
/// are dropped immediately, so the port is not reserved.
pub fn is_port_open(port: u16) -> bool {
    let localhost_free = TcpListener::bind(("127.0.0.1", port)).is_ok();
    let any_free = TcpListener::bind(("0.0.0.0", port)).is_ok();
    !(localhost_free && any_free)
}

#[derive(Debug, Clone)]
pub struct PortConflict {
    pub port: u16,
    pub processes: Vec<ProcessInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

impl PortConflict {
    /// Return conflict info if `port` is taken, with whatever holder
    /// processes the platform tools can identify.
    pub fn check(port: u16) -> Option<Self> {
        if !is_port_open(port) {
            return None;
        }
        Some(PortConflict {
            port,
            processes: Self::find_processes_on_port(port),
        })
    }

    /// Human-readable holder summary, e.g. `'python3' (PID 4121)`.
    pub fn holder_description(&self) -> Option<String> {
        if self.processes.is_empty() {
            return None;
        }
        Some(
            self.processes
                .iter()
                .map(|p| format!("'{}' (PID {})", p.name, p.pid))
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    fn find_processes_on_port(port: u16) -> Vec<ProcessInfo> {
        #[cfg(target_os = "linux")]
        {
            let mut processes = Self::find_processes_ss(port);
            if processes.is_empty() {
                processes = Self::find_processes_lsof(port);
            }
            processes
        }

        #[cfg(not(target_os = "linux"))]
        {
            Self::find_processes_lsof(port)
        }
    }

    #[cfg(target_os = "linux")]
    fn find_processes_ss(port: u16) -> Vec<ProcessInfo> {
        let output = match Command::new("ss")
            .args(["-tlnp", &format!("sport = :{}", port)])
            .output()
        {
            Ok(o) if o.status.success() => o,
            _ => return Vec::new(),
        };
        parse_ss_output(&String::from_utf8_lossy(&output.stdout))
    }

    fn find_processes_lsof(port: u16) -> Vec<ProcessInfo> {
        let output = match Command::new("lsof")
            .args(["-i", &format!(":{}", port), "-sTCP:LISTEN", "-P", "-n", "-F", "pc"])
            .output()
        {
            Ok(o) if o.status.success() => o,
            _ => return Vec::new(),
        };
        parse_lsof_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `ss -tlnp` output, picking `pid=N` entries from the users column.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_ss_output(stdout: &str) -> Vec<ProcessInfo> {
    let mut processes: Vec<ProcessInfo> = Vec::new();
    for line in stdout.lines().skip(1) {
        let Some(users) = line.split_whitespace().last() else {
            continue;
        };
        for part in users.split(',') {
            let Some(pid) = part
                .strip_prefix("pid=")
                .and_then(|p| p.parse::<u32>().ok())
            else {
                continue;
            };
            if processes.iter().any(|p| p.pid == pid) {
                continue;
            }
            let name = std::fs::read_to_string(format!("/proc/{}/comm", pid))
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            processes.push(ProcessInfo { pid, name });
        }
    }
    processes
}

/// Parse `lsof -F pc` field output: a `p<pid>` line then a `c<command>` line.
fn parse_lsof_output(stdout: &str) -> Vec<ProcessInfo> {
    let mut processes: Vec<ProcessInfo> = Vec::new();
    let mut current_pid: Option<u32> = None;

    for line in stdout.lines() {
        if let Some(pid) = line.strip_prefix('p') {
            current_pid = pid.parse::<u32>().ok();
        } else if let Some(command) = line.strip_prefix('c') {
            if let Some(pid) = current_pid.take() {
                if !processes.iter().any(|p| p.pid == pid) {
                    processes.push(ProcessInfo {
                        pid,
                        name: command.to_string(),
                    });
                }
            }
        }
    }
    processes
}
