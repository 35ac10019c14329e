//! Checks run before anything is started.
//!
//! Missing project files and a too-old interpreter are fatal. Optional tools
//! are only reported: without them the matching dependency falls back or its
//! readiness probe never passes.

use crate::config::SupervisorSettings;
use crate::error::{Error, Result};
use crate::output::UserOutput;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

const TOOL_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Major/minor pair, compared numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    /// Parse `"3.8"`, `"3.11.4"` or interpreter banners like `"Python 3.12.1"`.
    pub fn parse(text: &str) -> Option<Self> {
        let re = Regex::new(r"(\d+)\.(\d+)").ok()?;
        let caps = re.captures(text)?;
        Some(Self {
            major: caps.get(1)?.as_str().parse().ok()?,
            minor: caps.get(2)?.as_str().parse().ok()?,
        })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub name: String,
    /// First line of `--version` output, `None` if the tool is missing.
    pub version: Option<String>,
}

impl ToolStatus {
    pub fn available(&self) -> bool {
        self.version.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub interpreter: Option<Version>,
    pub tools: Vec<ToolStatus>,
}

pub struct Preflight;

impl Preflight {
    /// Fail on missing required files or an old interpreter; report tools.
    pub async fn run(
        settings: &SupervisorSettings,
        work_dir: &Path,
        out: &dyn UserOutput,
    ) -> Result<PreflightReport> {
        check_required_files(settings, work_dir)?;

        let interpreter = match settings.interpreter.as_deref() {
            Some(interpreter) => {
                out.progress(&format!("{}: ", interpreter));
                let found = check_interpreter(interpreter, &settings.min_interpreter_version).await;
                match &found {
                    Ok(version) => out.finish_progress(&version.to_string()),
                    Err(_) => out.finish_progress("unusable"),
                }
                Some(found?)
            }
            None => None,
        };

        let mut tools = Vec::with_capacity(settings.optional_tools.len());
        for tool in &settings.optional_tools {
            out.progress(&format!("{}: ", tool));
            let status = probe_tool(tool).await;
            match &status.version {
                Some(version) => out.finish_progress(version),
                None => out.finish_progress("not found (optional)"),
            }
            tools.push(status);
        }

        Ok(PreflightReport { interpreter, tools })
    }
}

fn check_required_files(settings: &SupervisorSettings, work_dir: &Path) -> Result<()> {
    let missing: Vec<String> = settings
        .required_files
        .iter()
        .filter(|f| !SupervisorSettings::resolve(work_dir, f).exists())
        .map(|f| f.display().to_string())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(Error::Precondition(format!(
        "{} not found in {}",
        missing.join(", "),
        work_dir.display()
    )))
}

/// Run `<interpreter> --version` and compare against `minimum`.
pub async fn check_interpreter(interpreter: &str, minimum: &str) -> Result<Version> {
    let required = Version::parse(minimum).ok_or_else(|| {
        Error::Config(format!(
            "min_interpreter_version '{}' is not a version",
            minimum
        ))
    })?;

    let banner = version_banner(interpreter).await.ok_or_else(|| {
        Error::Precondition(format!("interpreter '{}' could not be run", interpreter))
    })?;
    let found = Version::parse(&banner).ok_or_else(|| {
        Error::Precondition(format!(
            "could not read a version from '{} --version': {}",
            interpreter, banner
        ))
    })?;

    if found < required {
        return Err(Error::Precondition(format!(
            "{} {} found, {} or newer required",
            interpreter, found, required
        )));
    }
    Ok(found)
}

pub async fn probe_tool(name: &str) -> ToolStatus {
    ToolStatus {
        name: name.to_string(),
        version: version_banner(name).await,
    }
}

/// First non-empty line of `<program> --version` (stdout, else stderr).
async fn version_banner(program: &str) -> Option<String> {
    let output = tokio::time::timeout(
        TOOL_PROBE_TIMEOUT,
        tokio::process::Command::new(program)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .ok()?
    .ok()?;

    if !output.status.success() {
        return None;
    }
    // Python 2 printed its version on stderr
    for bytes in [&output.stdout, &output.stderr] {
        let text = String::from_utf8_lossy(bytes);
        if let Some(line) = text.lines().map(str::trim).find(|l| !l.is_empty()) {
            return Some(line.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::QuietOutput;
    use tempfile::TempDir;

    #[test]
    fn version_parsing() {
        assert_eq!(Version::parse("Python 3.12.1"), Some(Version { major: 3, minor: 12 }));
        assert_eq!(Version::parse("3.8"), Some(Version { major: 3, minor: 8 }));
        assert_eq!(Version::parse("no digits"), None);
        assert!(Version::parse("3.10").unwrap() > Version::parse("3.9").unwrap());
    }

    #[tokio::test]
    async fn missing_required_file_is_precondition() {
        let dir = TempDir::new().unwrap();
        let settings = SupervisorSettings {
            interpreter: None,
            optional_tools: Vec::new(),
            ..SupervisorSettings::default()
        };
        let err = Preflight::run(&settings, dir.path(), &QuietOutput)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(ref m) if m.contains("main.py")));
    }

    #[tokio::test]
    async fn present_files_pass_without_interpreter() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.py"), "").unwrap();
        let settings = SupervisorSettings {
            interpreter: None,
            optional_tools: vec!["definitely-not-a-tool-xyz".to_string()],
            ..SupervisorSettings::default()
        };
        let report = Preflight::run(&settings, dir.path(), &QuietOutput)
            .await
            .unwrap();
        assert!(report.interpreter.is_none());
        assert_eq!(report.tools.len(), 1);
        assert!(!report.tools[0].available());
    }

    #[tokio::test]
    async fn unrunnable_interpreter_is_precondition() {
        let err = check_interpreter("definitely-not-python-xyz", "3.8")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[tokio::test]
    async fn bad_minimum_is_config_error() {
        let err = check_interpreter("bash", "latest").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn version_gate_uses_banner() {
        // bash --version prints "GNU bash, version 5.x.y..."
        let found = check_interpreter("bash", "1.0").await.unwrap();
        assert!(found.major >= 3);
        let err = check_interpreter("bash", "999.0").await.unwrap_err();
        assert!(matches!(err, Error::Precondition(ref m) if m.contains("999.0")));
    }
}
