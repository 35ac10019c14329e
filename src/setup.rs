//! `--setup`: prepare a fresh checkout for local runs.

use crate::config::{SupervisorSettings, DEFAULT_ENV_CONTENTS};
use crate::error::{Error, Result};
use crate::output::UserOutput;
use std::path::Path;
use std::process::Stdio;

/// Where the `.env` file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvBootstrap {
    AlreadyPresent,
    CopiedTemplate,
    WroteDefaults,
}

/// Create directories, bootstrap `.env`, then run the install command.
pub async fn run_setup(
    settings: &SupervisorSettings,
    work_dir: &Path,
    out: &dyn UserOutput,
) -> Result<()> {
    out.status("Setting up local environment...");

    create_directories(settings, work_dir, out)?;

    match bootstrap_env_file(settings, work_dir)? {
        EnvBootstrap::AlreadyPresent => {}
        EnvBootstrap::CopiedTemplate => out.success(&format!(
            "Created {} from {}",
            settings.env_file.display(),
            settings.env_template.display()
        )),
        EnvBootstrap::WroteDefaults => out.success(&format!(
            "Created {} with default settings",
            settings.env_file.display()
        )),
    }

    if let Some(template) = &settings.install_command {
        let command = template.replace(
            "{python}",
            &shell_escape::escape(settings.interpreter_or_default().into()),
        );
        out.status(&format!("Installing dependencies: {}", command));
        run_install(&command, work_dir).await?;
        out.success("Dependencies installed");
    }

    Ok(())
}

pub fn create_directories(
    settings: &SupervisorSettings,
    work_dir: &Path,
    out: &dyn UserOutput,
) -> Result<()> {
    for dir in &settings.setup_directories {
        let path = SupervisorSettings::resolve(work_dir, dir);
        std::fs::create_dir_all(&path).map_err(|e| {
            Error::Setup(format!("could not create {}: {}", path.display(), e))
        })?;
        out.status(&format!("  directory {}", dir.display()));
    }
    Ok(())
}

/// Leave an existing `.env` alone; otherwise copy the template, or write the
/// built-in defaults when there is no template either.
pub fn bootstrap_env_file(settings: &SupervisorSettings, work_dir: &Path) -> Result<EnvBootstrap> {
    let env_path = SupervisorSettings::resolve(work_dir, &settings.env_file);
    if env_path.exists() {
        return Ok(EnvBootstrap::AlreadyPresent);
    }

    let template = SupervisorSettings::resolve(work_dir, &settings.env_template);
    if template.exists() {
        std::fs::copy(&template, &env_path).map_err(|e| {
            Error::Setup(format!(
                "could not copy {} to {}: {}",
                template.display(),
                env_path.display(),
                e
            ))
        })?;
        tracing::info!("Bootstrapped {} from {}", env_path.display(), template.display());
        return Ok(EnvBootstrap::CopiedTemplate);
    }

    std::fs::write(&env_path, DEFAULT_ENV_CONTENTS)
        .map_err(|e| Error::Setup(format!("could not write {}: {}", env_path.display(), e)))?;
    tracing::info!("Wrote default {}", env_path.display());
    Ok(EnvBootstrap::WroteDefaults)
}

async fn run_install(command: &str, work_dir: &Path) -> Result<()> {
    let status = tokio::process::Command::new("bash")
        .arg("-c")
        .arg(command)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| Error::Setup(format!("could not run '{}': {}", command, e)))?;

    if !status.success() {
        return Err(Error::Setup(format!("'{}' failed with {}", command, status)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::QuietOutput;
    use tempfile::TempDir;

    fn settings(install: Option<&str>) -> SupervisorSettings {
        SupervisorSettings {
            install_command: install.map(String::from),
            ..SupervisorSettings::default()
        }
    }

    #[test]
    fn template_is_copied() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".env.example"), "A=1\n").unwrap();
        let outcome = bootstrap_env_file(&settings(None), dir.path()).unwrap();
        assert_eq!(outcome, EnvBootstrap::CopiedTemplate);
        assert_eq!(std::fs::read_to_string(dir.path().join(".env")).unwrap(), "A=1\n");
    }

    #[test]
    fn defaults_without_template() {
        let dir = TempDir::new().unwrap();
        let outcome = bootstrap_env_file(&settings(None), dir.path()).unwrap();
        assert_eq!(outcome, EnvBootstrap::WroteDefaults);
        let contents = std::fs::read_to_string(dir.path().join(".env")).unwrap();
        assert!(contents.contains("DATABASE_URL="));
    }

    #[test]
    fn existing_env_is_untouched() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".env"), "KEEP=1\n").unwrap();
        std::fs::write(dir.path().join(".env.example"), "A=1\n").unwrap();
        let outcome = bootstrap_env_file(&settings(None), dir.path()).unwrap();
        assert_eq!(outcome, EnvBootstrap::AlreadyPresent);
        assert_eq!(std::fs::read_to_string(dir.path().join(".env")).unwrap(), "KEEP=1\n");
    }

    #[tokio::test]
    async fn setup_creates_directories_and_runs_install() {
        let dir = TempDir::new().unwrap();
        run_setup(&settings(Some("touch installed.marker")), dir.path(), &QuietOutput)
            .await
            .unwrap();
        for d in ["logs", "static", "templates", "data"] {
            assert!(dir.path().join(d).is_dir(), "{} missing", d);
        }
        assert!(dir.path().join(".env").exists());
        assert!(dir.path().join("installed.marker").exists());
    }

    #[tokio::test]
    async fn failing_install_is_setup_error() {
        let dir = TempDir::new().unwrap();
        let err = run_setup(&settings(Some("exit 3")), dir.path(), &QuietOutput)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Setup(_)));
    }
}
