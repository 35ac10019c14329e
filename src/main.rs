mod cli;

use clap::Parser;
use cli::Cli;
use run_local::logging::{self, RunLog, RUN_LOG_FILE};
use run_local::output::CliOutput;
use run_local::supervisor::{spawn_signal_listener, Supervisor};
use run_local::{Error as RunError, SupervisorSettings};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(run_error) = e.downcast_ref::<RunError>() {
            eprintln!("Error: {}", run_error);
            if let Some(suggestion) = run_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // clap exits with 2 on usage errors and 0 for --help/--version
    let cli = Cli::parse();

    let work_dir = match cli.workdir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let work_dir = work_dir.canonicalize().map_err(|e| {
        RunError::Precondition(format!(
            "working directory {} is not accessible: {}",
            work_dir.display(),
            e
        ))
    })?;

    let mut settings = SupervisorSettings::load(&work_dir, cli.config.as_deref())?;
    if let Some(env_file) = cli.env_file {
        settings.env_file = env_file;
    }

    let logs_dir = SupervisorSettings::resolve(&work_dir, &settings.logs_dir);
    logging::init(Some(RunLog::new(logs_dir.join(RUN_LOG_FILE))))?;

    // Installed before any side effect so Ctrl+C during startup reaches teardown
    let token = CancellationToken::new();
    let _listener = spawn_signal_listener(token.clone());

    let summary = Supervisor::new(settings, &work_dir, &CliOutput)
        .run(&cli.component, cli.setup, token)
        .await?;

    tracing::debug!(
        "Run finished: {} started, {} teardown step(s)",
        summary.started().count(),
        summary.shutdown.steps.len()
    );
    Ok(())
}
