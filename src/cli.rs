use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "run-local", version)]
#[command(about = "Run the call-center services locally with their database and cache")]
pub struct Cli {
    /// Component to run: `all` or one service name (agents, api, dashboard)
    #[arg(long, default_value = "all")]
    pub component: String,

    /// Create directories, bootstrap .env and install dependencies first
    #[arg(long)]
    pub setup: bool,

    /// Settings file (defaults to supervisor.yaml in the working directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Project directory (defaults to the current directory)
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// Environment file, overriding `env_file` from settings
    #[arg(long)]
    pub env_file: Option<PathBuf>,
}
