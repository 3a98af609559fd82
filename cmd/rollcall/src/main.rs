//! rollcall - face-matched class attendance.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{
    EnrollCommand, ExportCommand, ProcessCommand, RosterCommand, SubmitCommand, WorkerCommand,
};

/// rollcall - face-matched class attendance.
///
/// Enroll face embeddings per class session, then mark attendance from
/// class photos, either locally (`process`) or through workers on an
/// MQTT broker (`submit` + `worker`).
///
/// Configuration is read from ~/.rollcall/config.yaml.
#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "Face-matched class attendance")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.rollcall/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<String>,

    /// Output as JSON instead of YAML
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enroll a face embedding for a session
    Enroll(EnrollCommand),
    /// List or remove enrolled identities
    Roster(RosterCommand),
    /// Process a class photo locally
    Process(ProcessCommand),
    /// Submit a class photo to the workers and wait for the report
    Submit(SubmitCommand),
    /// Run a worker consuming submitted photos
    Worker(WorkerCommand),
    /// Export a day's attendance
    Export(ExportCommand),
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::Config::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Enroll(cmd) => cmd.run(&cli, &cfg).await,
        Commands::Roster(cmd) => cmd.run(&cli, &cfg).await,
        Commands::Process(cmd) => cmd.run(&cli, &cfg).await,
        Commands::Submit(cmd) => cmd.run(&cli, &cfg).await,
        Commands::Worker(cmd) => cmd.run(&cli, &cfg).await,
        Commands::Export(cmd) => cmd.run(&cli, &cfg).await,
    }
}
