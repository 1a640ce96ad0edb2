//! Relay CLI - validate and run workflow and task files.
//!
//! The `relay` binary wires the orchestration core to the built-in echo
//! provider so workflows and task batches can be exercised offline.

mod commands;
mod runtime;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{tasks, workflow};

/// Relay - AI task orchestration
#[derive(Parser, Debug)]
#[command(
    name = "relay",
    author,
    version,
    about = "Relay - route AI requests, run workflows, schedule agent tasks"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Orchestrator configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate or run workflow definitions
    #[command(subcommand)]
    Workflow(workflow::WorkflowCommand),

    /// Run batches of agent tasks
    #[command(subcommand)]
    Tasks(tasks::TasksCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so `--json` output stays machine-readable.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let runtime = runtime::Runtime::load(args.config.as_deref())?;

    match args.command {
        Command::Workflow(command) => workflow::execute(command, &runtime).await,
        Command::Tasks(command) => tasks::execute(command, &runtime).await,
    }
}
