//! proctor CLI: validate exam fixtures and replay scripted exam sessions.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "proctor", version, about = "Timed exam session engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an exam JSON file
    Validate {
        /// Path to the exam JSON
        #[arg(long)]
        exam: PathBuf,
    },

    /// Drive an exam session from a scripted list of steps
    Replay {
        /// Path to the exam JSON
        #[arg(long)]
        exam: PathBuf,

        /// Path to the .toml replay script
        #[arg(long)]
        script: PathBuf,

        /// Use an in-memory service instead of the configured server
        #[arg(long)]
        offline: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config, sample exam and replay script
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("proctor=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { exam } => commands::validate::execute(exam),
        Commands::Replay {
            exam,
            script,
            offline,
            config,
        } => commands::replay::execute(exam, script, offline, config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
