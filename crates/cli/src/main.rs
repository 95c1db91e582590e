//! Memgate CLI — the main entry point.
//!
//! Commands:
//! - `serve` — Start the HTTP chat gateway
//! - `stats` — Token usage report for a saved conversation

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "memgate",
    about = "Memgate — memory-augmented streaming chat gateway",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Report token usage for a conversation saved as a JSON message array
    Stats {
        /// Path to the JSON file
        file: std::path::PathBuf,

        /// Token budget to report against (defaults to the configured one)
        #[arg(short, long)]
        budget: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Stats { file, budget } => commands::stats::run(&file, budget)?,
    }

    Ok(())
}
