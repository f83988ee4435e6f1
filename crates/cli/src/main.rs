//! NewsDesk CLI — the main entry point.
//!
//! Commands:
//! - `ask`       — Run one conversation turn (or an interactive session)
//! - `onboard`   — Write a default config
//! - `doctor`    — Diagnose config, provider and index
//! - `policies`  — Validate and list the system policies
//!
//! Logs go to stderr; stdout carries only the answer stream.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "newsdesk",
    about = "NewsDesk — conversational news query router",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question (interactive when neither --message nor --history is given)
    Ask {
        /// A single question, sent as a one-turn history
        #[arg(short, long, conflicts_with = "history")]
        message: Option<String>,

        /// JSON file holding the conversation so far: [{"role":"user","content":"..."}, ...]
        #[arg(long)]
        history: Option<PathBuf>,

        /// Print the raw envelope stream instead of rendered text
        #[arg(long)]
        raw: bool,

        /// Also generate a conversation title from the first user turn
        #[arg(long)]
        title: bool,
    },

    /// Initialize configuration
    Onboard,

    /// Diagnose system health
    Doctor,

    /// Validate and list system policies
    Policies {
        /// Print each policy in full
        #[arg(long)]
        full: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Ask {
            message,
            history,
            raw,
            title,
        } => {
            commands::ask::run(commands::ask::AskOptions {
                message,
                history,
                raw,
                title,
            })
            .await?
        }
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Policies { full } => commands::policies::run(full)?,
    }

    Ok(())
}
