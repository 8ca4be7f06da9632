//! GenQ CLI - queue-managed conversations with Databricks Genie
//!
//! # Usage
//!
//! ```bash
//! # List accessible Genie spaces
//! genq spaces
//!
//! # Interactive chat session
//! genq chat
//!
//! # One-shot question
//! genq ask "What was total revenue last month?"
//!
//! # Burst-submit questions to exercise rate limiting
//! genq stress --count 10
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;

use commands::{ask, chat, spaces, stress};

/// GenQ - conversational analytics without the 429s.
///
/// Questions are admitted through a bounded queue with worker-side
/// backoff, so bursts degrade gracefully instead of failing.
#[derive(Parser)]
#[command(
    name = "genq",
    version,
    about = "GenQ CLI - queue-managed Genie conversations",
    long_about = "GenQ sends natural-language questions to a Databricks Genie space.\n\n\
                  Every question passes through a bounded request queue whose\n\
                  workers retry rate-limited calls with exponential backoff."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List accessible Genie spaces
    #[command(name = "spaces")]
    Spaces(spaces::SpacesArgs),

    /// Interactive chat with a Genie space
    #[command(name = "chat")]
    Chat(chat::ChatArgs),

    /// Ask a single question and exit
    #[command(name = "ask")]
    Ask(ask::AskArgs),

    /// Burst-submit questions to exercise queueing and backoff
    #[command(name = "stress")]
    Stress(stress::StressArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match cli.command {
        Commands::Spaces(args) => spaces::run(args).await,
        Commands::Chat(args) => chat::run(args).await,
        Commands::Ask(args) => ask::run(args).await,
        Commands::Stress(args) => stress::run(args).await,
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();
}

/// Print a success message with a checkmark
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message with an X
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}
