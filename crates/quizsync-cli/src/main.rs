//! quizsync CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "quizsync",
    version,
    about = "Local-first quiz result store with cloud sync"
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a finished quiz attempt
    Save {
        /// Correct answers
        #[arg(long)]
        score: u32,

        /// Questions asked
        #[arg(long)]
        total: u32,

        /// Subject label (e.g. "history")
        #[arg(long)]
        subject: String,

        /// Minutes spent on the attempt
        #[arg(long, default_value = "0")]
        time_spent: u32,

        /// Missed questions, comma-separated indices or keys
        #[arg(long)]
        mistakes: Option<String>,

        /// Sign in as this user before saving
        #[arg(long)]
        user: Option<String>,
    },

    /// Show dashboard statistics from the local history
    Stats {
        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Include a per-subject breakdown
        #[arg(long)]
        by_subject: bool,
    },

    /// List stored attempts
    History,

    /// Print a question bank
    Fetch {
        /// Bank file name (e.g. "bank1.json")
        #[arg(long)]
        bank: String,
    },

    /// Sign in and upload attempts the remote has not seen
    Sync {
        /// User to sign in as
        #[arg(long)]
        user: String,
    },

    /// Show the remote aggregate for a user
    RemoteStats {
        /// User to sign in as
        #[arg(long)]
        user: String,
    },

    /// Create a starter config
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "quizsync=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Save {
            score,
            total,
            subject,
            time_spent,
            mistakes,
            user,
        } => {
            commands::save::execute(score, total, subject, time_spent, mistakes, user, config)
                .await
        }
        Commands::Stats { format, by_subject } => {
            commands::stats::execute(format, by_subject, config)
        }
        Commands::History => commands::history::execute(config),
        Commands::Fetch { bank } => commands::fetch::execute(bank, config).await,
        Commands::Sync { user } => commands::sync::execute(user, config).await,
        Commands::RemoteStats { user } => commands::remote_stats::execute(user, config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
