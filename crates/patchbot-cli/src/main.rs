//! patchbot CLI.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "patchbot")]
#[command(about = "Turns mailing list patches into testable git branches", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "PATCHBOT_CONFIG", default_value = "patchbot.kdl")]
    config: PathBuf,

    /// PostgreSQL connection string, overrides the configuration file
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Process log format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run exactly one scheduler tick
    Tick {
        /// Name recorded on claims
        #[arg(long, env = "PATCHBOT_WORKER_ID")]
        worker_id: Option<String>,
    },
    /// Run ticks on the configured interval until interrupted
    Run {
        /// Name recorded on claims
        #[arg(long, env = "PATCHBOT_WORKER_ID")]
        worker_id: Option<String>,
    },
    /// Show which submission the next tick would build
    Select,
    /// Refresh submissions from the commitfest listing
    Sync {
        /// Commitfest to scrape; defaults to the current one
        #[arg(long)]
        commitfest: Option<i32>,
    },
    /// Apply database migrations
    Migrate,
    /// Inspect and update tracked branches
    Branch {
        #[command(subcommand)]
        command: BranchCommands,
    },
}

#[derive(Subcommand)]
enum BranchCommands {
    /// List recently recorded branches
    List {
        /// Maximum number of branches to show
        #[arg(long, default_value = "20")]
        limit: i64,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Record a CI result for a pushed branch
    SetStatus {
        /// Branch ID
        id: uuid::Uuid,
        /// One of testing, success, failure
        status: String,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let app = commands::App::load(&cli.config, cli.database_url)?;

    match cli.command {
        Commands::Tick { worker_id } => {
            commands::schedule::tick(&app, worker_id).await?;
        }
        Commands::Run { worker_id } => {
            commands::schedule::run(&app, worker_id).await?;
        }
        Commands::Select => {
            commands::schedule::select(&app).await?;
        }
        Commands::Sync { commitfest } => {
            commands::sync(&app, commitfest).await?;
        }
        Commands::Migrate => {
            commands::migrate(&app).await?;
        }
        Commands::Branch { command } => match command {
            BranchCommands::List { limit, json } => {
                commands::branch::list(&app, limit, json).await?;
            }
            BranchCommands::SetStatus { id, status } => {
                commands::branch::set_status(&app, id, &status).await?;
            }
        },
    }

    Ok(())
}
