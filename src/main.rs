//! # Stargazer Rank CLI (`sgr`)
//!
//! The `sgr` binary runs influence analyses from the command line, manages
//! the cache database, and starts the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! sgr --config ./config/sgr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sgr init` | Create the SQLite database and cache tables |
//! | `sgr analyze <url>` | Rank a repository's stargazers and fork owners |
//! | `sgr cache stats` | Show cache entry counts per namespace |
//! | `sgr cache clear [scope]` | Delete cached analyses and/or profiles |
//! | `sgr serve` | Start the streaming HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! sgr init --config ./config/sgr.toml
//!
//! # Rank a repository, forcing a fresh analysis
//! sgr analyze https://github.com/octocat/Hello-World --refresh
//!
//! # Same, but emit the raw record stream
//! sgr analyze octocat/Hello-World --json
//!
//! # Drop cached repository analyses only
//! sgr cache clear repo
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use stargazer_rank::analyze::{self, AnalyzeOptions};
use stargazer_rank::progress::ProgressMode;
use stargazer_rank::{cache_cmd, config, migrate, server};

/// Stargazer Rank: find the most influential people behind a GitHub repository.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sgr.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "sgr",
    about = "Stargazer Rank: rank a repository's stargazers and fork owners by influence",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/sgr.toml`.
    #[arg(long, global = true, default_value = "./config/sgr.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the cache tables. Idempotent.
    Init,

    /// Analyze a repository and print its ranked influencers.
    Analyze {
        /// Repository URL (`https://github.com/owner/repo`) or `owner/repo`.
        url: String,

        /// GitHub token. Falls back to `[github].token`, then `GITHUB_TOKEN`.
        #[arg(long)]
        token: Option<String>,

        /// Ignore a cached analysis and rebuild it.
        #[arg(long)]
        refresh: bool,

        /// Write every stream record to stdout as NDJSON.
        #[arg(long)]
        json: bool,

        /// Number of influencers to print.
        #[arg(long, default_value_t = 25)]
        limit: usize,

        /// Progress on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,
    },

    /// Inspect or invalidate the cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show total and fresh entries per namespace.
    Stats,
    /// Delete cache entries.
    Clear {
        /// `repo`, `user`, or `all`.
        #[arg(default_value = "all")]
        scope: String,
    },
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    ProgressMode::parse(s)
        .ok_or_else(|| format!("invalid progress mode '{}': expected off, human, or json", s))
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(match cli.command {
        Commands::Serve => "info",
        _ => "warn",
    });

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Analyze {
            url,
            token,
            refresh,
            json,
            limit,
            progress,
        } => {
            let opts = AnalyzeOptions {
                url,
                token,
                refresh,
                json,
                limit,
                progress: progress.unwrap_or_else(ProgressMode::default_for_tty),
            };
            analyze::run_analyze(&cfg, opts).await?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => cache_cmd::run_cache_stats(&cfg).await?,
            CacheAction::Clear { scope } => cache_cmd::run_cache_clear(&cfg, &scope).await?,
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
