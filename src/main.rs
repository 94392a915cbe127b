//! # Account Harness CLI (`acct`)
//!
//! Builds a registry of AWS accounts from every configured source and
//! answers questions about it.
//!
//! ## Usage
//!
//! ```bash
//! acct --config ./config/acct.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `acct refresh` | Scan all sources, merge, and write the snapshot |
//! | `acct sources` | List configured sources and their health |
//! | `acct stats` | Summarize the current snapshot |
//! | `acct get <id-or-name>` | Show one account |
//! | `acct list` | List all accounts |
//! | `acct query "<text>"` | Answer a free-text question |
//! | `acct serve` | Start the HTTP server |
//!
//! `get`, `list`, `query`, and `stats` read the snapshot written by the last
//! `refresh`; they never contact a source.
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `account_harness=info`).

use account_harness::{config, query, refresh, server, sources, stats};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "acct",
    about = "Account Harness — an AWS account registry built from heterogeneous sources",
    version,
    long_about = "Account Harness scans CSV/XLSX inventories, document folders, S3 prefixes, \
    and Bedrock knowledge bases for AWS account numbers, merges what every source says about \
    each account, and answers structured or free-text queries from a CLI and an HTTP server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/acct.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every source and replace the snapshot.
    ///
    /// A source that fails or times out is reported and skipped. When no
    /// source yields anything, the existing snapshot is left untouched.
    Refresh {
        /// Print the refresh report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List configured sources and whether they look reachable.
    Sources,

    /// Summarize the current snapshot.
    Stats,

    /// Show one account by 12-digit id or exact name.
    Get {
        id: String,

        /// Print the JSON payload instead of text.
        #[arg(long)]
        json: bool,
    },

    /// List all accounts.
    List {
        #[arg(long)]
        json: bool,
    },

    /// Answer a free-text question, e.g. "accounts provisioned in 2021".
    Query {
        text: String,

        /// Print the resolved intent and payload as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind`, refreshes once at startup, then every
    /// `[refresh].interval_secs` seconds when non-zero.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "account_harness=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Refresh { json } => {
            refresh::run_refresh(&cfg, json).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
        Commands::Get { id, json } => {
            query::run_get(&cfg, &id, json)?;
        }
        Commands::List { json } => {
            query::run_list(&cfg, json)?;
        }
        Commands::Query { text, json } => {
            query::run_query(&cfg, &text, json)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
