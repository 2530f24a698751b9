//! # track-cli
//!
//! CLI tool for driving a tally-track tracker.
//!
//! ## Commands
//!
//! - `init`: Write a tracker configuration
//! - `event`: Track one event
//! - `session`: Record one foreground visit
//! - `status`: Show counters, queue and attribution
//! - `forget-me`: Ask the collector to forget this install
//!
//! ## Example
//!
//! ```bash
//! # Configure the tracker
//! track-cli init --app-token abc123 --environment sandbox
//!
//! # Track a purchase
//! track-cli event abc123 --revenue 0.99 --currency EUR --param sku=gold
//!
//! # Try everything without a collector
//! track-cli --mock session
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use track_types::Environment;

mod commands;

use commands::{event, forget, init, session, status, EventArgs};

/// CLI tool for driving a tally-track tracker.
#[derive(Parser, Debug)]
#[command(name = "track-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding the configuration, state and queue
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use the mock transport instead of HTTP (for testing/demo)
    #[arg(long, global = true)]
    mock: bool,

    /// Seconds to wait for queued packages to be delivered
    #[arg(long, global = true, default_value = "10")]
    wait: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a tracker configuration
    Init {
        /// App token issued by the collector
        #[arg(long)]
        app_token: String,

        /// Environment reported with every package
        #[arg(long, value_enum, default_value = "sandbox")]
        environment: EnvironmentArg,

        /// Collector base URL
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Track one event
    Event {
        /// Event token
        token: String,

        /// Revenue amount (requires --currency)
        #[arg(long, requires = "currency")]
        revenue: Option<f64>,

        /// ISO 4217 currency code
        #[arg(long, requires = "revenue")]
        currency: Option<String>,

        /// Deduplication id for the revenue
        #[arg(long)]
        dedup: Option<String>,

        /// Callback parameter as key=value (repeatable)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Partner parameter as key=value (repeatable)
        #[arg(long = "partner", value_name = "KEY=VALUE")]
        partner: Vec<String>,
    },

    /// Record one foreground visit (start, then background)
    Session,

    /// Show counters, queue and attribution
    Status,

    /// Ask the collector to forget this install and wipe local data
    ForgetMe,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EnvironmentArg {
    Sandbox,
    Production,
}

impl From<EnvironmentArg> for Environment {
    fn from(arg: EnvironmentArg) -> Self {
        match arg {
            EnvironmentArg::Sandbox => Environment::Sandbox,
            EnvironmentArg::Production => Environment::Production,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let wait = Duration::from_secs(cli.wait);

    match cli.command {
        Commands::Init {
            app_token,
            environment,
            base_url,
        } => {
            init::run(&data_dir, &app_token, environment.into(), base_url.as_deref()).await?;
        }
        Commands::Event {
            token,
            revenue,
            currency,
            dedup,
            params,
            partner,
        } => {
            let args = EventArgs {
                token,
                revenue: revenue.zip(currency),
                dedup,
                params,
                partner,
            };
            event::run(&data_dir, args, cli.mock, wait).await?;
        }
        Commands::Session => {
            session::run(&data_dir, cli.mock, wait).await?;
        }
        Commands::Status => {
            status::run(&data_dir, cli.mock).await?;
        }
        Commands::ForgetMe => {
            forget::run(&data_dir, cli.mock, wait).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for track-cli.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "tally-track", "track-cli")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
