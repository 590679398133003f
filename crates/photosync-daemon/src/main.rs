//! PhotoSync daemon - background reconciliation of the local photo library
//!
//! `photosyncd run` mirrors the library into the record store and keeps a
//! [`SyncScheduler`](photosync_sync::SyncScheduler) uploading `Local`
//! records until SIGTERM/SIGINT. The other subcommands are one-shot
//! administrative tools over the same store.
//!
//! # Architecture
//!
//! Configuration and logging are set up here; [`service::DaemonService`]
//! builds the adapters and the engine. Every long-running command is bound
//! to a `CancellationToken` that the signal handler cancels.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use photosync_core::config::Config;
use photosync_core::domain::SyncStatus;

mod mock;
mod service;

use mock::MockSettings;
use service::DaemonService;

#[derive(Debug, Parser)]
#[command(name = "photosyncd", version, about = "Background photo library sync")]
pub struct Cli {
    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest the library and sync until interrupted
    Run,
    /// Mirror the library into the record store once
    Ingest,
    /// Show record counts per status
    Status {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reset records to local
    Reset {
        /// Only clear retry backoff, keeping synced records
        #[arg(long)]
        retry_only: bool,
    },
    /// Fill the record store with synthetic records
    Mock {
        /// Seconds between insert rounds
        #[arg(long, default_value_t = 1)]
        interval_secs: u64,
        /// Stop once the store holds this many records
        #[arg(long, default_value_t = mock::DEFAULT_CAP)]
        cap: u64,
        /// Year of the generated creation dates (defaults to the current year)
        #[arg(long)]
        year: Option<i32>,
    },
}

// ============================================================================
// Configuration and logging
// ============================================================================

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path()),
    };

    let errors = config.validate();
    if !errors.is_empty() {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("Invalid configuration:\n  {}", details.join("\n  "));
    }
    Ok(config)
}

/// Log filter from the verbosity flag, falling back to the configured level
fn log_filter(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn init_tracing(cli: &Cli, config: &Config) {
    let filter = log_filter(cli.verbose, &config.logging.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);
    if cli.json_logs || config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Commands
// ============================================================================

async fn execute(command: Commands, service: &DaemonService) -> Result<()> {
    match command {
        Commands::Run => service.run().await,
        Commands::Ingest => {
            let report = service.ingest().await?;
            println!(
                "Scanned {} assets: {} new, {} skipped",
                report.scanned, report.inserted, report.skipped
            );
            Ok(())
        }
        Commands::Status { json } => {
            let summary = service.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for status in [SyncStatus::Local, SyncStatus::Syncing, SyncStatus::Synced] {
                    println!("{:<8} {}", status.as_str(), summary.get(status));
                }
                println!("{:<8} {}", "total", summary.total());
                if summary.backing_off > 0 {
                    println!("{} local records are waiting to retry", summary.backing_off);
                }
            }
            Ok(())
        }
        Commands::Reset { retry_only } => {
            let count = service.reset(retry_only).await?;
            if retry_only {
                println!("Cleared retry backoff on {count} records");
            } else {
                println!("Reset {count} records to local");
            }
            Ok(())
        }
        Commands::Mock {
            interval_secs,
            cap,
            year,
        } => {
            let settings = MockSettings {
                interval: Duration::from_secs(interval_secs.max(1)),
                cap,
                year: year.unwrap_or_else(|| chrono::Utc::now().year()),
            };
            let inserted = service.mock(settings).await?;
            println!("Inserted {inserted} mock records");
            Ok(())
        }
    }
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&cli, &config);

    info!(command = ?cli.command, "PhotoSync daemon starting (photosyncd)");

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::open(config, shutdown_token)
        .await
        .context("Failed to start daemon service")?;

    let result = execute(cli.command, &service).await;
    match &result {
        Ok(()) => info!("PhotoSync daemon finished"),
        Err(e) => error!(error = %format!("{e:#}"), "PhotoSync daemon exiting with error"),
    }
    result
}

// ============================================================================
// Tests
// ============================================================================
