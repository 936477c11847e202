#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the traffic incident poller.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use traffic_incidents_poller::config::{Config, Overrides};
use traffic_incidents_poller::Poller;
use traffic_incidents_source::HttpFeed;

#[derive(Parser)]
#[command(
    name = "traffic_incidents",
    about = "Poll a traffic incident feed and accumulate a deduplicated history"
)]
struct Cli {
    /// Upstream feed URL (overrides `WAZE_API_URL`)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Seconds between polls (overrides `UPDATE_INTERVAL_SECONDS`)
    #[arg(long, global = true)]
    interval: Option<u64>,

    /// JSON config file (default `config.json` if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Local master file (overrides `INCIDENTS_MASTER_PATH`)
    #[arg(long, global = true)]
    master_path: Option<PathBuf>,

    /// Local latest file (overrides `INCIDENTS_LATEST_PATH`)
    #[arg(long, global = true)]
    latest_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll until interrupted (default)
    Run,
    /// Run a single cycle and exit
    Once,
    /// Print statistics for the persisted collection as JSON
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    let cli = Cli::parse();
    let config = Config::load(&Overrides {
        feed_url: cli.url,
        interval_secs: cli.interval,
        config_file: cli.config,
        master_path: cli.master_path,
        latest_path: cli.latest_path,
    })?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let feed = HttpFeed::new(config.require_feed_url()?, config.fetch_timeout)?;
            let backend = traffic_incidents_storage::connect(&config.storage).await?;

            let poller = Poller::start(Box::new(feed), backend, config.interval).await;
            poller.run(shutdown_signal()).await;
        }
        Commands::Once => {
            let feed = HttpFeed::new(config.require_feed_url()?, config.fetch_timeout)?;
            let backend = traffic_incidents_storage::connect(&config.storage).await?;

            Poller::start(Box::new(feed), backend, config.interval)
                .await
                .run_once()
                .await;
        }
        Commands::Stats => {
            let backend = traffic_incidents_storage::connect(&config.storage).await?;
            let accumulator = traffic_incidents_accumulator::Accumulator::new(backend.load().await);

            println!("{}", serde_json::to_string_pretty(&accumulator.statistics())?);
        }
    }

    Ok(())
}

/// Resolves on Ctrl+C, or on SIGTERM where available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => log::info!("Received Ctrl+C"),
        () = terminate => log::info!("Received SIGTERM"),
    }
}
