//! photobackup - Main entry point
//!
//! Archives every top-level folder of a source directory into cold storage,
//! skipping folders that are already stored.

use anyhow::{Context, Result};
use clap::Parser;
use photobackup::config::{Config, DestinationKind, FailurePolicy};
use photobackup::executor::{ExportSettings, Exporter};
use photobackup::shutdown::ShutdownCoordinator;
use photobackup::{destination, utils};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "backup-config.toml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", env = "PHOTOBACKUP_CONFIG")]
    config: Option<PathBuf>,

    /// Directory whose top-level folders are exported (overrides config)
    #[arg(short, long, value_name = "DIR")]
    source_dir: Option<PathBuf>,

    /// Build and discard archives without storing anything
    #[arg(long)]
    dry_run: bool,

    /// Keep going when a folder fails
    #[arg(long)]
    continue_on_error: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None if std::path::Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Config::from_file(std::path::Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG_FILE))?
        }
        None => Config::default(),
    };

    if let Some(dir) = &args.source_dir {
        config.source.dir = Some(dir.clone());
    }
    if args.dry_run {
        config.destination.kind = DestinationKind::Noop;
    }
    if args.continue_on_error {
        config.run.on_folder_error = FailurePolicy::Continue;
    }
    if let Some(level) = &args.log_level {
        config.log.level = level.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    // Initialize logging
    utils::logger::init(&config.log.level)?;

    tracing::info!("Starting photobackup v{}", env!("CARGO_PKG_VERSION"));

    config.validate()?;
    let settings = ExportSettings::from_config(&config)?;
    let destination = destination::build(&config.destination).await?;

    let shutdown_coordinator = ShutdownCoordinator::new();
    let exporter = Exporter::new(destination, settings, shutdown_coordinator.token());

    let watcher = shutdown_coordinator.clone();
    let signal_handle = tokio::spawn(async move {
        watcher.wait_for_signal().await;
    });

    let result = exporter.run().await;

    // Stop the signal watcher
    shutdown_coordinator.shutdown();
    let _ = signal_handle.await;

    let summary = result?;
    tracing::info!(
        "Done: {} uploaded, {} already stored",
        summary.uploaded,
        summary.skipped
    );

    Ok(())
}
