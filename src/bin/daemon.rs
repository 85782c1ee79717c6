// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! fangovd: system service that samples hwmon sensors, learns fan curves
//! and drives every configured fan from its own control loop.

use anyhow::{Context as _, bail};
use clap::Parser;
use fangov::config;
use fangov::context::Context;
use fangov::control::LoopState;
use fangov::hwmon;
use fangov::store::{JsonFileStore, MemoryStore, SampleStore};
use fangov::telemetry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "fangovd", about = "Linux fan control daemon with fan curve learning")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the sample store path.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Keep samples in memory only.
    #[arg(long)]
    no_persist: bool,

    /// Root of the hwmon class directory.
    #[arg(long, default_value = hwmon::HWMON_ROOT)]
    hwmon_root: PathBuf,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(&cli.config)
        .with_context(|| format!("Could not load config {}", cli.config.display()))?;
    if let Some(db) = cli.db {
        cfg.daemon.db_path = db;
    }
    cfg.validate()?;

    let store: Arc<dyn SampleStore> = if cli.no_persist {
        Arc::new(MemoryStore::new())
    } else {
        match JsonFileStore::open(&cfg.daemon.db_path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                log::warn!("Could not open sample store: {e}, keeping samples in memory");
                Arc::new(MemoryStore::new())
            }
        }
    };

    // Discover hardware
    let controllers =
        hwmon::discover_controllers(&cli.hwmon_root, cfg.daemon.rpm_rolling_window_size)
            .unwrap_or_else(|e| {
                log::error!("Failed to discover hwmon devices: {e}");
                Vec::new()
            });

    let ctx = Arc::new(Context::assemble(controllers, &cfg, store));
    log::info!("Detected devices:");
    ctx.log_status();

    // Sensor monitoring
    tokio::spawn(telemetry::run(Arc::clone(&ctx)));

    // Give the windows some live samples before fans react to them
    time::sleep(ctx.settings.monitor_warmup()).await;

    // One task per fan
    let loops = ctx.control_loops();
    if loops.is_empty() {
        bail!("No valid fan configurations, exiting.");
    }
    for control_loop in loops {
        let id = control_loop.fan().id().to_string();
        tokio::spawn(async move {
            if control_loop.run().await == LoopState::Failed {
                log::error!("Control of {id} stopped, fan left at its last duty");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    log::info!("Received shutdown signal");
    if let Err(e) = ctx.store.flush() {
        log::warn!("Failed to flush sample store: {e}");
    }
    Ok(())
}
