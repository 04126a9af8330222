mod capture;
mod detector;
mod luma;
mod overlay;
mod protection;
mod sampler;

use flash_shield_common::config::Config;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use capture::MonitorSource;
use overlay::CommandOverlay;
use sampler::SampleLoop;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    // A missing config file just means defaults; a malformed one is fatal.
    let config = if config_path.exists() {
        match Config::load(&config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {e}", config_path.display());
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        interval_ms = config.sampling.interval_ms,
        flash_threshold = config.detector.flash_threshold,
        max_flash_count = config.detector.max_flash_count,
        recovery_secs = config.protection.recovery_secs,
        monitor_index = config.capture.monitor_index,
        "starting flash-shield monitor"
    );

    let source = match MonitorSource::new(&config.capture) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to open screen capture");
            std::process::exit(1);
        }
    };

    // The shield window frontend drains this channel on its own thread and
    // owns the window (including close/minimize). Until one is attached the
    // commands are only logged.
    let (sink, mut commands) = CommandOverlay::channel();
    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            debug!(?command, "overlay command");
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    // The frontend's minimize control feeds Suppress through this sender.
    let (_control_tx, control_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
        }
        let _ = shutdown_tx.send(true);
    });

    SampleLoop::new(source, sink, &config)
        .run(shutdown_rx, control_rx)
        .await;
}
