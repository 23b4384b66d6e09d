//! vpad-relay server binary
//!
//! Relay remote controller input over WebSocket to a virtual joystick device.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vpad_relay::config::AppConfig;
use vpad_relay::device::{ConsoleSink, SinkMode};
use vpad_relay::layouts::LayoutStore;
use vpad_relay::paths::AppPaths;
use vpad_relay::server::{start_server, ApiState};

/// Relay remote controller input to a virtual joystick device
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to ./config.yaml or the
    /// platform data directory)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Override the listen port from the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Run without a device sink (state and telemetry only)
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    let paths = AppPaths::detect(args.config.as_deref());
    paths.ensure_directories()?;
    info!("configuration file: {}", paths.config.display());

    let mut config = AppConfig::load(&paths.config)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let sink = if args.dry_run || !config.device.enabled {
        warn!("device forwarding disabled: running in dry mode");
        SinkMode::Dry
    } else {
        SinkMode::Live(Arc::new(ConsoleSink::new(format!(
            "vjoy-{}",
            config.device.id
        ))))
    };

    let layouts = Arc::new(LayoutStore::open(&paths.layouts));
    let state = Arc::new(ApiState::new(&config, sink, layouts));

    start_server(
        state,
        &config.server.host,
        config.server.port,
        shutdown_signal(),
    )
    .await?;

    info!("relay shutdown complete");
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    info!("shutdown signal received");
}
