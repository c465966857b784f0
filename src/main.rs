//! AHM Link - command line host
//!
//! Connects to one AHM processor, mirrors its state and logs every change.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ahm_link::config::{AppConfig, ConfigWatcher, DeviceConfig};
use ahm_link::state::UnitType;
use ahm_link::{AhmDriver, ConnectionStatus, Driver};

/// AHM Link - mirror and control an Allen & Heath AHM processor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "ahm.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Write a starter configuration for this host and exit
    #[arg(long, value_name = "HOST")]
    init_config: Option<String>,

    /// Unit type for --init-config (ahm16, ahm32, ahm64)
    #[arg(long, default_value = "ahm64")]
    unit: UnitType,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level)?;

    info!("Starting AHM Link v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    if let Some(host) = args.init_config {
        return write_starter_config(&args.config, host, args.unit).await;
    }

    // Load configuration with hot-reload watcher
    let (config_watcher, initial_config) = ConfigWatcher::new(args.config.clone()).await?;
    info!("Configuration loaded successfully with hot-reload enabled");

    let driver = Arc::new(AhmDriver::new(initial_config));
    attach_log_subscribers(&driver);

    run_app(driver, config_watcher, shutdown_signal()).await?;

    info!("AHM Link shutdown complete");
    Ok(())
}

async fn run_app(
    driver: Arc<AhmDriver>,
    mut config_watcher: ConfigWatcher,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    driver.init().await?;
    info!("Starting main application loop...");

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(new_config) = config_watcher.next_config() => {
                info!("🔄 Applying new configuration ({} at {})",
                    new_config.device.unit, new_config.device.address());
                if let Err(e) = driver.reconfigure(new_config).await {
                    error!("Reconfiguration failed: {:#}", e);
                }
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    driver.shutdown().await?;
    Ok(())
}

/// Log status, feedback and variable traffic from the driver
fn attach_log_subscribers(driver: &Arc<AhmDriver>) {
    driver.subscribe_connection_status(Arc::new(|status, message| match status {
        ConnectionStatus::ConnectionFailure => warn!("AHM status: {} ({})", status, message),
        _ => info!("AHM status: {} ({})", status, message),
    }));

    driver.subscribe_feedbacks(Arc::new(|kind| {
        debug!("Feedback check: {}", kind);
    }));

    driver.subscribe_variables(Arc::new(|name, value| {
        debug!("Variable {} = {}", name, value);
    }));
}

async fn write_starter_config(path: &str, host: String, unit: UnitType) -> Result<()> {
    if Path::new(path).exists() {
        anyhow::bail!("Refusing to overwrite existing config file: {}", path);
    }

    let mut device = DeviceConfig::new(host);
    device.unit = unit;
    let config = AppConfig::for_device(device);
    config.validate().context("Invalid starter configuration")?;
    config.save(path).await?;

    info!("✅ Wrote starter configuration to {}", path);
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
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
