//! # Phoenix Reader
//!
//! Read a Phoenix RC USB adapter and log the normalized flight control inputs.
//!
//! This application opens the first attached adapter, translates its reports
//! with the configured axis map and polls it at a fixed rate until Ctrl+C.

use anyhow::{Context, Result};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use phoenix_usb_reader::config::{Config, LoggingConfig};
use phoenix_usb_reader::error::PhoenixError;
use phoenix_usb_reader::input::axis_map::AxisMap;
use phoenix_usb_reader::input::poller::InputPoller;
use phoenix_usb_reader::usb::RusbBus;

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// File name prefix of the rolling log files
const LOG_FILE_PREFIX: &str = "phoenix-reader.log";

/// Main entry point for Phoenix Reader
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, or `config/default.toml`)
///    - Set up logging with tracing subscriber
///    - Open the first Phoenix adapter, mapped or raw
///
/// 2. **Main Loop**
///    - Read one report per tick at `poll_rate_hz`
///    - Log a JSON snapshot every `status_interval_reads` reads
///    - Log and skip failed reads; the next tick tries again
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Release the adapter
///    - Log read statistics
///
/// # Errors
///
/// Returns error if:
/// - Configuration or axis map cannot be loaded
/// - No adapter is attached, or it cannot be opened
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path(std::env::args());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);

    info!("Phoenix Reader v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut reader = InputPoller::new(RusbBus::new(config.read_timeout()));
    let device = reader
        .available_devices()
        .into_iter()
        .next()
        .ok_or(PhoenixError::DeviceNotFound)?;

    let raw = config.input.raw;
    if raw {
        reader.enable_raw_reading(&device)?;
    } else {
        let axis_map = AxisMap::load(&config.input.axis_map)
            .with_context(|| format!("Failed to load axis map from {}", config.input.axis_map))?;
        reader.start(&device, axis_map)?;
    }

    let mut poll_interval = interval(config.poll_period());
    poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "Polling adapter {} at {}Hz ({} mode)",
        device.name,
        config.input.poll_rate_hz,
        if raw { "raw" } else { "mapped" }
    );
    info!("Press Ctrl+C to exit");

    let mut read_count: u64 = 0;
    let mut failed_count: u64 = 0;

    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                // Bulk reads block until the adapter answers or times out
                let sample = tokio::task::block_in_place(|| -> Result<serde_json::Value> {
                    if raw {
                        Ok(serde_json::to_value(reader.read_raw_values()?)?)
                    } else {
                        Ok(serde_json::to_value(reader.read()?)?)
                    }
                });

                match sample {
                    Ok(sample) => {
                        read_count += 1;
                        if read_count % config.logging.status_interval_reads == 0 {
                            info!("Read {} reports, latest: {}", read_count, sample);
                        } else {
                            debug!("Report: {}", sample);
                        }
                    }
                    Err(e) => {
                        failed_count += 1;
                        warn!("Failed to read report: {:#}", e);
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    if raw {
        reader.disable_raw_reading()?;
    } else {
        reader.stop()?;
    }

    info!("Total reports read: {} ({} failed)", read_count, failed_count);
    Ok(())
}

/// Picks the configuration path from the command line arguments
fn config_path<I: IntoIterator<Item = String>>(args: I) -> String {
    args.into_iter()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

/// Installs the tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level. The returned guard
/// must be held for the lifetime of the program when logging to a file.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.log_dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}
