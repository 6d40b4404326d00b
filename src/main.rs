//! # Sport Telemetry
//!
//! Decode FrSky S.Port telemetry from a serial receiver link into live
//! sensor values.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (path from the first argument)
//!    - Set up logging, to stdout or a daily rolling file
//!    - Restore the sensor table and create the telemetry session
//!
//! 2. **Main Loop**
//!    - Read, deframe and decode packets as they arrive
//!    - Tick the link monitor and value freshness every `cycle_ms`
//!    - Persist the sensor table when a slot was provisioned
//!    - Write JSONL snapshots every `snapshot_interval_ms`
//!    - Reopen the serial port after errors
//!
//! 3. **Graceful Shutdown** on Ctrl+C
//!
//! # Examples
//!
//! ```bash
//! RUST_LOG=sport_telemetry=debug cargo run --release -- config/default.toml
//! ```

use anyhow::{Context, Result};
use std::path::Path;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use sport_telemetry::config::{self, Config, LoggingConfig};
use sport_telemetry::serial::SportSerial;
use sport_telemetry::session::TelemetrySession;
use sport_telemetry::sport::{LinkMonitor, SportPacket};
use sport_telemetry::telemetry::{SensorRegistry, SnapshotLogger};

/// Configuration used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Application log file prefix
const LOG_FILE_NAME: &str = "sport-telemetry.log";

/// Number of packets between status log messages
const LOG_INTERVAL_PACKETS: u64 = 1000;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);
    info!("Sport Telemetry v{} starting...", env!("CARGO_PKG_VERSION"));

    let registry = load_registry(&config)?;
    let mut session = TelemetrySession::new(registry, config.telemetry.settings());
    let mut link = LinkMonitor::new(config.telemetry.link_timeout_ticks());

    let mut logger = if config.logging.enabled {
        Some(SnapshotLogger::new(
            &config.logging.snapshot_dir,
            config.logging.max_records_per_file,
            config.logging.max_files_to_keep,
        )?)
    } else {
        None
    };

    let mut cycle = interval(Duration::from_millis(config.telemetry.cycle_ms));
    cycle.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut snapshot = interval(Duration::from_millis(config.logging.snapshot_interval_ms));
    snapshot.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut reconnect = interval(Duration::from_millis(config.serial.reconnect_interval_ms));

    let mut serial: Option<SportSerial> = None;
    let mut packet_count: u64 = 0;
    let mut dropped_count: u64 = 0;

    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            result = read_packets(&mut serial) => {
                match result {
                    Ok(packets) => {
                        for packet in &packets {
                            if !session.process_sport_packet(packet, &mut link) {
                                dropped_count += 1;
                            }
                            packet_count += 1;

                            if packet_count % LOG_INTERVAL_PACKETS == 0 {
                                info!("Processed {} packets ({} dropped)", packet_count, dropped_count);
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Serial link lost: {}", e);
                        serial = None;
                        link.reset();
                    }
                }
            }

            _ = reconnect.tick(), if serial.is_none() => {
                match SportSerial::open(&config.serial.port, config.serial.baud_rate) {
                    Ok(opened) => {
                        info!("Receiving telemetry from {}", opened.device_path());
                        serial = Some(opened);
                    }
                    Err(e) => debug!("Serial port not available: {}", e),
                }
            }

            _ = cycle.tick() => {
                link.tick();
                session.tick();
                persist_sensor_table(&config, &mut session);
            }

            _ = snapshot.tick(), if logger.is_some() => {
                if let Some(logger) = logger.as_mut() {
                    if let Err(e) = logger.log(&session.store().readings()) {
                        warn!("Failed to write telemetry snapshot: {}", e);
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                info!("Total packets processed: {} ({} dropped)", packet_count, dropped_count);
                break;
            }
        }
    }

    persist_sensor_table(&config, &mut session);
    if let Some(logger) = logger.as_mut() {
        logger.flush()?;
    }

    Ok(())
}

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the default `info` level. The returned guard must
/// live until exit so buffered file output is flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// Sensor table from the persisted file when present, else from the config
fn load_registry(config: &Config) -> Result<SensorRegistry> {
    if let Some(path) = &config.telemetry.sensors_file {
        if Path::new(path).exists() {
            let entries = config::load_sensor_table(path)
                .with_context(|| format!("Failed to load sensor table from {}", path))?;
            info!("Restored {} sensors from {}", entries.len(), path);
            return Ok(SensorRegistry::with_entries(&entries)?);
        }
    }

    Ok(config.sensor_registry()?)
}

/// Write the sensor table if a slot changed since the last write
fn persist_sensor_table(config: &Config, session: &mut TelemetrySession) {
    let Some(path) = &config.telemetry.sensors_file else {
        return;
    };

    let registry = session.store_mut().registry_mut();
    if !registry.is_dirty() {
        return;
    }

    // Stays dirty on failure so the next cycle retries
    match config::save_sensor_table(path, &registry.entries()) {
        Ok(()) => {
            registry.mark_clean();
            debug!("Saved sensor table to {}", path);
        }
        Err(e) => warn!("Failed to save sensor table to {}: {}", path, e),
    }
}

/// Next packets from the port, or never while disconnected
async fn read_packets(serial: &mut Option<SportSerial>) -> sport_telemetry::error::Result<Vec<SportPacket>> {
    match serial {
        Some(serial) => serial.read_packets().await,
        None => std::future::pending().await,
    }
}
