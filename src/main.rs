//! # VAT Monitor
//!
//! Field device loop: sample the depth sensor, back every record up on the
//! storage medium, and drain the offline queue through the gateway uplink
//! whenever it is reachable.

use std::path::Path;

use anyhow::Result;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use vat_monitor::config::{Config, LoggingConfig, UplinkConfig};
use vat_monitor::producer::Producer;
use vat_monitor::sensor::SimulatedSensor;
use vat_monitor::storage::medium::DirMedium;
use vat_monitor::storage::StorageHandle;
use vat_monitor::sync::{PassEnd, SyncEngine, Transport};
use vat_monitor::uplink::SerialUplink;

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// File name prefix of the daily rolling log
const LOG_FILE_NAME: &str = "vat-monitor.log";

/// Installs the console subscriber and, if `config.dir` is set, a daily
/// rolling file log. The returned guard must outlive the program.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = if config.dir.is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(&config.dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// Opens the gateway uplink, or `None` if the port is not there yet.
fn open_uplink(config: &UplinkConfig) -> Option<SerialUplink> {
    match SerialUplink::open(config) {
        Ok(uplink) => Some(uplink),
        Err(e) => {
            warn!("Gateway uplink unavailable, records stay queued: {}", e);
            None
        }
    }
}

/// Main entry point for VAT Monitor
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, else `config/default.toml`)
///    - Set up logging
///    - Mount the storage medium and open the gateway uplink
///
/// 2. **Main Loop**
///    - Sampling tick: read the sensor and persist the record, sending it live
///      if it could not be queued
///    - Sync tick: recheck storage, reopen the uplink if needed, run one sync pass
///    - Stats tick: log offline queue diagnostics
///    - Handle Ctrl+C for graceful shutdown
///
/// Storage and uplink failures never end the loop; the device keeps
/// sampling in degraded mode.
///
/// # Errors
///
/// Returns error if the configuration file is invalid
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config_found = Path::new(&config_path).exists();
    let config = if config_found {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    let _log_guard = init_logging(&config.logging);

    info!("VAT Monitor v{} starting...", env!("CARGO_PKG_VERSION"));
    if config_found {
        info!("Configuration loaded from {}", config_path);
    } else {
        warn!("{} not found, using built-in defaults", config_path);
    }
    let producer = Producer::from_config(&config)?;
    info!("Device ID: {}", producer.encoder().device_id());

    let medium = DirMedium::new(&config.storage.root_dir);
    info!("Storage root: {}", medium.root().display());
    let mut storage = StorageHandle::mount(medium);
    let engine = SyncEngine::from_config(producer.queue().clone(), &config.sync);
    let mut sensor = SimulatedSensor::new();
    let mut uplink = open_uplink(&config.uplink);

    if producer.queue().is_not_empty(&storage) {
        info!("Pending offline data: {}", producer.queue().stats(&storage));
    }

    let mut sample_interval = interval(Duration::from_millis(config.sampling.interval_ms));
    let mut sync_interval = interval(Duration::from_millis(config.sync.interval_ms));
    let mut stats_interval = interval(Duration::from_millis(config.logging.stats_interval_ms));
    for ticker in [&mut sample_interval, &mut sync_interval, &mut stats_interval] {
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    }

    info!("Sampling every {} ms, syncing every {} ms", config.sampling.interval_ms, config.sync.interval_ms);
    info!("Press Ctrl+C to exit");

    let mut records_persisted: u64 = 0;
    let mut records_delivered: u64 = 0;

    loop {
        tokio::select! {
            _ = sample_interval.tick() => {
                match producer.cycle(&mut sensor, &mut storage) {
                    Ok(Some(persisted)) if persisted.report.queued => records_persisted += 1,
                    Ok(Some(persisted)) => match uplink.as_mut() {
                        Some(link) => {
                            if producer.send_unbacked(link, &persisted).await {
                                records_delivered += 1;
                            }
                        }
                        None => warn!("Record not queued and no uplink, record lost"),
                    },
                    Ok(None) => {}
                    Err(e) => warn!("Sampling cycle failed: {}", e),
                }
            }

            _ = sync_interval.tick() => {
                if !storage.is_healthy() && storage.check_health() {
                    info!("Storage medium recovered");
                }

                if !uplink.as_ref().is_some_and(|link| link.is_connected()) {
                    uplink = open_uplink(&config.uplink);
                }

                if let Some(link) = uplink.as_mut() {
                    let report = engine.run_pass(&mut storage, link).await;
                    records_delivered += report.delivered as u64;
                    match report.end {
                        PassEnd::NothingToDo => debug!("Sync pass: nothing to do"),
                        end => info!("Sync pass delivered {} records ({:?})", report.delivered, end),
                    }
                }
            }

            _ = stats_interval.tick() => {
                info!(
                    "Storage {}, {}, {} persisted / {} delivered since start",
                    if storage.is_healthy() { "healthy" } else { "unavailable" },
                    producer.queue().stats(&storage),
                    records_persisted,
                    records_delivered
                );
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                info!("Records persisted: {}, delivered: {}", records_persisted, records_delivered);
                break;
            }
        }
    }

    Ok(())
}
