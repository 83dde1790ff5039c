//! # Producer
//!
//! Turns one sensor cycle into persisted artifacts.
//!
//! Every valid record is serialized once and written three times, in order:
//! daily archive, offline queue, latest snapshot. The writes are independent.
//! A failure of one is logged and does not stop the others, so the archive
//! still holds the record when the queue append fails (medium full, bad
//! file). There is no write-ahead marker: a power loss between writes leaves
//! partial persistence, which the archive covers for manual recovery.
//!
//! A record that did not make it into the queue is never synced later. The
//! device loop hands it to [`Producer::send_unbacked`] for one live attempt.

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Result, VatMonitorError};
use crate::sensor::Sensor;
use crate::storage::archive::DailyArchive;
use crate::storage::medium::StorageMedium;
use crate::storage::queue::OfflineQueue;
use crate::storage::snapshot::LatestSnapshot;
use crate::storage::StorageHandle;
use crate::sync::Transport;
use crate::telemetry::codec::RecordEncoder;
use crate::telemetry::record::{DepthModel, TelemetryRecord};

/// Which of the three writes succeeded for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PersistReport {
    pub archived: bool,
    pub queued: bool,
    pub snapshot: bool,
}

/// Outcome of persisting one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persisted {
    /// Serialized queue line, also the live payload
    pub line: String,
    pub report: PersistReport,
}

impl PersistReport {
    pub fn all(&self) -> bool {
        self.archived && self.queued && self.snapshot
    }

    pub fn none(&self) -> bool {
        !self.archived && !self.queued && !self.snapshot
    }
}

#[derive(Debug, Clone)]
pub struct Producer {
    encoder: RecordEncoder,
    archive: DailyArchive,
    queue: OfflineQueue,
    snapshot: LatestSnapshot,
    depth: DepthModel,
}

impl Producer {
    pub fn new(
        encoder: RecordEncoder,
        archive: DailyArchive,
        queue: OfflineQueue,
        snapshot: LatestSnapshot,
        depth: DepthModel,
    ) -> Self {
        Self {
            encoder,
            archive,
            queue,
            snapshot,
            depth,
        }
    }

    /// Builds the producer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the timezone offset is out of range
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            RecordEncoder::new(config.device.device_id.as_str(), config.device.timezone_offset_hours)?,
            DailyArchive::new(config.storage.archive_prefix.as_str()),
            OfflineQueue::from_config(&config.storage),
            LatestSnapshot::new(config.storage.snapshot_file.as_str()),
            DepthModel::new(config.sampling.depth_gain, config.sampling.depth_offset_cm),
        ))
    }

    pub fn encoder(&self) -> &RecordEncoder {
        &self.encoder
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Writes one record to archive, queue and snapshot.
    ///
    /// # Returns
    ///
    /// * `Result<Persisted>` - Serialized line and per-artifact outcome
    ///
    /// # Errors
    ///
    /// Returns error only if the record is invalid or cannot be serialized;
    /// in that case nothing is written.
    pub fn persist<M: StorageMedium>(
        &self,
        storage: &mut StorageHandle<M>,
        record: &TelemetryRecord,
    ) -> Result<Persisted> {
        if !record.is_valid {
            return Err(VatMonitorError::InvalidRecord(
                "refusing to persist an invalid reading".to_string(),
            ));
        }

        let line = self.encoder.to_queue_line(record)?;

        if !storage.is_healthy() {
            warn!("Storage unavailable, record not backed up");
            return Ok(Persisted {
                line,
                report: PersistReport::default(),
            });
        }

        let archived = match self.archive.append(storage, &self.encoder, record) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to write daily archive: {}", e);
                false
            }
        };

        let queued = match self.queue.enqueue(storage, &line) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to append to offline queue: {}", e);
                false
            }
        };

        let snapshot = match self.snapshot.overwrite(storage, &line) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to write latest snapshot: {}", e);
                false
            }
        };

        let report = PersistReport {
            archived,
            queued,
            snapshot,
        };
        debug!("Record persisted: {:?}", report);
        Ok(Persisted { line, report })
    }

    /// Sends a record live if it missed the offline queue.
    ///
    /// Queued records are left to the sync engine and not sent here.
    ///
    /// # Returns
    ///
    /// * `bool` - true if the transport accepted the record
    pub async fn send_unbacked<T: Transport + ?Sized>(&self, transport: &mut T, persisted: &Persisted) -> bool {
        if persisted.report.queued {
            return false;
        }
        if !transport.is_connected() {
            warn!("Record not queued and uplink down, record lost");
            return false;
        }

        if persisted.report.none() {
            debug!("Sending unbacked record live");
        } else {
            debug!("Sending record live after failed queue append");
        }
        match transport.send(persisted.line.as_bytes()).await {
            Ok(()) => {
                info!("Unqueued record delivered live");
                true
            }
            Err(e) => {
                warn!("Live send of unqueued record failed, record lost: {}", e);
                false
            }
        }
    }

    /// Runs one sampling cycle: read, build the record, persist it.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - The reading failed validation and was dropped
    /// * `Ok(Some(persisted))` - The record went through [`Producer::persist`]
    ///
    /// # Errors
    ///
    /// Returns error if the sensor read fails or the record cannot be serialized
    pub fn cycle<S, M>(&self, sensor: &mut S, storage: &mut StorageHandle<M>) -> Result<Option<Persisted>>
    where
        S: Sensor + ?Sized,
        M: StorageMedium,
    {
        let reading = sensor.read_reading()?;
        if !reading.valid {
            warn!("Invalid sensor reading, skipping cycle");
            return Ok(None);
        }

        let record = TelemetryRecord::from_reading(&reading, &self.depth);
        debug!(
            "Reading: d1={:.1} d2={:.1} depth={:.1}",
            record.distance1, record.distance2, record.depth
        );
        self.persist(storage, &record).map(Some)
    }
}
