//! # Offline Queue
//!
//! Pairs the record log with its sync cursor and owns the operations that
//! touch both: enqueueing, the "is there unsynced data" check, compaction and
//! diagnostics.
//!
//! Invariant kept here: `0 <= cursor <= log length`. A cursor found past the
//! end of the log (external tampering, or no log at all) is treated as a fully
//! drained queue and compacted.

use tracing::{info, warn};

use super::cursor::SyncCursor;
use super::log::RecordLog;
use super::medium::StorageMedium;
use super::StorageHandle;
use crate::config::StorageConfig;
use crate::error::Result;

/// Snapshot of queue diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Record log length in bytes
    pub size_bytes: u64,
    /// Persisted cursor offset
    pub cursor: u64,
    /// Lines between the cursor and the end of the log
    pub pending_lines: usize,
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "queue {} bytes, cursor {}, {} pending",
            self.size_bytes, self.cursor, self.pending_lines
        )
    }
}

/// Record log plus cursor
#[derive(Debug, Clone)]
pub struct OfflineQueue {
    log: RecordLog,
    cursor: SyncCursor,
}

impl OfflineQueue {
    pub fn new(log: RecordLog, cursor: SyncCursor) -> Self {
        Self { log, cursor }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(
            RecordLog::new(config.queue_file.as_str()),
            SyncCursor::new(config.cursor_file.as_str()),
        )
    }

    pub fn log(&self) -> &RecordLog {
        &self.log
    }

    pub fn cursor(&self) -> &SyncCursor {
        &self.cursor
    }

    /// Appends a serialized record to the log.
    ///
    /// # Errors
    ///
    /// Returns error if the record was not persisted
    pub fn enqueue<M: StorageMedium>(&self, storage: &mut StorageHandle<M>, line: &str) -> Result<()> {
        self.repair_cursor(storage)?;
        self.log.append(storage, line)
    }

    /// True iff there is unsynced data.
    pub fn is_not_empty<M: StorageMedium>(&self, storage: &StorageHandle<M>) -> bool {
        let cursor = self.cursor.read(storage);
        self.log.is_not_empty(storage, cursor)
    }

    /// Compacts the queue if the cursor points past the end of the log.
    ///
    /// # Returns
    ///
    /// * `Result<bool>` - true if compaction ran
    pub fn repair_cursor<M: StorageMedium>(&self, storage: &mut StorageHandle<M>) -> Result<bool> {
        let cursor = self.cursor.read(storage);
        let len = self.log.size_bytes(storage);
        if cursor <= len {
            return Ok(false);
        }

        warn!(
            "Cursor {} is beyond the end of {} ({} bytes), treating queue as drained",
            cursor,
            self.log.name(),
            len
        );
        self.compact(storage)?;
        Ok(true)
    }

    /// Deletes the cursor and the log, resetting the queue to empty.
    ///
    /// The cursor goes first: if power fails in between, the surviving log is
    /// replayed from offset 0 rather than paired with a stale cursor.
    pub fn compact<M: StorageMedium>(&self, storage: &mut StorageHandle<M>) -> Result<()> {
        self.cursor.remove(storage)?;
        self.log.remove(storage)?;
        info!("Offline queue fully synced, {} and {} removed", self.log.name(), self.cursor.name());
        Ok(())
    }

    pub fn stats<M: StorageMedium>(&self, storage: &StorageHandle<M>) -> QueueStats {
        let cursor = self.cursor.read(storage);
        QueueStats {
            size_bytes: self.log.size_bytes(storage),
            cursor,
            pending_lines: self.log.pending_line_count(storage, cursor),
        }
    }
}
