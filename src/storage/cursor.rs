//! # Sync Cursor
//!
//! Byte offset into the record log marking where undelivered records start.
//! Persisted as plain decimal ASCII in its own file and rewritten whole on
//! every update.

use std::io::Read;

use tracing::{debug, warn};

use super::medium::StorageMedium;
use super::StorageHandle;
use crate::error::Result;

/// Persisted delivery boundary
#[derive(Debug, Clone)]
pub struct SyncCursor {
    name: String,
}

impl SyncCursor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads the persisted offset.
    ///
    /// # Returns
    ///
    /// * `u64` - The offset, or 0 when the cursor file is absent, unreadable,
    ///   not a decimal number, or the medium is unhealthy
    pub fn read<M: StorageMedium>(&self, storage: &StorageHandle<M>) -> u64 {
        let Ok(medium) = storage.reader() else {
            return 0;
        };
        if !medium.exists(&self.name) {
            return 0;
        }

        let mut text = String::new();
        let read = medium
            .reader_at(&self.name, 0)
            .and_then(|mut reader| reader.read_to_string(&mut text));
        if let Err(e) = read {
            warn!("Failed to read cursor file {}: {}", self.name, e);
            return 0;
        }

        match text.trim().parse::<u64>() {
            Ok(offset) => offset,
            Err(_) => {
                // Restarting from zero re-sends, it never skips
                warn!("Cursor file {} holds {:?}, restarting from 0", self.name, text);
                0
            }
        }
    }

    /// Persists a new offset, replacing the previous value.
    ///
    /// # Errors
    ///
    /// Returns error if the medium is unhealthy or the write fails
    pub fn write<M: StorageMedium>(&self, storage: &mut StorageHandle<M>, offset: u64) -> Result<()> {
        storage
            .writer()?
            .replace(&self.name, offset.to_string().as_bytes())?;
        debug!("Cursor moved to {}", offset);
        Ok(())
    }

    /// Deletes the cursor file.
    pub(crate) fn remove<M: StorageMedium>(&self, storage: &mut StorageHandle<M>) -> Result<()> {
        storage.writer()?.remove(&self.name)?;
        Ok(())
    }
}
