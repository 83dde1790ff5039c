//! # Latest Snapshot
//!
//! Single-slot file holding only the most recent serialized record. Manual
//! recovery aid; nothing in the delivery path reads it.

use tracing::debug;

use super::log::LINE_TERMINATOR;
use super::medium::{read_all, StorageMedium};
use super::StorageHandle;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct LatestSnapshot {
    name: String,
}

impl LatestSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replaces the snapshot with `line`.
    ///
    /// # Errors
    ///
    /// Returns error if the medium is unhealthy or the write fails
    pub fn overwrite<M: StorageMedium>(&self, storage: &mut StorageHandle<M>, line: &str) -> Result<()> {
        let mut bytes = line.as_bytes().to_vec();
        bytes.extend_from_slice(LINE_TERMINATOR);
        storage.writer()?.replace(&self.name, &bytes)?;
        debug!("Latest snapshot updated");
        Ok(())
    }

    /// Returns the stored record, if any.
    pub fn read<M: StorageMedium>(&self, storage: &StorageHandle<M>) -> Result<Option<String>> {
        let medium = storage.reader()?;
        if !medium.exists(&self.name) {
            return Ok(None);
        }
        let bytes = read_all(medium, &self.name)?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(Some(text.trim_end_matches(['\r', '\n']).to_string()))
    }
}
