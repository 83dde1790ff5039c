//! # Daily Archive
//!
//! Write-only audit trail. Every persisted record gets one CSV row in the file
//! for its own date (`<prefix>_<YYYY>-<MM>-<DD>.csv`), regardless of whether
//! it is ever delivered. Files are never pruned here.

use chrono::NaiveDate;
use tracing::{debug, info};

use super::log::LINE_TERMINATOR;
use super::medium::StorageMedium;
use super::StorageHandle;
use crate::error::Result;
use crate::telemetry::codec::{RecordEncoder, ARCHIVE_HEADER};
use crate::telemetry::record::TelemetryRecord;

/// Date-partitioned CSV archive
#[derive(Debug, Clone)]
pub struct DailyArchive {
    prefix: String,
}

impl DailyArchive {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// File name for a calendar day
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use vat_monitor::storage::archive::DailyArchive;
    ///
    /// let archive = DailyArchive::new("vatlog");
    /// let day = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
    /// assert_eq!(archive.file_name(day), "vatlog_2024-03-07.csv");
    /// ```
    #[must_use]
    pub fn file_name(&self, date: NaiveDate) -> String {
        format!("{}_{}.csv", self.prefix, date.format("%Y-%m-%d"))
    }

    /// Writes the header row if the file is missing or empty. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns error if the medium is unhealthy or the write fails
    pub fn ensure_header<M: StorageMedium>(&self, storage: &mut StorageHandle<M>, name: &str) -> Result<()> {
        let medium = storage.writer()?;
        if medium.exists(name) && medium.len(name)? > 0 {
            return Ok(());
        }

        let mut header = Vec::with_capacity(ARCHIVE_HEADER.len() + LINE_TERMINATOR.len());
        header.extend_from_slice(ARCHIVE_HEADER.as_bytes());
        header.extend_from_slice(LINE_TERMINATOR);
        medium.append(name, &header)?;

        info!("CSV header created for: {}", name);
        Ok(())
    }

    /// Appends one row for `record` to the file of the record's date.
    ///
    /// # Errors
    ///
    /// Returns error if the medium is unhealthy or a write fails
    pub fn append<M: StorageMedium>(
        &self,
        storage: &mut StorageHandle<M>,
        encoder: &RecordEncoder,
        record: &TelemetryRecord,
    ) -> Result<()> {
        let name = self.file_name(record.date());
        self.ensure_header(storage, &name)?;

        let mut row = encoder.to_archive_row(record).into_bytes();
        row.extend_from_slice(LINE_TERMINATOR);
        storage.writer()?.append(&name, &row)?;

        debug!("Record archived to {}", name);
        Ok(())
    }
}
