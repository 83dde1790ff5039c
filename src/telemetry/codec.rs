//! # Record Serialization
//!
//! Renders a [`TelemetryRecord`] in the two on-disk forms:
//!
//! - **Queue line**: compact single-line JSON, the payload the uplink receives
//! - **Archive row**: fixed-column CSV for the daily archive
//!
//! Both forms carry the timestamp at the device's configured UTC offset.

use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use serde::Serialize;

use super::record::TelemetryRecord;
use crate::error::{Result, VatMonitorError};

/// Header row of every daily archive file
pub const ARCHIVE_HEADER: &str =
    "timestamp_tz,device_id,distance1,distance2,latitude,longitude,depth,satellites,hdop";

#[derive(Serialize)]
struct QueuePayload<'a> {
    device_id: &'a str,
    data: PayloadData,
    timestamp: String,
}

#[derive(Serialize)]
struct PayloadData {
    distance1: f64,
    distance2: f64,
    latitude: f64,
    longitude: f64,
    depth: f64,
}

/// Rounds to one decimal place.
fn round1(value: f32) -> f64 {
    (f64::from(value) * 10.0).round() / 10.0
}

/// Encodes records for one device at one UTC offset
#[derive(Debug, Clone)]
pub struct RecordEncoder {
    device_id: String,
    offset: FixedOffset,
}

impl RecordEncoder {
    /// Creates an encoder.
    ///
    /// # Errors
    ///
    /// Returns [`VatMonitorError::InvalidTimestamp`] if the offset is outside
    /// ±24 hours.
    pub fn new(device_id: impl Into<String>, offset_hours: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(offset_hours * 3600).ok_or_else(|| {
            VatMonitorError::InvalidTimestamp(format!("UTC offset {}h out of range", offset_hours))
        })?;

        Ok(Self {
            device_id: device_id.into(),
            offset,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Renders a UTC timestamp at this encoder's offset,
    /// e.g. `2024-01-01T19:30:45+07:00`.
    #[must_use]
    pub fn local_timestamp(&self, utc: &NaiveDateTime) -> String {
        self.offset
            .from_utc_datetime(utc)
            .format("%Y-%m-%dT%H:%M:%S%:z")
            .to_string()
    }

    /// Serializes a record as one JSON queue line (no terminator).
    ///
    /// # Examples
    ///
    /// ```
    /// use vat_monitor::telemetry::codec::RecordEncoder;
    /// use vat_monitor::telemetry::record::{utc_from_fields, TelemetryRecord};
    ///
    /// let encoder = RecordEncoder::new("BJK0001", 7)?;
    /// let record = TelemetryRecord {
    ///     distance1: 23.5,
    ///     distance2: 32.0,
    ///     latitude: -6.5,
    ///     longitude: 106.5,
    ///     depth: 74.5,
    ///     timestamp: utc_from_fields(2024, 1, 1, 12, 0, 0)?,
    ///     satellites: 8,
    ///     hdop: 1.5,
    ///     is_valid: true,
    /// };
    /// let line = encoder.to_queue_line(&record)?;
    /// assert!(line.starts_with(r#"{"device_id":"BJK0001","data":{"distance1":23.5"#));
    /// assert!(line.ends_with(r#""timestamp":"2024-01-01T19:00:00+07:00"}"#));
    /// # Ok::<(), vat_monitor::error::VatMonitorError>(())
    /// ```
    pub fn to_queue_line(&self, record: &TelemetryRecord) -> Result<String> {
        let payload = QueuePayload {
            device_id: &self.device_id,
            data: PayloadData {
                distance1: round1(record.distance1),
                distance2: round1(record.distance2),
                latitude: record.latitude,
                longitude: record.longitude,
                depth: round1(record.depth),
            },
            timestamp: self.local_timestamp(&record.timestamp),
        };

        Ok(serde_json::to_string(&payload)?)
    }

    /// Formats a record as one CSV archive row (no terminator).
    ///
    /// Column order matches [`ARCHIVE_HEADER`].
    #[must_use]
    pub fn to_archive_row(&self, record: &TelemetryRecord) -> String {
        format!(
            "{},{},{:.1},{:.1},{:.6},{:.6},{:.2},{},{:.2}",
            self.local_timestamp(&record.timestamp),
            self.device_id,
            record.distance1,
            record.distance2,
            record.latitude,
            record.longitude,
            record.depth,
            record.satellites,
            record.hdop,
        )
    }
}
