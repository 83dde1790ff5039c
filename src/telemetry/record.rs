//! # Telemetry Records
//!
//! Value types produced once per sensor cycle.
//!
//! A [`Reading`] is what the sensor side hands over (two ultrasonic distances
//! plus the GPS fix). [`TelemetryRecord::from_reading`] turns it into the
//! immutable record that gets persisted, computing depth on the way.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Result, VatMonitorError};

/// Raw sensor cycle output
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Ultrasonic sensor 1 distance in centimeters
    pub distance1: f32,
    /// Ultrasonic sensor 2 distance in centimeters
    pub distance2: f32,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Satellites used in the fix
    pub satellites: u8,
    /// Horizontal dilution of precision
    pub hdop: f32,
    /// UTC time of the fix
    pub fix_time: NaiveDateTime,
    /// Whether both distance frames passed their checksum
    pub valid: bool,
}

/// Linear model converting the second distance reading to depth
///
/// `depth = gain * distance2 - offset_cm`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthModel {
    pub gain: f32,
    pub offset_cm: f32,
}

impl Default for DepthModel {
    fn default() -> Self {
        Self {
            gain: 2.84,
            offset_cm: 16.6,
        }
    }
}

impl DepthModel {
    /// Creates a depth model with the given gain and offset.
    #[must_use]
    pub fn new(gain: f32, offset_cm: f32) -> Self {
        Self { gain, offset_cm }
    }

    /// Computes depth in centimeters from the second distance reading.
    #[must_use]
    pub fn depth(&self, distance2: f32) -> f32 {
        self.gain * distance2 - self.offset_cm
    }
}

/// One persisted telemetry sample
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub distance1: f32,
    pub distance2: f32,
    pub latitude: f64,
    pub longitude: f64,
    pub depth: f32,
    /// UTC timestamp taken from the GPS fix
    pub timestamp: NaiveDateTime,
    pub satellites: u8,
    pub hdop: f32,
    pub is_valid: bool,
}

impl TelemetryRecord {
    /// Builds a record from a sensor reading.
    ///
    /// # Examples
    ///
    /// ```
    /// use vat_monitor::telemetry::record::{utc_from_fields, DepthModel, Reading, TelemetryRecord};
    ///
    /// let reading = Reading {
    ///     distance1: 23.5,
    ///     distance2: 10.0,
    ///     latitude: -6.175392,
    ///     longitude: 106.827153,
    ///     satellites: 8,
    ///     hdop: 1.2,
    ///     fix_time: utc_from_fields(2024, 1, 1, 12, 0, 0)?,
    ///     valid: true,
    /// };
    /// let record = TelemetryRecord::from_reading(&reading, &DepthModel::default());
    /// assert!((record.depth - 11.8).abs() < 0.001);
    /// # Ok::<(), vat_monitor::error::VatMonitorError>(())
    /// ```
    #[must_use]
    pub fn from_reading(reading: &Reading, model: &DepthModel) -> Self {
        Self {
            distance1: reading.distance1,
            distance2: reading.distance2,
            latitude: reading.latitude,
            longitude: reading.longitude,
            depth: model.depth(reading.distance2),
            timestamp: reading.fix_time,
            satellites: reading.satellites,
            hdop: reading.hdop,
            is_valid: reading.valid,
        }
    }

    /// Calendar date of the record's own timestamp (UTC).
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Builds a UTC timestamp from the broken-down fields a GPS fix reports.
///
/// # Errors
///
/// Returns [`VatMonitorError::InvalidTimestamp`] if the fields do not name a
/// real instant (month 13, February 30th, hour 24 and so on).
pub fn utc_from_fields(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| {
            VatMonitorError::InvalidTimestamp(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ))
        })
}
