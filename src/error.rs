//! # Error Types
//!
//! Custom error types for VAT Monitor using `thiserror`.

use thiserror::Error;

/// Main error type for VAT Monitor
#[derive(Debug, Error)]
pub enum VatMonitorError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Storage medium is not mounted or failed its last health check
    #[error("Storage medium unavailable")]
    StorageUnavailable,

    /// A serialized record cannot be stored as a single log line
    #[error("Invalid record line: {0}")]
    InvalidRecord(String),

    /// Date/time fields do not form a valid UTC timestamp
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Sensor read failures
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate uplink ports could be opened
    #[error("Uplink serial port not found (tried: {0})")]
    SerialPortNotFound(String),

    /// Uplink delivery failures (write error, rejected ack, timeout)
    #[error("Uplink error: {0}")]
    Uplink(String),
}

/// Result type alias for VAT Monitor
pub type Result<T> = std::result::Result<T, VatMonitorError>;
