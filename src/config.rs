//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, VatMonitorError};
use crate::uplink::SUPPORTED_BAUD_RATES;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub uplink: UplinkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Device identity configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Offset from UTC used when rendering record timestamps
    #[serde(default = "default_timezone_offset_hours")]
    pub timezone_offset_hours: i32,
}

/// Storage medium layout
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_root_dir")]
    pub root_dir: String,

    #[serde(default = "default_queue_file")]
    pub queue_file: String,

    #[serde(default = "default_cursor_file")]
    pub cursor_file: String,

    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,

    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

/// Sync engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_sync_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    #[serde(default = "default_inter_send_delay_ms")]
    pub inter_send_delay_ms: u64,
}

/// Sensor sampling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    #[serde(default = "default_sampling_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_sampling_source")]
    pub source: String,

    #[serde(default = "default_depth_gain")]
    pub depth_gain: f32,

    #[serde(default = "default_depth_offset_cm")]
    pub depth_offset_cm: f32,
}

/// Serial uplink configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UplinkConfig {
    #[serde(default = "default_uplink_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for the rolling log file; empty disables file logging
    #[serde(default)]
    pub dir: String,

    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
}

// Default value functions
fn default_device_id() -> String { "BJK0001".to_string() }
fn default_timezone_offset_hours() -> i32 { 7 }

fn default_root_dir() -> String { "./data".to_string() }
fn default_queue_file() -> String { "offline_queue.txt".to_string() }
fn default_cursor_file() -> String { "queue_progress.txt".to_string() }
fn default_archive_prefix() -> String { "vatlog".to_string() }
fn default_snapshot_file() -> String { "critical_backup.json".to_string() }

fn default_sync_interval_ms() -> u64 { 60000 }
fn default_max_attempts() -> usize { 10 }
fn default_inter_send_delay_ms() -> u64 { 1000 }

fn default_sampling_interval_ms() -> u64 { 1000 }
fn default_sampling_source() -> String { "simulated".to_string() }
fn default_depth_gain() -> f32 { 2.84 }
fn default_depth_offset_cm() -> f32 { 16.6 }

fn default_uplink_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 9600 }
fn default_ack_timeout_ms() -> u64 { 30000 }

fn default_log_level() -> String { "info".to_string() }
fn default_stats_interval_ms() -> u64 { 60000 }

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            timezone_offset_hours: default_timezone_offset_hours(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            queue_file: default_queue_file(),
            cursor_file: default_cursor_file(),
            archive_prefix: default_archive_prefix(),
            snapshot_file: default_snapshot_file(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sync_interval_ms(),
            max_attempts: default_max_attempts(),
            inter_send_delay_ms: default_inter_send_delay_ms(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sampling_interval_ms(),
            source: default_sampling_source(),
            depth_gain: default_depth_gain(),
            depth_offset_cm: default_depth_offset_cm(),
        }
    }
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            port: default_uplink_port(),
            baud_rate: default_baud_rate(),
            ack_timeout_ms: default_ack_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: String::new(),
            stats_interval_ms: default_stats_interval_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            storage: StorageConfig::default(),
            sync: SyncConfig::default(),
            sampling: SamplingConfig::default(),
            uplink: UplinkConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> VatMonitorError {
    VatMonitorError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vat_monitor::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.device.device_id.is_empty() {
            return Err(invalid("device_id cannot be empty"));
        }

        // CSV rows are comma separated and queue lines are single-line JSON
        if self.device.device_id.contains([',', '\r', '\n']) {
            return Err(invalid("device_id cannot contain commas or line breaks"));
        }

        if !(-12..=14).contains(&self.device.timezone_offset_hours) {
            return Err(invalid("timezone_offset_hours must be between -12 and 14"));
        }

        if self.storage.root_dir.is_empty() {
            return Err(invalid("storage root_dir cannot be empty"));
        }

        let names = [
            ("queue_file", &self.storage.queue_file),
            ("cursor_file", &self.storage.cursor_file),
            ("archive_prefix", &self.storage.archive_prefix),
            ("snapshot_file", &self.storage.snapshot_file),
        ];
        for (field, value) in names {
            if value.is_empty() {
                return Err(invalid(format!("storage {} cannot be empty", field)));
            }
            if value.contains(['/', '\\']) {
                return Err(invalid(format!("storage {} must be a plain file name", field)));
            }
        }

        if self.storage.queue_file == self.storage.cursor_file
            || self.storage.queue_file == self.storage.snapshot_file
            || self.storage.cursor_file == self.storage.snapshot_file
        {
            return Err(invalid("queue_file, cursor_file and snapshot_file must be distinct"));
        }

        // Validate sync engine bounds
        if self.sync.max_attempts == 0 || self.sync.max_attempts > 1000 {
            return Err(invalid("max_attempts must be between 1 and 1000"));
        }

        if self.sync.inter_send_delay_ms > 60000 {
            return Err(invalid("inter_send_delay_ms must be at most 60000"));
        }

        if self.sync.interval_ms == 0 || self.sync.interval_ms > 86_400_000 {
            return Err(invalid("sync interval_ms must be between 1 and 86400000"));
        }

        // Validate sampling
        if self.sampling.interval_ms == 0 || self.sampling.interval_ms > 3_600_000 {
            return Err(invalid("sampling interval_ms must be between 1 and 3600000"));
        }

        if self.sampling.source != "simulated" {
            return Err(invalid("sampling source must be 'simulated' (only supported source)"));
        }

        if !self.sampling.depth_gain.is_finite() || !self.sampling.depth_offset_cm.is_finite() {
            return Err(invalid("depth_gain and depth_offset_cm must be finite"));
        }

        // Validate uplink
        if self.uplink.port.is_empty() {
            return Err(invalid("uplink port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.uplink.baud_rate) {
            return Err(invalid("baud_rate must be one of: 9600, 19200, 38400, 57600, 115200"));
        }

        if self.uplink.ack_timeout_ms == 0 || self.uplink.ack_timeout_ms > 120000 {
            return Err(invalid("ack_timeout_ms must be between 1 and 120000"));
        }

        // Validate logging
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        if self.logging.stats_interval_ms == 0 {
            return Err(invalid("stats_interval_ms must be greater than 0"));
        }

        Ok(())
    }
}
