//! # Uplink Module
//!
//! Serial link to the gateway modem that forwards records to the collector.
//!
//! This module handles:
//! - Opening the gateway serial port (8N1, configurable baud)
//! - Writing one payload line per record
//! - Waiting for the gateway's one-line acknowledgement
//! - Marking the link down on I/O failure or ack timeout so the device loop can reopen it
//!
//! ## Gateway protocol
//!
//! ```text
//! device  -> gateway : <payload>\r\n
//! gateway -> device  : OK\r\n         accepted by the collector
//!                      ERROR ...\r\n  rejected, retry later
//! ```
//!
//! Blank lines from the gateway are ignored. Input still pending when a
//! payload is written is discarded first. No reply within the ack timeout
//! counts as a failed send and marks the link down, so the port is reopened
//! before the next payload.

pub mod port;

use std::time::Duration;

use async_trait::async_trait;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::config::UplinkConfig;
use crate::error::{Result, VatMonitorError};
use crate::sync::Transport;
pub use port::{TokioSerialPort, UplinkPort};

/// Supported gateway baud rates
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200];

/// Acknowledgement the gateway sends for an accepted payload
pub const ACK_OK: &str = "OK";

const PAYLOAD_TERMINATOR: &[u8] = b"\r\n";

/// Gateway uplink over a serial port
pub struct SerialUplink<P: UplinkPort = TokioSerialPort> {
    port: P,
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
    ack_timeout: Duration,
    connected: bool,
}

impl<P: UplinkPort> std::fmt::Debug for SerialUplink<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialUplink")
            .field("device_path", &self.device_path)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl SerialUplink<TokioSerialPort> {
    /// Opens the gateway port named in the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vat_monitor::config::UplinkConfig;
    /// use vat_monitor::uplink::SerialUplink;
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let uplink = SerialUplink::open(&UplinkConfig::default())?;
    ///     println!("Gateway at {}", uplink.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(config: &UplinkConfig) -> Result<Self> {
        Self::open_with_paths(
            &[config.port.as_str()],
            config.baud_rate,
            Duration::from_millis(config.ack_timeout_ms),
        )
    }

    /// Opens the first device path that works.
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try, in order
    /// * `baud_rate` - Line speed
    /// * `ack_timeout` - How long to wait for the gateway's reply
    ///
    /// # Returns
    ///
    /// * `Result<SerialUplink>` - Connected uplink or error
    pub fn open_with_paths(paths: &[&str], baud_rate: u32, ack_timeout: Duration) -> Result<Self> {
        for path in paths {
            debug!("Trying to open gateway port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Gateway uplink opened at {} ({} baud)", path, baud_rate);
                    return Ok(Self::with_port(TokioSerialPort::new(port), *path, ack_timeout));
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(VatMonitorError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| VatMonitorError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }
}

impl<P: UplinkPort> SerialUplink<P> {
    /// Wraps an already-open port. The uplink starts connected.
    pub fn with_port(port: P, device_path: impl Into<String>, ack_timeout: Duration) -> Self {
        Self {
            port,
            device_path: device_path.into(),
            ack_timeout,
            connected: true,
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Reads lines until a non-blank one arrives.
    async fn read_ack(&mut self) -> Result<String> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .port
                .read_line(&mut line)
                .await
                .map_err(|e| self.link_lost(format!("Failed to read ack: {}", e)))?;
            if read == 0 {
                return Err(self.link_lost("Gateway closed the port".to_string()));
            }

            let reply = line.trim();
            if !reply.is_empty() {
                return Ok(reply.to_string());
            }
        }
    }

    fn link_lost(&mut self, msg: String) -> VatMonitorError {
        warn!("Gateway link on {} lost: {}", self.device_path, msg);
        self.connected = false;
        VatMonitorError::Serial(msg)
    }
}

#[async_trait]
impl<P: UplinkPort> Transport for SerialUplink<P> {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(VatMonitorError::Uplink("Gateway not connected".to_string()));
        }

        // A reply that missed its own timeout must not ack this payload
        if let Err(e) = self.port.discard_input().await {
            return Err(self.link_lost(format!("Failed to clear gateway input: {}", e)));
        }

        let mut frame = Vec::with_capacity(payload.len() + PAYLOAD_TERMINATOR.len());
        frame.extend_from_slice(payload);
        frame.extend_from_slice(PAYLOAD_TERMINATOR);

        if let Err(e) = self.port.write_all(&frame).await {
            return Err(self.link_lost(format!("Failed to write payload: {}", e)));
        }
        if let Err(e) = self.port.flush().await {
            return Err(self.link_lost(format!("Failed to flush gateway port: {}", e)));
        }
        debug!("Sent payload to gateway ({} bytes)", frame.len());

        let reply = match tokio::time::timeout(self.ack_timeout, self.read_ack()).await {
            Ok(reply) => reply?,
            Err(_) => {
                // The late reply may still arrive; only a reopened port is trusted again
                let msg = format!("No ack within {} ms", self.ack_timeout.as_millis());
                return Err(self.link_lost(msg));
            }
        };

        if reply == ACK_OK {
            Ok(())
        } else {
            Err(VatMonitorError::Uplink(format!("Gateway rejected payload: {}", reply)))
        }
    }
}
