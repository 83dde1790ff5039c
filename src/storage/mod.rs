//! # Storage Module
//!
//! Durable artifacts kept on the storage medium (SD card).
//!
//! This module handles:
//! - Mounting the medium and tracking whether it is healthy
//! - The append-only record log and its persisted sync cursor
//! - The date-partitioned daily CSV archive
//! - The single-slot latest-record snapshot
//!
//! Every operation goes through a [`StorageHandle`]. When the handle is
//! unhealthy all operations fail with [`VatMonitorError::StorageUnavailable`]
//! (or report an empty/zero value) and the device keeps running without
//! offline backup until the next explicit [`StorageHandle::check_health`].

pub mod archive;
pub mod cursor;
pub mod log;
pub mod medium;
pub mod queue;
pub mod snapshot;

use tracing::{info, warn};

use crate::error::{Result, VatMonitorError};
use medium::StorageMedium;

/// A storage medium plus its health state
#[derive(Debug)]
pub struct StorageHandle<M> {
    medium: M,
    healthy: bool,
}

impl<M: StorageMedium> StorageHandle<M> {
    /// Mounts a medium, probing it once.
    ///
    /// Never fails: a medium that does not pass the probe yields an
    /// unhealthy handle.
    pub fn mount(medium: M) -> Self {
        let mut handle = Self {
            medium,
            healthy: false,
        };
        handle.check_health();
        handle
    }

    /// Re-probes the medium and updates the health state.
    ///
    /// # Returns
    ///
    /// * `bool` - true if the medium is usable
    pub fn check_health(&mut self) -> bool {
        match self.medium.probe() {
            Ok(()) => {
                if !self.healthy {
                    info!("Storage medium mounted and healthy");
                }
                self.healthy = true;
            }
            Err(e) => {
                warn!("Storage medium unavailable, offline backup disabled: {}", e);
                self.healthy = false;
            }
        }
        self.healthy
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Medium for read-only operations, if healthy
    pub(crate) fn reader(&self) -> Result<&M> {
        if self.healthy {
            Ok(&self.medium)
        } else {
            Err(VatMonitorError::StorageUnavailable)
        }
    }

    /// Medium for mutating operations, if healthy
    pub(crate) fn writer(&mut self) -> Result<&mut M> {
        if self.healthy {
            Ok(&mut self.medium)
        } else {
            Err(VatMonitorError::StorageUnavailable)
        }
    }

    /// Underlying medium regardless of health
    pub fn medium(&self) -> &M {
        &self.medium
    }

    pub fn medium_mut(&mut self) -> &mut M {
        &mut self.medium
    }
}
