//! Trait abstraction for the delivery transport to enable testing

use async_trait::async_trait;

use crate::error::Result;

/// Link that delivers one payload to the remote collector
///
/// `send` returning `Ok` means the collector accepted the payload. Every
/// error is treated the same way: retry later.
#[async_trait]
pub trait Transport: Send {
    /// Whether the link is currently up
    fn is_connected(&self) -> bool;

    /// Delivers one payload, blocking until accepted, rejected or timed out
    async fn send(&mut self, payload: &[u8]) -> Result<()>;
}
