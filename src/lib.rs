//! # VAT Monitor Library
//!
//! Subsoil depth telemetry for a field device that is offline most of the time.
//!
//! Every sensor cycle yields a [`telemetry::record::TelemetryRecord`] that is
//! written to three places on the storage medium: a daily CSV archive, an
//! append-only offline queue and a latest-record snapshot. Whenever the uplink
//! is up, the [`sync::SyncEngine`] drains the queue at-least-once and in
//! order, then deletes it once everything has been delivered.

pub mod config;
pub mod error;
pub mod producer;
pub mod sensor;
pub mod storage;
pub mod sync;
pub mod telemetry;
pub mod uplink;
