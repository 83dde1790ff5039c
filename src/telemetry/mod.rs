//! # Telemetry Module
//!
//! Telemetry record model and its serialized forms.
//!
//! This module handles:
//! - Building immutable records from sensor readings
//! - Depth calculation from the ultrasonic distance
//! - UTC timestamp construction from GPS date/time fields
//! - JSON queue lines and CSV archive rows

pub mod codec;
pub mod record;
