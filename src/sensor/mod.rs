//! # Sensor Module
//!
//! Source of one [`Reading`] per sampling cycle.
//!
//! The real acquisition path (two ultrasonic sensors on UART plus a GPS
//! receiver) lives outside this crate. It plugs in through the [`Sensor`]
//! trait. [`SimulatedSensor`] produces a deterministic ramp for bench runs.

use chrono::Utc;
use tracing::debug;

use crate::error::Result;
use crate::telemetry::record::Reading;

/// Simulated latitude (degrees)
pub const SIMULATED_LATITUDE: f64 = -6.175392;

/// Simulated longitude (degrees)
pub const SIMULATED_LONGITUDE: f64 = 106.827153;

/// Base distances for the simulated ramp, in centimeters
const SIMULATED_BASE_DISTANCE1: f32 = 25.3;
const SIMULATED_BASE_DISTANCE2: f32 = 28.7;

/// Per-cycle ramp steps
const SIMULATED_STEP_DISTANCE1: f32 = 0.1;
const SIMULATED_STEP_DISTANCE2: f32 = 0.15;

/// Cycles before the ramp starts over
const SIMULATED_RAMP_CYCLES: u32 = 100;

/// One sampling cycle
#[cfg_attr(test, mockall::automock)]
pub trait Sensor {
    /// Takes one reading.
    ///
    /// A reading with `valid == false` is still `Ok`; it means the frames
    /// arrived but failed their checksum. `Err` means nothing was read.
    fn read_reading(&mut self) -> Result<Reading>;
}

/// Deterministic stand-in for the ultrasonic + GPS hardware
#[derive(Debug, Default)]
pub struct SimulatedSensor {
    cycle: u32,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distances for a given ramp position
    #[must_use]
    pub fn distances_at(cycle: u32) -> (f32, f32) {
        let step = (cycle % SIMULATED_RAMP_CYCLES) as f32;
        (
            SIMULATED_BASE_DISTANCE1 + step * SIMULATED_STEP_DISTANCE1,
            SIMULATED_BASE_DISTANCE2 + step * SIMULATED_STEP_DISTANCE2,
        )
    }
}

impl Sensor for SimulatedSensor {
    fn read_reading(&mut self) -> Result<Reading> {
        let (distance1, distance2) = Self::distances_at(self.cycle);
        self.cycle = self.cycle.wrapping_add(1);

        debug!("Simulated reading: d1={:.1} d2={:.1}", distance1, distance2);

        Ok(Reading {
            distance1,
            distance2,
            latitude: SIMULATED_LATITUDE,
            longitude: SIMULATED_LONGITUDE,
            satellites: 8,
            hdop: 1.2,
            fix_time: Utc::now().naive_utc(),
            valid: true,
        })
    }
}
