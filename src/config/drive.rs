//! Per-drive configuration from TOML.

use heapless::String;
use serde::Deserialize;

use super::units::{Microsteps, MmPerSec, MmPerSecSquared};

/// Configuration of one motor drive.
///
/// Drives are listed in order: the first `NUM_AXES` entries are the motors of
/// the machine geometry, any further entry is an extruder.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveConfig {
    /// Human-readable name (max 16 chars).
    pub name: String<16>,

    /// Full steps per millimetre of travel, before microstepping.
    pub full_steps_per_mm: f32,

    /// Microstep setting (1, 2, 4, 8, 16, 32, etc.).
    pub microsteps: Microsteps,

    /// Maximum speed of this drive in millimetres per second.
    #[serde(rename = "max_speed_mm_per_sec")]
    pub max_speed: MmPerSec,

    /// Maximum acceleration of this drive in millimetres per second squared.
    #[serde(rename = "max_acceleration_mm_per_sec2")]
    pub max_acceleration: MmPerSecSquared,

    /// Invert direction pin logic.
    #[serde(default)]
    pub invert_direction: bool,
}

impl DriveConfig {
    /// Create a drive configuration.
    pub fn new(
        name: &str,
        full_steps_per_mm: f32,
        microsteps: Microsteps,
        max_speed: MmPerSec,
        max_acceleration: MmPerSecSquared,
    ) -> Self {
        Self {
            name: String::try_from(name).unwrap_or_default(),
            full_steps_per_mm,
            microsteps,
            max_speed,
            max_acceleration,
            invert_direction: false,
        }
    }

    /// Microsteps per millimetre of travel.
    #[inline]
    pub fn steps_per_mm(&self) -> f32 {
        self.microsteps.steps_per_mm(self.full_steps_per_mm)
    }
}
