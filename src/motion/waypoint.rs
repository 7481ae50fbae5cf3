//! Decoded move requests.

use heapless::Deque;

use crate::config::units::MmPerSec;
use crate::error::MotionError;
use crate::{MAX_DRIVES, NUM_AXES};

/// Where a move ends.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Target {
    /// Cartesian coordinates in millimetres, X, Y, Z.
    ///
    /// For [`MoveType::RawMotor`] moves these are per-drive positions in
    /// millimetres of the first three drives, bypassing the geometry.
    Cartesian([f32; NUM_AXES]),
    /// Absolute motor positions in microsteps for every drive.
    ///
    /// Always executed as a raw motor move.
    Motor([i32; MAX_DRIVES]),
}

/// How a move relates to the machine geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MoveType {
    /// Coordinated move through the geometry, blended with its neighbours.
    #[default]
    Coordinated,
    /// Independent motor move; starts and ends at rest.
    RawMotor,
}

/// Extruder motion attached to a move.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Extrusion {
    /// Filament length in millimetres, relative to the previous move.
    pub amount: f32,
    /// Pressure advance factor in seconds (0 disables).
    pub pressure_advance: f32,
}

/// One decoded move request.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Waypoint {
    /// Target position.
    pub target: Target,
    /// Requested speed along the path.
    pub feed_rate: MmPerSec,
    /// Coordinated or raw motor move.
    pub move_type: MoveType,
    /// Optional extrusion on the first extruder drive.
    pub extrusion: Option<Extrusion>,
}

impl Waypoint {
    /// Coordinated move to a Cartesian position.
    pub fn linear(coords: [f32; NUM_AXES], feed_rate: MmPerSec) -> Self {
        Self {
            target: Target::Cartesian(coords),
            feed_rate,
            move_type: MoveType::Coordinated,
            extrusion: None,
        }
    }

    /// Raw move to absolute motor positions.
    pub fn raw_motor(steps: [i32; MAX_DRIVES], feed_rate: MmPerSec) -> Self {
        Self {
            target: Target::Motor(steps),
            feed_rate,
            move_type: MoveType::RawMotor,
            extrusion: None,
        }
    }

    /// Attach extrusion to this move.
    pub fn with_extrusion(mut self, amount: f32, pressure_advance: f32) -> Self {
        self.extrusion = Some(Extrusion {
            amount,
            pressure_advance,
        });
        self
    }

    /// True if the move bypasses the geometry.
    pub fn is_raw_motor(&self) -> bool {
        self.move_type == MoveType::RawMotor || matches!(self.target, Target::Motor(_))
    }
}

/// Upstream supplier of waypoints, drained by [`Move::spin`](crate::Move::spin).
pub trait WaypointSource {
    /// Next waypoint without removing it.
    fn peek(&self) -> Option<&Waypoint>;

    /// Remove the peeked waypoint after it was admitted.
    fn accept(&mut self);

    /// Remove the peeked waypoint after it was refused for good.
    fn reject(&mut self, error: MotionError);
}

impl<const N: usize> WaypointSource for Deque<Waypoint, N> {
    fn peek(&self) -> Option<&Waypoint> {
        self.front()
    }

    fn accept(&mut self) {
        self.pop_front();
    }

    fn reject(&mut self, error: MotionError) {
        warn!("dropping waypoint: {}", error);
        self.pop_front();
    }
}
