//! # stepper-dda
//!
//! Look-ahead motion planning and interrupt-driven step generation for
//! multi-drive CNC and 3D-printer controllers.
//!
//! ## Features
//!
//! - **Look-ahead planning**: Junction speeds are blended across queued moves
//! - **Interrupt-driven stepping**: Bounded work per step-timer interrupt
//! - **Pluggable geometry**: Cartesian, CoreXY and linear delta kinematics
//! - **embedded-hal 1.0**: Uses `OutputPin` for STEP/DIR, `DelayNs` for pulse width
//! - **no_std compatible**: Core library works without standard library
//! - **Configuration-driven**: Machine description in TOML files
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepper_dda::{MachineConfig, MotionShared, Move, Waypoint};
//! use stepper_dda::config::units::MmPerSec;
//!
//! static MOTION: MotionShared = MotionShared::new();
//!
//! // Load configuration from TOML
//! let config: MachineConfig = stepper_dda::load_config("machine.toml")?;
//! let mut motion: Move = Move::new(config, &MOTION)?;
//!
//! // Queue moves and hand them to the step interrupt
//! queue.push_back(Waypoint::linear([10.0, 0.0, 0.0], MmPerSec(50.0)))?;
//! loop {
//!     motion.spin(&mut queue, &mut timer);
//! }
//!
//! // In the step-timer interrupt
//! MOTION.interrupt(&mut timer, &mut pins);
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Enables file I/O, TOML parsing and a host critical section
//! - `alloc`: Enables heap allocation for no_std with allocator
//! - `defmt`: Enables defmt logging for embedded targets

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow large error types - necessary for no_std with heapless strings
#![allow(clippy::result_large_err)]

#[cfg(feature = "alloc")]
extern crate alloc;

// Must come first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

// Core modules
pub mod config;
pub mod error;
pub mod kinematics;
pub mod motion;
pub mod motor;

/// Number of Cartesian axes.
pub const NUM_AXES: usize = 3;

/// Maximum number of drives, axes and extruders together.
pub const MAX_DRIVES: usize = 6;

/// Drive index of the first extruder.
pub const EXTRUDER_DRIVE: usize = NUM_AXES;

/// Default look-ahead ring capacity.
pub const DDA_RING_LENGTH: usize = 20;

/// Default drive-movement pool size.
pub const NUM_DMS: usize = DDA_RING_LENGTH * MAX_DRIVES;

// Re-exports for ergonomic API
pub use config::{validate_config, KinematicsConfig, KinematicsType, MachineConfig};
pub use error::{Error, MotionError, Result};
pub use kinematics::{AnyKinematics, Kinematics};
pub use motion::{Diagnostics, FlushMode, MotionShared, Move, StepClock, Waypoint, WaypointSource};
pub use motor::{PinBank, StepOutput};

// Configuration loading (std only)
#[cfg(feature = "std")]
pub use config::{load_config, parse_config};

// Unit types
pub use config::units::{Microsteps, Millimetres, MmPerSec, MmPerSecSquared};
