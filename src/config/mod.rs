//! Configuration module for stepper-dda.
//!
//! Provides types for loading and validating machine, drive, geometry and
//! planner configurations from TOML files (with `std` feature) or pre-built data.

mod drive;
mod kinematics;
mod limits;
mod machine;
mod planner;
pub mod units;
#[cfg(feature = "std")]
mod loader;
mod validation;

pub use drive::DriveConfig;
pub use kinematics::{KinematicsConfig, KinematicsType};
pub use limits::{LimitPolicy, SoftLimits};
pub use machine::MachineConfig;
pub use planner::PlannerConfig;
pub use validation::validate_config;
pub(crate) use validation::validate_geometry;

#[cfg(feature = "std")]
pub use loader::{load_config, parse_config};

// Re-export unit types at config level
pub use units::{Microsteps, Millimetres, MmPerSec, MmPerSecSquared};
