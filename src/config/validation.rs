//! Configuration validation.

use crate::error::{ConfigError, Error, Result};
use crate::NUM_AXES;

use super::{DriveConfig, KinematicsConfig, KinematicsType, MachineConfig, PlannerConfig};

/// Validate a machine configuration.
///
/// Checks:
/// - Drive parameters are positive and finite
/// - Soft limits are valid (min < max) and at most one per axis
/// - Planner settings are usable
/// - The geometry has its parameters and enough drives
pub fn validate_config(config: &MachineConfig) -> Result<()> {
    for drive in config.drives.iter() {
        validate_drive(drive)?;
    }

    if config.axis_limits.len() > NUM_AXES {
        return Err(Error::Config(ConfigError::TooManyAxisLimits(
            config.axis_limits.len(),
        )));
    }
    for limits in config.axis_limits.iter() {
        if !limits.is_valid() {
            return Err(Error::Config(ConfigError::InvalidSoftLimits {
                min: limits.min.0,
                max: limits.max.0,
            }));
        }
    }

    validate_planner(&config.planner)?;
    validate_geometry(&config.kinematics)?;

    if config.num_drives() < NUM_AXES {
        return Err(Error::Config(ConfigError::TooFewDrives {
            required: NUM_AXES,
            configured: config.num_drives(),
        }));
    }

    Ok(())
}

fn validate_drive(drive: &DriveConfig) -> Result<()> {
    if !(drive.full_steps_per_mm.is_finite() && drive.full_steps_per_mm > 0.0) {
        return Err(Error::Config(ConfigError::InvalidStepsPerMm(
            drive.full_steps_per_mm,
        )));
    }

    if !drive.max_speed.is_valid() {
        return Err(Error::Config(ConfigError::InvalidMaxSpeed(drive.max_speed.0)));
    }

    if !drive.max_acceleration.is_valid() {
        return Err(Error::Config(ConfigError::InvalidMaxAcceleration(
            drive.max_acceleration.0,
        )));
    }

    Ok(())
}

fn validate_planner(planner: &PlannerConfig) -> Result<()> {
    if planner.step_clock_hz == 0 {
        return Err(Error::Config(ConfigError::InvalidStepClock(planner.step_clock_hz)));
    }

    let jd = planner.junction_deviation.0;
    if !(jd.is_finite() && jd >= 0.0) {
        return Err(Error::Config(ConfigError::InvalidJunctionDeviation(jd)));
    }

    if planner.max_steps_per_interrupt == 0 {
        return Err(Error::Config(ConfigError::InvalidStepsPerInterrupt(
            planner.max_steps_per_interrupt,
        )));
    }

    Ok(())
}

/// Check that a geometry carries the parameters it needs.
pub(crate) fn validate_geometry(kinematics: &KinematicsConfig) -> Result<()> {
    if kinematics.kind == KinematicsType::LinearDelta {
        let (Some(rod), Some(radius)) = (kinematics.diagonal_rod_mm, kinematics.radius_mm) else {
            return Err(Error::Config(ConfigError::MissingDeltaGeometry));
        };
        // The effector must at least reach the bed centre.
        if !(rod.is_finite() && radius.is_finite() && radius > 0.0 && rod > radius) {
            return Err(Error::Config(ConfigError::InvalidDeltaGeometry {
                diagonal_rod: rod,
                radius,
            }));
        }
    }

    Ok(())
}
