//! Machine configuration - root configuration structure.

use heapless::Vec;
use serde::Deserialize;

use super::drive::DriveConfig;
use super::kinematics::KinematicsConfig;
use super::limits::SoftLimits;
use super::planner::PlannerConfig;
use crate::{MAX_DRIVES, NUM_AXES};

/// Root configuration structure from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MachineConfig {
    /// Machine geometry.
    #[serde(default)]
    pub kinematics: KinematicsConfig,

    /// Look-ahead and step-clock settings.
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Optional soft limits, one per Cartesian axis in X, Y, Z order.
    #[serde(default)]
    pub axis_limits: Vec<SoftLimits, NUM_AXES>,

    /// Drives in index order.
    pub drives: Vec<DriveConfig, MAX_DRIVES>,
}

impl MachineConfig {
    /// Create a configuration with default planner settings and no soft limits.
    pub fn new(kinematics: KinematicsConfig) -> Self {
        Self {
            kinematics,
            planner: PlannerConfig::default(),
            axis_limits: Vec::new(),
            drives: Vec::new(),
        }
    }

    /// Find a drive index by name.
    pub fn drive_index(&self, name: &str) -> Option<usize> {
        self.drives.iter().position(|d| d.name.as_str() == name)
    }

    /// Number of configured drives.
    pub fn num_drives(&self) -> usize {
        self.drives.len()
    }

    /// Soft limits of a Cartesian axis, if configured.
    pub fn axis_limits(&self, axis: usize) -> Option<&SoftLimits> {
        self.axis_limits.get(axis)
    }

    /// Steps per millimetre of every drive, zero for unconfigured slots.
    pub fn steps_per_mm(&self) -> [f32; MAX_DRIVES] {
        let mut out = [0.0; MAX_DRIVES];
        for (slot, drive) in out.iter_mut().zip(self.drives.iter()) {
            *slot = drive.steps_per_mm();
        }
        out
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self::new(KinematicsConfig::default())
    }
}
