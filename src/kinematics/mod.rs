//! Machine geometry.
//!
//! A [`Kinematics`] implementation converts between Cartesian coordinates in
//! millimetres and absolute motor positions in microsteps for the first
//! [`NUM_AXES`] drives. Implementations hold only geometric constants; the
//! orchestrator owns exactly one of them through [`AnyKinematics`].

mod cartesian;
mod core_xy;
mod linear_delta;

pub use cartesian::Cartesian;
pub use core_xy::CoreXy;
pub use linear_delta::LinearDelta;

use crate::config::units::Millimetres;
use crate::config::{validate_geometry, KinematicsConfig, KinematicsType};
use crate::error::{MotionError, Result};
use crate::{MAX_DRIVES, NUM_AXES};

/// Geometry transform between Cartesian space and motor-step space.
pub trait Kinematics {
    /// Geometry tag.
    fn kinematics_type(&self) -> KinematicsType;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// Number of drives this geometry moves.
    fn required_drives(&self) -> usize {
        NUM_AXES
    }

    /// Convert a Cartesian position to absolute motor positions.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::KinematicsUnreachable`] if the position cannot be
    /// represented by this geometry.
    fn cartesian_to_motor_steps(
        &self,
        coords: &[f32; NUM_AXES],
        steps_per_mm: &[f32; MAX_DRIVES],
    ) -> core::result::Result<[i32; NUM_AXES], MotionError>;

    /// Convert absolute motor positions back to a Cartesian position.
    fn motor_steps_to_cartesian(
        &self,
        motor: &[i32; NUM_AXES],
        steps_per_mm: &[f32; MAX_DRIVES],
    ) -> [f32; NUM_AXES];
}

/// The geometry selected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AnyKinematics {
    /// One motor per axis.
    Cartesian(Cartesian),
    /// CoreXY belt arrangement.
    CoreXy(CoreXy),
    /// Linear delta.
    LinearDelta(LinearDelta),
}

impl AnyKinematics {
    /// Build the geometry described by a configuration section.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the geometry lacks its parameters.
    pub fn from_config(config: &KinematicsConfig) -> Result<Self> {
        validate_geometry(config)?;

        Ok(match config.kind {
            KinematicsType::Cartesian => AnyKinematics::Cartesian(Cartesian),
            KinematicsType::CoreXy => AnyKinematics::CoreXy(CoreXy),
            KinematicsType::LinearDelta => AnyKinematics::LinearDelta(LinearDelta::new(
                config.diagonal_rod_mm.unwrap_or_default(),
                config.radius_mm.unwrap_or_default(),
            )),
        })
    }

    fn inner(&self) -> &dyn Kinematics {
        match self {
            AnyKinematics::Cartesian(k) => k,
            AnyKinematics::CoreXy(k) => k,
            AnyKinematics::LinearDelta(k) => k,
        }
    }
}

impl Default for AnyKinematics {
    fn default() -> Self {
        AnyKinematics::Cartesian(Cartesian)
    }
}

impl Kinematics for AnyKinematics {
    fn kinematics_type(&self) -> KinematicsType {
        self.inner().kinematics_type()
    }

    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn required_drives(&self) -> usize {
        self.inner().required_drives()
    }

    fn cartesian_to_motor_steps(
        &self,
        coords: &[f32; NUM_AXES],
        steps_per_mm: &[f32; MAX_DRIVES],
    ) -> core::result::Result<[i32; NUM_AXES], MotionError> {
        self.inner().cartesian_to_motor_steps(coords, steps_per_mm)
    }

    fn motor_steps_to_cartesian(
        &self,
        motor: &[i32; NUM_AXES],
        steps_per_mm: &[f32; MAX_DRIVES],
    ) -> [f32; NUM_AXES] {
        self.inner().motor_steps_to_cartesian(motor, steps_per_mm)
    }
}

/// Round a motor position in millimetres to the nearest step.
///
/// Fails for non-finite input and for positions outside the `i32` range.
pub(crate) fn mm_to_steps(
    mm: f32,
    steps_per_mm: f32,
    axis: usize,
) -> core::result::Result<i32, MotionError> {
    Millimetres(mm)
        .to_steps(steps_per_mm)
        .ok_or(MotionError::KinematicsUnreachable { axis })
}
