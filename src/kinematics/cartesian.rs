use super::{mm_to_steps, Kinematics};
use crate::config::KinematicsType;
use crate::error::MotionError;
use crate::{MAX_DRIVES, NUM_AXES};

/// One motor per Cartesian axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cartesian;

impl Kinematics for Cartesian {
    fn kinematics_type(&self) -> KinematicsType {
        KinematicsType::Cartesian
    }

    fn name(&self) -> &'static str {
        "cartesian"
    }

    fn cartesian_to_motor_steps(
        &self,
        coords: &[f32; NUM_AXES],
        steps_per_mm: &[f32; MAX_DRIVES],
    ) -> Result<[i32; NUM_AXES], MotionError> {
        let mut motor = [0; NUM_AXES];
        for (axis, slot) in motor.iter_mut().enumerate() {
            *slot = mm_to_steps(coords[axis], steps_per_mm[axis], axis)?;
        }
        Ok(motor)
    }

    fn motor_steps_to_cartesian(
        &self,
        motor: &[i32; NUM_AXES],
        steps_per_mm: &[f32; MAX_DRIVES],
    ) -> [f32; NUM_AXES] {
        core::array::from_fn(|axis| motor[axis] as f32 / steps_per_mm[axis])
    }
}
