use super::{mm_to_steps, Kinematics};
use crate::config::KinematicsType;
use crate::error::MotionError;
use crate::{MAX_DRIVES, NUM_AXES};

/// CoreXY: motor A moves X+Y, motor B moves X−Y, Z is direct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CoreXy;

impl Kinematics for CoreXy {
    fn kinematics_type(&self) -> KinematicsType {
        KinematicsType::CoreXy
    }

    fn name(&self) -> &'static str {
        "core_xy"
    }

    fn cartesian_to_motor_steps(
        &self,
        coords: &[f32; NUM_AXES],
        steps_per_mm: &[f32; MAX_DRIVES],
    ) -> Result<[i32; NUM_AXES], MotionError> {
        let [x, y, z] = *coords;
        Ok([
            mm_to_steps(x + y, steps_per_mm[0], 0)?,
            mm_to_steps(x - y, steps_per_mm[1], 1)?,
            mm_to_steps(z, steps_per_mm[2], 2)?,
        ])
    }

    fn motor_steps_to_cartesian(
        &self,
        motor: &[i32; NUM_AXES],
        steps_per_mm: &[f32; MAX_DRIVES],
    ) -> [f32; NUM_AXES] {
        let a = motor[0] as f32 / steps_per_mm[0];
        let b = motor[1] as f32 / steps_per_mm[1];
        [(a + b) * 0.5, (a - b) * 0.5, motor[2] as f32 / steps_per_mm[2]]
    }
}
