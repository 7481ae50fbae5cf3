use libm::{cosf, sinf, sqrtf};

use super::{mm_to_steps, Kinematics};
use crate::config::KinematicsType;
use crate::error::MotionError;
use crate::{MAX_DRIVES, NUM_AXES};

/// Tower angles in degrees, towers A, B and C.
const TOWER_ANGLES_DEG: [f32; NUM_AXES] = [210.0, 330.0, 90.0];

/// Linear delta with three towers on a circle of `radius` around the bed centre.
///
/// Motor positions are carriage heights above the effector, so the carriage of
/// tower `i` sits at `z + sqrt(L² - dx² - dy²)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinearDelta {
    diagonal_rod: f32,
    radius: f32,
    tower_x: [f32; NUM_AXES],
    tower_y: [f32; NUM_AXES],
}

impl LinearDelta {
    /// Create a delta geometry from rod length and tower radius in millimetres.
    pub fn new(diagonal_rod: f32, radius: f32) -> Self {
        let mut tower_x = [0.0; NUM_AXES];
        let mut tower_y = [0.0; NUM_AXES];
        for (i, angle) in TOWER_ANGLES_DEG.iter().enumerate() {
            let rad = angle.to_radians();
            tower_x[i] = radius * cosf(rad);
            tower_y[i] = radius * sinf(rad);
        }
        Self {
            diagonal_rod,
            radius,
            tower_x,
            tower_y,
        }
    }

    /// Diagonal rod length.
    pub fn diagonal_rod(&self) -> f32 {
        self.diagonal_rod
    }

    /// Tower radius.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Carriage height of one tower above the effector, `None` when out of reach.
    fn carriage_height(&self, tower: usize, coords: &[f32; NUM_AXES]) -> Option<f32> {
        let dx = coords[0] - self.tower_x[tower];
        let dy = coords[1] - self.tower_y[tower];
        let d2 = self.diagonal_rod * self.diagonal_rod - dx * dx - dy * dy;
        if d2.is_finite() && d2 >= 0.0 {
            Some(coords[2] + sqrtf(d2))
        } else {
            None
        }
    }
}

impl Kinematics for LinearDelta {
    fn kinematics_type(&self) -> KinematicsType {
        KinematicsType::LinearDelta
    }

    fn name(&self) -> &'static str {
        "linear_delta"
    }

    fn cartesian_to_motor_steps(
        &self,
        coords: &[f32; NUM_AXES],
        steps_per_mm: &[f32; MAX_DRIVES],
    ) -> Result<[i32; NUM_AXES], MotionError> {
        let mut motor = [0; NUM_AXES];
        for (tower, slot) in motor.iter_mut().enumerate() {
            let height = self
                .carriage_height(tower, coords)
                .ok_or(MotionError::KinematicsUnreachable { axis: tower })?;
            *slot = mm_to_steps(height, steps_per_mm[tower], tower)?;
        }
        Ok(motor)
    }

    fn motor_steps_to_cartesian(
        &self,
        motor: &[i32; NUM_AXES],
        steps_per_mm: &[f32; MAX_DRIVES],
    ) -> [f32; NUM_AXES] {
        // Trilaterate the effector from the three carriage positions.
        let p: [[f32; 3]; NUM_AXES] = core::array::from_fn(|i| {
            [self.tower_x[i], self.tower_y[i], motor[i] as f32 / steps_per_mm[i]]
        });

        let p21 = sub(p[1], p[0]);
        let p31 = sub(p[2], p[0]);
        let d = norm(p21);
        let ex = scale(p21, 1.0 / d);
        let i = dot(ex, p31);
        let ey_raw = sub(p31, scale(ex, i));
        let ey = scale(ey_raw, 1.0 / norm(ey_raw));
        let ez = cross(ex, ey);
        let j = dot(ey, p31);

        // All three spheres share the rod length as radius.
        let x = d * 0.5;
        let y = (i * i + j * j) / (2.0 * j) - (i / j) * x;
        let z2 = self.diagonal_rod * self.diagonal_rod - x * x - y * y;
        let z = sqrtf(z2.max(0.0));

        let mut out = p[0];
        for k in 0..3 {
            out[k] += x * ex[k] + y * ey[k] - z * ez[k];
        }
        out
    }
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn scale(a: [f32; 3], s: f32) -> [f32; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(a: [f32; 3]) -> f32 {
    sqrtf(dot(a, a))
}
