//! Velocity profile calculation.
//!
//! Provides the cornering limit between consecutive moves, the trapezoid that
//! joins an entry speed to an exit speed, and the step timing derived from it.
//! All speeds are in millimetres per second along the path; times in
//! [`StepTiming`] are returned in step-clock ticks.

use libm::{roundf, sqrtf};

/// Cosine above which two moves are treated as a full reversal.
const REVERSAL_COS: f32 = 0.999_999;

/// Direction of drive motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Increasing motor position (positive step count).
    Forward,
    /// Decreasing motor position (negative step count).
    Reverse,
}

impl Direction {
    /// Get direction from signed step count.
    #[inline]
    pub fn from_steps(steps: i32) -> Self {
        if steps >= 0 {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }

    /// Get the sign multiplier.
    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        }
    }

    /// True for [`Direction::Forward`].
    #[inline]
    pub fn is_forward(self) -> bool {
        self == Direction::Forward
    }
}

/// Highest speed at which the path may pass from `prev_unit` to `unit`.
///
/// Uses the junction deviation model: the corner is replaced by an arc that
/// deviates at most `junction_deviation` from the sharp corner, and the speed
/// is the one whose centripetal acceleration on that arc equals `accel`.
/// Collinear moves have no cornering limit and return `f32::INFINITY`;
/// a full reversal returns 0.
pub fn junction_speed(
    prev_unit: &[f32; 3],
    unit: &[f32; 3],
    accel: f32,
    junction_deviation: f32,
) -> f32 {
    let cos_theta = -(prev_unit[0] * unit[0] + prev_unit[1] * unit[1] + prev_unit[2] * unit[2]);

    if cos_theta > REVERSAL_COS {
        return 0.0;
    }
    if cos_theta < -REVERSAL_COS {
        return f32::INFINITY;
    }

    let sin_theta_d2 = sqrtf(0.5 * (1.0 - cos_theta));
    let r = junction_deviation * sin_theta_d2 / (1.0 - sin_theta_d2);
    sqrtf(accel * r)
}

/// Highest speed reachable from `from` over `distance` at `accel`.
#[inline]
pub fn reachable_speed(from: f32, accel: f32, distance: f32) -> f32 {
    sqrtf(from * from + 2.0 * accel * distance)
}

/// Peak speed of a trapezoid joining `entry` to `exit` over `length`.
///
/// This is the requested speed when the move is long enough to cruise,
/// otherwise the apex of the triangle where the acceleration and
/// deceleration ramps meet.
pub fn peak_speed(entry: f32, exit: f32, requested: f32, accel: f32, decel: f32, length: f32) -> f32 {
    let apex2 = (2.0 * accel * decel * length + decel * entry * entry + accel * exit * exit)
        / (accel + decel);
    let peak = sqrtf(apex2).min(requested);
    // Rounding must never leave the peak below either end.
    peak.max(entry).max(exit)
}

/// Fixed step timing for a frozen move.
///
/// Maps a distance along the path to the time since the start of the move.
/// Times in the deceleration phase are measured back from the end of the move,
/// so the final step lands exactly on the analytic duration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepTiming {
    /// Path length in millimetres.
    pub length: f32,
    /// Speed at the start of the move.
    pub entry: f32,
    /// Cruise speed.
    pub cruise: f32,
    /// Speed at the end of the move.
    pub exit: f32,
    /// Acceleration magnitude.
    pub accel: f32,
    /// Deceleration magnitude.
    pub decel: f32,
    /// Distance at which cruising starts.
    pub accel_distance: f32,
    /// Distance at which deceleration starts.
    pub decel_start: f32,
    accel_time: f32,
    decel_start_time: f32,
    total_time: f32,
    ticks_per_sec: f32,
}

impl StepTiming {
    /// Build the timing for a move from its settled speeds.
    pub fn new(
        length: f32,
        entry: f32,
        requested: f32,
        exit: f32,
        accel: f32,
        decel: f32,
        step_clock_hz: u32,
    ) -> Self {
        let cruise = peak_speed(entry, exit, requested, accel, decel, length);

        let accel_distance = ((cruise * cruise - entry * entry) / (2.0 * accel)).clamp(0.0, length);
        let decel_distance = ((cruise * cruise - exit * exit) / (2.0 * decel)).clamp(0.0, length);
        let decel_start = (length - decel_distance).max(accel_distance);

        let accel_time = ramp_time(entry, accel, accel_distance);
        let cruise_time = if cruise > 0.0 {
            (decel_start - accel_distance) / cruise
        } else {
            0.0
        };
        let decel_time = ramp_time(exit, decel, length - decel_start);

        Self {
            length,
            entry,
            cruise,
            exit,
            accel,
            decel,
            accel_distance,
            decel_start,
            accel_time,
            decel_start_time: accel_time + cruise_time,
            total_time: accel_time + cruise_time + decel_time,
            ticks_per_sec: step_clock_hz as f32,
        }
    }

    /// Seconds from the start of the move until `step` of `total` is due.
    pub fn step_time(&self, step: u32, total: u32) -> f32 {
        if total == 0 {
            return self.total_time;
        }
        let remaining = self.length * (total - step.min(total)) as f32 / total as f32;
        let distance = self.length - remaining;

        if distance <= self.accel_distance {
            ramp_time(self.entry, self.accel, distance)
        } else if distance < self.decel_start {
            self.accel_time + (distance - self.accel_distance) / self.cruise
        } else {
            self.total_time - ramp_time(self.exit, self.decel, remaining)
        }
    }

    /// Ticks from the start of the move until `step` of `total` is due.
    pub fn step_ticks(&self, step: u32, total: u32) -> u32 {
        roundf(self.step_time(step, total) * self.ticks_per_sec) as u32
    }

    /// Duration of the whole move in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.total_time
    }

    /// Duration of the whole move in ticks.
    pub fn duration_ticks(&self) -> u32 {
        roundf(self.total_time * self.ticks_per_sec) as u32
    }
}

/// Time to cover `distance` starting at `speed` with constant `accel`.
///
/// Written as `2s / (v + sqrt(v² + 2as))` to avoid cancellation.
fn ramp_time(speed: f32, accel: f32, distance: f32) -> f32 {
    if distance <= 0.0 {
        return 0.0;
    }
    let end = reachable_speed(speed, accel, distance);
    let sum = speed + end;
    if sum > 0.0 {
        2.0 * distance / sum
    } else {
        0.0
    }
}
