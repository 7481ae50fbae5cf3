//! Planner and step-clock settings.

use serde::Deserialize;

use super::units::Millimetres;

/// Look-ahead planner and step scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct PlannerConfig {
    /// Step clock frequency in Hz. All step times are expressed in ticks of this clock.
    pub step_clock_hz: u32,

    /// Junction deviation used to derive cornering speed.
    #[serde(rename = "junction_deviation_mm")]
    pub junction_deviation: Millimetres,

    /// Upper bound on steps emitted by a single interrupt.
    pub max_steps_per_interrupt: u16,

    /// Minimum lead between promotion and the first step, in microseconds.
    pub start_lead_us: u32,
}

impl PlannerConfig {
    /// Start lead converted to step-clock ticks.
    pub fn start_lead_ticks(&self) -> u32 {
        ((self.start_lead_us as u64 * self.step_clock_hz as u64) / 1_000_000) as u32
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            step_clock_hz: 1_000_000,
            junction_deviation: Millimetres(0.05),
            max_steps_per_interrupt: 32,
            start_lead_us: 2000,
        }
    }
}
