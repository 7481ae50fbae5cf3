//! Motor output module for stepper-dda.
//!
//! Provides the step/direction sink the step interrupt drives and its
//! embedded-hal implementation.

mod output;

pub use output::{DrivePins, PinBank, StepOutput};
