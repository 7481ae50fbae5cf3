//! Error types for stepper-dda.
//!
//! Provides unified error handling across configuration, planning and move admission.

use core::fmt;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all stepper-dda operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration parsing or validation error
    Config(ConfigError),
    /// Move admission or motion-state error
    Motion(MotionError),
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    ParseError(heapless::String<128>),
    /// Invalid microstep value (must be power of 2: 1, 2, 4, 8, 16, 32, 64, 128, 256)
    InvalidMicrosteps(u16),
    /// Invalid steps per millimetre (must be > 0)
    InvalidStepsPerMm(f32),
    /// Invalid max speed (must be > 0)
    InvalidMaxSpeed(f32),
    /// Invalid max acceleration (must be > 0)
    InvalidMaxAcceleration(f32),
    /// Invalid soft limits (min must be < max)
    InvalidSoftLimits {
        /// Minimum limit value
        min: f32,
        /// Maximum limit value
        max: f32,
    },
    /// More axis limits than Cartesian axes
    TooManyAxisLimits(usize),
    /// Linear delta kinematics without rod length or radius
    MissingDeltaGeometry,
    /// Linear delta geometry that cannot reach its own centre
    InvalidDeltaGeometry {
        /// Diagonal rod length in millimetres
        diagonal_rod: f32,
        /// Tower radius in millimetres
        radius: f32,
    },
    /// Kinematics needs more drives than configured
    TooFewDrives {
        /// Drives the kinematics needs
        required: usize,
        /// Drives in the configuration
        configured: usize,
    },
    /// Step clock frequency must be > 0
    InvalidStepClock(u32),
    /// Junction deviation must be finite and >= 0
    InvalidJunctionDeviation(f32),
    /// Steps per interrupt must be > 0
    InvalidStepsPerInterrupt(u16),
    /// File I/O error (std only)
    #[cfg(feature = "std")]
    IoError(heapless::String<128>),
}

/// Why a waypoint has no admissible velocity profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlanningViolation {
    /// Feed rate is zero, negative or not finite
    InvalidFeedRate,
    /// Waypoint produces no motor steps at all
    NullMove,
    /// No drive limit leaves a positive acceleration
    NoAcceleration,
    /// Raw motor target addresses more drives than configured
    TooManyDrives,
}

/// Move admission and motion-state errors.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotionError {
    /// Ring or drive-movement pool at capacity; retry after moves retire
    BackpressureFull,
    /// Target position is not representable by the current geometry
    KinematicsUnreachable {
        /// Axis or drive that could not be reached
        axis: usize,
    },
    /// No velocity profile satisfies the configured limits
    PlanningViolation(PlanningViolation),
    /// Kinematics may only be replaced when no movement is live
    KinematicsBusy,
    /// Operation not valid in the current motion state
    InvalidState(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Motion(e) => write!(f, "Motion error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::InvalidMicrosteps(v) => {
                write!(f, "Invalid microsteps: {}. Valid values: 1, 2, 4, 8, 16, 32, 64, 128, 256", v)
            }
            ConfigError::InvalidStepsPerMm(v) => write!(f, "Invalid steps per mm: {}. Must be > 0", v),
            ConfigError::InvalidMaxSpeed(v) => write!(f, "Invalid max speed: {}. Must be > 0", v),
            ConfigError::InvalidMaxAcceleration(v) => write!(f, "Invalid max acceleration: {}. Must be > 0", v),
            ConfigError::InvalidSoftLimits { min, max } => {
                write!(f, "Invalid soft limits: min ({}) must be < max ({})", min, max)
            }
            ConfigError::TooManyAxisLimits(n) => write!(f, "{} axis limits given, at most 3 axes exist", n),
            ConfigError::MissingDeltaGeometry => {
                write!(f, "Linear delta kinematics needs diagonal_rod_mm and radius_mm")
            }
            ConfigError::InvalidDeltaGeometry { diagonal_rod, radius } => {
                write!(f, "Invalid delta geometry: rod {} must be longer than radius {}", diagonal_rod, radius)
            }
            ConfigError::TooFewDrives { required, configured } => {
                write!(f, "Kinematics needs {} drives, {} configured", required, configured)
            }
            ConfigError::InvalidStepClock(v) => write!(f, "Invalid step clock: {} Hz. Must be > 0", v),
            ConfigError::InvalidJunctionDeviation(v) => {
                write!(f, "Invalid junction deviation: {}. Must be >= 0", v)
            }
            ConfigError::InvalidStepsPerInterrupt(v) => {
                write!(f, "Invalid steps per interrupt: {}. Must be > 0", v)
            }
            #[cfg(feature = "std")]
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for PlanningViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanningViolation::InvalidFeedRate => write!(f, "feed rate must be positive and finite"),
            PlanningViolation::NullMove => write!(f, "move produces no steps"),
            PlanningViolation::NoAcceleration => write!(f, "no usable acceleration for this move"),
            PlanningViolation::TooManyDrives => write!(f, "target addresses unconfigured drives"),
        }
    }
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionError::BackpressureFull => write!(f, "Move queue full"),
            MotionError::KinematicsUnreachable { axis } => {
                write!(f, "Target unreachable on axis {}", axis)
            }
            MotionError::PlanningViolation(v) => write!(f, "Planning violation: {}", v),
            MotionError::KinematicsBusy => {
                write!(f, "Kinematics cannot change while movement is live")
            }
            MotionError::InvalidState(state) => write!(f, "Invalid motion state: {}", state),
        }
    }
}

// Conversion impls
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<MotionError> for Error {
    fn from(e: MotionError) -> Self {
        Error::Motion(e)
    }
}

impl From<PlanningViolation> for MotionError {
    fn from(v: PlanningViolation) -> Self {
        MotionError::PlanningViolation(v)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for MotionError {}
