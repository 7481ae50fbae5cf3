//! Machine geometry selection.

use serde::Deserialize;

/// Supported machine geometries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "snake_case")]
pub enum KinematicsType {
    /// One motor per Cartesian axis.
    #[default]
    Cartesian,
    /// Two belts driving X and Y together.
    CoreXy,
    /// Three vertical towers with diagonal rods.
    LinearDelta,
}

impl KinematicsType {
    /// Lowercase name as used in configuration files.
    pub const fn as_str(self) -> &'static str {
        match self {
            KinematicsType::Cartesian => "cartesian",
            KinematicsType::CoreXy => "core_xy",
            KinematicsType::LinearDelta => "linear_delta",
        }
    }
}

/// Geometry section of the machine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KinematicsConfig {
    /// Which geometry to use.
    #[serde(default)]
    pub kind: KinematicsType,

    /// Diagonal rod length (linear delta only).
    #[serde(default)]
    pub diagonal_rod_mm: Option<f32>,

    /// Horizontal distance from the bed centre to each tower (linear delta only).
    #[serde(default)]
    pub radius_mm: Option<f32>,
}

impl KinematicsConfig {
    /// Cartesian geometry.
    pub const fn cartesian() -> Self {
        Self {
            kind: KinematicsType::Cartesian,
            diagonal_rod_mm: None,
            radius_mm: None,
        }
    }

    /// CoreXY geometry.
    pub const fn core_xy() -> Self {
        Self {
            kind: KinematicsType::CoreXy,
            diagonal_rod_mm: None,
            radius_mm: None,
        }
    }

    /// Linear delta geometry with the given rod length and tower radius.
    pub const fn linear_delta(diagonal_rod_mm: f32, radius_mm: f32) -> Self {
        Self {
            kind: KinematicsType::LinearDelta,
            diagonal_rod_mm: Some(diagonal_rod_mm),
            radius_mm: Some(radius_mm),
        }
    }
}
