//! Unit tests for TOML configuration parsing.

use stepper_dda::config::units::Microsteps;
use stepper_dda::config::{KinematicsType, LimitPolicy, MachineConfig};

const FULL_CONFIG: &str = r#"
[kinematics]
kind = "linear_delta"
diagonal_rod_mm = 215.0
radius_mm = 105.0

[planner]
step_clock_hz = 2000000
junction_deviation_mm = 0.02
max_steps_per_interrupt = 16
start_lead_us = 5000

[[axis_limits]]
min_mm = -100.0
max_mm = 100.0

[[axis_limits]]
min_mm = -100.0
max_mm = 100.0
policy = "clamp"

[[axis_limits]]
min_mm = 0.0
max_mm = 300.0

[[drives]]
name = "a"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 300.0
max_acceleration_mm_per_sec2 = 3000.0
invert_direction = true

[[drives]]
name = "b"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 300.0
max_acceleration_mm_per_sec2 = 3000.0

[[drives]]
name = "c"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 300.0
max_acceleration_mm_per_sec2 = 3000.0

[[drives]]
name = "e"
full_steps_per_mm = 20.0
microsteps = 8
max_speed_mm_per_sec = 60.0
max_acceleration_mm_per_sec2 = 1000.0
"#;

/// Test parsing of every configuration section.
#[test]
fn test_parse_full_config() {
    let config: MachineConfig = toml::from_str(FULL_CONFIG).expect("Failed to parse TOML");

    assert_eq!(config.kinematics.kind, KinematicsType::LinearDelta);
    assert_eq!(config.kinematics.diagonal_rod_mm, Some(215.0));
    assert_eq!(config.kinematics.radius_mm, Some(105.0));

    assert_eq!(config.planner.step_clock_hz, 2_000_000);
    assert_eq!(config.planner.junction_deviation.value(), 0.02);
    assert_eq!(config.planner.max_steps_per_interrupt, 16);
    assert_eq!(config.planner.start_lead_ticks(), 10_000);

    assert_eq!(config.axis_limits.len(), 3);
    assert_eq!(config.axis_limits[0].policy, LimitPolicy::Reject);
    assert_eq!(config.axis_limits[1].policy, LimitPolicy::Clamp);
    assert_eq!(config.axis_limits[2].max.value(), 300.0);

    assert_eq!(config.num_drives(), 4);
    assert!(config.drives[0].invert_direction);
    assert!(!config.drives[1].invert_direction);
    assert_eq!(config.drives[3].microsteps, Microsteps::EIGHTH);
    assert_eq!(config.steps_per_mm()[3], 160.0);
    assert_eq!(config.drive_index("e"), Some(3));
}

/// Test that the planner section falls back to its defaults.
#[test]
fn test_planner_defaults() {
    let toml_str = r#"
[[drives]]
name = "x"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 300.0
max_acceleration_mm_per_sec2 = 3000.0
"#;

    let config: MachineConfig = toml::from_str(toml_str).expect("Failed to parse TOML");
    assert_eq!(config.kinematics.kind, KinematicsType::Cartesian);
    assert_eq!(config.planner.step_clock_hz, 1_000_000);
    assert_eq!(config.planner.junction_deviation.value(), 0.05);
    assert_eq!(config.planner.max_steps_per_interrupt, 32);
    assert_eq!(config.planner.start_lead_us, 2000);
    assert!(config.axis_limits.is_empty());
}

/// Test parsing of the CoreXY geometry name.
#[test]
fn test_parse_core_xy() {
    let toml_str = r#"
[kinematics]
kind = "core_xy"

[[drives]]
name = "a"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 300.0
max_acceleration_mm_per_sec2 = 3000.0
"#;

    let config: MachineConfig = toml::from_str(toml_str).expect("Failed to parse TOML");
    assert_eq!(config.kinematics.kind, KinematicsType::CoreXy);
    assert_eq!(config.kinematics.kind.as_str(), "core_xy");
}

/// Test that an unknown geometry is rejected.
#[test]
fn test_unknown_kinematics_rejected() {
    let toml_str = r#"
[kinematics]
kind = "scara"
"#;

    let result: Result<MachineConfig, _> = toml::from_str(toml_str);
    assert!(result.is_err());
}

/// Test that microsteps must be a power of two.
#[test]
fn test_invalid_microsteps_rejected() {
    for value in [0, 3, 12, 512] {
        let toml_str = format!(
            r#"
[[drives]]
name = "x"
full_steps_per_mm = 5.0
microsteps = {}
max_speed_mm_per_sec = 300.0
max_acceleration_mm_per_sec2 = 3000.0
"#,
            value
        );
        let result: Result<MachineConfig, _> = toml::from_str(&toml_str);
        assert!(result.is_err(), "microsteps = {} accepted", value);
    }
}

/// Test that a drive without limits is rejected.
#[test]
fn test_missing_drive_field_rejected() {
    let toml_str = r#"
[[drives]]
name = "x"
full_steps_per_mm = 5.0
microsteps = 16
"#;

    let result: Result<MachineConfig, _> = toml::from_str(toml_str);
    assert!(result.is_err());
}
