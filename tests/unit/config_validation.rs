//! Unit tests for configuration validation.

use stepper_dda::config::{parse_config, validate_config, MachineConfig};
use stepper_dda::error::{ConfigError, Error};

const DRIVES: &str = r#"
[[drives]]
name = "x"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 300.0
max_acceleration_mm_per_sec2 = 3000.0

[[drives]]
name = "y"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 300.0
max_acceleration_mm_per_sec2 = 3000.0

[[drives]]
name = "z"
full_steps_per_mm = 25.0
microsteps = 16
max_speed_mm_per_sec = 10.0
max_acceleration_mm_per_sec2 = 200.0
"#;

fn with_drives(extra: &str) -> String {
    format!("{}\n{}", extra, DRIVES)
}

/// Test validation of a valid configuration.
#[test]
fn test_valid_config_passes_validation() {
    let config: MachineConfig = toml::from_str(DRIVES).expect("Failed to parse TOML");
    assert!(validate_config(&config).is_ok());
}

/// Test that min must be below max.
#[test]
fn test_inverted_soft_limits() {
    let toml_str = with_drives(
        r#"
[[axis_limits]]
min_mm = 100.0
max_mm = 0.0
"#,
    );

    let result = parse_config(&toml_str);
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::InvalidSoftLimits { .. }))
    ));
}

/// Test that a delta needs its rods and radius.
#[test]
fn test_delta_without_geometry() {
    let toml_str = with_drives(
        r#"
[kinematics]
kind = "linear_delta"
radius_mm = 105.0
"#,
    );

    assert_eq!(
        parse_config(&toml_str).unwrap_err(),
        Error::Config(ConfigError::MissingDeltaGeometry)
    );
}

/// Test that rods shorter than the radius cannot reach the centre.
#[test]
fn test_delta_rods_too_short() {
    let toml_str = with_drives(
        r#"
[kinematics]
kind = "linear_delta"
diagonal_rod_mm = 100.0
radius_mm = 105.0
"#,
    );

    assert!(matches!(
        parse_config(&toml_str),
        Err(Error::Config(ConfigError::InvalidDeltaGeometry { .. }))
    ));
}

/// Test that zero steps per interrupt is rejected.
#[test]
fn test_zero_step_budget() {
    let toml_str = with_drives(
        r#"
[planner]
max_steps_per_interrupt = 0
"#,
    );

    assert_eq!(
        parse_config(&toml_str).unwrap_err(),
        Error::Config(ConfigError::InvalidStepsPerInterrupt(0))
    );
}

/// Test that a zero step clock is rejected.
#[test]
fn test_zero_step_clock() {
    let toml_str = with_drives(
        r#"
[planner]
step_clock_hz = 0
"#,
    );

    assert_eq!(
        parse_config(&toml_str).unwrap_err(),
        Error::Config(ConfigError::InvalidStepClock(0))
    );
}

/// Test that a negative acceleration is rejected.
#[test]
fn test_negative_acceleration() {
    let toml_str = r#"
[[drives]]
name = "x"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 300.0
max_acceleration_mm_per_sec2 = -1.0
"#;

    assert!(matches!(
        parse_config(toml_str),
        Err(Error::Config(ConfigError::InvalidMaxAcceleration(_)))
    ));
}

/// Test that every geometry needs a drive per axis.
#[test]
fn test_too_few_drives() {
    let toml_str = r#"
[[drives]]
name = "x"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 300.0
max_acceleration_mm_per_sec2 = 3000.0
"#;

    assert_eq!(
        parse_config(toml_str).unwrap_err(),
        Error::Config(ConfigError::TooFewDrives {
            required: 3,
            configured: 1
        })
    );
}
