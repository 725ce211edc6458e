//! TOML machine files.

use tinyg_motion::canonical::{DistanceMode, Plane};
use tinyg_motion::config::{AxisMode, Microsteps, Polarity, SwitchMode};
use tinyg_motion::error::{ConfigError, Error};
use tinyg_motion::{parse_config, Axis, MachineConfig, Units};

/// A complete machine file overriding every table.
#[test]
fn test_parse_full_machine() {
    let toml_str = r#"
[global]
min_segment_len = 0.02
arc_segment_len = 0.05
min_segment_time = 10000.0
enable_acceleration = true
status_report_interval = 25

[gcode]
units = "inches"
plane = "xz"
distance_mode = "incremental"

[motors.1]
motor_map = "x"
step_angle = 0.9
travel_per_rev = 5.0
microsteps = 8
polarity = 1

[motors.4]
motor_map = "y"
power_mode = true

[axes.x]
travel_max = 300.0
switch_mode = "homing_and_limit"

[axes.a]
mode = "radius"
radius = 10.0

[axes.c]
mode = "disabled"
"#;

    let config = parse_config(toml_str).expect("valid machine file");

    assert_eq!(config.global.arc_segment_len, 0.05);
    assert_eq!(config.global.status_report_interval, 25);
    assert_eq!(config.gcode.units, Units::Inches);
    assert_eq!(config.gcode.plane, Plane::Xz);
    assert_eq!(config.gcode.distance_mode, DistanceMode::Incremental);

    let m1 = &config.motors[0];
    assert_eq!(m1.microsteps(), Microsteps::new(8).unwrap());
    assert_eq!(m1.polarity, Polarity::Reversed);
    // 400 full steps per rev, 8 microsteps, 5 mm per rev
    assert!((m1.steps_per_unit() - 640.0).abs() < 1e-9);

    assert_eq!(config.motors[3].motor_map, Axis::Y);
    assert!(config.motors[3].power_mode);

    assert_eq!(config.axis(Axis::X).travel_max, 300.0);
    assert_eq!(config.axis(Axis::X).switch_mode, SwitchMode::HomingAndLimit);
    assert_eq!(config.axis(Axis::A).mode, AxisMode::Radius);
    assert_eq!(config.axis(Axis::C).mode, AxisMode::Disabled);
}

/// Tables left out keep their defaults.
#[test]
fn test_unspecified_tables_keep_defaults() {
    let config = parse_config("[axes.z]\njerk_max = 1.0e8\n").unwrap();
    let defaults = MachineConfig::default();

    assert_eq!(config.axis(Axis::Z).jerk_max, 1.0e8);
    assert_eq!(config.axis(Axis::Z).velocity_max, defaults.axis(Axis::Z).velocity_max);
    assert_eq!(config.motors, defaults.motors);
    assert_eq!(config.global, defaults.global);
}

/// Unknown keys are rejected.
#[test]
fn test_unknown_field_rejected() {
    let result = parse_config("[axes.x]\nmax_speed = 10.0\n");
    assert!(matches!(result, Err(Error::Config(ConfigError::ParseError(_)))));
}

/// Unknown axis letters are rejected.
#[test]
fn test_unknown_axis_rejected() {
    let result = parse_config("[axes.w]\njerk_max = 1.0\n");
    assert!(matches!(result, Err(Error::Config(ConfigError::ParseError(_)))));
}

/// Polarity only takes 0 or 1.
#[test]
fn test_bad_polarity_rejected() {
    let result = parse_config("[motors.2]\npolarity = 2\n");
    assert!(matches!(result, Err(Error::Config(ConfigError::ParseError(_)))));
}
