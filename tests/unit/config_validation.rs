//! Configuration validation and the parameter table.

use tinyg_motion::config::{params, AxisMode};
use tinyg_motion::error::{ConfigError, Error, Status};
use tinyg_motion::{parse_config, validate_config, Axis, MachineConfig};

/// The built-in defaults are a valid machine.
#[test]
fn test_defaults_pass_validation() {
    assert!(validate_config(&MachineConfig::default()).is_ok());
}

/// An active axis needs a positive jerk.
#[test]
fn test_zero_jerk_rejected() {
    let mut config = MachineConfig::default();
    config.axis_mut(Axis::Y).jerk_max = 0.0;
    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidValue { field: "jerk_max", .. }))
    ));
}

/// Disabled axes are not checked.
#[test]
fn test_disabled_axis_skipped() {
    let mut config = MachineConfig::default();
    let c = config.axis_mut(Axis::C);
    c.mode = AxisMode::Disabled;
    c.velocity_max = 0.0;
    assert!(validate_config(&config).is_ok());
}

/// A radius axis needs a radius.
#[test]
fn test_radius_axis_needs_radius() {
    let toml_str = r#"
[axes.a]
mode = "radius"
radius = 0.0
"#;
    assert!(matches!(
        parse_config(toml_str),
        Err(Error::Config(ConfigError::InvalidValue { field: "radius", .. }))
    ));
}

/// Parameters are addressed by token and range checked.
#[test]
fn test_param_tokens() {
    let mut config = MachineConfig::default();

    params::set(&mut config, "xfr", 1200.0).unwrap();
    assert_eq!(config.axis(Axis::X).feedrate_max, 1200.0);
    assert_eq!(params::get(&config, "xfr").unwrap(), 1200.0);

    params::set(&mut config, "ea", 0.0).unwrap();
    assert!(!config.global.enable_acceleration);

    params::set(&mut config, "2tr", 4.0).unwrap();
    assert!((config.motors[1].steps_per_unit() - 400.0).abs() < 1e-9);

    let err = params::set(&mut config, "mst", 10.0).unwrap_err();
    assert_eq!(err.status(), Status::ParameterUnderRange);
    let err = params::get(&config, "xxx").unwrap_err();
    assert_eq!(err.status(), Status::ParameterNotFound);
}
