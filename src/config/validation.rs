//! Configuration validation.

use crate::error::{ConfigError, Error, Result};

use super::axis::{AxisConfig, AxisMode};
use super::motor::MotorConfig;
use super::units::Axis;
use super::MachineConfig;

/// Validate a machine configuration.
///
/// Checks:
/// - Motor step geometry is positive
/// - Active axes have positive rates and jerk, non-negative deviation
/// - Global segment lengths, times and corner acceleration are positive
pub fn validate_config(config: &MachineConfig) -> Result<()> {
    for motor in config.motors.iter() {
        validate_motor(motor)?;
    }

    for axis in Axis::ALL {
        validate_axis(config.axis(axis))?;
    }

    let global = &config.global;
    positive("min_segment_len", global.min_segment_len)?;
    positive("arc_segment_len", global.arc_segment_len)?;
    positive("min_segment_time", global.min_segment_time)?;
    positive("corner_acceleration", global.corner_acceleration)?;

    Ok(())
}

fn validate_motor(motor: &MotorConfig) -> Result<()> {
    positive("step_angle", motor.step_angle())?;
    positive("travel_per_rev", motor.travel_per_rev())?;
    Ok(())
}

fn validate_axis(axis: &AxisConfig) -> Result<()> {
    if axis.mode == AxisMode::Disabled {
        return Ok(());
    }

    positive("feedrate_max", axis.feedrate_max)?;
    positive("velocity_max", axis.velocity_max)?;
    positive("jerk_max", axis.jerk_max)?;
    non_negative("junction_deviation", axis.junction_deviation)?;
    non_negative("travel_max", axis.travel_max)?;

    if axis.mode == AxisMode::Radius {
        positive("radius", axis.radius)?;
    }

    if axis.switch_mode.homes() {
        positive("search_velocity", axis.homing.search_velocity)?;
        positive("latch_velocity", axis.homing.latch_velocity)?;
        non_negative("latch_backoff", axis.homing.latch_backoff)?;
        non_negative("zero_backoff", axis.homing.zero_backoff)?;
    }

    Ok(())
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(Error::Config(ConfigError::InvalidValue { field, value }))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(Error::Config(ConfigError::InvalidValue { field, value }))
    }
}
