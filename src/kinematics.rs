//! Axis to motor mapping.
//!
//! Converts axis-space travel (mm, deg) into motor steps honoring the motor
//! map, axis mode, microsteps and polarity.

use core::f64::consts::PI;

use crate::config::{Axis, AxisMode, MachineConfig, AXES, MOTORS};

const DEGREES_PER_RADIAN: f64 = 180.0 / PI;

/// Travel of the axis a motor follows, before conversion to steps.
fn motor_axis_travel(travel: &[f64; AXES], axis: Axis, config: &MachineConfig) -> f64 {
    let cfg = config.axis(axis);
    match cfg.mode {
        AxisMode::Disabled | AxisMode::Inhibited => 0.0,
        AxisMode::Standard => travel[axis.index()],
        AxisMode::Radius => travel[axis.index()] * cfg.radius / DEGREES_PER_RADIAN,
        slave => slave.masters().iter().map(|m| travel[m.index()]).sum(),
    }
}

/// Fractional steps per motor for an axis travel vector.
pub fn motor_travel(travel: &[f64; AXES], config: &MachineConfig) -> [f64; MOTORS] {
    let mut steps = [0.0; MOTORS];
    for (out, motor) in steps.iter_mut().zip(config.motors.iter()) {
        let distance = motor_axis_travel(travel, motor.motor_map, config);
        *out = distance * motor.steps_per_unit() * motor.polarity.sign();
    }
    steps
}

/// Relative integer steps per motor for an axis travel vector.
///
/// The sign of each count is the motor direction.
pub fn inverse(travel: &[f64; AXES], config: &MachineConfig) -> [i32; MOTORS] {
    motor_travel(travel, config).map(|s| libm::round(s) as i32)
}

/// Axis travel produced by a step vector.
///
/// Only standard and radius axes are recovered; an axis driven by several
/// motors takes the first motor's value.
pub fn forward(steps: &[i32; MOTORS], config: &MachineConfig) -> [f64; AXES] {
    let mut travel = [0.0; AXES];
    let mut seen = [false; AXES];
    for (count, motor) in steps.iter().zip(config.motors.iter()) {
        let axis = motor.motor_map;
        let i = axis.index();
        if seen[i] || motor.steps_per_unit() <= 0.0 {
            continue;
        }
        let cfg = config.axis(axis);
        let distance = *count as f64 / motor.steps_per_unit() * motor.polarity.sign();
        travel[i] = match cfg.mode {
            AxisMode::Standard => distance,
            AxisMode::Radius if cfg.radius > 0.0 => distance * DEGREES_PER_RADIAN / cfg.radius,
            _ => continue,
        };
        seen[i] = true;
    }
    travel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Polarity;

    fn travel(x: f64, y: f64, z: f64, a: f64) -> [f64; AXES] {
        [x, y, z, a, 0.0, 0.0]
    }

    #[test]
    fn test_standard_axes() {
        let cfg = MachineConfig::default();
        let steps = inverse(&travel(1.0, -2.0, 0.5, 90.0), &cfg);
        assert_eq!(steps, [320, -640, 640, 400]);
    }

    #[test]
    fn test_polarity_reverses_sign() {
        let mut cfg = MachineConfig::default();
        cfg.motors[0].polarity = Polarity::Reversed;
        assert_eq!(inverse(&travel(1.0, 0.0, 0.0, 0.0), &cfg)[0], -320);
    }

    #[test]
    fn test_inhibited_axis_contributes_nothing() {
        let mut cfg = MachineConfig::default();
        cfg.axis_mut(Axis::Y).mode = AxisMode::Inhibited;
        assert_eq!(inverse(&travel(0.0, 10.0, 0.0, 0.0), &cfg)[1], 0);
    }

    #[test]
    fn test_radius_mode_scales_degrees() {
        let mut cfg = MachineConfig::default();
        cfg.axis_mut(Axis::A).mode = AxisMode::Radius;
        cfg.axis_mut(Axis::A).radius = 10.0;
        cfg.motors[3].set_travel_per_rev(10.0);
        // 180 deg on a 10 mm radius is 10*pi mm, 160 steps/mm
        let steps = motor_travel(&travel(0.0, 0.0, 0.0, 180.0), &cfg);
        assert!((steps[3] - 10.0 * PI * 160.0).abs() < 1e-6);
    }

    #[test]
    fn test_slaved_axis_sums_masters() {
        let mut cfg = MachineConfig::default();
        cfg.axis_mut(Axis::A).mode = AxisMode::SlaveXy;
        cfg.motors[3].set_travel_per_rev(5.0);
        let steps = inverse(&travel(1.0, 2.0, 0.0, 0.0), &cfg);
        assert_eq!(steps[3], 960);
    }

    #[test]
    fn test_forward_inverts_inverse() {
        let cfg = MachineConfig::default();
        let steps = [1234, -77, 5, -400];
        assert_eq!(inverse(&forward(&steps, &cfg), &cfg), steps);
    }
}
