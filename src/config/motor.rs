//! Motor channel configuration.

use serde::Deserialize;

use super::units::{Axis, Microsteps, Polarity};

/// Configuration of one motor channel.
///
/// `steps_per_unit` is derived from `step_angle`, `microsteps` and
/// `travel_per_rev`; the setters keep it current.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorConfig {
    /// Axis driven by this motor.
    pub motor_map: Axis,
    /// Direction polarity.
    pub polarity: Polarity,
    /// Disable the motor at the end of every move.
    pub power_mode: bool,
    step_angle: f64,
    travel_per_rev: f64,
    microsteps: Microsteps,
    steps_per_unit: f64,
}

impl MotorConfig {
    /// Create a motor configuration.
    pub fn new(
        motor_map: Axis,
        step_angle: f64,
        travel_per_rev: f64,
        microsteps: Microsteps,
        polarity: Polarity,
        power_mode: bool,
    ) -> Self {
        let mut motor = Self {
            motor_map,
            polarity,
            power_mode,
            step_angle,
            travel_per_rev,
            microsteps,
            steps_per_unit: 0.0,
        };
        motor.recompute();
        motor
    }

    /// Default configuration for motor channel `index` (0-based).
    pub fn default_for(index: usize) -> Self {
        match index {
            0 => Self::new(Axis::X, 1.8, 5.0, Microsteps::EIGHTH, Polarity::Normal, false),
            1 => Self::new(Axis::Y, 1.8, 5.0, Microsteps::EIGHTH, Polarity::Normal, false),
            2 => Self::new(Axis::Z, 1.8, 1.25, Microsteps::EIGHTH, Polarity::Normal, false),
            _ => Self::new(Axis::A, 1.8, 360.0, Microsteps::EIGHTH, Polarity::Normal, false),
        }
    }

    /// Degrees per full step.
    #[inline]
    pub fn step_angle(&self) -> f64 {
        self.step_angle
    }

    /// Travel per motor revolution (mm or degrees).
    #[inline]
    pub fn travel_per_rev(&self) -> f64 {
        self.travel_per_rev
    }

    /// Microstep divisor.
    #[inline]
    pub fn microsteps(&self) -> Microsteps {
        self.microsteps
    }

    /// Microsteps per unit of axis travel.
    #[inline]
    pub fn steps_per_unit(&self) -> f64 {
        self.steps_per_unit
    }

    /// Set degrees per full step.
    pub fn set_step_angle(&mut self, step_angle: f64) {
        self.step_angle = step_angle;
        self.recompute();
    }

    /// Set travel per revolution.
    pub fn set_travel_per_rev(&mut self, travel_per_rev: f64) {
        self.travel_per_rev = travel_per_rev;
        self.recompute();
    }

    /// Set the microstep divisor.
    pub fn set_microsteps(&mut self, microsteps: Microsteps) {
        self.microsteps = microsteps;
        self.recompute();
    }

    fn recompute(&mut self) {
        let microstep_angle = self.step_angle / self.microsteps.value() as f64;
        self.steps_per_unit = if microstep_angle > 0.0 && self.travel_per_rev > 0.0 {
            360.0 / microstep_angle / self.travel_per_rev
        } else {
            0.0
        };
    }
}

/// Partial motor table as written in TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct MotorToml {
    motor_map: Option<Axis>,
    step_angle: Option<f64>,
    travel_per_rev: Option<f64>,
    microsteps: Option<Microsteps>,
    polarity: Option<Polarity>,
    power_mode: Option<bool>,
}

impl MotorToml {
    pub(crate) fn merge(&self, base: MotorConfig) -> MotorConfig {
        MotorConfig::new(
            self.motor_map.unwrap_or(base.motor_map),
            self.step_angle.unwrap_or(base.step_angle),
            self.travel_per_rev.unwrap_or(base.travel_per_rev),
            self.microsteps.unwrap_or(base.microsteps),
            self.polarity.unwrap_or(base.polarity),
            self.power_mode.unwrap_or(base.power_mode),
        )
    }
}
