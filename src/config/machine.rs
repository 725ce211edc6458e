//! Machine configuration - root configuration structure.

use serde::Deserialize;

use super::axis::{AxisConfig, AxisToml};
use super::motor::{MotorConfig, MotorToml};
use super::units::{Axis, Units, AXES, MOTORS};
use crate::canonical::{DistanceMode, PathControl, Plane};

/// Global planner and runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Moves shorter than this are collapsed into a single segment (mm).
    pub min_segment_len: f64,
    /// Chord length used to subdivide arcs (mm).
    pub arc_segment_len: f64,
    /// Minimum duration of one runtime segment (microseconds).
    pub min_segment_time: f64,
    /// Centripetal acceleration allowed at corners (mm/min^2).
    pub corner_acceleration: f64,
    /// Plan jerk-limited moves; when false lines run at constant velocity.
    pub enable_acceleration: bool,
    /// Segments between status reports; 0 disables reporting.
    pub status_report_interval: u32,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            min_segment_len: 0.01,
            arc_segment_len: 0.1,
            min_segment_time: 5000.0,
            corner_acceleration: 2_000_000.0,
            enable_acceleration: true,
            status_report_interval: 0,
        }
    }
}

/// Gcode modal defaults applied at power-up and after an async end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GcodeDefaults {
    /// G20/G21
    pub units: Units,
    /// G17/G18/G19
    pub plane: Plane,
    /// G61/G61.1/G64
    pub path_control: PathControl,
    /// G90/G91
    pub distance_mode: DistanceMode,
}

/// Complete machine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineConfig {
    /// Motor channels 1..4.
    pub motors: [MotorConfig; MOTORS],
    /// Axes X Y Z A B C.
    pub axes: [AxisConfig; AXES],
    /// Global settings.
    pub global: GlobalConfig,
    /// Gcode defaults.
    pub gcode: GcodeDefaults,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            motors: core::array::from_fn(MotorConfig::default_for),
            axes: Axis::ALL.map(AxisConfig::default_for),
            global: GlobalConfig::default(),
            gcode: GcodeDefaults::default(),
        }
    }
}

impl MachineConfig {
    /// Configuration of one axis.
    #[inline]
    pub fn axis(&self, axis: Axis) -> &AxisConfig {
        &self.axes[axis.index()]
    }

    /// Mutable configuration of one axis.
    #[inline]
    pub fn axis_mut(&mut self, axis: Axis) -> &mut AxisConfig {
        &mut self.axes[axis.index()]
    }

    /// Minimum segment time in minutes.
    #[inline]
    pub fn min_segment_minutes(&self) -> f64 {
        self.global.min_segment_time / super::units::MICROSECONDS_PER_MINUTE
    }
}

/// TOML document shape; every table and field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct MachineToml {
    #[serde(default)]
    global: GlobalConfig,
    #[serde(default)]
    gcode: GcodeDefaults,
    #[serde(default)]
    motors: MotorsToml,
    #[serde(default)]
    axes: AxesToml,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MotorsToml {
    #[serde(rename = "1")]
    m1: Option<MotorToml>,
    #[serde(rename = "2")]
    m2: Option<MotorToml>,
    #[serde(rename = "3")]
    m3: Option<MotorToml>,
    #[serde(rename = "4")]
    m4: Option<MotorToml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AxesToml {
    x: Option<AxisToml>,
    y: Option<AxisToml>,
    z: Option<AxisToml>,
    a: Option<AxisToml>,
    b: Option<AxisToml>,
    c: Option<AxisToml>,
}

impl MachineToml {
    pub(crate) fn into_config(self) -> MachineConfig {
        let mut config = MachineConfig {
            global: self.global,
            gcode: self.gcode,
            ..MachineConfig::default()
        };
        let motors = [self.motors.m1, self.motors.m2, self.motors.m3, self.motors.m4];
        for (slot, table) in config.motors.iter_mut().zip(motors.iter()) {
            if let Some(table) = table {
                *slot = table.merge(*slot);
            }
        }
        let axes = [
            self.axes.x,
            self.axes.y,
            self.axes.z,
            self.axes.a,
            self.axes.b,
            self.axes.c,
        ];
        for (slot, table) in config.axes.iter_mut().zip(axes.iter()) {
            if let Some(table) = table {
                *slot = table.merge(*slot);
            }
        }
        config
    }
}
