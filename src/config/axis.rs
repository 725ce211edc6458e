//! Per-axis configuration.

use serde::Deserialize;

use super::units::Axis;
use crate::error::ConfigError;

/// How an axis participates in motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "snake_case")]
pub enum AxisMode {
    /// Axis is ignored entirely.
    Disabled,
    /// Normal axis.
    #[default]
    Standard,
    /// Axis is planned but its motors do not move.
    Inhibited,
    /// Rotary axis driven as linear travel along its radius.
    Radius,
    /// Follows X.
    SlaveX,
    /// Follows Y.
    SlaveY,
    /// Follows Z.
    SlaveZ,
    /// Follows X + Y.
    SlaveXy,
    /// Follows X + Z.
    SlaveXz,
    /// Follows Y + Z.
    SlaveYz,
    /// Follows X + Y + Z.
    SlaveXyz,
}

impl AxisMode {
    const ORDER: [AxisMode; 11] = [
        AxisMode::Disabled,
        AxisMode::Standard,
        AxisMode::Inhibited,
        AxisMode::Radius,
        AxisMode::SlaveX,
        AxisMode::SlaveY,
        AxisMode::SlaveZ,
        AxisMode::SlaveXy,
        AxisMode::SlaveXz,
        AxisMode::SlaveYz,
        AxisMode::SlaveXyz,
    ];

    /// Mode from its numeric configuration value.
    pub fn from_value(value: u8) -> Result<Self, ConfigError> {
        Self::ORDER
            .get(value as usize)
            .copied()
            .ok_or(ConfigError::InvalidValue {
                field: "axis_mode",
                value: value as f64,
            })
    }

    /// Numeric configuration value.
    pub fn value(self) -> u8 {
        Self::ORDER.iter().position(|m| *m == self).unwrap_or(0) as u8
    }

    /// Master axes for slaved modes; empty for every other mode.
    pub const fn masters(self) -> &'static [Axis] {
        match self {
            AxisMode::SlaveX => &[Axis::X],
            AxisMode::SlaveY => &[Axis::Y],
            AxisMode::SlaveZ => &[Axis::Z],
            AxisMode::SlaveXy => &[Axis::X, Axis::Y],
            AxisMode::SlaveXz => &[Axis::X, Axis::Z],
            AxisMode::SlaveYz => &[Axis::Y, Axis::Z],
            AxisMode::SlaveXyz => &[Axis::X, Axis::Y, Axis::Z],
            _ => &[],
        }
    }

    /// True for the slaved modes.
    #[inline]
    pub const fn is_slave(self) -> bool {
        !self.masters().is_empty()
    }

    /// Whether the axis takes part in planning (length, jerk, homing).
    #[inline]
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            AxisMode::Standard | AxisMode::Inhibited | AxisMode::Radius
        )
    }
}

/// Homing and limit switch behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "snake_case")]
pub enum SwitchMode {
    /// Switches ignored.
    Disabled,
    /// Switch used only during homing.
    #[default]
    HomingOnly,
    /// Switch acts only as a limit.
    LimitOnly,
    /// Switch used for homing and as a limit.
    HomingAndLimit,
}

impl SwitchMode {
    /// Mode from its numeric configuration value.
    pub fn from_value(value: u8) -> Result<Self, ConfigError> {
        match value {
            0 => Ok(SwitchMode::Disabled),
            1 => Ok(SwitchMode::HomingOnly),
            2 => Ok(SwitchMode::LimitOnly),
            3 => Ok(SwitchMode::HomingAndLimit),
            _ => Err(ConfigError::InvalidValue {
                field: "switch_mode",
                value: value as f64,
            }),
        }
    }

    /// Numeric configuration value.
    pub const fn value(self) -> u8 {
        match self {
            SwitchMode::Disabled => 0,
            SwitchMode::HomingOnly => 1,
            SwitchMode::LimitOnly => 2,
            SwitchMode::HomingAndLimit => 3,
        }
    }

    /// Switch takes part in homing.
    pub const fn homes(self) -> bool {
        matches!(self, SwitchMode::HomingOnly | SwitchMode::HomingAndLimit)
    }

    /// Switch closure outside homing is a limit hit.
    pub const fn limits(self) -> bool {
        matches!(self, SwitchMode::LimitOnly | SwitchMode::HomingAndLimit)
    }
}

/// Homing cycle parameters for one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomingConfig {
    /// Signed search distance; negative searches toward the minimum switch.
    pub travel: f64,
    /// Search velocity (units/min).
    pub search_velocity: f64,
    /// Latch velocity (units/min).
    pub latch_velocity: f64,
    /// Distance backed off the switch before latching.
    pub latch_backoff: f64,
    /// Distance backed off the switch after latching.
    pub zero_backoff: f64,
    /// Machine coordinate assigned after the zero backoff.
    pub zero_offset: f64,
    /// Work coordinate zero the cycle finishes at (machine coordinates).
    pub work_offset: f64,
}

impl HomingConfig {
    fn linear() -> Self {
        Self {
            travel: -400.0,
            search_velocity: 500.0,
            latch_velocity: 100.0,
            latch_backoff: 5.0,
            zero_backoff: 2.0,
            zero_offset: 0.0,
            work_offset: 0.0,
        }
    }

    fn rotary() -> Self {
        Self {
            travel: -360.0,
            search_velocity: 3600.0,
            latch_velocity: 360.0,
            latch_backoff: 5.0,
            zero_backoff: 2.0,
            zero_offset: 0.0,
            work_offset: 0.0,
        }
    }

    /// Direction sign of the search (+1 toward a max switch, -1 toward a min switch).
    pub fn search_sign(&self) -> f64 {
        if self.travel < 0.0 {
            -1.0
        } else {
            1.0
        }
    }
}

/// Complete axis configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisConfig {
    /// Participation mode.
    pub mode: AxisMode,
    /// Maximum feed rate for G1/G2/G3 (units/min).
    pub feedrate_max: f64,
    /// Maximum traverse rate for G0 (units/min).
    pub velocity_max: f64,
    /// Soft travel envelope; 0 disables the check.
    pub travel_max: f64,
    /// Maximum jerk (units/min^3).
    pub jerk_max: f64,
    /// Cornering deviation (mm).
    pub junction_deviation: f64,
    /// Radius for rotary axes in radius mode (mm).
    pub radius: f64,
    /// Switch behavior.
    pub switch_mode: SwitchMode,
    /// Homing cycle parameters.
    pub homing: HomingConfig,
}

impl AxisConfig {
    /// Default configuration for an axis.
    pub fn default_for(axis: Axis) -> Self {
        match axis {
            Axis::X | Axis::Y => Self {
                mode: AxisMode::Standard,
                feedrate_max: 8_000.0,
                velocity_max: 8_000.0,
                travel_max: 0.0,
                jerk_max: 50_000_000.0,
                junction_deviation: 0.05,
                radius: 1.0,
                switch_mode: SwitchMode::HomingOnly,
                homing: HomingConfig::linear(),
            },
            Axis::Z => Self {
                mode: AxisMode::Standard,
                feedrate_max: 800.0,
                velocity_max: 800.0,
                travel_max: 0.0,
                jerk_max: 50_000_000.0,
                junction_deviation: 0.05,
                radius: 1.0,
                switch_mode: SwitchMode::HomingOnly,
                homing: HomingConfig {
                    travel: -100.0,
                    search_velocity: 400.0,
                    ..HomingConfig::linear()
                },
            },
            Axis::A | Axis::B | Axis::C => Self {
                mode: if axis == Axis::A {
                    AxisMode::Standard
                } else {
                    AxisMode::Disabled
                },
                feedrate_max: 36_000.0,
                velocity_max: 36_000.0,
                travel_max: 0.0,
                jerk_max: 50_000_000.0,
                junction_deviation: 0.05,
                radius: 10.0,
                switch_mode: SwitchMode::Disabled,
                homing: HomingConfig::rotary(),
            },
        }
    }

    /// Maximum rate for a traverse (`true`) or a feed (`false`).
    #[inline]
    pub fn max_rate(&self, traverse: bool) -> f64 {
        if traverse {
            self.velocity_max
        } else {
            self.feedrate_max
        }
    }
}

/// Partial axis table as written in TOML; unset fields keep the axis default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct AxisToml {
    mode: Option<AxisMode>,
    feedrate_max: Option<f64>,
    velocity_max: Option<f64>,
    travel_max: Option<f64>,
    jerk_max: Option<f64>,
    junction_deviation: Option<f64>,
    radius: Option<f64>,
    switch_mode: Option<SwitchMode>,
    #[serde(default)]
    homing: HomingToml,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct HomingToml {
    travel: Option<f64>,
    search_velocity: Option<f64>,
    latch_velocity: Option<f64>,
    latch_backoff: Option<f64>,
    zero_backoff: Option<f64>,
    zero_offset: Option<f64>,
    work_offset: Option<f64>,
}

impl AxisToml {
    pub(crate) fn merge(&self, base: AxisConfig) -> AxisConfig {
        let h = &self.homing;
        AxisConfig {
            mode: self.mode.unwrap_or(base.mode),
            feedrate_max: self.feedrate_max.unwrap_or(base.feedrate_max),
            velocity_max: self.velocity_max.unwrap_or(base.velocity_max),
            travel_max: self.travel_max.unwrap_or(base.travel_max),
            jerk_max: self.jerk_max.unwrap_or(base.jerk_max),
            junction_deviation: self.junction_deviation.unwrap_or(base.junction_deviation),
            radius: self.radius.unwrap_or(base.radius),
            switch_mode: self.switch_mode.unwrap_or(base.switch_mode),
            homing: HomingConfig {
                travel: h.travel.unwrap_or(base.homing.travel),
                search_velocity: h.search_velocity.unwrap_or(base.homing.search_velocity),
                latch_velocity: h.latch_velocity.unwrap_or(base.homing.latch_velocity),
                latch_backoff: h.latch_backoff.unwrap_or(base.homing.latch_backoff),
                zero_backoff: h.zero_backoff.unwrap_or(base.homing.zero_backoff),
                zero_offset: h.zero_offset.unwrap_or(base.homing.zero_offset),
                work_offset: h.work_offset.unwrap_or(base.homing.work_offset),
            },
        }
    }
}
