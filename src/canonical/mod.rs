//! Canonical machine.
//!
//! Owns the RS274 model and the machine state. The modal calls that do not
//! touch the planner live here; the calls that queue moves are on
//! [`MotionCore`](crate::MotionCore), which composes this with the planner.

mod arc;
mod block;
pub mod homing;
mod model;

pub use arc::{arc_geometry, ArcCenter};
pub use block::{GcodeBlock, NonModal, ProgramFlow};
pub use homing::{HomingAction, HomingCycle, HomingPhase};
pub use model::{
    DistanceMode, GcodeModel, HomingState, MachineState, MotionMode, PathControl, Plane,
    SpindleMode, COORD_SYSTEMS,
};

use crate::config::{Axis, AxisMode, GcodeDefaults, MachineConfig, Units, AXES};
use crate::error::{GcodeError, Result};
use crate::planner::ArcGeometry;

/// RS274 state plus machine and homing state.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalMachine {
    /// The Gcode model.
    pub gm: GcodeModel,
    /// Model saved across a homing cycle.
    pub(crate) saved: Option<GcodeModel>,
    /// Reported machine state.
    pub machine_state: MachineState,
    /// Whether a homing cycle has completed.
    pub homing_state: HomingState,
    /// Running homing cycle.
    pub(crate) homing: Option<HomingCycle>,
}

impl CanonicalMachine {
    /// Machine in reset with the configured Gcode defaults.
    pub fn new(defaults: &GcodeDefaults) -> Self {
        Self {
            gm: GcodeModel::new(defaults),
            saved: None,
            machine_state: MachineState::Reset,
            homing_state: HomingState::NotHomed,
            homing: None,
        }
    }

    /// G17/G18/G19
    pub fn select_plane(&mut self, plane: Plane) {
        self.gm.plane = plane;
    }

    /// G90/G91
    pub fn set_distance_mode(&mut self, mode: DistanceMode) {
        self.gm.distance_mode = mode;
    }

    /// G20/G21
    pub fn set_units_mode(&mut self, units: Units) {
        self.gm.units = units;
    }

    /// G93/G94
    pub fn set_inverse_feed_rate_mode(&mut self, enable: bool) {
        self.gm.inverse_feed_rate_mode = enable;
    }

    /// F word. Stored in mm/min, or as inverse minutes in G93.
    pub fn set_feed_rate(&mut self, value: f64) -> Result<()> {
        if value < 0.0 {
            return Err(GcodeError::InputError("negative feed rate").into());
        }
        self.gm.feed_rate = if self.gm.inverse_feed_rate_mode {
            value
        } else {
            self.gm.length_to_canonical(value)
        };
        Ok(())
    }

    /// G61/G61.1/G64
    pub fn set_path_control(&mut self, mode: PathControl) {
        self.gm.path_control = mode;
    }

    /// G92: make the current position read as the given work coordinates.
    pub fn set_origin_offsets(&mut self, words: &[Option<f64>; AXES]) {
        for axis in Axis::ALL {
            if let Some(value) = words[axis.index()] {
                let value = self.gm.to_canonical(axis, value);
                self.gm.origin_offsets[axis.index()] = self.gm.position[axis.index()] - value;
            }
        }
    }

    /// M3/M4/M5
    pub fn set_spindle_mode(&mut self, mode: SpindleMode) {
        self.gm.spindle_mode = mode;
    }

    /// S word.
    pub fn set_spindle_speed(&mut self, speed: f64) {
        self.gm.spindle_speed = speed;
    }

    /// T word.
    pub fn select_tool(&mut self, tool: u8) {
        self.gm.next_tool = tool;
    }

    /// M6
    pub fn change_tool(&mut self) {
        self.gm.tool = self.gm.next_tool;
    }

    /// M48/M49
    pub fn set_feed_override(&mut self, enable: bool) {
        self.gm.feed_override_enable = enable;
    }

    /// Homing cycle in progress.
    pub fn is_homing(&self) -> bool {
        self.homing.is_some()
    }

    /// Duration of a straight move from the model position to `target`.
    ///
    /// Traverses run every axis at its `velocity_max` and take as long as
    /// the slowest axis. Feeds run at the programmed rate unless an axis
    /// would exceed its `feedrate_max`. In inverse time mode the block time
    /// is `1/F`.
    pub fn move_minutes(
        &self,
        config: &MachineConfig,
        target: &[f64; AXES],
        traverse: bool,
    ) -> Result<f64> {
        let mut axis_minutes: f64 = 0.0;
        let mut sq = 0.0;
        for axis in Axis::ALL {
            let delta = libm::fabs(target[axis.index()] - self.gm.position[axis.index()]);
            sq += delta * delta;
            let rate = config.axis(axis).max_rate(traverse);
            if delta > 0.0 && rate > 0.0 {
                axis_minutes = axis_minutes.max(delta / rate);
            }
        }
        if traverse {
            return Ok(axis_minutes);
        }

        let feed = self.gm.feed_rate;
        if feed <= 0.0 {
            return Err(GcodeError::InputError("feed rate not set").into());
        }
        if self.gm.inverse_feed_rate_mode {
            let minutes = 1.0 / feed;
            if axis_minutes > minutes {
                return Err(GcodeError::MaxFeedRateExceeded.into());
            }
            return Ok(minutes);
        }
        Ok((libm::sqrt(sq) / feed).max(axis_minutes))
    }

    /// Duration of an arc of `length` with `geometry`.
    ///
    /// The plane component may not exceed the slower plane axis and the
    /// helical component its own axis.
    pub fn arc_minutes(
        &self,
        config: &MachineConfig,
        geometry: &ArcGeometry,
        length: f64,
    ) -> Result<f64> {
        let feed = self.gm.feed_rate;
        if feed <= 0.0 {
            return Err(GcodeError::InputError("feed rate not set").into());
        }
        let plane_rate = config
            .axis(geometry.axis_1)
            .feedrate_max
            .min(config.axis(geometry.axis_2).feedrate_max);
        let linear_rate = config.axis(geometry.axis_linear).feedrate_max;
        let mut axis_minutes: f64 = 0.0;
        if plane_rate > 0.0 {
            axis_minutes = libm::fabs(geometry.angular_travel * geometry.radius) / plane_rate;
        }
        if linear_rate > 0.0 {
            axis_minutes = axis_minutes.max(libm::fabs(geometry.linear_travel) / linear_rate);
        }

        if self.gm.inverse_feed_rate_mode {
            let minutes = 1.0 / feed;
            if axis_minutes > minutes {
                return Err(GcodeError::MaxFeedRateExceeded.into());
            }
            return Ok(minutes);
        }
        Ok((length / feed).max(axis_minutes))
    }

    /// Reject a target outside the travel envelope of a homed machine.
    pub fn check_soft_limits(&self, config: &MachineConfig, target: &[f64; AXES]) -> Result<()> {
        if self.homing_state != HomingState::Homed || self.is_homing() {
            return Ok(());
        }
        for axis in Axis::ALL {
            let cfg = config.axis(axis);
            let value = target[axis.index()];
            if cfg.mode == AxisMode::Standard
                && cfg.travel_max > 0.0
                && (value < 0.0 || value > cfg.travel_max)
            {
                debug!("soft limit on axis {}", axis.index());
                return Err(GcodeError::MaxTravelExceeded {
                    axis: axis.index() as u8,
                }
                .into());
            }
        }
        Ok(())
    }
}
