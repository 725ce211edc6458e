//! RS274 model state.

use serde::{Deserialize, Serialize};

use crate::config::units::{Axis, Units, AXES};
use crate::config::GcodeDefaults;

/// Arc plane (G17/G18/G19).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "lowercase")]
pub enum Plane {
    /// G17
    #[default]
    Xy,
    /// G18
    Xz,
    /// G19
    Yz,
}

impl Plane {
    /// (first, second, linear) axes of the plane.
    pub const fn axes(self) -> (Axis, Axis, Axis) {
        match self {
            Plane::Xy => (Axis::X, Axis::Y, Axis::Z),
            Plane::Xz => (Axis::Z, Axis::X, Axis::Y),
            Plane::Yz => (Axis::Y, Axis::Z, Axis::X),
        }
    }

    /// Numeric configuration value.
    pub const fn value(self) -> u8 {
        match self {
            Plane::Xy => 0,
            Plane::Xz => 1,
            Plane::Yz => 2,
        }
    }

    /// Plane from its numeric configuration value.
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Plane::Xy),
            1 => Some(Plane::Xz),
            2 => Some(Plane::Yz),
            _ => None,
        }
    }
}

/// G90/G91.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    /// G90
    #[default]
    Absolute,
    /// G91
    Incremental,
}

/// G61/G61.1/G64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "snake_case")]
pub enum PathControl {
    /// G61: stop at the end of every move.
    ExactStop,
    /// G61.1
    ExactPath,
    /// G64
    #[default]
    Continuous,
}

impl PathControl {
    /// Numeric configuration value.
    pub const fn value(self) -> u8 {
        match self {
            PathControl::ExactStop => 0,
            PathControl::ExactPath => 1,
            PathControl::Continuous => 2,
        }
    }

    /// Path control from its numeric configuration value.
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(PathControl::ExactStop),
            1 => Some(PathControl::ExactPath),
            2 => Some(PathControl::Continuous),
            _ => None,
        }
    }
}

/// Modal motion group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotionMode {
    /// G0
    Traverse,
    /// G1
    #[default]
    Feed,
    /// G2
    ArcCw,
    /// G3
    ArcCcw,
    /// G80
    Cancel,
}

/// Spindle state (M3/M4/M5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpindleMode {
    /// M5
    #[default]
    Off,
    /// M3
    Clockwise,
    /// M4
    CounterClockwise,
}

/// Machine state as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    /// Power-up or after an async end.
    #[default]
    Reset,
    /// Executing moves.
    Run,
    /// Motion stopped.
    Stop,
    /// Feedhold in effect.
    Hold,
    /// Resuming from a feedhold.
    Resume,
    /// Homing cycle running.
    Homing,
}

impl MachineState {
    /// Lowercase name used in status reports.
    pub const fn name(self) -> &'static str {
        match self {
            MachineState::Reset => "reset",
            MachineState::Run => "run",
            MachineState::Stop => "stop",
            MachineState::Hold => "hold",
            MachineState::Resume => "resume",
            MachineState::Homing => "homing",
        }
    }
}

/// Whether the machine has been homed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HomingState {
    /// No successful homing cycle since reset.
    #[default]
    NotHomed,
    /// Last homing cycle succeeded.
    Homed,
}

/// Number of stored coordinate systems (G54..G59).
pub const COORD_SYSTEMS: usize = 6;

/// The Gcode model: modal state plus position, all in canonical units (mm, deg).
#[derive(Debug, Clone, PartialEq)]
pub struct GcodeModel {
    /// Current line number (N word).
    pub line: u32,
    /// Modal motion mode.
    pub motion_mode: MotionMode,
    /// Machine position at the end of the last accepted move.
    pub position: [f64; AXES],
    /// Target of the block in progress.
    pub target: [f64; AXES],
    /// G92 offsets.
    pub origin_offsets: [f64; AXES],
    /// Feed rate in mm/min, or inverse minutes in G93.
    pub feed_rate: f64,
    /// G93 in effect.
    pub inverse_feed_rate_mode: bool,
    /// Arc plane.
    pub plane: Plane,
    /// Input units.
    pub units: Units,
    /// Distance mode.
    pub distance_mode: DistanceMode,
    /// Path control mode.
    pub path_control: PathControl,
    /// Last dwell time in seconds.
    pub dwell_time: f64,
    /// Last arc radius (R word).
    pub arc_radius: f64,
    /// Last arc offsets (I, J, K).
    pub arc_offset: [f64; 3],
    /// Spindle state.
    pub spindle_mode: SpindleMode,
    /// Spindle speed (S word).
    pub spindle_speed: f64,
    /// Loaded tool.
    pub tool: u8,
    /// Tool selected by the last T word.
    pub next_tool: u8,
    /// Stored G54..G59 offsets.
    pub coord_offsets: [[f64; AXES]; COORD_SYSTEMS],
    /// M48/M49 feed override enable.
    pub feed_override_enable: bool,
    /// Stored feed override factor.
    pub feed_override_factor: f64,
}

impl GcodeModel {
    /// Model initialized from the configured Gcode defaults.
    pub fn new(defaults: &GcodeDefaults) -> Self {
        Self {
            line: 0,
            motion_mode: MotionMode::Feed,
            position: [0.0; AXES],
            target: [0.0; AXES],
            origin_offsets: [0.0; AXES],
            feed_rate: 0.0,
            inverse_feed_rate_mode: false,
            plane: defaults.plane,
            units: defaults.units,
            distance_mode: defaults.distance_mode,
            path_control: defaults.path_control,
            dwell_time: 0.0,
            arc_radius: 0.0,
            arc_offset: [0.0; 3],
            spindle_mode: SpindleMode::Off,
            spindle_speed: 0.0,
            tool: 0,
            next_tool: 0,
            coord_offsets: [[0.0; AXES]; COORD_SYSTEMS],
            feed_override_enable: false,
            feed_override_factor: 1.0,
        }
    }

    /// Convert a programmed value for `axis` to canonical units.
    #[inline]
    pub fn to_canonical(&self, axis: Axis, value: f64) -> f64 {
        if axis.is_rotary() {
            value
        } else {
            value * self.units.to_mm()
        }
    }

    /// Convert a linear length or rate to canonical units.
    #[inline]
    pub fn length_to_canonical(&self, value: f64) -> f64 {
        value * self.units.to_mm()
    }

    /// Work coordinate of `axis` for a machine coordinate, in input units.
    pub fn work_coordinate(&self, axis: Axis, machine: f64) -> f64 {
        let work = machine - self.origin_offsets[axis.index()];
        if axis.is_rotary() {
            work
        } else {
            work / self.units.to_mm()
        }
    }

    /// Resolve a block's axis words into an absolute machine target.
    ///
    /// `machine_coords` is the G53 one-shot: absolute values with no offsets.
    pub fn resolve_target(
        &self,
        words: &[Option<f64>; AXES],
        machine_coords: bool,
    ) -> [f64; AXES] {
        let mut target = self.position;
        for axis in Axis::ALL {
            let i = axis.index();
            if let Some(value) = words[i] {
                let value = self.to_canonical(axis, value);
                target[i] = if machine_coords {
                    value
                } else {
                    match self.distance_mode {
                        DistanceMode::Absolute => value + self.origin_offsets[i],
                        DistanceMode::Incremental => self.position[i] + value,
                    }
                };
            }
        }
        target
    }

    /// Modal reset performed by M2/M30.
    pub fn program_end_reset(&mut self) {
        self.plane = Plane::Xy;
        self.distance_mode = DistanceMode::Absolute;
        self.inverse_feed_rate_mode = false;
        self.spindle_mode = SpindleMode::Off;
        self.origin_offsets = [0.0; AXES];
        self.motion_mode = MotionMode::Feed;
    }
}
