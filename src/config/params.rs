//! Parameter table.
//!
//! Every configurable value has a fixed 2 or 3 character token. The table
//! order is stable and doubles as the record index in non-volatile storage,
//! so new parameters must only ever be appended to a group.

use core::fmt;

use crate::canonical::{DistanceMode, PathControl, Plane};
use crate::error::{ConfigError, Error, Result};

use super::axis::{AxisMode, SwitchMode};
use super::units::{Axis, Microsteps, Polarity, Units, AXES, MOTORS};
use super::MachineConfig;

/// Motor fields addressable by token (`1ma`, `2sa`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorField {
    /// `ma`
    MotorMap,
    /// `sa`
    StepAngle,
    /// `tr`
    TravelPerRev,
    /// `mi`
    Microsteps,
    /// `po`
    Polarity,
    /// `pm`
    PowerMode,
}

/// Axis fields addressable by token (`xam`, `yvm`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AxisField {
    /// `am`
    Mode,
    /// `fr`
    FeedrateMax,
    /// `vm`
    VelocityMax,
    /// `tm`
    TravelMax,
    /// `jm`
    JerkMax,
    /// `jd`
    JunctionDeviation,
    /// `ra`
    Radius,
    /// `sm`
    SwitchMode,
    /// `ht`
    HomingTravel,
    /// `sv`
    SearchVelocity,
    /// `lv`
    LatchVelocity,
    /// `lb`
    LatchBackoff,
    /// `zb`
    ZeroBackoff,
    /// `zo`
    ZeroOffset,
    /// `wo`
    WorkOffset,
}

/// Global fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GlobalField {
    /// `msl`
    MinSegmentLen,
    /// `asl`
    ArcSegmentLen,
    /// `mst`
    MinSegmentTime,
    /// `cac`
    CornerAcceleration,
    /// `ea`
    EnableAcceleration,
    /// `sr`
    StatusReportInterval,
}

/// Gcode default fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GcodeField {
    /// `gun`
    Units,
    /// `gpl`
    Plane,
    /// `gpa`
    PathControl,
    /// `gdi`
    DistanceMode,
}

/// What a parameter reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Target {
    /// Motor channel (0-based) field.
    Motor(u8, MotorField),
    /// Axis field.
    Axis(Axis, AxisField),
    /// Global field.
    Global(GlobalField),
    /// Gcode default field.
    Gcode(GcodeField),
}

/// Value representation of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Kind {
    /// Small enumerant or count.
    U8,
    /// Unsigned integer.
    U32,
    /// Floating point value.
    F64,
    /// 0 or 1.
    Bool,
}

/// A 2 or 3 character parameter token.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    bytes: [u8; 3],
    len: u8,
}

impl Token {
    /// Token from text; `None` unless 2 or 3 ASCII characters.
    pub fn new(text: &str) -> Option<Self> {
        let raw = text.as_bytes();
        if !(2..=3).contains(&raw.len()) || !raw.iter().all(u8::is_ascii_alphanumeric) {
            return None;
        }
        let mut bytes = [0u8; 3];
        bytes[..raw.len()].copy_from_slice(raw);
        Some(Self {
            bytes,
            len: raw.len() as u8,
        })
    }

    /// Token from a storage record field (NUL padded).
    pub fn from_record(bytes: [u8; 3]) -> Option<Self> {
        let len = bytes.iter().position(|b| *b == 0).unwrap_or(3);
        core::str::from_utf8(&bytes[..len]).ok().and_then(Self::new)
    }

    fn compose(prefix: u8, suffix: &str) -> Self {
        let s = suffix.as_bytes();
        Self {
            bytes: [prefix, s[0], s[1]],
            len: 3,
        }
    }

    /// Token text.
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }

    /// NUL padded bytes as stored in a record.
    pub fn to_record(self) -> [u8; 3] {
        self.bytes
    }

    fn to_error_string(self) -> heapless::String<4> {
        let mut s = heapless::String::new();
        let _ = s.push_str(self.as_str());
        s
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.as_str())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Param {
    /// Token.
    pub token: Token,
    /// Accessed field.
    pub target: Target,
    /// Value representation.
    pub kind: Kind,
    /// Smallest accepted value.
    pub min: f64,
    /// Largest accepted value.
    pub max: f64,
}

struct Field<F> {
    suffix: &'static str,
    field: F,
    kind: Kind,
    min: f64,
    max: f64,
}

const fn field<F>(suffix: &'static str, field: F, kind: Kind, min: f64, max: f64) -> Field<F> {
    Field {
        suffix,
        field,
        kind,
        min,
        max,
    }
}

const BIG: f64 = 1.0e12;

const MOTOR_FIELDS: [Field<MotorField>; 6] = [
    field("ma", MotorField::MotorMap, Kind::U8, 0.0, (AXES - 1) as f64),
    field("sa", MotorField::StepAngle, Kind::F64, 0.001, 360.0),
    field("tr", MotorField::TravelPerRev, Kind::F64, 0.0001, BIG),
    field("mi", MotorField::Microsteps, Kind::U8, 1.0, 8.0),
    field("po", MotorField::Polarity, Kind::U8, 0.0, 1.0),
    field("pm", MotorField::PowerMode, Kind::Bool, 0.0, 1.0),
];

const AXIS_FIELDS: [Field<AxisField>; 15] = [
    field("am", AxisField::Mode, Kind::U8, 0.0, 10.0),
    field("fr", AxisField::FeedrateMax, Kind::F64, 0.0, BIG),
    field("vm", AxisField::VelocityMax, Kind::F64, 0.0, BIG),
    field("tm", AxisField::TravelMax, Kind::F64, 0.0, BIG),
    field("jm", AxisField::JerkMax, Kind::F64, 0.0, BIG),
    field("jd", AxisField::JunctionDeviation, Kind::F64, 0.0, 100.0),
    field("ra", AxisField::Radius, Kind::F64, 0.0, BIG),
    field("sm", AxisField::SwitchMode, Kind::U8, 0.0, 3.0),
    field("ht", AxisField::HomingTravel, Kind::F64, -BIG, BIG),
    field("sv", AxisField::SearchVelocity, Kind::F64, 0.0, BIG),
    field("lv", AxisField::LatchVelocity, Kind::F64, 0.0, BIG),
    field("lb", AxisField::LatchBackoff, Kind::F64, 0.0, BIG),
    field("zb", AxisField::ZeroBackoff, Kind::F64, 0.0, BIG),
    field("zo", AxisField::ZeroOffset, Kind::F64, -BIG, BIG),
    field("wo", AxisField::WorkOffset, Kind::F64, -BIG, BIG),
];

const GLOBAL_FIELDS: [Field<GlobalField>; 6] = [
    field("msl", GlobalField::MinSegmentLen, Kind::F64, 0.0001, 10.0),
    field("asl", GlobalField::ArcSegmentLen, Kind::F64, 0.001, 10.0),
    field("mst", GlobalField::MinSegmentTime, Kind::F64, 1000.0, 100_000.0),
    field("cac", GlobalField::CornerAcceleration, Kind::F64, 1.0, BIG),
    field("ea", GlobalField::EnableAcceleration, Kind::Bool, 0.0, 1.0),
    field("sr", GlobalField::StatusReportInterval, Kind::U32, 0.0, 100_000.0),
];

const GCODE_FIELDS: [Field<GcodeField>; 4] = [
    field("gun", GcodeField::Units, Kind::U8, 0.0, 1.0),
    field("gpl", GcodeField::Plane, Kind::U8, 0.0, 2.0),
    field("gpa", GcodeField::PathControl, Kind::U8, 0.0, 2.0),
    field("gdi", GcodeField::DistanceMode, Kind::U8, 0.0, 1.0),
];

/// Number of parameters in the table.
pub const PARAM_COUNT: usize =
    MOTORS * MOTOR_FIELDS.len() + AXES * AXIS_FIELDS.len() + GLOBAL_FIELDS.len() + GCODE_FIELDS.len();

/// Parameter at table position `index`.
pub fn param_at(index: usize) -> Option<Param> {
    let motor_span = MOTORS * MOTOR_FIELDS.len();
    let axis_span = AXES * AXIS_FIELDS.len();

    if index < motor_span {
        let motor = index / MOTOR_FIELDS.len();
        let f = &MOTOR_FIELDS[index % MOTOR_FIELDS.len()];
        return Some(Param {
            token: Token::compose(b'1' + motor as u8, f.suffix),
            target: Target::Motor(motor as u8, f.field),
            kind: f.kind,
            min: f.min,
            max: f.max,
        });
    }

    let index = index - motor_span;
    if index < axis_span {
        let axis = Axis::ALL[index / AXIS_FIELDS.len()];
        let f = &AXIS_FIELDS[index % AXIS_FIELDS.len()];
        return Some(Param {
            token: Token::compose(axis.letter() as u8, f.suffix),
            target: Target::Axis(axis, f.field),
            kind: f.kind,
            min: f.min,
            max: f.max,
        });
    }

    let index = index - axis_span;
    if let Some(f) = GLOBAL_FIELDS.get(index) {
        return Token::new(f.suffix).map(|token| Param {
            token,
            target: Target::Global(f.field),
            kind: f.kind,
            min: f.min,
            max: f.max,
        });
    }

    let index = index - GLOBAL_FIELDS.len();
    GCODE_FIELDS.get(index).and_then(|f| {
        Token::new(f.suffix).map(|token| Param {
            token,
            target: Target::Gcode(f.field),
            kind: f.kind,
            min: f.min,
            max: f.max,
        })
    })
}

/// All parameters in table order.
pub fn params() -> impl Iterator<Item = Param> {
    (0..PARAM_COUNT).filter_map(param_at)
}

/// Table position of a token.
pub fn index_of(token: &str) -> Option<usize> {
    params().position(|p| p.token.as_str() == token)
}

/// Look up a parameter by token.
pub fn lookup(token: &str) -> Result<Param> {
    index_of(token).and_then(param_at).ok_or_else(|| not_found(token))
}

fn not_found(token: &str) -> Error {
    let mut s = heapless::String::new();
    for c in token.chars().take(4) {
        let _ = s.push(c);
    }
    Error::Config(ConfigError::ParameterNotFound(s))
}

/// Read a parameter value.
pub fn get(config: &MachineConfig, token: &str) -> Result<f64> {
    Ok(read(config, &lookup(token)?))
}

/// Write a parameter value after range checking.
pub fn set(config: &mut MachineConfig, token: &str, value: f64) -> Result<()> {
    let param = lookup(token)?;
    write(config, &param, value)
}

/// Read the value a descriptor points at.
pub fn read(config: &MachineConfig, param: &Param) -> f64 {
    match param.target {
        Target::Motor(m, field) => {
            let motor = &config.motors[m as usize];
            match field {
                MotorField::MotorMap => motor.motor_map.index() as f64,
                MotorField::StepAngle => motor.step_angle(),
                MotorField::TravelPerRev => motor.travel_per_rev(),
                MotorField::Microsteps => motor.microsteps().value() as f64,
                MotorField::Polarity => motor.polarity.value() as f64,
                MotorField::PowerMode => bool_value(motor.power_mode),
            }
        }
        Target::Axis(axis, field) => {
            let a = config.axis(axis);
            match field {
                AxisField::Mode => a.mode.value() as f64,
                AxisField::FeedrateMax => a.feedrate_max,
                AxisField::VelocityMax => a.velocity_max,
                AxisField::TravelMax => a.travel_max,
                AxisField::JerkMax => a.jerk_max,
                AxisField::JunctionDeviation => a.junction_deviation,
                AxisField::Radius => a.radius,
                AxisField::SwitchMode => a.switch_mode.value() as f64,
                AxisField::HomingTravel => a.homing.travel,
                AxisField::SearchVelocity => a.homing.search_velocity,
                AxisField::LatchVelocity => a.homing.latch_velocity,
                AxisField::LatchBackoff => a.homing.latch_backoff,
                AxisField::ZeroBackoff => a.homing.zero_backoff,
                AxisField::ZeroOffset => a.homing.zero_offset,
                AxisField::WorkOffset => a.homing.work_offset,
            }
        }
        Target::Global(field) => {
            let g = &config.global;
            match field {
                GlobalField::MinSegmentLen => g.min_segment_len,
                GlobalField::ArcSegmentLen => g.arc_segment_len,
                GlobalField::MinSegmentTime => g.min_segment_time,
                GlobalField::CornerAcceleration => g.corner_acceleration,
                GlobalField::EnableAcceleration => bool_value(g.enable_acceleration),
                GlobalField::StatusReportInterval => g.status_report_interval as f64,
            }
        }
        Target::Gcode(field) => {
            let d = &config.gcode;
            match field {
                GcodeField::Units => match d.units {
                    Units::Inches => 0.0,
                    Units::Millimeters => 1.0,
                },
                GcodeField::Plane => d.plane.value() as f64,
                GcodeField::PathControl => d.path_control.value() as f64,
                GcodeField::DistanceMode => match d.distance_mode {
                    DistanceMode::Absolute => 0.0,
                    DistanceMode::Incremental => 1.0,
                },
            }
        }
    }
}

/// Range check and store a value through a descriptor.
pub fn write(config: &mut MachineConfig, param: &Param, value: f64) -> Result<()> {
    if value.is_nan() || value < param.min {
        return Err(Error::Config(ConfigError::UnderRange {
            token: param.token.to_error_string(),
            value,
        }));
    }
    if value > param.max {
        return Err(Error::Config(ConfigError::OverRange {
            token: param.token.to_error_string(),
            value,
        }));
    }

    let int = libm::round(value) as u32;
    let flag = value >= 0.5;
    let over_range = || {
        Error::Config(ConfigError::OverRange {
            token: param.token.to_error_string(),
            value,
        })
    };

    match param.target {
        Target::Motor(m, field) => {
            let motor = &mut config.motors[m as usize];
            match field {
                MotorField::MotorMap => {
                    motor.motor_map = Axis::from_index(int as usize).ok_or_else(over_range)?
                }
                MotorField::StepAngle => motor.set_step_angle(value),
                MotorField::TravelPerRev => motor.set_travel_per_rev(value),
                MotorField::Microsteps => motor.set_microsteps(Microsteps::new(int as u16)?),
                MotorField::Polarity => motor.polarity = Polarity::from_value(int as u8)?,
                MotorField::PowerMode => motor.power_mode = flag,
            }
        }
        Target::Axis(axis, field) => {
            let a = config.axis_mut(axis);
            match field {
                AxisField::Mode => a.mode = AxisMode::from_value(int as u8)?,
                AxisField::FeedrateMax => a.feedrate_max = value,
                AxisField::VelocityMax => a.velocity_max = value,
                AxisField::TravelMax => a.travel_max = value,
                AxisField::JerkMax => a.jerk_max = value,
                AxisField::JunctionDeviation => a.junction_deviation = value,
                AxisField::Radius => a.radius = value,
                AxisField::SwitchMode => a.switch_mode = SwitchMode::from_value(int as u8)?,
                AxisField::HomingTravel => a.homing.travel = value,
                AxisField::SearchVelocity => a.homing.search_velocity = value,
                AxisField::LatchVelocity => a.homing.latch_velocity = value,
                AxisField::LatchBackoff => a.homing.latch_backoff = value,
                AxisField::ZeroBackoff => a.homing.zero_backoff = value,
                AxisField::ZeroOffset => a.homing.zero_offset = value,
                AxisField::WorkOffset => a.homing.work_offset = value,
            }
        }
        Target::Global(field) => {
            let g = &mut config.global;
            match field {
                GlobalField::MinSegmentLen => g.min_segment_len = value,
                GlobalField::ArcSegmentLen => g.arc_segment_len = value,
                GlobalField::MinSegmentTime => g.min_segment_time = value,
                GlobalField::CornerAcceleration => g.corner_acceleration = value,
                GlobalField::EnableAcceleration => g.enable_acceleration = flag,
                GlobalField::StatusReportInterval => g.status_report_interval = int,
            }
        }
        Target::Gcode(field) => {
            let d = &mut config.gcode;
            match field {
                GcodeField::Units => {
                    d.units = if int == 0 {
                        Units::Inches
                    } else {
                        Units::Millimeters
                    }
                }
                GcodeField::Plane => {
                    d.plane = Plane::from_value(int as u8).ok_or_else(over_range)?
                }
                GcodeField::PathControl => {
                    d.path_control = PathControl::from_value(int as u8).ok_or_else(over_range)?
                }
                GcodeField::DistanceMode => {
                    d.distance_mode = if int == 0 {
                        DistanceMode::Absolute
                    } else {
                        DistanceMode::Incremental
                    }
                }
            }
        }
    }
    Ok(())
}

#[inline]
fn bool_value(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
