//! Axis and motor indices, unit systems and validated unit types.

use core::fmt;

use serde::Deserialize;

use crate::error::ConfigError;

/// Number of logical axes (X Y Z A B C).
pub const AXES: usize = 6;

/// Number of motor channels.
pub const MOTORS: usize = 4;

/// Millimeters per inch.
pub const MM_PER_INCH: f64 = 25.4;

/// Microseconds per minute; planner times are kept in minutes.
pub const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;

/// Logical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Linear X
    X = 0,
    /// Linear Y
    Y = 1,
    /// Linear Z
    Z = 2,
    /// Rotary about X
    A = 3,
    /// Rotary about Y
    B = 4,
    /// Rotary about Z
    C = 5,
}

impl Axis {
    /// All axes in index order.
    pub const ALL: [Axis; AXES] = [Axis::X, Axis::Y, Axis::Z, Axis::A, Axis::B, Axis::C];

    /// Array index of this axis.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Axis for an array index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Axis for a Gcode word letter.
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'X' => Some(Axis::X),
            'Y' => Some(Axis::Y),
            'Z' => Some(Axis::Z),
            'A' => Some(Axis::A),
            'B' => Some(Axis::B),
            'C' => Some(Axis::C),
            _ => None,
        }
    }

    /// Gcode word letter, lowercase as used in tokens.
    pub const fn letter(self) -> char {
        match self {
            Axis::X => 'x',
            Axis::Y => 'y',
            Axis::Z => 'z',
            Axis::A => 'a',
            Axis::B => 'b',
            Axis::C => 'c',
        }
    }

    /// Rotary axes are programmed in degrees and never unit-converted.
    #[inline]
    pub const fn is_rotary(self) -> bool {
        matches!(self, Axis::A | Axis::B | Axis::C)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter().to_ascii_uppercase())
    }
}

/// Gcode unit system (G20/G21).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// G20
    Inches,
    /// G21
    #[default]
    #[serde(alias = "mm")]
    Millimeters,
}

impl Units {
    /// Factor converting a value in these units to millimeters.
    #[inline]
    pub const fn to_mm(self) -> f64 {
        match self {
            Units::Inches => MM_PER_INCH,
            Units::Millimeters => 1.0,
        }
    }
}

/// Microstep divisor (1, 2, 4, 8).
///
/// Validated at construction; the value also drives the two microstep-select lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Microsteps(u8);

impl Microsteps {
    /// Full step (no microstepping).
    pub const FULL: Self = Self(1);
    /// Half step.
    pub const HALF: Self = Self(2);
    /// Quarter step.
    pub const QUARTER: Self = Self(4);
    /// Eighth step.
    pub const EIGHTH: Self = Self(8);

    /// Valid microstep values.
    const VALID_VALUES: [u8; 4] = [1, 2, 4, 8];

    /// Create a new Microsteps value with validation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidMicrosteps` if the value is not 1, 2, 4 or 8.
    pub fn new(value: u16) -> Result<Self, ConfigError> {
        if value <= u8::MAX as u16 && Self::VALID_VALUES.contains(&(value as u8)) {
            Ok(Self(value as u8))
        } else {
            Err(ConfigError::InvalidMicrosteps(value))
        }
    }

    /// Get the raw divisor value.
    #[inline]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Levels of the (MS0, MS1) select lines for this divisor.
    pub const fn select_lines(self) -> (bool, bool) {
        match self.0 {
            2 => (true, false),
            4 => (false, true),
            8 => (true, true),
            _ => (false, false),
        }
    }
}

impl Default for Microsteps {
    fn default() -> Self {
        Self::EIGHTH
    }
}

impl TryFrom<u16> for Microsteps {
    type Error = ConfigError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for Microsteps {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use core::fmt::Write;
        let value = u16::deserialize(deserializer)?;
        Microsteps::new(value).map_err(|e| {
            let mut buf = heapless::String::<128>::new();
            let _ = write!(buf, "{}", e);
            serde::de::Error::custom(buf.as_str())
        })
    }
}

/// Direction polarity of a motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    /// Positive travel produces positive steps.
    #[default]
    Normal,
    /// Positive travel produces negative steps.
    Reversed,
}

impl Polarity {
    /// Sign applied to step counts.
    #[inline]
    pub const fn sign(self) -> f64 {
        match self {
            Polarity::Normal => 1.0,
            Polarity::Reversed => -1.0,
        }
    }

    /// Polarity from its configuration value (0 or 1).
    pub fn from_value(value: u8) -> Result<Self, ConfigError> {
        match value {
            0 => Ok(Polarity::Normal),
            1 => Ok(Polarity::Reversed),
            _ => Err(ConfigError::InvalidValue {
                field: "polarity",
                value: value as f64,
            }),
        }
    }

    /// Configuration value (0 or 1).
    pub const fn value(self) -> u8 {
        match self {
            Polarity::Normal => 0,
            Polarity::Reversed => 1,
        }
    }
}

impl<'de> Deserialize<'de> for Polarity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Polarity::from_value(value).map_err(|_| serde::de::Error::custom("polarity must be 0 or 1"))
    }
}
