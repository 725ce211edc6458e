//! Error types for tinyg-motion.
//!
//! `Status` is the flat status-code table reported to the host. `Error` is the
//! structured error carried through `Result`; every `Error` maps onto exactly
//! one non-transient `Status`.

use core::fmt;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Status codes surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    /// Function completed successfully.
    Ok = 0,
    /// Function would block; call again.
    Eagain = 1,
    /// Function had no-operation.
    Noop = 2,
    /// Operation is complete.
    Complete = 3,
    /// Generic error.
    Err = 4,
    /// Move is shorter than the minimum line length.
    ZeroLengthMove = 5,
    /// Planner buffer is full; retry the block later.
    BufferFullFatal = 6,
    /// Buffer is full but the caller may proceed.
    BufferFullNonFatal = 7,
    /// Malformed or inconsistent Gcode block.
    GcodeInputError = 8,
    /// Unsupported G/M code or word.
    UnrecognizedCommand = 9,
    /// Arc center, radius or endpoint is inconsistent.
    ArcSpecificationError = 10,
    /// Non-finite intermediate result.
    FloatingPointError = 11,
    /// Unknown configuration token.
    ParameterNotFound = 12,
    /// Configuration value below its minimum.
    ParameterUnderRange = 13,
    /// Configuration value above its maximum.
    ParameterOverRange = 14,
    /// Requested feed rate above the axis maximum.
    MaxFeedRateExceeded = 15,
    /// Target outside the axis travel envelope.
    MaxTravelExceeded = 16,
    /// Homing cycle could not complete.
    HomingCycleFailed = 17,
    /// Successive approximation did not converge.
    FailedToConverge = 18,
}

impl Status {
    /// Numeric wire code.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Flow-control codes that are never reported to the user.
    pub const fn is_transient(self) -> bool {
        matches!(self, Status::Eagain | Status::Noop | Status::Complete)
    }

    /// Codes after which the motion subsystem must be re-initialized.
    pub const fn is_fatal(self) -> bool {
        matches!(self, Status::Err | Status::HomingCycleFailed)
    }

    /// Short human readable message.
    pub const fn message(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Eagain => "EAGAIN",
            Status::Noop => "NOOP",
            Status::Complete => "complete",
            Status::Err => "error",
            Status::ZeroLengthMove => "zero length move",
            Status::BufferFullFatal => "buffer full",
            Status::BufferFullNonFatal => "buffer full (non-fatal)",
            Status::GcodeInputError => "gcode input error",
            Status::UnrecognizedCommand => "unrecognized command",
            Status::ArcSpecificationError => "arc specification error",
            Status::FloatingPointError => "floating point error",
            Status::ParameterNotFound => "parameter not found",
            Status::ParameterUnderRange => "parameter under range",
            Status::ParameterOverRange => "parameter over range",
            Status::MaxFeedRateExceeded => "maximum feed rate exceeded",
            Status::MaxTravelExceeded => "maximum travel exceeded",
            Status::HomingCycleFailed => "homing cycle failed",
            Status::FailedToConverge => "failed to converge",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

/// Unified error type for all tinyg-motion operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration parsing, lookup or validation error
    Config(ConfigError),
    /// Gcode block rejected by the canonical machine
    Gcode(GcodeError),
    /// Planner or runtime error
    Motion(MotionError),
    /// Non-volatile storage error
    Storage(StorageError),
    /// Stepper hardware error
    Stepper(StepperError),
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    ParseError(heapless::String<128>),
    /// Invalid microstep value (must be 1, 2, 4 or 8)
    InvalidMicrosteps(u16),
    /// Unknown parameter token
    ParameterNotFound(heapless::String<4>),
    /// Value below the parameter's minimum
    UnderRange {
        /// Parameter token
        token: heapless::String<4>,
        /// Offending value
        value: f64,
    },
    /// Value above the parameter's maximum
    OverRange {
        /// Parameter token
        token: heapless::String<4>,
        /// Offending value
        value: f64,
    },
    /// Value is not one of the accepted enumerants
    InvalidValue {
        /// Field name
        field: &'static str,
        /// Offending value
        value: f64,
    },
    /// File I/O error (std only)
    #[cfg(feature = "std")]
    IoError(heapless::String<128>),
}

/// Gcode block errors. The block is rejected and planner state is preserved.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GcodeError {
    /// Move shorter than the minimum line length
    ZeroLengthMove,
    /// Malformed block or missing required word
    InputError(&'static str),
    /// Unsupported G or M code
    UnrecognizedCommand {
        /// Word letter
        letter: char,
        /// Word value
        value: f32,
    },
    /// Inconsistent arc center, radius or endpoint
    ArcSpecification(&'static str),
    /// Feed rate above the configured maximum
    MaxFeedRateExceeded,
    /// Target outside the configured travel
    MaxTravelExceeded {
        /// Axis index
        axis: u8,
    },
}

/// Planner, runtime and homing errors.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotionError {
    /// No free planner buffer; retry the block once the queue drains
    BufferFull,
    /// A computation produced a non-finite value
    FloatingPoint,
    /// Successive approximation did not converge
    FailedToConverge,
    /// Homing could not complete
    HomingCycleFailed(&'static str),
    /// Runtime found an inconsistent buffer and aborted the move
    RuntimeFault,
}

/// Non-volatile storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Access past the end of the device
    OutOfBounds {
        /// Byte offset
        offset: usize,
        /// Access length
        len: usize,
    },
    /// Device reported a failure
    Device,
}

/// Stepper hardware errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepperError {
    /// Pin operation failed
    PinError,
    /// Segment would need more steps than timer ticks
    StepOverflow,
}

impl Error {
    /// Status code reported for this error.
    pub fn status(&self) -> Status {
        match self {
            Error::Config(e) => match e {
                ConfigError::ParameterNotFound(_) => Status::ParameterNotFound,
                ConfigError::UnderRange { .. } => Status::ParameterUnderRange,
                ConfigError::OverRange { .. } => Status::ParameterOverRange,
                _ => Status::Err,
            },
            Error::Gcode(e) => match e {
                GcodeError::ZeroLengthMove => Status::ZeroLengthMove,
                GcodeError::InputError(_) => Status::GcodeInputError,
                GcodeError::UnrecognizedCommand { .. } => Status::UnrecognizedCommand,
                GcodeError::ArcSpecification(_) => Status::ArcSpecificationError,
                GcodeError::MaxFeedRateExceeded => Status::MaxFeedRateExceeded,
                GcodeError::MaxTravelExceeded { .. } => Status::MaxTravelExceeded,
            },
            Error::Motion(e) => match e {
                MotionError::BufferFull => Status::BufferFullFatal,
                MotionError::FloatingPoint => Status::FloatingPointError,
                MotionError::FailedToConverge => Status::FailedToConverge,
                MotionError::HomingCycleFailed(_) => Status::HomingCycleFailed,
                MotionError::RuntimeFault => Status::Err,
            },
            Error::Storage(_) | Error::Stepper(_) => Status::Err,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Gcode(e) => write!(f, "Gcode error: {}", e),
            Error::Motion(e) => write!(f, "Motion error: {}", e),
            Error::Storage(e) => write!(f, "Storage error: {}", e),
            Error::Stepper(e) => write!(f, "Stepper error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::InvalidMicrosteps(v) => {
                write!(f, "Invalid microsteps: {}. Valid values: 1, 2, 4, 8", v)
            }
            ConfigError::ParameterNotFound(token) => write!(f, "Parameter '{}' not found", token),
            ConfigError::UnderRange { token, value } => {
                write!(f, "Parameter '{}' under range: {}", token, value)
            }
            ConfigError::OverRange { token, value } => {
                write!(f, "Parameter '{}' over range: {}", token, value)
            }
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value for {}: {}", field, value)
            }
            #[cfg(feature = "std")]
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for GcodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcodeError::ZeroLengthMove => write!(f, "Zero length move"),
            GcodeError::InputError(msg) => write!(f, "Input error: {}", msg),
            GcodeError::UnrecognizedCommand { letter, value } => {
                write!(f, "Unrecognized command {}{}", letter, value)
            }
            GcodeError::ArcSpecification(msg) => write!(f, "Arc specification error: {}", msg),
            GcodeError::MaxFeedRateExceeded => write!(f, "Maximum feed rate exceeded"),
            GcodeError::MaxTravelExceeded { axis } => {
                write!(f, "Maximum travel exceeded on axis {}", axis)
            }
        }
    }
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionError::BufferFull => write!(f, "Planner buffer full"),
            MotionError::FloatingPoint => write!(f, "Floating point error"),
            MotionError::FailedToConverge => write!(f, "Failed to converge"),
            MotionError::HomingCycleFailed(msg) => write!(f, "Homing cycle failed: {}", msg),
            MotionError::RuntimeFault => write!(f, "Runtime fault"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::OutOfBounds { offset, len } => {
                write!(f, "Access of {} bytes at {} out of bounds", len, offset)
            }
            StorageError::Device => write!(f, "Device failure"),
        }
    }
}

impl fmt::Display for StepperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepperError::PinError => write!(f, "GPIO pin operation failed"),
            StepperError::StepOverflow => write!(f, "Step count exceeds timer ticks"),
        }
    }
}

// Conversion impls
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<GcodeError> for Error {
    fn from(e: GcodeError) -> Self {
        Error::Gcode(e)
    }
}

impl From<MotionError> for Error {
    fn from(e: MotionError) -> Self {
        Error::Motion(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::Storage(e)
    }
}

impl From<StepperError> for Error {
    fn from(e: StepperError) -> Self {
        Error::Stepper(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for GcodeError {}

#[cfg(feature = "std")]
impl std::error::Error for MotionError {}

#[cfg(feature = "std")]
impl std::error::Error for StorageError {}

#[cfg(feature = "std")]
impl std::error::Error for StepperError {}
