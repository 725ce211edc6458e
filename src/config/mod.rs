//! Configuration module for tinyg-motion.
//!
//! Provides motor, axis and global machine settings, loaded from TOML files
//! (with `std` feature), addressed by token through the parameter table, and
//! persisted to non-volatile storage.

mod axis;
mod machine;
mod motor;
pub mod params;
pub mod persist;
pub mod units;
#[cfg(feature = "std")]
mod loader;
mod validation;

pub use axis::{AxisConfig, AxisMode, HomingConfig, SwitchMode};
pub use machine::{GcodeDefaults, GlobalConfig, MachineConfig};
pub use motor::MotorConfig;
pub use persist::{ConfigStore, LoadOutcome, NvStorage, RamStorage};
pub use validation::validate_config;

#[cfg(feature = "std")]
pub use loader::{load_config, parse_config};

// Re-export unit types at config level
pub use units::{Axis, Microsteps, Polarity, Units, AXES, MICROSECONDS_PER_MINUTE, MM_PER_INCH, MOTORS};
