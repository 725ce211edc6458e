//! # tinyg-motion
//!
//! Jerk-limited multi-axis CNC motion core with embedded-hal 1.0 support.
//!
//! ## Features
//!
//! - **Canonical machine**: RS274 modal state, G0/G1/G2/G3/G4, G28/G30,
//!   G92/G53, program stop and end
//! - **Look-ahead planner**: 24 move buffers, centripetal cornering,
//!   constant-jerk trapezoids replanned as moves arrive
//! - **Segment generator**: S-curve velocity profiles chopped into
//!   constant-time segments, arcs chopped into chords, feedhold
//! - **DDA stepper driver**: Bresenham step generation from interrupt
//!   context over `OutputPin`s
//! - **no_std compatible**: everything but TOML loading and JSON strings
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tinyg_motion::{GcodeBlock, MachineConfig, MotionCore, MotorQueue, Stepper, StepperLink};
//!
//! static LINK: StepperLink = StepperLink::new();
//!
//! let mut queue = MotorQueue::new();
//! let (producer, consumer) = queue.split();
//! let config = tinyg_motion::load_config("machine.toml")?;
//!
//! let mut stepper = Stepper::new(consumer, &LINK, motors, timers, delay);
//! stepper.apply_config(&config)?;
//! let mut core = MotionCore::new(config, producer, &LINK);
//!
//! core.execute_block(&GcodeBlock::from_words(&[('G', 1.0), ('X', 100.0), ('F', 1000.0)])?)?;
//! while core.poll().is_pending() {}
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): TOML loading, JSON status strings, `log` output
//! - `log`: route internal logging to the `log` facade
//! - `defmt`: route internal logging to defmt for embedded targets

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow large error types - necessary for no_std with heapless strings
#![allow(clippy::result_large_err)]

#[macro_use]
mod fmt;

pub mod canonical;
pub mod config;
pub mod error;
pub mod kinematics;
mod motion_core;
pub mod planner;
pub mod report;
pub mod stepper;

pub use canonical::{
    ArcCenter, CanonicalMachine, GcodeBlock, GcodeModel, HomingState, MachineState,
};
pub use config::{validate_config, AxisConfig, MachineConfig, MotorConfig};
pub use error::{Error, Result, Status};
pub use motion_core::{MotionCore, BLOCK_HEADROOM};
pub use planner::{Planner, Runtime};
pub use report::StatusReport;
pub use stepper::{MotorQueue, Segment, Stepper, StepperLink};

#[cfg(feature = "std")]
pub use config::{load_config, parse_config};

pub use config::units::{Axis, Units, AXES, MOTORS};
