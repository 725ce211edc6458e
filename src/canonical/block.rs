//! One Gcode block as handed over by the tokenizer.
//!
//! Every word is optional: `None` means the word was absent, which is the
//! information the "which fields were set" shadow model carries.

use super::model::{DistanceMode, MotionMode, PathControl, Plane, SpindleMode};
use crate::config::{Axis, Units, AXES};
use crate::error::{GcodeError, Result};

/// Non-modal G codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NonModal {
    /// G4
    Dwell,
    /// G28
    Home,
    /// G30
    ReturnHome,
    /// G92
    SetOriginOffsets,
}

/// M codes of the program flow group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProgramFlow {
    /// M0, M1, M60
    Stop,
    /// M2, M30
    End,
}

/// A validated block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GcodeBlock {
    /// N
    pub line: Option<u32>,
    /// G0, G1, G2, G3, G80
    pub motion: Option<MotionMode>,
    /// G17, G18, G19
    pub plane: Option<Plane>,
    /// G20, G21
    pub units: Option<Units>,
    /// G90, G91
    pub distance_mode: Option<DistanceMode>,
    /// G61, G61.1, G64
    pub path_control: Option<PathControl>,
    /// G93 (true), G94 (false)
    pub inverse_feed_rate_mode: Option<bool>,
    /// G4, G28, G30, G92
    pub non_modal: Option<NonModal>,
    /// G53
    pub machine_coords: bool,
    /// M0, M1, M2, M30, M60
    pub program_flow: Option<ProgramFlow>,
    /// M3, M4, M5
    pub spindle: Option<SpindleMode>,
    /// M6
    pub tool_change: bool,
    /// M48 (true), M49 (false)
    pub feed_override: Option<bool>,
    /// F
    pub feed_rate: Option<f64>,
    /// S
    pub spindle_speed: Option<f64>,
    /// T
    pub tool: Option<u8>,
    /// X Y Z A B C
    pub axes: [Option<f64>; AXES],
    /// I J K
    pub offsets: [Option<f64>; 3],
    /// R
    pub radius: Option<f64>,
    /// P (seconds)
    pub dwell: Option<f64>,
}

/// Tenths of a G or M number, so that G61.1 is distinct from G61.
fn code(value: f64) -> i32 {
    libm::round(value * 10.0) as i32
}

fn set_once<T>(slot: &mut Option<T>, value: T) -> Result<()> {
    if slot.is_some() {
        return Err(GcodeError::InputError("modal group used twice").into());
    }
    *slot = Some(value);
    Ok(())
}

/// A whole number in `0..=max`.
fn whole(value: f64, max: u32, message: &'static str) -> Result<u32> {
    if value < 0.0 || value > max as f64 || libm::trunc(value) != value {
        return Err(GcodeError::InputError(message).into());
    }
    Ok(value as u32)
}

fn unrecognized(letter: char, value: f64) -> crate::error::Error {
    GcodeError::UnrecognizedCommand {
        letter,
        value: value as f32,
    }
    .into()
}

impl GcodeBlock {
    /// Build a block from `(letter, value)` words.
    ///
    /// # Errors
    ///
    /// `UnrecognizedCommand` for unsupported G/M codes or letters,
    /// `GcodeInputError` for two codes of one modal group, a repeated word,
    /// a non-finite value or a line or tool number that is not a whole
    /// number in range.
    pub fn from_words(words: &[(char, f64)]) -> Result<Self> {
        let mut block = Self::default();
        for &(letter, value) in words {
            if !value.is_finite() {
                return Err(GcodeError::InputError("non-finite word value").into());
            }
            let letter = letter.to_ascii_uppercase();
            match letter {
                'G' => block.g_word(value)?,
                'M' => block.m_word(value)?,
                'N' => set_once(&mut block.line, whole(value, u32::MAX, "bad line number")?)?,
                'F' => set_once(&mut block.feed_rate, value)?,
                'S' => set_once(&mut block.spindle_speed, value)?,
                'T' => {
                    let tool = whole(value, u8::MAX as u32, "bad tool number")?;
                    set_once(&mut block.tool, tool as u8)?
                }
                'R' => set_once(&mut block.radius, value)?,
                'P' => set_once(&mut block.dwell, value)?,
                'I' => set_once(&mut block.offsets[0], value)?,
                'J' => set_once(&mut block.offsets[1], value)?,
                'K' => set_once(&mut block.offsets[2], value)?,
                _ => match Axis::from_letter(letter) {
                    Some(axis) => set_once(&mut block.axes[axis.index()], value)?,
                    None => return Err(unrecognized(letter, value)),
                },
            }
        }
        Ok(block)
    }

    fn g_word(&mut self, value: f64) -> Result<()> {
        match code(value) {
            0 => set_once(&mut self.motion, MotionMode::Traverse),
            10 => set_once(&mut self.motion, MotionMode::Feed),
            20 => set_once(&mut self.motion, MotionMode::ArcCw),
            30 => set_once(&mut self.motion, MotionMode::ArcCcw),
            800 => set_once(&mut self.motion, MotionMode::Cancel),
            40 => set_once(&mut self.non_modal, NonModal::Dwell),
            280 => set_once(&mut self.non_modal, NonModal::Home),
            300 => set_once(&mut self.non_modal, NonModal::ReturnHome),
            920 => set_once(&mut self.non_modal, NonModal::SetOriginOffsets),
            170 => set_once(&mut self.plane, Plane::Xy),
            180 => set_once(&mut self.plane, Plane::Xz),
            190 => set_once(&mut self.plane, Plane::Yz),
            200 => set_once(&mut self.units, Units::Inches),
            210 => set_once(&mut self.units, Units::Millimeters),
            530 => {
                self.machine_coords = true;
                Ok(())
            }
            610 => set_once(&mut self.path_control, PathControl::ExactStop),
            611 => set_once(&mut self.path_control, PathControl::ExactPath),
            640 => set_once(&mut self.path_control, PathControl::Continuous),
            900 => set_once(&mut self.distance_mode, DistanceMode::Absolute),
            910 => set_once(&mut self.distance_mode, DistanceMode::Incremental),
            930 => set_once(&mut self.inverse_feed_rate_mode, true),
            940 => set_once(&mut self.inverse_feed_rate_mode, false),
            _ => Err(unrecognized('G', value)),
        }
    }

    fn m_word(&mut self, value: f64) -> Result<()> {
        match code(value) {
            0 | 10 | 600 => set_once(&mut self.program_flow, ProgramFlow::Stop),
            20 | 300 => set_once(&mut self.program_flow, ProgramFlow::End),
            30 => set_once(&mut self.spindle, SpindleMode::Clockwise),
            40 => set_once(&mut self.spindle, SpindleMode::CounterClockwise),
            50 => set_once(&mut self.spindle, SpindleMode::Off),
            60 => {
                self.tool_change = true;
                Ok(())
            }
            480 => set_once(&mut self.feed_override, true),
            490 => set_once(&mut self.feed_override, false),
            _ => Err(unrecognized('M', value)),
        }
    }

    /// At least one axis word is present.
    pub fn has_axis_words(&self) -> bool {
        self.axes.iter().any(Option::is_some)
    }
}
