//! Status reports.

use core::fmt::{self, Write};

use serde::Serialize;

use crate::canonical::{GcodeModel, MachineState};
use crate::config::{Axis, Units, AXES};

/// Capacity of a report rendered without allocation.
pub const REPORT_LEN: usize = 320;

/// Snapshot of the machine sent to the host.
///
/// Positions are work coordinates and the velocity is per minute, both in
/// the active input units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusReport {
    /// Line number of the executing move.
    pub line: u32,
    /// X work position.
    pub posx: f64,
    /// Y work position.
    pub posy: f64,
    /// Z work position.
    pub posz: f64,
    /// A work position.
    pub posa: f64,
    /// B work position.
    pub posb: f64,
    /// C work position.
    pub posc: f64,
    /// Current velocity.
    pub vel: f64,
    /// 0 for inches, 1 for millimeters.
    pub unit: u8,
    /// Machine state.
    pub stat: MachineState,
}

#[derive(Serialize)]
struct Envelope<'a> {
    sr: &'a StatusReport,
}

impl StatusReport {
    /// Build a report from machine coordinates and a velocity in mm/min.
    pub fn new(
        gm: &GcodeModel,
        state: MachineState,
        line: u32,
        position: &[f64; AXES],
        velocity: f64,
    ) -> Self {
        let pos = |axis: Axis| gm.work_coordinate(axis, position[axis.index()]);
        Self {
            line,
            posx: pos(Axis::X),
            posy: pos(Axis::Y),
            posz: pos(Axis::Z),
            posa: pos(Axis::A),
            posb: pos(Axis::B),
            posc: pos(Axis::C),
            vel: velocity / gm.units.to_mm(),
            unit: match gm.units {
                Units::Inches => 0,
                Units::Millimeters => 1,
            },
            stat: state,
        }
    }

    /// Work position as an array.
    pub fn position(&self) -> [f64; AXES] {
        [self.posx, self.posy, self.posz, self.posa, self.posb, self.posc]
    }

    /// Render `{"sr":{...}}` into a fixed buffer.
    ///
    /// `None` if the report does not fit in [`REPORT_LEN`] bytes.
    pub fn to_json_string(&self) -> Option<heapless::String<REPORT_LEN>> {
        serde_json_core::to_string(&Envelope { sr: self }).ok()
    }

    /// Render `{"sr":{...}}` into any writer.
    pub fn write_json<W: Write>(&self, w: &mut W) -> fmt::Result {
        let json = self.to_json_string().ok_or(fmt::Error)?;
        w.write_str(&json)
    }

    /// Report as a JSON string.
    #[cfg(feature = "std")]
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(&Envelope { sr: self })
            .map_err(|_| crate::error::MotionError::FloatingPoint.into())
    }
}
