//! Planner ring of move buffers.
//!
//! Buffers live in a fixed arena indexed by `u8`; the ring order gives each
//! slot its previous and next neighbor.

use crate::config::{Axis, AXES};

/// Number of planner buffers.
pub const PLANNER_BUFFERS: usize = 24;

/// Buffer lifecycle: `Empty -> Loading -> Queued -> Pending -> Running -> Empty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferState {
    /// Free.
    #[default]
    Empty,
    /// Reserved by the writer, not yet committed.
    Loading,
    /// Committed, waiting to run.
    Queued,
    /// Picked up by the runtime, no segment emitted yet.
    Pending,
    /// Segments being emitted.
    Running,
}

/// What a buffer describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MoveType {
    /// Unused.
    #[default]
    Null,
    /// Constant velocity line (acceleration planning disabled).
    Line,
    /// Jerk-limited line.
    Aline,
    /// Timed pause.
    Dwell,
    /// Enable motors.
    Start,
    /// Program stop: pause until cycle start.
    Stop,
    /// Arc at constant velocity.
    Arc,
    /// Program end.
    End,
}

impl MoveType {
    /// Carries geometry (line, aline or arc).
    pub const fn is_motion(self) -> bool {
        matches!(self, MoveType::Line | MoveType::Aline | MoveType::Arc)
    }
}

/// Arc geometry precomputed by the canonical machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcGeometry {
    /// Start angle (rad).
    pub theta: f64,
    /// Radius (mm).
    pub radius: f64,
    /// Signed sweep; positive is clockwise (rad).
    pub angular_travel: f64,
    /// Travel along the axis normal to the plane (mm).
    pub linear_travel: f64,
    /// First plane axis.
    pub axis_1: Axis,
    /// Second plane axis.
    pub axis_2: Axis,
    /// Helical axis.
    pub axis_linear: Axis,
    /// Center on the first plane axis.
    pub center_1: f64,
    /// Center on the second plane axis.
    pub center_2: f64,
}

impl Default for ArcGeometry {
    fn default() -> Self {
        Self {
            theta: 0.0,
            radius: 0.0,
            angular_travel: 0.0,
            linear_travel: 0.0,
            axis_1: Axis::X,
            axis_2: Axis::Y,
            axis_linear: Axis::Z,
            center_1: 0.0,
            center_2: 0.0,
        }
    }
}

/// One planner slot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveBuffer {
    /// Lifecycle state.
    pub state: BufferState,
    /// Move kind.
    pub move_type: MoveType,
    /// May still be replanned.
    pub replannable: bool,
    /// Source line number.
    pub line: u32,

    /// Absolute end point (mm, deg).
    pub target: [f64; AXES],
    /// Unit direction vector.
    pub unit: [f64; AXES],
    /// Path length.
    pub length: f64,
    /// Acceleration length.
    pub head_length: f64,
    /// Cruise length.
    pub body_length: f64,
    /// Deceleration length.
    pub tail_length: f64,
    /// Requested duration (minutes), or dwell seconds for dwells.
    pub time: f64,
    /// Jerk limit for this move.
    pub jerk: f64,

    /// Planned entry velocity.
    pub entry_velocity: f64,
    /// Planned cruise velocity.
    pub cruise_velocity: f64,
    /// Planned exit velocity.
    pub exit_velocity: f64,
    /// Highest entry velocity allowed by the junction.
    pub entry_velocity_limit: f64,
    /// Requested cruise velocity.
    pub cruise_velocity_set: f64,
    /// Highest exit velocity.
    pub exit_velocity_limit: f64,
    /// Velocity change this move can absorb from rest.
    pub braking_velocity: f64,
    /// Highest entry velocity from which the rest of the queue can still stop.
    pub cumulative_braking: f64,

    /// Arc geometry (arcs only).
    pub arc: ArcGeometry,
}

impl MoveBuffer {
    fn reset(&mut self) {
        *self = Self::default();
    }

    /// Cut an arc down to what is left after `travelled` along it, the
    /// current angle being `theta`. The arc velocity is kept.
    pub(crate) fn trim_arc(&mut self, theta: f64, travelled: f64) {
        let velocity = if self.time > 0.0 { self.length / self.time } else { 0.0 };
        let left = (self.length - travelled).max(0.0);
        let fraction = if self.length > 0.0 { left / self.length } else { 0.0 };
        self.arc.theta = theta;
        self.arc.angular_travel *= fraction;
        self.arc.linear_travel *= fraction;
        self.length = left;
        self.body_length = left;
        self.time = if velocity > 0.0 { left / velocity } else { 0.0 };
    }

    /// Check `head + body + tail == length` within `epsilon`.
    pub fn lengths_consistent(&self, epsilon: f64) -> bool {
        libm::fabs(self.head_length + self.body_length + self.tail_length - self.length)
            < epsilon
    }
}

/// Ring of planner buffers.
///
/// `write` is the next slot to reserve; `run` the oldest committed slot.
#[derive(Debug, Clone)]
pub struct PlannerRing {
    buffers: [MoveBuffer; PLANNER_BUFFERS],
    write: u8,
    run: u8,
}

impl Default for PlannerRing {
    fn default() -> Self {
        Self::new()
    }
}

impl PlannerRing {
    /// Empty ring.
    pub fn new() -> Self {
        Self {
            buffers: [MoveBuffer::default(); PLANNER_BUFFERS],
            write: 0,
            run: 0,
        }
    }

    /// Slot after `i`.
    #[inline]
    pub const fn next(i: u8) -> u8 {
        ((i as usize + 1) % PLANNER_BUFFERS) as u8
    }

    /// Slot before `i`.
    #[inline]
    pub const fn prev(i: u8) -> u8 {
        ((i as usize + PLANNER_BUFFERS - 1) % PLANNER_BUFFERS) as u8
    }

    /// Buffer at `i`.
    #[inline]
    pub fn get(&self, i: u8) -> &MoveBuffer {
        &self.buffers[i as usize]
    }

    /// Mutable buffer at `i`.
    #[inline]
    pub fn get_mut(&mut self, i: u8) -> &mut MoveBuffer {
        &mut self.buffers[i as usize]
    }

    /// Free slots.
    pub fn available(&self) -> usize {
        self.buffers
            .iter()
            .filter(|b| b.state == BufferState::Empty)
            .count()
    }

    /// No committed or running buffer.
    pub fn is_empty(&self) -> bool {
        self.buffers.iter().all(|b| b.state == BufferState::Empty)
    }

    /// Reserve the write slot; `None` when the ring is full.
    pub fn reserve(&mut self) -> Option<u8> {
        let i = self.write;
        let buffer = &mut self.buffers[i as usize];
        if buffer.state != BufferState::Empty {
            return None;
        }
        buffer.reset();
        buffer.state = BufferState::Loading;
        Some(i)
    }

    /// Return a reserved slot without committing it.
    pub fn unreserve(&mut self, i: u8) {
        let buffer = &mut self.buffers[i as usize];
        if buffer.state == BufferState::Loading {
            buffer.reset();
        }
    }

    /// Commit the reserved slot.
    pub fn commit(&mut self, i: u8, move_type: MoveType) {
        let buffer = &mut self.buffers[i as usize];
        buffer.move_type = move_type;
        buffer.state = BufferState::Queued;
        self.write = Self::next(i);
    }

    /// Most recently committed slot, if still in the queue.
    pub fn newest(&self) -> Option<u8> {
        let i = Self::prev(self.write);
        match self.buffers[i as usize].state {
            BufferState::Queued | BufferState::Pending | BufferState::Running => Some(i),
            _ => None,
        }
    }

    /// Oldest committed slot; marks a queued slot pending.
    pub fn run_buffer(&mut self) -> Option<u8> {
        let i = self.run;
        let buffer = &mut self.buffers[i as usize];
        match buffer.state {
            BufferState::Queued => {
                buffer.state = BufferState::Pending;
                buffer.replannable = false;
                Some(i)
            }
            BufferState::Pending | BufferState::Running => Some(i),
            _ => None,
        }
    }

    /// Index of the oldest committed slot without changing its state.
    pub fn peek_run(&self) -> Option<u8> {
        match self.buffers[self.run as usize].state {
            BufferState::Queued | BufferState::Pending | BufferState::Running => Some(self.run),
            _ => None,
        }
    }

    /// Free the run slot and advance.
    pub fn release(&mut self, i: u8) {
        if i != self.run {
            return;
        }
        self.buffers[i as usize].reset();
        self.run = Self::next(i);
    }

    /// Discard every buffer.
    pub fn flush(&mut self) {
        for buffer in self.buffers.iter_mut() {
            buffer.reset();
        }
        self.write = 0;
        self.run = 0;
    }

    /// Discard everything after the run slot.
    pub fn flush_after_run(&mut self) {
        let mut i = Self::next(self.run);
        while i != self.run {
            self.buffers[i as usize].reset();
            i = Self::next(i);
        }
        self.write = if self.buffers[self.run as usize].state == BufferState::Empty {
            self.run
        } else {
            Self::next(self.run)
        };
    }

    /// Committed slots from run to newest, oldest first.
    pub fn queued(&self) -> impl Iterator<Item = u8> + '_ {
        let start = self.run;
        let count = PLANNER_BUFFERS - self.available();
        (0..count)
            .map(move |k| ((start as usize + k) % PLANNER_BUFFERS) as u8)
            .filter(move |i| {
                matches!(
                    self.buffers[*i as usize].state,
                    BufferState::Queued | BufferState::Pending | BufferState::Running
                )
            })
    }
}
