//! Motor queue: segments handed from the runtime to the step ISR.

use heapless::spsc::{Consumer, Producer, Queue};

use crate::config::MOTORS;

/// CPU clock the timer periods are derived from.
pub const F_CPU: u32 = 32_000_000;

/// DDA interrupt rate (Hz).
pub const DDA_FREQUENCY: u32 = 50_000;

/// Dwell interrupt rate (Hz).
pub const DWELL_FREQUENCY: u32 = 10_000;

/// Timer period register value for the DDA rate.
pub const DDA_PERIOD: u16 = (F_CPU / DDA_FREQUENCY) as u16;

/// Timer period register value for the dwell rate.
pub const DWELL_PERIOD: u16 = (F_CPU / DWELL_FREQUENCY) as u16;

/// Queue storage size; one slot is kept free, so three are usable.
pub const MOTOR_QUEUE_SIZE: usize = 4;

/// Backing storage for the motor queue.
pub type MotorQueue = Queue<Segment, MOTOR_QUEUE_SIZE>;

/// Runtime side of the motor queue.
pub type SegmentProducer<'q> = Producer<'q, Segment, MOTOR_QUEUE_SIZE>;

/// Step ISR side of the motor queue.
pub type SegmentConsumer<'q> = Consumer<'q, Segment, MOTOR_QUEUE_SIZE>;

/// Segment kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SegmentKind {
    /// Step pulses at the DDA rate.
    Line,
    /// Timed pause at the dwell rate.
    Dwell,
    /// Enable all motors.
    Start,
    /// Pause until cycle start.
    Stop,
    /// Program end: release motors.
    End,
}

/// Per-motor part of a line segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorSteps {
    /// Negative direction.
    pub reverse: bool,
    /// Absolute step count.
    pub steps: u32,
}

/// One motor queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Segment {
    /// Segment kind.
    pub kind: SegmentKind,
    /// Timer period register value.
    pub timer_period: u16,
    /// Interrupts this segment lasts.
    pub timer_ticks: u32,
    /// Per-motor direction and steps.
    pub motors: [MotorSteps; MOTORS],
}

impl Segment {
    /// Line segment of `microseconds` duration.
    ///
    /// Returns the segment and whether the tick count had to be raised so
    /// that no motor needs more steps than ticks.
    pub fn line(steps: &[i32; MOTORS], microseconds: f64) -> (Self, bool) {
        let mut motors = [MotorSteps::default(); MOTORS];
        let mut max_steps = 0u32;
        for (out, s) in motors.iter_mut().zip(steps.iter()) {
            out.reverse = *s < 0;
            out.steps = s.unsigned_abs();
            max_steps = max_steps.max(out.steps);
        }
        let ticks = libm::round(microseconds * DDA_FREQUENCY as f64 / 1_000_000.0);
        let mut timer_ticks = if ticks >= 1.0 { ticks as u32 } else { 1 };
        let clamped = max_steps > timer_ticks;
        if clamped {
            timer_ticks = max_steps;
        }
        (
            Self {
                kind: SegmentKind::Line,
                timer_period: DDA_PERIOD,
                timer_ticks,
                motors,
            },
            clamped,
        )
    }

    /// Dwell segment.
    pub fn dwell(seconds: f64) -> Self {
        let ticks = libm::round(seconds * DWELL_FREQUENCY as f64);
        Self {
            kind: SegmentKind::Dwell,
            timer_period: DWELL_PERIOD,
            timer_ticks: if ticks > 0.0 { ticks as u32 } else { 0 },
            motors: [MotorSteps::default(); MOTORS],
        }
    }

    /// Marker segment (start, stop or end).
    pub fn marker(kind: SegmentKind) -> Self {
        Self {
            kind,
            timer_period: 0,
            timer_ticks: 0,
            motors: [MotorSteps::default(); MOTORS],
        }
    }

    /// Signed steps of one motor.
    pub fn signed_steps(&self, motor: usize) -> i64 {
        let m = &self.motors[motor];
        if m.reverse {
            -(m.steps as i64)
        } else {
            m.steps as i64
        }
    }
}
