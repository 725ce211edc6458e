//! Step generation.
//!
//! The [`Stepper`] is owned by interrupt context. It pulls [`Segment`]s from
//! the motor queue and runs a Bresenham DDA over the motor channels:
//! `on_dda_tick` from the DDA timer, `on_dwell_tick` from the dwell timer and
//! `on_load` from the loader software interrupt.

mod link;
mod pins;
mod queue;

pub use link::StepperLink;
pub use pins::{MotorOutputs, MotorPins, NoPin, StepTimers, StepperChannel};
pub use queue::{
    MotorQueue, MotorSteps, Segment, SegmentConsumer, SegmentKind, SegmentProducer,
    DDA_FREQUENCY, DDA_PERIOD, DWELL_FREQUENCY, DWELL_PERIOD, F_CPU, MOTOR_QUEUE_SIZE,
};

use embedded_hal::delay::DelayNs;

use crate::config::{MachineConfig, MOTORS};
use crate::error::StepperError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Active {
    Idle,
    Line,
    Dwell,
}

/// Interrupt-side stepper driver.
pub struct Stepper<'q, M, T, D>
where
    M: MotorOutputs,
    T: StepTimers,
    D: DelayNs,
{
    consumer: SegmentConsumer<'q>,
    link: &'q StepperLink,
    motors: M,
    timers: T,
    delay: D,
    active: Active,
    counters: [i64; MOTORS],
    steps: [u32; MOTORS],
    reverse: [bool; MOTORS],
    power_mode: [bool; MOTORS],
    timer_ticks: u32,
    ticks_left: u32,
    position: [i64; MOTORS],
}

impl<'q, M, T, D> Stepper<'q, M, T, D>
where
    M: MotorOutputs,
    T: StepTimers,
    D: DelayNs,
{
    /// Create an idle stepper.
    pub fn new(
        consumer: SegmentConsumer<'q>,
        link: &'q StepperLink,
        motors: M,
        timers: T,
        delay: D,
    ) -> Self {
        Self {
            consumer,
            link,
            motors,
            timers,
            delay,
            active: Active::Idle,
            counters: [0; MOTORS],
            steps: [0; MOTORS],
            reverse: [false; MOTORS],
            power_mode: [false; MOTORS],
            timer_ticks: 0,
            ticks_left: 0,
            position: [0; MOTORS],
        }
    }

    /// Apply microstep select lines and power modes from the configuration.
    ///
    /// Call between moves only.
    pub fn apply_config(&mut self, config: &MachineConfig) -> Result<(), StepperError> {
        for (m, motor) in config.motors.iter().enumerate() {
            self.motors.set_microsteps(m, motor.microsteps())?;
            self.power_mode[m] = motor.power_mode;
            if !motor.power_mode {
                self.motors.set_enabled(m, true)?;
            }
        }
        Ok(())
    }

    /// Net steps issued per motor since creation.
    pub fn position(&self) -> [i64; MOTORS] {
        self.position
    }

    /// No segment executing.
    pub fn is_idle(&self) -> bool {
        self.active == Active::Idle
    }

    /// Motor outputs.
    pub fn motors(&self) -> &M {
        &self.motors
    }

    /// Timers.
    pub fn timers(&self) -> &T {
        &self.timers
    }

    /// Loader: start the next segment if idle.
    ///
    /// Markers (start, end) are processed in place; a stop marker pauses the
    /// loader until [`StepperLink::resume`].
    pub fn on_load(&mut self) {
        self.link.take_load_request();

        if self.link.take_halt_request() {
            self.halt();
            return;
        }
        if self.active != Active::Idle || self.link.is_stopped() {
            return;
        }

        while let Some(segment) = self.consumer.dequeue() {
            match segment.kind {
                SegmentKind::Line => {
                    if let Err(e) = self.load_line(&segment) {
                        self.fault(e);
                    }
                    return;
                }
                SegmentKind::Dwell => {
                    if segment.timer_ticks == 0 {
                        continue;
                    }
                    self.ticks_left = segment.timer_ticks;
                    self.active = Active::Dwell;
                    self.link.set_busy(true);
                    self.timers.start_dwell(segment.timer_period);
                    return;
                }
                SegmentKind::Start => {
                    if let Err(e) = self.set_all_enabled(true) {
                        self.fault(e);
                        return;
                    }
                }
                SegmentKind::Stop => {
                    self.link.set_stopped(true);
                    self.link.set_busy(false);
                    return;
                }
                SegmentKind::End => {
                    if let Err(e) = self.set_all_enabled(false) {
                        self.fault(e);
                        return;
                    }
                }
            }
        }
        self.link.set_busy(false);
    }

    fn load_line(&mut self, segment: &Segment) -> Result<(), StepperError> {
        let ticks = segment.timer_ticks.max(1);
        for m in 0..MOTORS {
            let ms = segment.motors[m];
            if ms.steps > ticks {
                return Err(StepperError::StepOverflow);
            }
            // keep the DDA phase across segments
            self.counters[m] = if self.timer_ticks == 0 {
                -((ticks / 2) as i64)
            } else {
                self.counters[m] * ticks as i64 / self.timer_ticks as i64
            };
            self.steps[m] = ms.steps;
            if ms.steps > 0 {
                if ms.reverse != self.reverse[m] {
                    self.motors.set_direction(m, ms.reverse)?;
                    self.reverse[m] = ms.reverse;
                }
                if self.power_mode[m] {
                    self.motors.set_enabled(m, true)?;
                }
            }
        }
        self.timer_ticks = ticks;
        self.ticks_left = ticks;
        self.active = Active::Line;
        self.link.set_busy(true);
        self.timers.start_dda(segment.timer_period);
        Ok(())
    }

    /// DDA timer interrupt.
    pub fn on_dda_tick(&mut self) {
        if self.active != Active::Line {
            return;
        }
        if self.link.halt_pending() {
            self.link.take_halt_request();
            self.halt();
            return;
        }

        let mut pulsed = [false; MOTORS];
        let mut any = false;
        for m in 0..MOTORS {
            self.counters[m] += self.steps[m] as i64;
            if self.counters[m] > 0 {
                self.counters[m] -= self.timer_ticks as i64;
                if let Err(e) = self.motors.set_step(m, true) {
                    self.fault(e);
                    return;
                }
                pulsed[m] = true;
                any = true;
                self.position[m] += if self.reverse[m] { -1 } else { 1 };
            }
        }
        if any {
            self.delay.delay_us(1);
            for m in (0..MOTORS).filter(|m| pulsed[*m]) {
                if let Err(e) = self.motors.set_step(m, false) {
                    self.fault(e);
                    return;
                }
            }
        }

        self.ticks_left = self.ticks_left.saturating_sub(1);
        if self.ticks_left == 0 {
            self.end_move();
        }
    }

    /// Dwell timer interrupt.
    pub fn on_dwell_tick(&mut self) {
        if self.active != Active::Dwell {
            return;
        }
        if self.link.halt_pending() {
            self.link.take_halt_request();
            self.halt();
            return;
        }
        self.ticks_left = self.ticks_left.saturating_sub(1);
        if self.ticks_left == 0 {
            self.timers.stop();
            self.active = Active::Idle;
            self.link.request_load();
        }
    }

    fn end_move(&mut self) {
        self.timers.stop();
        self.active = Active::Idle;
        for m in 0..MOTORS {
            if self.power_mode[m] {
                if let Err(e) = self.motors.set_enabled(m, false) {
                    self.fault(e);
                    return;
                }
            }
        }
        self.link.request_load();
    }

    fn set_all_enabled(&mut self, enabled: bool) -> Result<(), StepperError> {
        for m in 0..MOTORS {
            self.motors.set_enabled(m, enabled)?;
        }
        Ok(())
    }

    /// Stop immediately and discard queued segments.
    fn halt(&mut self) {
        self.timers.stop();
        while self.consumer.dequeue().is_some() {}
        self.active = Active::Idle;
        self.ticks_left = 0;
        self.link.set_stopped(false);
        self.link.set_busy(false);
    }

    fn fault(&mut self, error: StepperError) {
        error!("stepper fault: {}", error);
        self.link.set_fault();
        self.halt();
    }
}
