//! Simulated machine for integration tests.
//!
//! Wires a `MotionCore` to a `Stepper` whose outputs only count, drives the
//! DDA and dwell interrupts from a loop and closes simulated switches when
//! the stepped position crosses them.

#![allow(dead_code)]

use core::task::Poll;

use embedded_hal_mock::eh1::delay::NoopDelay;
use tinyg_motion::config::Microsteps;
use tinyg_motion::error::StepperError;
use tinyg_motion::stepper::{MotorOutputs, StepTimers, DDA_FREQUENCY, DWELL_FREQUENCY};
use tinyg_motion::{
    kinematics, Axis, GcodeBlock, MachineConfig, MotionCore, MotorQueue, Result, Stepper,
    StepperLink, AXES, MOTORS,
};

/// Motor outputs that record what they were told.
#[derive(Debug, Default)]
pub struct CountingMotors {
    pub pulses: [u64; MOTORS],
    pub reverse: [bool; MOTORS],
    pub enabled: [bool; MOTORS],
    pub microsteps: [u8; MOTORS],
}

impl MotorOutputs for CountingMotors {
    fn set_step(&mut self, motor: usize, high: bool) -> core::result::Result<(), StepperError> {
        if high {
            self.pulses[motor] += 1;
        }
        Ok(())
    }

    fn set_direction(
        &mut self,
        motor: usize,
        reverse: bool,
    ) -> core::result::Result<(), StepperError> {
        self.reverse[motor] = reverse;
        Ok(())
    }

    fn set_enabled(&mut self, motor: usize, enabled: bool) -> core::result::Result<(), StepperError> {
        self.enabled[motor] = enabled;
        Ok(())
    }

    fn set_microsteps(
        &mut self,
        motor: usize,
        microsteps: Microsteps,
    ) -> core::result::Result<(), StepperError> {
        self.microsteps[motor] = microsteps.value();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerMode {
    #[default]
    Off,
    Dda,
    Dwell,
}

/// Timers that only remember which interrupt should be firing.
#[derive(Debug, Default)]
pub struct SimTimers {
    pub mode: TimerMode,
}

impl StepTimers for SimTimers {
    fn start_dda(&mut self, _period: u16) {
        self.mode = TimerMode::Dda;
    }

    fn start_dwell(&mut self, _period: u16) {
        self.mode = TimerMode::Dwell;
    }

    fn stop(&mut self) {
        self.mode = TimerMode::Off;
    }
}

/// A switch that is closed while the axis is at or below `at` (physical mm).
#[derive(Debug, Clone, Copy)]
pub struct SimSwitch {
    pub axis: Axis,
    pub at: f64,
    pub closed: bool,
}

pub struct Machine<'q> {
    pub core: MotionCore<'q>,
    pub stepper: Stepper<'q, CountingMotors, SimTimers, NoopDelay>,
    pub link: &'q StepperLink,
    pub switches: Vec<SimSwitch>,
    pub dda_ticks: u64,
    pub dwell_ticks: u64,
    pub switch_errors: Vec<tinyg_motion::Error>,
}

/// Build a machine and hand it to `f`.
pub fn with_machine<R>(config: MachineConfig, f: impl FnOnce(&mut Machine<'_>) -> R) -> R {
    let link = StepperLink::new();
    let mut queue = MotorQueue::new();
    let (producer, consumer) = queue.split();
    let mut stepper = Stepper::new(
        consumer,
        &link,
        CountingMotors::default(),
        SimTimers::default(),
        NoopDelay::new(),
    );
    stepper.apply_config(&config).unwrap();
    let core = MotionCore::new(config, producer, &link);
    let mut machine = Machine {
        core,
        stepper,
        link: &link,
        switches: Vec::new(),
        dda_ticks: 0,
        dwell_ticks: 0,
        switch_errors: Vec::new(),
    };
    f(&mut machine)
}

pub fn block(words: &[(char, f64)]) -> GcodeBlock {
    GcodeBlock::from_words(words).unwrap()
}

impl<'q> Machine<'q> {
    /// Execute a block given as `(letter, value)` words.
    pub fn gcode(&mut self, words: &[(char, f64)]) -> Result<()> {
        let block = GcodeBlock::from_words(words)?;
        self.core.execute_block(&block)
    }

    /// Add a switch and report its initial state to the core.
    pub fn add_switch(&mut self, axis: Axis, at: f64) {
        let closed = self.physical()[axis.index()] <= at;
        self.switches.push(SimSwitch { axis, at, closed });
        if closed {
            self.core.switch_event(axis, true).unwrap();
        }
    }

    /// Net stepped travel converted back to axis coordinates.
    pub fn physical(&self) -> [f64; AXES] {
        let steps = self.stepper.position().map(|s| s as i32);
        kinematics::forward(&steps, self.core.config())
    }

    /// Simulated seconds elapsed.
    pub fn seconds(&self) -> f64 {
        self.dda_ticks as f64 / DDA_FREQUENCY as f64
            + self.dwell_ticks as f64 / DWELL_FREQUENCY as f64
    }

    /// One main loop pass plus one timer interrupt.
    ///
    /// The loader runs whenever it was kicked, before and after the tick.
    pub fn step(&mut self) -> Poll<Result<()>> {
        self.load();
        let poll = self.core.poll();
        self.load();
        match self.stepper.timers().mode {
            TimerMode::Dda => {
                self.stepper.on_dda_tick();
                self.dda_ticks += 1;
                self.check_switches();
            }
            TimerMode::Dwell => {
                self.stepper.on_dwell_tick();
                self.dwell_ticks += 1;
            }
            TimerMode::Off => {}
        }
        self.load();
        poll
    }

    fn load(&mut self) {
        if self.link.load_pending() {
            self.stepper.on_load();
        }
    }

    fn check_switches(&mut self) {
        if self.switches.is_empty() {
            return;
        }
        let position = self.physical();
        for k in 0..self.switches.len() {
            let sw = self.switches[k];
            let closed = position[sw.axis.index()] <= sw.at;
            if closed != sw.closed {
                self.switches[k].closed = closed;
                if let Err(e) = self.core.switch_event(sw.axis, closed) {
                    self.switch_errors.push(e);
                }
            }
        }
    }

    /// Run until nothing is queued, executing or homing.
    ///
    /// `Ok(false)` when `max_seconds` of simulated time pass first.
    pub fn run(&mut self, max_seconds: f64) -> Result<bool> {
        let limit = (max_seconds * DDA_FREQUENCY as f64) as u64 + 1000;
        for _ in 0..limit {
            let poll = self.step();
            if let Poll::Ready(Err(e)) = poll {
                return Err(e);
            }
            if poll.is_ready() && !self.core.is_busy() && !self.core.canonical().is_homing() {
                // one more pass so the core sees the steppers idle
                if let Poll::Ready(Err(e)) = self.core.poll() {
                    return Err(e);
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run for a fixed amount of simulated time.
    pub fn run_for(&mut self, seconds: f64) -> Result<()> {
        let end = self.seconds() + seconds;
        let limit = (seconds * DDA_FREQUENCY as f64) as u64 * 2 + 1000;
        for _ in 0..limit {
            if self.seconds() >= end {
                break;
            }
            if let Poll::Ready(Err(e)) = self.step() {
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run until `done` holds, with a simulated time limit.
    pub fn run_until(&mut self, max_seconds: f64, mut done: impl FnMut(&Self) -> bool) -> Result<bool> {
        let limit = (max_seconds * DDA_FREQUENCY as f64) as u64 + 1000;
        for _ in 0..limit {
            if let Poll::Ready(Err(e)) = self.step() {
                return Err(e);
            }
            if done(self) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
