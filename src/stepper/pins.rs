//! Motor output lines and step timers.
//!
//! Generic over embedded-hal 1.0 `OutputPin` types.

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};

use crate::config::Microsteps;
use crate::error::StepperError;

/// The output lines of one motor driver.
pub trait StepperChannel {
    /// Drive the step line.
    fn set_step(&mut self, high: bool) -> Result<(), StepperError>;

    /// Drive the direction line; `reverse` is the negative direction.
    fn set_direction(&mut self, reverse: bool) -> Result<(), StepperError>;

    /// Energize or release the motor.
    fn set_enabled(&mut self, enabled: bool) -> Result<(), StepperError>;

    /// Drive the microstep select lines.
    fn set_microsteps(&mut self, microsteps: Microsteps) -> Result<(), StepperError>;
}

/// Pins of one motor driver: step, direction, enable (active low) and two
/// microstep select lines.
pub struct MotorPins<STEP, DIR, EN, MS0, MS1> {
    step: STEP,
    dir: DIR,
    enable: EN,
    ms0: MS0,
    ms1: MS1,
}

impl<STEP, DIR, EN, MS0, MS1> MotorPins<STEP, DIR, EN, MS0, MS1>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
    MS0: OutputPin,
    MS1: OutputPin,
{
    /// Group the pins of one driver.
    pub fn new(step: STEP, dir: DIR, enable: EN, ms0: MS0, ms1: MS1) -> Self {
        Self {
            step,
            dir,
            enable,
            ms0,
            ms1,
        }
    }

    /// Release the pins.
    pub fn release(self) -> (STEP, DIR, EN, MS0, MS1) {
        (self.step, self.dir, self.enable, self.ms0, self.ms1)
    }
}

fn drive<P: OutputPin>(pin: &mut P, high: bool) -> Result<(), StepperError> {
    if high {
        pin.set_high().map_err(|_| StepperError::PinError)
    } else {
        pin.set_low().map_err(|_| StepperError::PinError)
    }
}

impl<STEP, DIR, EN, MS0, MS1> StepperChannel for MotorPins<STEP, DIR, EN, MS0, MS1>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
    MS0: OutputPin,
    MS1: OutputPin,
{
    fn set_step(&mut self, high: bool) -> Result<(), StepperError> {
        drive(&mut self.step, high)
    }

    fn set_direction(&mut self, reverse: bool) -> Result<(), StepperError> {
        drive(&mut self.dir, reverse)
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), StepperError> {
        drive(&mut self.enable, !enabled)
    }

    fn set_microsteps(&mut self, microsteps: Microsteps) -> Result<(), StepperError> {
        let (ms0, ms1) = microsteps.select_lines();
        drive(&mut self.ms0, ms0)?;
        drive(&mut self.ms1, ms1)
    }
}

/// Placeholder for a line the board does not wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPin;

impl ErrorType for NoPin {
    type Error = Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// All motor channels, addressed by index.
pub trait MotorOutputs {
    /// See [`StepperChannel::set_step`].
    fn set_step(&mut self, motor: usize, high: bool) -> Result<(), StepperError>;
    /// See [`StepperChannel::set_direction`].
    fn set_direction(&mut self, motor: usize, reverse: bool) -> Result<(), StepperError>;
    /// See [`StepperChannel::set_enabled`].
    fn set_enabled(&mut self, motor: usize, enabled: bool) -> Result<(), StepperError>;
    /// See [`StepperChannel::set_microsteps`].
    fn set_microsteps(&mut self, motor: usize, microsteps: Microsteps)
        -> Result<(), StepperError>;
}

macro_rules! dispatch {
    ($self:ident, $motor:ident, $method:ident ( $($arg:expr),* )) => {
        match $motor {
            0 => $self.0.$method($($arg),*),
            1 => $self.1.$method($($arg),*),
            2 => $self.2.$method($($arg),*),
            3 => $self.3.$method($($arg),*),
            _ => Err(StepperError::PinError),
        }
    };
}

impl<A, B, C, D> MotorOutputs for (A, B, C, D)
where
    A: StepperChannel,
    B: StepperChannel,
    C: StepperChannel,
    D: StepperChannel,
{
    fn set_step(&mut self, motor: usize, high: bool) -> Result<(), StepperError> {
        dispatch!(self, motor, set_step(high))
    }

    fn set_direction(&mut self, motor: usize, reverse: bool) -> Result<(), StepperError> {
        dispatch!(self, motor, set_direction(reverse))
    }

    fn set_enabled(&mut self, motor: usize, enabled: bool) -> Result<(), StepperError> {
        dispatch!(self, motor, set_enabled(enabled))
    }

    fn set_microsteps(
        &mut self,
        motor: usize,
        microsteps: Microsteps,
    ) -> Result<(), StepperError> {
        dispatch!(self, motor, set_microsteps(microsteps))
    }
}

/// DDA and dwell timers.
pub trait StepTimers {
    /// Run the DDA interrupt with the given period register value.
    fn start_dda(&mut self, period: u16);

    /// Run the dwell interrupt with the given period register value.
    fn start_dwell(&mut self, period: u16);

    /// Stop whichever timer is running.
    fn stop(&mut self);
}
