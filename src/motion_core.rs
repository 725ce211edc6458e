//! The motion core: canonical machine, planner and runtime in one owned value.
//!
//! The main loop feeds blocks with [`MotionCore::execute_block`] and calls
//! [`MotionCore::poll`] until it returns `Ready`. The step ISR owns the
//! matching [`Stepper`](crate::stepper::Stepper) and talks to the core only
//! through the motor queue and the [`StepperLink`].

use core::task::Poll;

use crate::canonical::{
    arc_geometry, ArcCenter, CanonicalMachine, DistanceMode, GcodeBlock, HomingAction,
    HomingCycle, HomingState, MachineState, MotionMode, NonModal, PathControl, ProgramFlow,
};
use crate::config::{params, Axis, MachineConfig, AXES};
use crate::error::{Error, GcodeError, MotionError, Result};
use crate::planner::{HoldState, MoveType, Planner, Runtime, MIN_LINE_LENGTH};
use crate::report::StatusReport;
use crate::stepper::{SegmentProducer, StepperLink};

/// Planner buffers a single block may need (dwell, move, program flow).
pub const BLOCK_HEADROOM: usize = 4;

/// Everything the main context owns.
pub struct MotionCore<'q> {
    config: MachineConfig,
    cm: CanonicalMachine,
    planner: Planner,
    runtime: Runtime,
    producer: SegmentProducer<'q>,
    link: &'q StepperLink,
    switches: [bool; AXES],
    report_counter: u32,
    report: Option<StatusReport>,
}

impl<'q> MotionCore<'q> {
    /// Core in reset at the origin.
    pub fn new(config: MachineConfig, producer: SegmentProducer<'q>, link: &'q StepperLink) -> Self {
        Self {
            cm: CanonicalMachine::new(&config.gcode),
            config,
            planner: Planner::new(),
            runtime: Runtime::new(),
            producer,
            link,
            switches: [false; AXES],
            report_counter: 0,
            report: None,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Mutable configuration. Change it between moves only.
    pub fn config_mut(&mut self) -> &mut MachineConfig {
        &mut self.config
    }

    /// Set one configuration parameter by token.
    pub fn set_param(&mut self, token: &str, value: f64) -> Result<()> {
        params::set(&mut self.config, token, value)
    }

    /// Canonical machine.
    pub fn canonical(&self) -> &CanonicalMachine {
        &self.cm
    }

    /// Canonical machine, for the modal calls (plane, units, feed rate, ...).
    pub fn canonical_mut(&mut self) -> &mut CanonicalMachine {
        &mut self.cm
    }

    /// Planner queue.
    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Segment generator.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Reported machine state.
    pub fn machine_state(&self) -> MachineState {
        self.cm.machine_state
    }

    /// Whether a homing cycle has completed.
    pub fn homing_state(&self) -> HomingState {
        self.cm.homing_state
    }

    /// Room for another block.
    pub fn has_capacity(&self) -> bool {
        self.planner.available() >= BLOCK_HEADROOM
    }

    /// Motion queued, executing or still being stepped.
    pub fn is_busy(&self) -> bool {
        self.runtime.is_busy()
            || !self.planner.is_empty()
            || self.link.is_busy()
            || self.producer.len() > 0
    }

    // ========================================================================
    // Block execution
    // ========================================================================

    /// Execute one block in RS274 order of execution.
    ///
    /// Units apply to every word of the block. Modal changes made before a
    /// failing step stay in effect; nothing is queued for a rejected move.
    pub fn execute_block(&mut self, block: &GcodeBlock) -> Result<()> {
        if self.cm.is_homing() {
            return Err(GcodeError::InputError("homing cycle running").into());
        }
        if let Some(line) = block.line {
            self.cm.gm.line = line;
        }
        if let Some(units) = block.units {
            self.cm.set_units_mode(units);
        }
        if let Some(inverse) = block.inverse_feed_rate_mode {
            self.cm.set_inverse_feed_rate_mode(inverse);
        }
        if let Some(feed) = block.feed_rate {
            self.cm.set_feed_rate(feed)?;
        }
        if let Some(speed) = block.spindle_speed {
            self.cm.set_spindle_speed(speed);
        }
        if let Some(tool) = block.tool {
            self.cm.select_tool(tool);
        }
        if block.tool_change {
            self.cm.change_tool();
        }
        if let Some(mode) = block.spindle {
            self.cm.set_spindle_mode(mode);
        }
        if let Some(enable) = block.feed_override {
            self.cm.set_feed_override(enable);
        }
        if block.non_modal == Some(NonModal::Dwell) {
            let seconds = block
                .dwell
                .ok_or(GcodeError::InputError("dwell needs a P word"))?;
            self.dwell(seconds)?;
        }
        if let Some(plane) = block.plane {
            self.cm.select_plane(plane);
        }
        if let Some(mode) = block.path_control {
            self.cm.set_path_control(mode);
        }
        if let Some(mode) = block.distance_mode {
            self.cm.set_distance_mode(mode);
        }

        match block.non_modal {
            Some(NonModal::Home) => self.homing_cycle(&block.axes)?,
            Some(NonModal::ReturnHome) => self.return_to_home(&block.axes)?,
            Some(NonModal::SetOriginOffsets) => self.cm.set_origin_offsets(&block.axes),
            _ => self.execute_motion(block)?,
        }

        match block.program_flow {
            Some(ProgramFlow::Stop) => self.program_stop()?,
            Some(ProgramFlow::End) => self.program_end()?,
            None => {}
        }
        Ok(())
    }

    fn execute_motion(&mut self, block: &GcodeBlock) -> Result<()> {
        if let Some(mode) = block.motion {
            self.cm.gm.motion_mode = mode;
        }
        let mode = self.cm.gm.motion_mode;
        let arc = matches!(mode, MotionMode::ArcCw | MotionMode::ArcCcw);
        let full_circle = arc && block.offsets.iter().any(Option::is_some);
        if !block.has_axis_words() && !full_circle {
            return Ok(());
        }
        if self.cm.gm.inverse_feed_rate_mode
            && mode != MotionMode::Traverse
            && block.feed_rate.is_none()
        {
            return Err(GcodeError::InputError("inverse time move needs an F word").into());
        }

        let target = self.cm.gm.resolve_target(&block.axes, block.machine_coords);
        match mode {
            MotionMode::Traverse => self.queue_straight(target, true),
            MotionMode::Feed => self.queue_straight(target, false),
            MotionMode::ArcCw | MotionMode::ArcCcw => {
                let center = match block.radius {
                    Some(r) => ArcCenter::Radius(r),
                    None => ArcCenter::Offsets(block.offsets),
                };
                self.queue_arc(target, center, mode == MotionMode::ArcCw)
            }
            MotionMode::Cancel => Err(GcodeError::InputError("axis words with G80").into()),
        }
    }

    // ========================================================================
    // Canonical moves
    // ========================================================================

    /// G0 to the axis words (input units, current distance mode).
    pub fn straight_traverse(&mut self, words: &[Option<f64>; AXES]) -> Result<()> {
        let target = self.cm.gm.resolve_target(words, false);
        self.queue_straight(target, true)
    }

    /// G1 to the axis words (input units, current distance mode).
    pub fn straight_feed(&mut self, words: &[Option<f64>; AXES]) -> Result<()> {
        let target = self.cm.gm.resolve_target(words, false);
        self.queue_straight(target, false)
    }

    /// G2 (`clockwise`) or G3 to the axis words; `center` is in input units.
    pub fn arc_feed(
        &mut self,
        words: &[Option<f64>; AXES],
        center: ArcCenter,
        clockwise: bool,
    ) -> Result<()> {
        let target = self.cm.gm.resolve_target(words, false);
        self.queue_arc(target, center, clockwise)
    }

    /// G4
    pub fn dwell(&mut self, seconds: f64) -> Result<()> {
        if seconds.is_nan() || seconds < 0.0 {
            return Err(GcodeError::InputError("negative dwell").into());
        }
        self.planner
            .queue_command(MoveType::Dwell, seconds, self.cm.gm.line)?;
        self.cm.gm.dwell_time = seconds;
        Ok(())
    }

    /// M0, M1, M60: the steppers pause at this point until cycle start.
    pub fn program_stop(&mut self) -> Result<()> {
        self.planner
            .queue_command(MoveType::Stop, 0.0, self.cm.gm.line)
    }

    /// M2, M30: release the motors at this point and reset the modal state.
    pub fn program_end(&mut self) -> Result<()> {
        self.planner
            .queue_command(MoveType::End, 0.0, self.cm.gm.line)?;
        self.cm.gm.program_end_reset();
        Ok(())
    }

    /// Enable all motors once the queue reaches this point.
    pub fn motors_on(&mut self) -> Result<()> {
        self.planner
            .queue_command(MoveType::Start, 0.0, self.cm.gm.line)
    }

    /// G30: traverse through the optional waypoint to the home position.
    pub fn return_to_home(&mut self, words: &[Option<f64>; AXES]) -> Result<()> {
        if words.iter().any(Option::is_some) {
            let waypoint = self.cm.gm.resolve_target(words, false);
            skip_zero_length(self.queue_straight(waypoint, true))?;
        }
        let mut home = self.cm.gm.position;
        for axis in Axis::ALL {
            let cfg = self.config.axis(axis);
            if cfg.mode.is_active() {
                home[axis.index()] = cfg.homing.zero_offset;
            }
        }
        skip_zero_length(self.queue_straight(home, true))
    }

    /// G28: start a homing cycle over the axes with a word on the block.
    ///
    /// The cycle runs from [`poll`](Self::poll).
    pub fn homing_cycle(&mut self, words: &[Option<f64>; AXES]) -> Result<()> {
        if self.cm.is_homing() {
            return Err(GcodeError::InputError("homing cycle running").into());
        }
        info!("homing cycle start");
        self.cm.saved = Some(self.cm.gm.clone());
        self.cm.homing = Some(HomingCycle::new(words));
        self.cm.gm.distance_mode = DistanceMode::Absolute;
        self.cm.gm.inverse_feed_rate_mode = false;
        self.cm.machine_state = MachineState::Homing;
        self.cm.homing_state = HomingState::NotHomed;
        Ok(())
    }

    fn queue_straight(&mut self, target: [f64; AXES], traverse: bool) -> Result<()> {
        if distance(&self.cm.gm.position, &target) < MIN_LINE_LENGTH {
            debug!("zero length move rejected");
            return Err(GcodeError::ZeroLengthMove.into());
        }
        self.cm.check_soft_limits(&self.config, &target)?;
        let minutes = self.cm.move_minutes(&self.config, &target, traverse)?;
        self.cm.gm.target = target;
        if self.config.global.enable_acceleration {
            self.planner.aline(
                &self.config,
                &target,
                minutes,
                self.cm.gm.path_control,
                self.cm.gm.line,
            )?;
        } else {
            self.planner.line(&target, minutes, self.cm.gm.line)?;
        }
        self.moved(target);
        Ok(())
    }

    fn queue_arc(&mut self, target: [f64; AXES], center: ArcCenter, clockwise: bool) -> Result<()> {
        let gm = &self.cm.gm;
        let center = match center {
            ArcCenter::Radius(r) => ArcCenter::Radius(gm.length_to_canonical(r)),
            ArcCenter::Offsets(ijk) => {
                ArcCenter::Offsets(ijk.map(|o| o.map(|v| gm.length_to_canonical(v))))
            }
        };
        let (geometry, length) =
            arc_geometry(&gm.position, &target, center, gm.plane, clockwise)?;
        self.cm.check_soft_limits(&self.config, &target)?;
        let minutes = self.cm.arc_minutes(&self.config, &geometry, length)?;
        self.cm.gm.target = target;
        self.planner.arc(
            &self.config,
            &target,
            geometry,
            length,
            minutes,
            self.cm.gm.line,
        )?;

        match center {
            ArcCenter::Radius(r) => self.cm.gm.arc_radius = r,
            ArcCenter::Offsets(ijk) => self.cm.gm.arc_offset = ijk.map(|o| o.unwrap_or(0.0)),
        }
        self.moved(target);
        Ok(())
    }

    fn moved(&mut self, target: [f64; AXES]) {
        self.cm.gm.position = target;
        if !self.cm.is_homing() && self.cm.machine_state != MachineState::Hold {
            self.cm.machine_state = MachineState::Run;
        }
    }

    // ========================================================================
    // Main loop
    // ========================================================================

    /// Run the segment generator and the homing cycle once.
    ///
    /// `Pending` while work remains, `Ready(Ok(()))` when the queue is
    /// drained or held. A stepper fault re-initializes the core and is
    /// returned as an error.
    pub fn poll(&mut self) -> Poll<Result<()>> {
        if self.link.take_fault() {
            error!("stepper fault, resetting motion");
            self.async_end();
            return Poll::Ready(Err(MotionError::RuntimeFault.into()));
        }

        let exec = self.runtime.exec(
            &mut self.planner,
            &self.config,
            &mut self.producer,
            self.link,
        );
        self.update_state();

        let exec = match exec {
            Poll::Ready(Err(e)) => {
                if e.status().is_fatal() {
                    self.async_end();
                }
                return Poll::Ready(Err(e));
            }
            other => other,
        };

        if self.cm.is_homing() {
            return match self.drive_homing() {
                Ok(()) => Poll::Pending,
                Err(e) => Poll::Ready(Err(e)),
            };
        }
        exec
    }

    fn update_state(&mut self) {
        match self.runtime.take_marker() {
            Some(MoveType::Stop) | Some(MoveType::End) => {
                self.cm.machine_state = MachineState::Stop;
            }
            _ => {}
        }

        let hold = self.runtime.hold();
        match self.cm.machine_state {
            MachineState::Resume if hold == HoldState::Off => {
                self.cm.machine_state = MachineState::Run;
            }
            MachineState::Run if !self.is_busy() => {
                self.cm.machine_state = MachineState::Stop;
            }
            _ => {}
        }

        let interval = self.config.global.status_report_interval;
        self.report_counter = self
            .report_counter
            .saturating_add(self.runtime.take_segment_count());
        if interval > 0 && self.report_counter >= interval {
            self.report_counter = 0;
            self.report = Some(self.status_report());
        }
    }

    fn drive_homing(&mut self) -> Result<()> {
        if self.runtime.hold() == HoldState::Hold {
            self.planner.flush();
            self.runtime.abort();
            self.sync_positions();
        }
        if self.is_busy() || self.runtime.hold() != HoldState::Off {
            return Ok(());
        }

        let step = match self.cm.homing.as_mut() {
            Some(cycle) => cycle.next(&self.config, &self.switches),
            None => return Ok(()),
        };
        let action = match step {
            Ok(action) => action,
            Err(e) => {
                warn!("homing cycle failed");
                self.end_homing(false);
                return Err(e);
            }
        };

        let result = match action {
            HomingAction::Jog {
                axis,
                distance,
                velocity,
            } => {
                let mut target = self.cm.gm.position;
                target[axis.index()] += distance;
                let minutes = libm::fabs(distance) / velocity;
                self.queue_homing_move(target, minutes)
            }
            HomingAction::SetPosition { axis, value } => {
                self.cm.gm.position[axis.index()] = value;
                self.planner.set_axis_position(axis, value);
                self.runtime.set_position(self.cm.gm.position);
                Ok(())
            }
            HomingAction::Waypoint(words) => {
                let target = match self.cm.saved.as_ref() {
                    Some(saved) => {
                        let mut gm = saved.clone();
                        gm.position = self.cm.gm.position;
                        gm.resolve_target(&words, false)
                    }
                    None => self.cm.gm.position,
                };
                self.homing_traverse(target)
            }
            HomingAction::Traverse(words) => {
                let mut target = self.cm.gm.position;
                for (t, w) in target.iter_mut().zip(words.iter()) {
                    if let Some(value) = w {
                        *t = *value;
                    }
                }
                self.homing_traverse(target)
            }
            HomingAction::Finish => {
                let homed = self
                    .cm
                    .homing
                    .as_ref()
                    .map_or(false, |c| c.homed().iter().any(|h| *h));
                info!("homing cycle complete");
                self.end_homing(homed);
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("homing move rejected");
            self.end_homing(false);
            return Err(e);
        }
        Ok(())
    }

    fn homing_traverse(&mut self, target: [f64; AXES]) -> Result<()> {
        if distance(&self.cm.gm.position, &target) < MIN_LINE_LENGTH {
            return Ok(());
        }
        let minutes = self.cm.move_minutes(&self.config, &target, true)?;
        self.queue_homing_move(target, minutes)
    }

    fn queue_homing_move(&mut self, target: [f64; AXES], minutes: f64) -> Result<()> {
        let queued = self.planner.aline(
            &self.config,
            &target,
            minutes,
            PathControl::ExactStop,
            self.cm.gm.line,
        );
        match queued {
            Ok(()) => {
                self.cm.gm.position = target;
                Ok(())
            }
            Err(e) => skip_zero_length(Err(e)),
        }
    }

    /// Restore the model saved at the start of the cycle, keeping the position.
    fn end_homing(&mut self, homed: bool) {
        if let Some(mut saved) = self.cm.saved.take() {
            saved.position = self.cm.gm.position;
            saved.target = self.cm.gm.position;
            self.cm.gm = saved;
        }
        self.cm.homing = None;
        self.cm.machine_state = MachineState::Stop;
        self.cm.homing_state = if homed {
            HomingState::Homed
        } else {
            HomingState::NotHomed
        };
    }

    fn sync_positions(&mut self) {
        let position = self.runtime.position();
        self.planner.set_position(position);
        self.cm.gm.position = position;
        self.cm.gm.target = position;
    }

    // ========================================================================
    // Feedhold and stops
    // ========================================================================

    /// Decelerate to a stop and hold.
    pub fn feedhold(&mut self) {
        self.runtime.feedhold();
        if self.cm.machine_state == MachineState::Run {
            self.cm.machine_state = MachineState::Hold;
        }
    }

    /// Resume from a feedhold or a program stop.
    pub fn cycle_start(&mut self) {
        self.runtime.cycle_start();
        self.link.resume();
        match self.cm.machine_state {
            MachineState::Hold => self.cm.machine_state = MachineState::Resume,
            MachineState::Stop | MachineState::Reset if self.is_busy() => {
                self.cm.machine_state = MachineState::Run;
            }
            _ => {}
        }
    }

    /// Stop the steppers now and discard all queued motion.
    ///
    /// The model position is set to the last position handed to the steppers.
    pub fn async_stop(&mut self) {
        warn!("async stop");
        self.link.request_halt();
        self.planner.flush();
        self.runtime.abort();
        self.sync_positions();
        if let Some(mut saved) = self.cm.saved.take() {
            saved.position = self.cm.gm.position;
            saved.target = self.cm.gm.position;
            self.cm.gm = saved;
        }
        self.cm.homing = None;
        self.cm.machine_state = MachineState::Stop;
    }

    /// Async stop, then reset the Gcode model and the machine state.
    pub fn async_end(&mut self) {
        self.async_stop();
        warn!("async end");
        let position = self.cm.gm.position;
        self.cm = CanonicalMachine::new(&self.config.gcode);
        self.cm.gm.position = position;
        self.cm.gm.target = position;
        self.report_counter = 0;
        self.report = None;
    }

    /// A limit or homing switch changed.
    ///
    /// During homing a closing switch on the axis being searched stops the
    /// move. Otherwise a closing limit switch stops the machine and returns
    /// `MaxTravelExceeded`.
    pub fn switch_event(&mut self, axis: Axis, closed: bool) -> Result<()> {
        self.switches[axis.index()] = closed;
        if !closed {
            return Ok(());
        }
        if let Some(cycle) = self.cm.homing.as_mut() {
            if cycle.on_switch(axis) {
                debug!("homing switch hit on axis {}", axis.index());
                self.runtime.feedhold();
            }
            return Ok(());
        }
        if self.config.axis(axis).switch_mode.limits() {
            self.async_stop();
            return Err(GcodeError::MaxTravelExceeded {
                axis: axis.index() as u8,
            }
            .into());
        }
        Ok(())
    }

    // ========================================================================
    // Reports
    // ========================================================================

    /// Report for the current runtime position.
    pub fn status_report(&self) -> StatusReport {
        StatusReport::new(
            &self.cm.gm,
            self.cm.machine_state,
            self.runtime.line(),
            &self.runtime.position(),
            self.runtime.velocity(),
        )
    }

    /// Periodic report due since the last call, if any.
    pub fn take_status_report(&mut self) -> Option<StatusReport> {
        self.report.take()
    }
}

fn skip_zero_length(result: Result<()>) -> Result<()> {
    match result {
        Err(Error::Gcode(GcodeError::ZeroLengthMove)) => Ok(()),
        other => other,
    }
}

fn distance(a: &[f64; AXES], b: &[f64; AXES]) -> f64 {
    libm::sqrt(a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum())
}
