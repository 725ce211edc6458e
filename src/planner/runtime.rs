//! Segment generator.
//!
//! Turns the run buffer into constant-time line segments for the motor
//! queue. An aline runs through head, body and tail sections; head and
//! tail are split into a concave and a convex half whose segment
//! velocities follow the constant-jerk S-curve. Arcs are chopped into
//! chords, dwells and program flow buffers become one motor queue entry.
//!
//! Feedhold is handled here too: at the next segment boundary of an aline
//! or arc the rest of the move is replaced by a deceleration to zero. An
//! arc keeps following its curve while it slows down.

use core::task::Poll;

use super::buffer::{ArcGeometry, BufferState, MoveType};
use super::zoid::{optimal_length, EPSILON};
use super::Planner;
use crate::config::{MachineConfig, AXES, MICROSECONDS_PER_MINUTE, MOTORS};
use crate::error::{MotionError, Result};
use crate::kinematics;
use crate::stepper::{Segment, SegmentKind, SegmentProducer, StepperLink};

/// Feedhold progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HoldState {
    /// Running normally.
    #[default]
    Off,
    /// Hold requested; waiting for a segment boundary with room to stop.
    Sync,
    /// Decelerating to zero.
    Decel,
    /// Stopped; the rest of the queue is planned from rest.
    Hold,
    /// Resume requested.
    EndHold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Head,
    Body,
    Tail,
}

impl Section {
    const fn index(self) -> usize {
        match self {
            Section::Head => 0,
            Section::Body => 1,
            Section::Tail => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Half {
    Init,
    First,
    Second,
}

/// Runtime state of the move being executed.
#[derive(Debug, Clone)]
pub struct Runtime {
    active: Option<u8>,
    move_type: MoveType,
    line: u32,
    section: Section,
    half: Half,

    target: [f64; AXES],
    unit: [f64; AXES],
    ends: [[f64; AXES]; 3],
    head_length: f64,
    body_length: f64,
    tail_length: f64,
    entry_velocity: f64,
    cruise_velocity: f64,
    exit_velocity: f64,
    jerk: f64,

    segments: u32,
    index: u32,
    segment_time: f64,
    flat: bool,
    ramp_start: f64,
    midpoint_velocity: f64,
    midpoint_acceleration: f64,
    jerk_div2: f64,

    arc: ArcGeometry,
    theta: f64,
    arc_length: f64,
    arc_done: f64,
    chord_length: f64,
    ramp_done: f64,

    position: [f64; AXES],
    residual: [f64; MOTORS],
    velocity: f64,
    fresh: bool,
    braking: bool,
    hold: HoldState,
    segment_count: u32,
    marker: Option<MoveType>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Idle runtime at the origin.
    pub fn new() -> Self {
        Self {
            active: None,
            move_type: MoveType::Null,
            line: 0,
            section: Section::Head,
            half: Half::Init,
            target: [0.0; AXES],
            unit: [0.0; AXES],
            ends: [[0.0; AXES]; 3],
            head_length: 0.0,
            body_length: 0.0,
            tail_length: 0.0,
            entry_velocity: 0.0,
            cruise_velocity: 0.0,
            exit_velocity: 0.0,
            jerk: 0.0,
            segments: 0,
            index: 0,
            segment_time: 0.0,
            flat: false,
            ramp_start: 0.0,
            midpoint_velocity: 0.0,
            midpoint_acceleration: 0.0,
            jerk_div2: 0.0,
            arc: ArcGeometry::default(),
            theta: 0.0,
            arc_length: 0.0,
            arc_done: 0.0,
            chord_length: 0.0,
            ramp_done: 0.0,
            position: [0.0; AXES],
            residual: [0.0; MOTORS],
            velocity: 0.0,
            fresh: false,
            braking: false,
            hold: HoldState::Off,
            segment_count: 0,
            marker: None,
        }
    }

    /// Position after the last emitted segment.
    pub fn position(&self) -> [f64; AXES] {
        self.position
    }

    /// Overwrite the runtime position (idle only).
    pub fn set_position(&mut self, position: [f64; AXES]) {
        self.position = position;
        self.residual = [0.0; MOTORS];
    }

    /// Velocity of the last emitted segment (mm/min).
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Line number of the executing move.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// A move is being executed.
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Feedhold state.
    pub fn hold(&self) -> HoldState {
        self.hold
    }

    /// Segments emitted since the last call.
    pub fn take_segment_count(&mut self) -> u32 {
        core::mem::take(&mut self.segment_count)
    }

    /// Program flow marker emitted since the last call.
    pub(crate) fn take_marker(&mut self) -> Option<MoveType> {
        self.marker.take()
    }

    /// Request a feedhold.
    pub fn feedhold(&mut self) {
        if self.hold == HoldState::Off {
            self.hold = HoldState::Sync;
        }
    }

    /// Leave a feedhold.
    pub fn cycle_start(&mut self) {
        self.hold = match self.hold {
            HoldState::Sync => HoldState::Off,
            HoldState::Decel | HoldState::Hold => HoldState::EndHold,
            other => other,
        };
    }

    /// Drop the executing move and any hold.
    pub fn abort(&mut self) {
        self.active = None;
        self.move_type = MoveType::Null;
        self.section = Section::Head;
        self.half = Half::Init;
        self.braking = false;
        self.hold = HoldState::Off;
        self.velocity = 0.0;
        self.marker = None;
    }

    /// Advance the run buffer by at most one motor queue entry.
    ///
    /// `Ready(Ok(()))` when there is nothing to run (queue empty or held),
    /// `Pending` when more work remains.
    pub fn exec(
        &mut self,
        planner: &mut Planner,
        config: &MachineConfig,
        producer: &mut SegmentProducer<'_>,
        link: &StepperLink,
    ) -> Poll<Result<()>> {
        if self.hold == HoldState::Hold {
            return Poll::Ready(Ok(()));
        }
        if self.hold == HoldState::EndHold && !self.braking {
            self.hold = HoldState::Off;
        }
        if !producer.ready() {
            return Poll::Pending;
        }

        let i = match self.active {
            Some(i) => i,
            None => match planner.ring_mut().run_buffer() {
                Some(i) => {
                    self.start(i, planner, config);
                    i
                }
                None => {
                    self.velocity = 0.0;
                    if self.hold == HoldState::Sync {
                        self.hold = HoldState::Hold;
                    }
                    return Poll::Ready(Ok(()));
                }
            },
        };

        let done = match self.move_type {
            MoveType::Aline | MoveType::Line => self.step_move(config, producer, link),
            MoveType::Arc => self.step_arc(config, producer, link),
            MoveType::Dwell => {
                let seconds = planner.ring().get(i).time;
                enqueue(producer, link, Segment::dwell(seconds)).map(|_| true)
            }
            MoveType::Start | MoveType::Stop | MoveType::End => {
                let kind = match self.move_type {
                    MoveType::Start => SegmentKind::Start,
                    MoveType::Stop => SegmentKind::Stop,
                    _ => SegmentKind::End,
                };
                self.marker = Some(self.move_type);
                enqueue(producer, link, Segment::marker(kind)).map(|_| true)
            }
            MoveType::Null => Ok(true),
        };

        match done {
            Ok(true) => {
                self.finish(i, planner, config);
                Poll::Pending
            }
            Ok(false) => Poll::Pending,
            Err(e) => {
                error!("runtime aborted move");
                planner.ring_mut().release(i);
                self.active = None;
                Poll::Ready(Err(e))
            }
        }
    }

    fn start(&mut self, i: u8, planner: &mut Planner, config: &MachineConfig) {
        let b = planner.ring_mut().get_mut(i);
        b.state = BufferState::Running;
        let b = *b;

        self.active = Some(i);
        self.move_type = b.move_type;
        self.line = b.line;
        self.target = b.target;
        self.unit = b.unit;
        self.head_length = b.head_length;
        self.body_length = b.body_length;
        self.tail_length = b.tail_length;
        self.entry_velocity = b.entry_velocity;
        self.cruise_velocity = if b.cruise_velocity > EPSILON {
            b.cruise_velocity
        } else {
            b.cruise_velocity_set
        };
        self.exit_velocity = b.exit_velocity;
        self.jerk = b.jerk;
        self.section = Section::Head;
        self.half = Half::Init;
        self.fresh = true;
        self.braking = false;

        let start = self.position;
        self.ends = [b.target; 3];
        if b.body_length + b.tail_length >= EPSILON {
            self.ends[0] = along(&start, &b.unit, b.head_length);
        }
        if b.tail_length >= EPSILON {
            self.ends[1] = along(&start, &b.unit, b.head_length + b.body_length);
        }

        if b.move_type == MoveType::Arc {
            let min = config.min_segment_minutes();
            let mut n = libm::ceil(b.length / config.global.arc_segment_len);
            let cap = libm::floor(b.time / min);
            if n > cap {
                n = cap;
            }
            let n = n.max(1.0);
            self.arc = b.arc;
            self.theta = b.arc.theta;
            self.arc_length = b.length;
            self.arc_done = 0.0;
            self.chord_length = b.length / n;
            self.segments = if b.length < EPSILON { 0 } else { n as u32 };
            self.segment_time = b.time / n;
            self.cruise_velocity = if b.time > 0.0 { b.length / b.time } else { 0.0 };
            self.index = 0;
        }
    }

    fn finish(&mut self, i: u8, planner: &mut Planner, config: &MachineConfig) {
        self.active = None;
        if self.braking {
            self.braking = false;
            let resume = match self.hold {
                HoldState::Decel => Some(HoldState::Hold),
                HoldState::EndHold => Some(HoldState::Off),
                _ => None,
            };
            if let Some(next) = resume {
                self.hold = next;
                info!("feedhold complete");
                if self.move_type == MoveType::Arc {
                    planner
                        .ring_mut()
                        .get_mut(i)
                        .trim_arc(self.theta, self.arc_done);
                }
                planner.replan_from_hold(i, &self.position, config);
                return;
            }
        }
        planner.ring_mut().release(i);
    }

    /// Replace the rest of the running aline by a deceleration.
    fn begin_hold(&mut self) {
        let v = if self.fresh {
            self.velocity.min(self.entry_velocity)
        } else {
            self.velocity
        };
        let remaining = distance(&self.position, &self.target);
        self.braking = true;
        if remaining < EPSILON {
            return;
        }

        let braking_length = if v > EPSILON {
            optimal_length(v, 0.0, self.jerk)
        } else {
            0.0
        };
        self.head_length = 0.0;
        self.body_length = 0.0;
        self.entry_velocity = v;
        self.cruise_velocity = v;
        if braking_length <= remaining {
            self.tail_length = braking_length;
            self.exit_velocity = 0.0;
            self.ends[2] = along(&self.position, &self.unit, braking_length);
            self.hold = HoldState::Decel;
        } else {
            // too short to stop: slow down now, stop in a later move
            self.tail_length = remaining;
            self.exit_velocity = reachable_exit(v, remaining, self.jerk);
            self.ends[2] = self.target;
        }
        self.section = Section::Tail;
        self.half = Half::Init;
        debug!("feedhold from {} over {}", v, self.tail_length);
    }

    fn step_move(
        &mut self,
        config: &MachineConfig,
        producer: &mut SegmentProducer<'_>,
        link: &StepperLink,
    ) -> Result<bool> {
        if self.hold == HoldState::Sync && self.move_type == MoveType::Aline && !self.braking {
            self.begin_hold();
        }

        loop {
            match (self.section, self.half) {
                (Section::Head, Half::Init) => {
                    if self.head_length < EPSILON {
                        self.enter(Section::Body);
                        continue;
                    }
                    self.init_ramp(self.head_length, self.entry_velocity, self.cruise_velocity, config);
                }
                (Section::Body, Half::Init) => {
                    if self.body_length < EPSILON {
                        self.enter(Section::Tail);
                        continue;
                    }
                    let min = config.min_segment_minutes();
                    let t = if self.cruise_velocity > EPSILON {
                        self.body_length / self.cruise_velocity
                    } else {
                        min
                    };
                    let n = libm::floor(t / min).max(1.0);
                    self.segments = n as u32;
                    self.segment_time = t / n;
                    self.index = 0;
                    self.flat = false;
                    self.half = Half::First;
                }
                (Section::Tail, Half::Init) => {
                    if self.tail_length < EPSILON {
                        return Ok(true);
                    }
                    self.init_ramp(self.tail_length, self.cruise_velocity, self.exit_velocity, config);
                }
                (section, half) => {
                    let t = (self.index as f64 + 0.5) * self.segment_time;
                    let v = if self.flat {
                        self.midpoint_velocity
                    } else {
                        self.ramp_velocity(t)
                    };
                    self.index += 1;
                    let last_of_half = self.index >= self.segments;
                    let last_of_section = last_of_half
                        && (self.flat || half == Half::Second || section == Section::Body);

                    let end = if last_of_section {
                        self.ends[section.index()]
                    } else {
                        along(&self.position, &self.unit, v * self.segment_time)
                    };
                    self.emit_to(&end, self.segment_time, v, config, producer, link)?;

                    if last_of_section {
                        match section {
                            Section::Head => self.enter(Section::Body),
                            Section::Body => self.enter(Section::Tail),
                            Section::Tail => return Ok(true),
                        }
                    } else if last_of_half {
                        self.half = Half::Second;
                        self.index = 0;
                    }
                    return Ok(false);
                }
            }
        }
    }

    fn enter(&mut self, section: Section) {
        self.section = section;
        self.half = Half::Init;
    }

    fn init_ramp(&mut self, length: f64, v0: f64, v1: f64, config: &MachineConfig) {
        let min = config.min_segment_minutes();
        let sum = v0 + v1;
        let t = if sum > EPSILON { 2.0 * length / sum } else { min };
        let jerk = 4.0 * libm::fabs(v1 - v0) / (t * t);

        self.ramp_start = v0;
        self.midpoint_velocity = sum / 2.0;
        self.jerk_div2 = jerk / 2.0;
        self.midpoint_acceleration = jerk * t / 2.0;
        self.index = 0;
        self.half = Half::First;

        let n = libm::round(t / min / 2.0);
        if n < 1.0 {
            self.flat = true;
            self.segments = 1;
            self.segment_time = t;
        } else {
            self.flat = false;
            self.segments = n as u32;
            self.segment_time = t / (2.0 * n);
        }
    }

    /// Velocity at elapsed time `t` into the current half.
    fn ramp_velocity(&self, t: f64) -> f64 {
        let jt2 = self.jerk_div2 * t * t;
        match (self.section, self.half) {
            (Section::Head, Half::First) => self.ramp_start + jt2,
            (Section::Head, _) => self.midpoint_velocity + self.midpoint_acceleration * t - jt2,
            (Section::Tail, Half::First) => self.ramp_start - jt2,
            (Section::Tail, _) => self.midpoint_velocity - self.midpoint_acceleration * t + jt2,
            (Section::Body, _) => self.cruise_velocity,
        }
    }

    fn step_arc(
        &mut self,
        config: &MachineConfig,
        producer: &mut SegmentProducer<'_>,
        link: &StepperLink,
    ) -> Result<bool> {
        if self.segments == 0 {
            return Ok(true);
        }
        if self.hold == HoldState::Sync && !self.braking {
            self.begin_arc_hold(config);
        }
        if self.braking {
            return self.step_arc_hold(config, producer, link);
        }

        self.index += 1;
        let last = self.index >= self.segments;
        let end = if last {
            self.target
        } else {
            self.along_arc(self.chord_length)
        };
        self.emit_to(&end, self.segment_time, self.cruise_velocity, config, producer, link)?;
        self.arc_done += self.chord_length;
        Ok(last)
    }

    /// Replace the remaining chords by a deceleration along the curve.
    ///
    /// Left in `Sync` when the rest of the arc is too short to stop in; the
    /// next move gets the chance instead.
    fn begin_arc_hold(&mut self, config: &MachineConfig) {
        let v = self.cruise_velocity;
        let remaining = self.arc_length - self.arc_done;
        if self.jerk <= 0.0 || v <= EPSILON {
            return;
        }
        let braking_length = optimal_length(v, 0.0, self.jerk);
        if braking_length > remaining {
            return;
        }
        self.braking = true;
        self.hold = HoldState::Decel;
        self.section = Section::Tail;
        self.tail_length = braking_length;
        self.ramp_done = 0.0;
        self.init_ramp(braking_length, v, 0.0, config);
        debug!("arc feedhold from {} over {}", v, braking_length);
    }

    fn step_arc_hold(
        &mut self,
        config: &MachineConfig,
        producer: &mut SegmentProducer<'_>,
        link: &StepperLink,
    ) -> Result<bool> {
        let t = (self.index as f64 + 0.5) * self.segment_time;
        let v = if self.flat {
            self.midpoint_velocity
        } else {
            self.ramp_velocity(t)
        };
        self.index += 1;
        let last_of_half = self.index >= self.segments;
        let last = last_of_half && (self.flat || self.half == Half::Second);

        let d = if last {
            self.tail_length - self.ramp_done
        } else {
            v * self.segment_time
        };
        let end = self.along_arc(d);
        self.emit_to(&end, self.segment_time, v, config, producer, link)?;
        self.ramp_done += d;
        self.arc_done += d;

        if last {
            return Ok(true);
        }
        if last_of_half {
            self.half = Half::Second;
            self.index = 0;
        }
        Ok(false)
    }

    /// Point `d` further along the arc from the current position.
    fn along_arc(&mut self, d: f64) -> [f64; AXES] {
        let g = self.arc;
        let fraction = if self.arc_length > 0.0 { d / self.arc_length } else { 0.0 };
        self.theta += g.angular_travel * fraction;
        let mut end = self.position;
        end[g.axis_1.index()] = g.center_1 + libm::sin(self.theta) * g.radius;
        end[g.axis_2.index()] = g.center_2 + libm::cos(self.theta) * g.radius;
        end[g.axis_linear.index()] += g.linear_travel * fraction;
        end
    }

    /// Queue one line segment ending at `end`.
    ///
    /// Fractional steps are carried per motor so that rounding never
    /// accumulates across segments.
    fn emit_to(
        &mut self,
        end: &[f64; AXES],
        minutes: f64,
        velocity: f64,
        config: &MachineConfig,
        producer: &mut SegmentProducer<'_>,
        link: &StepperLink,
    ) -> Result<()> {
        let mut travel = [0.0; AXES];
        for k in 0..AXES {
            travel[k] = end[k] - self.position[k];
        }
        if travel.iter().any(|t| !t.is_finite()) || !minutes.is_finite() {
            return Err(MotionError::FloatingPoint.into());
        }

        let fractional = kinematics::motor_travel(&travel, config);
        let mut steps = [0i32; MOTORS];
        for m in 0..MOTORS {
            let total = fractional[m] + self.residual[m];
            let whole = libm::round(total);
            steps[m] = whole as i32;
            self.residual[m] = total - whole;
        }

        let (segment, clamped) = Segment::line(&steps, minutes * MICROSECONDS_PER_MINUTE);
        if clamped {
            warn!("segment step count clamped to {} ticks", segment.timer_ticks);
        }
        enqueue(producer, link, segment)?;

        self.position = *end;
        self.velocity = velocity;
        self.fresh = false;
        self.segment_count = self.segment_count.wrapping_add(1);
        Ok(())
    }
}

fn enqueue(producer: &mut SegmentProducer<'_>, link: &StepperLink, segment: Segment) -> Result<()> {
    producer
        .enqueue(segment)
        .map_err(|_| MotionError::BufferFull)?;
    link.request_load();
    Ok(())
}

fn along(start: &[f64; AXES], unit: &[f64; AXES], length: f64) -> [f64; AXES] {
    let mut p = *start;
    for k in 0..AXES {
        p[k] += unit[k] * length;
    }
    p
}

fn distance(a: &[f64; AXES], b: &[f64; AXES]) -> f64 {
    libm::sqrt(a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum())
}

/// Lowest exit velocity reachable from `v` over `length`.
fn reachable_exit(v: f64, length: f64, jerk: f64) -> f64 {
    let (mut lo, mut hi) = (0.0, v);
    for _ in 0..64 {
        let mid = 0.5 * (lo + hi);
        if optimal_length(v, mid, jerk) > length {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    hi
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::PathControl;
    use crate::stepper::{MotorQueue, SegmentConsumer};

    struct Sink {
        steps: [i64; MOTORS],
        lines: u32,
        dwells: u32,
        markers: u32,
    }

    fn drain(consumer: &mut SegmentConsumer<'_>, sink: &mut Sink) {
        while let Some(s) = consumer.dequeue() {
            match s.kind {
                SegmentKind::Line => {
                    sink.lines += 1;
                    for m in 0..MOTORS {
                        sink.steps[m] += s.signed_steps(m);
                    }
                }
                SegmentKind::Dwell => sink.dwells += 1,
                _ => sink.markers += 1,
            }
        }
    }

    fn run(
        runtime: &mut Runtime,
        planner: &mut Planner,
        cfg: &MachineConfig,
        producer: &mut SegmentProducer<'_>,
        consumer: &mut SegmentConsumer<'_>,
        sink: &mut Sink,
        limit: u32,
    ) {
        let link = StepperLink::new();
        for _ in 0..limit {
            match runtime.exec(planner, cfg, producer, &link) {
                Poll::Ready(Ok(())) => break,
                Poll::Ready(Err(e)) => panic!("runtime error: {}", e),
                Poll::Pending => drain(consumer, sink),
            }
        }
        drain(consumer, sink);
    }

    fn sink() -> Sink {
        Sink {
            steps: [0; MOTORS],
            lines: 0,
            dwells: 0,
            markers: 0,
        }
    }

    fn xy(x: f64, y: f64) -> [f64; AXES] {
        [x, y, 0.0, 0.0, 0.0, 0.0]
    }

    #[test]
    fn test_line_reaches_exact_step_count() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        let mut runtime = Runtime::new();
        let mut queue = MotorQueue::new();
        let (mut producer, mut consumer) = queue.split();
        let mut out = sink();

        planner
            .aline(&cfg, &xy(100.0, 0.0), 0.1, PathControl::Continuous, 1)
            .unwrap();
        run(&mut runtime, &mut planner, &cfg, &mut producer, &mut consumer, &mut out, 100_000);

        assert_eq!(out.steps[0], 32_000);
        assert_eq!(out.steps[1], 0);
        assert_eq!(runtime.position(), xy(100.0, 0.0));
        assert!(planner.is_empty());
        assert!(!runtime.is_busy());
        // roughly 6 s at 5 ms per segment
        assert!(out.lines > 1000 && out.lines < 1400, "{}", out.lines);
    }

    #[test]
    fn test_segment_velocities_stay_below_cruise() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        let mut runtime = Runtime::new();
        let mut queue = MotorQueue::new();
        let (mut producer, mut consumer) = queue.split();
        let link = StepperLink::new();

        planner
            .aline(&cfg, &xy(20.0, 0.0), 0.02, PathControl::Continuous, 1)
            .unwrap();
        let mut peak: f64 = 0.0;
        for _ in 0..10_000 {
            match runtime.exec(&mut planner, &cfg, &mut producer, &link) {
                Poll::Ready(_) => break,
                Poll::Pending => {
                    peak = peak.max(runtime.velocity());
                    while consumer.dequeue().is_some() {}
                }
            }
        }
        assert!(peak <= 1000.0 + 1e-6);
        assert!(peak > 990.0);
    }

    #[test]
    fn test_dwell_and_markers_pass_through() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        let mut runtime = Runtime::new();
        let mut queue = MotorQueue::new();
        let (mut producer, mut consumer) = queue.split();
        let mut out = sink();

        planner.queue_command(MoveType::Start, 0.0, 0).unwrap();
        planner.queue_command(MoveType::Dwell, 0.5, 0).unwrap();
        planner.queue_command(MoveType::End, 0.0, 0).unwrap();
        run(&mut runtime, &mut planner, &cfg, &mut producer, &mut consumer, &mut out, 100);

        assert_eq!(out.dwells, 1);
        assert_eq!(out.markers, 2);
        assert_eq!(runtime.take_marker(), Some(MoveType::End));
        assert!(planner.is_empty());
    }

    #[test]
    fn test_feedhold_stops_short_and_resumes() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        let mut runtime = Runtime::new();
        let mut queue = MotorQueue::new();
        let (mut producer, mut consumer) = queue.split();
        let mut out = sink();

        planner
            .aline(&cfg, &xy(100.0, 0.0), 0.1, PathControl::Continuous, 1)
            .unwrap();
        run(&mut runtime, &mut planner, &cfg, &mut producer, &mut consumer, &mut out, 400);
        assert!(runtime.is_busy());

        runtime.feedhold();
        run(&mut runtime, &mut planner, &cfg, &mut producer, &mut consumer, &mut out, 100_000);
        assert_eq!(runtime.hold(), HoldState::Hold);
        let held = runtime.position()[0];
        assert!(held > 10.0 && held < 100.0, "{}", held);
        assert!(!planner.is_empty());

        let run_buffer = planner.ring().peek_run().unwrap();
        assert_eq!(planner.ring().get(run_buffer).entry_velocity, 0.0);

        runtime.cycle_start();
        run(&mut runtime, &mut planner, &cfg, &mut producer, &mut consumer, &mut out, 100_000);
        assert_eq!(runtime.hold(), HoldState::Off);
        assert_eq!(out.steps[0], 32_000);
        assert!(planner.is_empty());
    }

    #[test]
    fn test_arc_chords_end_on_target() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        let mut runtime = Runtime::new();
        let mut queue = MotorQueue::new();
        let (mut producer, mut consumer) = queue.split();
        let mut out = sink();

        let geometry = ArcGeometry {
            theta: -core::f64::consts::FRAC_PI_2,
            radius: 5.0,
            angular_travel: core::f64::consts::PI,
            center_1: 5.0,
            ..ArcGeometry::default()
        };
        let length = 5.0 * core::f64::consts::PI;
        planner
            .arc(&cfg, &xy(10.0, 0.0), geometry, length, length / 600.0, 1)
            .unwrap();
        run(&mut runtime, &mut planner, &cfg, &mut producer, &mut consumer, &mut out, 10_000);

        assert_eq!(out.lines, 158);
        assert_eq!(out.steps[0], 3200);
        assert_eq!(out.steps[1], 0);
        assert_eq!(runtime.position(), xy(10.0, 0.0));
    }

    #[test]
    fn test_feedhold_during_arc_stays_on_the_curve() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        let mut runtime = Runtime::new();
        let mut queue = MotorQueue::new();
        let (mut producer, mut consumer) = queue.split();
        let mut out = sink();

        let geometry = ArcGeometry {
            theta: -core::f64::consts::FRAC_PI_2,
            radius: 5.0,
            angular_travel: core::f64::consts::PI,
            center_1: 5.0,
            ..ArcGeometry::default()
        };
        let length = 5.0 * core::f64::consts::PI;
        planner
            .arc(&cfg, &xy(10.0, 0.0), geometry, length, length / 600.0, 1)
            .unwrap();
        run(&mut runtime, &mut planner, &cfg, &mut producer, &mut consumer, &mut out, 20);
        assert!(runtime.is_busy());

        runtime.feedhold();
        run(&mut runtime, &mut planner, &cfg, &mut producer, &mut consumer, &mut out, 100_000);
        assert_eq!(runtime.hold(), HoldState::Hold);
        assert!(runtime.velocity() < 50.0, "{}", runtime.velocity());
        let p = runtime.position();
        let r = libm::sqrt((p[0] - 5.0) * (p[0] - 5.0) + p[1] * p[1]);
        assert!((r - 5.0).abs() < 1e-9, "{}", r);
        assert!(p[0] < 10.0 - 1.0, "{:?}", p);
        assert!(!planner.is_empty());

        runtime.cycle_start();
        run(&mut runtime, &mut planner, &cfg, &mut producer, &mut consumer, &mut out, 100_000);
        assert_eq!(runtime.hold(), HoldState::Off);
        assert_eq!(out.steps[0], 3200);
        assert_eq!(out.steps[1], 0);
        assert!(planner.is_empty());
    }

    #[test]
    fn test_reachable_exit() {
        let jerk = 50_000_000.0;
        let vx = reachable_exit(1000.0, 1.0, jerk);
        assert!(vx > 0.0 && vx < 1000.0);
        assert!((optimal_length(1000.0, vx, jerk) - 1.0).abs() < 1e-6);
    }
}
