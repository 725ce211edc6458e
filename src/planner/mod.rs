//! Look-ahead motion planner.
//!
//! Moves enter a bounded ring ([`PlannerRing`]). Every new line is shaped
//! into a jerk-limited trapezoid ([`zoid`]) and the replannable tail of the
//! queue is re-optimized: a backward pass propagates braking limits from
//! the newest move, a forward pass replans each move from its predecessor's
//! exit velocity.

mod buffer;
pub mod runtime;
pub mod zoid;

pub use buffer::{
    ArcGeometry, BufferState, MoveBuffer, MoveType, PlannerRing, PLANNER_BUFFERS,
};
pub use runtime::{HoldState, Runtime};
pub use zoid::Zoid;

use crate::canonical::PathControl;
use crate::config::{Axis, MachineConfig, AXES};
use crate::error::{GcodeError, MotionError, Result};

use zoid::{get_segments, junction_velocity, velocity_change, EPSILON};

/// Lines shorter than this are rejected (mm).
pub const MIN_LINE_LENGTH: f64 = 0.001;

/// The move queue and its planning state.
#[derive(Debug, Clone)]
pub struct Planner {
    ring: PlannerRing,
    position: [f64; AXES],
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

impl Planner {
    /// Empty planner at the origin.
    pub fn new() -> Self {
        Self {
            ring: PlannerRing::new(),
            position: [0.0; AXES],
        }
    }

    /// The buffer ring.
    #[inline]
    pub fn ring(&self) -> &PlannerRing {
        &self.ring
    }

    pub(crate) fn ring_mut(&mut self) -> &mut PlannerRing {
        &mut self.ring
    }

    /// End point of the last queued move.
    #[inline]
    pub fn position(&self) -> [f64; AXES] {
        self.position
    }

    /// Overwrite the planning position (queue must be empty or flushed).
    pub fn set_position(&mut self, position: [f64; AXES]) {
        self.position = position;
    }

    /// Overwrite one axis of the planning position.
    pub fn set_axis_position(&mut self, axis: Axis, value: f64) {
        self.position[axis.index()] = value;
    }

    /// Free buffers.
    pub fn available(&self) -> usize {
        self.ring.available()
    }

    /// Nothing queued or running.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Discard all buffers.
    pub fn flush(&mut self) {
        self.ring.flush();
    }

    /// Queue a jerk-limited line to `target` lasting `minutes`.
    ///
    /// # Errors
    ///
    /// `ZeroLengthMove` below [`MIN_LINE_LENGTH`], `BufferFull` when no slot
    /// is free, `FloatingPoint` for a non-finite target or duration. The
    /// planner is unchanged on error.
    pub fn aline(
        &mut self,
        config: &MachineConfig,
        target: &[f64; AXES],
        minutes: f64,
        path_control: PathControl,
        line: u32,
    ) -> Result<()> {
        let (length, unit) = self.travel(target, minutes)?;
        let i = self.ring.reserve().ok_or(MotionError::BufferFull)?;

        let cruise_set = length / minutes;
        let jerk = move_jerk(config, &unit);
        let prev = *self.ring.get(PlannerRing::prev(i));
        let prev_queued = matches!(
            prev.state,
            BufferState::Queued | BufferState::Pending | BufferState::Running
        );

        let (entry_limit, replannable) = if path_control == PathControl::ExactStop {
            (0.0, false)
        } else if !prev_queued || !prev.move_type.is_motion() {
            (0.0, true)
        } else if prev.move_type == MoveType::Arc {
            (prev.exit_velocity.min(cruise_set), true)
        } else {
            let deviation = config.axes.map(|a| a.junction_deviation);
            let junction = junction_velocity(
                &prev.unit,
                &unit,
                &deviation,
                config.global.corner_acceleration,
            );
            (
                junction.min(prev.exit_velocity_limit).min(cruise_set),
                true,
            )
        };

        let braking = velocity_change(0.0, length, jerk);
        let entry = if prev_queued && prev.move_type.is_motion() {
            prev.exit_velocity.min(entry_limit)
        } else {
            0.0
        };
        let zoid = get_segments(
            entry.min(cruise_set).min(braking),
            cruise_set,
            0.0,
            length,
            jerk,
            config.global.min_segment_len,
        );

        let b = self.ring.get_mut(i);
        b.line = line;
        b.target = *target;
        b.unit = unit;
        b.length = length;
        b.time = minutes;
        b.jerk = jerk;
        b.replannable = replannable;
        b.entry_velocity_limit = entry_limit;
        b.cruise_velocity_set = cruise_set;
        b.exit_velocity_limit = cruise_set;
        b.braking_velocity = braking;
        b.cumulative_braking = braking;
        apply(b, &zoid);
        self.ring.commit(i, MoveType::Aline);
        self.position = *target;

        trace!("aline queued, length {} cruise {}", length, cruise_set);
        if replannable {
            self.backplan(i, config);
        }
        Ok(())
    }

    /// Queue a constant velocity line (acceleration planning disabled).
    pub fn line(
        &mut self,
        target: &[f64; AXES],
        minutes: f64,
        line: u32,
    ) -> Result<()> {
        let (length, unit) = self.travel(target, minutes)?;
        let i = self.ring.reserve().ok_or(MotionError::BufferFull)?;
        let velocity = length / minutes;

        let b = self.ring.get_mut(i);
        b.line = line;
        b.target = *target;
        b.unit = unit;
        b.length = length;
        b.time = minutes;
        set_constant(b, velocity);
        self.ring.commit(i, MoveType::Line);
        self.position = *target;
        Ok(())
    }

    /// Queue an arc run at constant velocity.
    ///
    /// The predecessor is replanned to exit at the arc velocity; lines after
    /// the arc take its exit velocity as their entry limit.
    pub fn arc(
        &mut self,
        config: &MachineConfig,
        target: &[f64; AXES],
        geometry: ArcGeometry,
        length: f64,
        minutes: f64,
        line: u32,
    ) -> Result<()> {
        if !length.is_finite() || !minutes.is_finite() || minutes <= 0.0 {
            return Err(MotionError::FloatingPoint.into());
        }
        if length < MIN_LINE_LENGTH {
            return Err(GcodeError::ZeroLengthMove.into());
        }
        let i = self.ring.reserve().ok_or(MotionError::BufferFull)?;
        let velocity = length / minutes;
        let mut plane = [0.0; AXES];
        plane[geometry.axis_1.index()] = 1.0;
        plane[geometry.axis_2.index()] = 1.0;
        if libm::fabs(geometry.linear_travel) > EPSILON {
            plane[geometry.axis_linear.index()] = 1.0;
        }

        let b = self.ring.get_mut(i);
        b.line = line;
        b.target = *target;
        b.length = length;
        b.time = minutes;
        b.jerk = move_jerk(config, &plane);
        b.arc = geometry;
        set_constant(b, velocity);
        self.ring.commit(i, MoveType::Arc);
        self.position = *target;

        self.backplan(i, config);
        Ok(())
    }

    /// Queue a dwell, start, stop or end buffer.
    pub fn queue_command(&mut self, move_type: MoveType, dwell_seconds: f64, line: u32) -> Result<()> {
        let i = self.ring.reserve().ok_or(MotionError::BufferFull)?;
        let b = self.ring.get_mut(i);
        b.line = line;
        b.target = self.position;
        b.time = dwell_seconds;
        b.replannable = false;
        self.ring.commit(i, move_type);
        Ok(())
    }

    fn travel(&self, target: &[f64; AXES], minutes: f64) -> Result<(f64, [f64; AXES])> {
        if !minutes.is_finite() || minutes <= 0.0 || target.iter().any(|v| !v.is_finite()) {
            return Err(MotionError::FloatingPoint.into());
        }
        let mut delta = [0.0; AXES];
        for k in 0..AXES {
            delta[k] = target[k] - self.position[k];
        }
        let length = libm::sqrt(delta.iter().map(|d| d * d).sum());
        if length < MIN_LINE_LENGTH {
            debug!("zero length move rejected");
            return Err(GcodeError::ZeroLengthMove.into());
        }
        Ok((length, delta.map(|d| d / length)))
    }

    /// Re-optimize the replannable moves ending at `newest`.
    pub(crate) fn backplan(&mut self, newest: u8, config: &MachineConfig) {
        // backward: braking limits
        let mut first = newest;
        loop {
            let p = PlannerRing::prev(first);
            let pb = self.ring.get(p);
            if p == newest
                || !pb.replannable
                || pb.state != BufferState::Queued
                || !pb.move_type.is_motion()
            {
                break;
            }
            let nb = self.ring.get(first);
            let cap = exit_cap(nb);
            let through = cap + velocity_change(cap, pb.length, pb.jerk);
            // an aline also takes any lower entry, so stopping short of
            // `cap` counts; this keeps the limit from falling as moves arrive
            let cumulative = if nb.move_type == MoveType::Aline {
                through.max(pb.braking_velocity)
            } else {
                through
            };
            self.ring.get_mut(p).cumulative_braking = cumulative;
            first = p;
        }

        // forward: replan from the predecessor's exit
        let mut i = first;
        loop {
            let replan = {
                let b = self.ring.get(i);
                b.replannable && b.move_type == MoveType::Aline
            };
            if replan {
                let p = self.ring.get(PlannerRing::prev(i));
                let entry = if p.move_type.is_motion()
                    && matches!(
                        p.state,
                        BufferState::Queued | BufferState::Pending | BufferState::Running
                    ) {
                    p.exit_velocity
                } else {
                    0.0
                };
                let exit = if i == newest {
                    0.0
                } else {
                    let n = self.ring.get(PlannerRing::next(i));
                    self.ring.get(i).cruise_velocity_set.min(exit_cap(n))
                };

                let b = self.ring.get(i);
                let zoid = get_segments(
                    entry.min(b.entry_velocity_limit),
                    b.cruise_velocity_set,
                    exit,
                    b.length,
                    b.jerk,
                    config.global.min_segment_len,
                );
                let b = self.ring.get_mut(i);
                apply(b, &zoid);
                if i != newest
                    && near(zoid.entry_velocity, b.entry_velocity_limit)
                    && near(zoid.cruise_velocity, b.cruise_velocity_set)
                    && near(zoid.exit_velocity, b.exit_velocity_limit)
                {
                    b.replannable = false;
                }
            }
            if i == newest {
                break;
            }
            i = PlannerRing::next(i);
        }
    }

    /// Replan the queue after a feedhold stopped the run buffer short.
    ///
    /// The run buffer `run` starts again from rest at `position`, covering
    /// what is left of it; every queued line after it becomes replannable.
    /// A held arc must already be trimmed to its remaining sweep.
    pub(crate) fn replan_from_hold(
        &mut self,
        run: u8,
        position: &[f64; AXES],
        config: &MachineConfig,
    ) {
        let remaining = {
            let b = self.ring.get(run);
            if b.move_type == MoveType::Arc {
                b.length
            } else {
                let mut sq = 0.0;
                for k in 0..AXES {
                    let d = b.target[k] - position[k];
                    sq += d * d;
                }
                libm::sqrt(sq)
            }
        };

        let mut newest = run;
        let mut i = PlannerRing::next(run);
        while i != run && self.ring.get(i).state == BufferState::Queued {
            let b = self.ring.get_mut(i);
            if b.move_type == MoveType::Aline {
                b.replannable = true;
            }
            newest = i;
            i = PlannerRing::next(i);
        }

        {
            let b = self.ring.get_mut(run);
            b.state = BufferState::Pending;
            b.length = remaining;
            b.entry_velocity_limit = 0.0;
            b.entry_velocity = 0.0;
            if b.move_type == MoveType::Aline {
                b.braking_velocity = velocity_change(0.0, remaining, b.jerk);
                b.cumulative_braking = b.braking_velocity;
                b.replannable = true;
                // planned as if it were queued so the passes include it
                b.state = BufferState::Queued;
            }
        }

        if newest != run {
            self.backplan(newest, config);
        } else {
            self.backplan(run, config);
        }

        let b = self.ring.get_mut(run);
        if b.move_type == MoveType::Aline && remaining < EPSILON {
            b.head_length = 0.0;
            b.body_length = 0.0;
            b.tail_length = 0.0;
        }
        b.state = BufferState::Pending;
        b.replannable = false;
    }
}

/// Highest exit velocity a move may plan into `next`.
fn exit_cap(next: &MoveBuffer) -> f64 {
    next.entry_velocity_limit
        .min(next.cruise_velocity_set)
        .min(next.cumulative_braking)
}

fn apply(b: &mut MoveBuffer, zoid: &Zoid) {
    b.entry_velocity = zoid.entry_velocity;
    b.cruise_velocity = zoid.cruise_velocity;
    b.exit_velocity = zoid.exit_velocity;
    b.head_length = zoid.head_length;
    b.body_length = zoid.body_length;
    b.tail_length = zoid.tail_length;
}

fn set_constant(b: &mut MoveBuffer, velocity: f64) {
    b.replannable = false;
    b.entry_velocity = velocity;
    b.cruise_velocity = velocity;
    b.exit_velocity = velocity;
    b.entry_velocity_limit = velocity;
    b.cruise_velocity_set = velocity;
    b.exit_velocity_limit = velocity;
    b.braking_velocity = velocity;
    b.cumulative_braking = velocity;
    b.body_length = b.length;
}

/// Lowest jerk limit among the axes the move travels on.
fn move_jerk(config: &MachineConfig, unit: &[f64; AXES]) -> f64 {
    let jerk = Axis::ALL
        .iter()
        .filter(|a| libm::fabs(unit[a.index()]) > EPSILON)
        .map(|a| config.axis(*a).jerk_max)
        .filter(|j| *j > 0.0)
        .fold(f64::INFINITY, f64::min);
    if jerk.is_finite() {
        jerk
    } else {
        config.axis(Axis::X).jerk_max
    }
}

#[inline]
fn near(a: f64, b: f64) -> bool {
    libm::fabs(a - b) < EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xy(x: f64, y: f64) -> [f64; AXES] {
        [x, y, 0.0, 0.0, 0.0, 0.0]
    }

    fn feed(planner: &mut Planner, cfg: &MachineConfig, target: [f64; AXES], rate: f64) {
        let p = planner.position();
        let d = libm::sqrt((0..AXES).map(|k| (target[k] - p[k]).powi(2)).sum());
        planner
            .aline(cfg, &target, d / rate, PathControl::Continuous, 0)
            .unwrap();
    }

    fn buffers(planner: &Planner) -> heapless::Vec<MoveBuffer, PLANNER_BUFFERS> {
        planner.ring().queued().map(|i| *planner.ring().get(i)).collect()
    }

    #[test]
    fn test_single_line_full_plateau() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        feed(&mut planner, &cfg, xy(100.0, 0.0), 1000.0);

        let b = buffers(&planner)[0];
        assert!(b.head_length > 0.0 && b.body_length > 0.0 && b.tail_length > 0.0);
        assert!(b.head_length + b.tail_length < 100.0);
        assert!((b.cruise_velocity - 1000.0).abs() < 1e-9);
        assert_eq!(b.entry_velocity, 0.0);
        assert_eq!(b.exit_velocity, 0.0);
        assert!(b.lengths_consistent(1e-6));
    }

    #[test]
    fn test_collinear_lines_do_not_stop() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        feed(&mut planner, &cfg, xy(50.0, 0.0), 1000.0);
        feed(&mut planner, &cfg, xy(100.0, 0.0), 1000.0);

        let b = buffers(&planner);
        assert!((b[0].exit_velocity - 1000.0).abs() < 1e-6);
        assert_eq!(b[0].exit_velocity, b[1].entry_velocity);
        assert_eq!(b[0].tail_length, 0.0);
        assert_eq!(b[1].head_length, 0.0);
    }

    #[test]
    fn test_right_angle_corner() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        feed(&mut planner, &cfg, xy(50.0, 0.0), 1000.0);
        feed(&mut planner, &cfg, xy(50.0, 50.0), 1000.0);

        let b = buffers(&planner);
        let s = libm::sqrt(0.5);
        let expected = libm::sqrt(2.0e6 * 0.05 * s / (1.0 - s));
        assert!((b[1].entry_velocity_limit - expected).abs() < 1e-6);
        assert!((b[0].exit_velocity - expected).abs() < 1e-6);
        assert_eq!(b[0].exit_velocity, b[1].entry_velocity);
        assert!(b[0].tail_length > 0.0);
        assert!(b[1].head_length > 0.0);
    }

    #[test]
    fn test_junctions_stay_continuous_as_moves_arrive() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        let mut seed: u32 = 0x2545_f491;
        let mut random = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            (seed % 10_000) as f64 / 10_000.0
        };
        // (line, entry, cruise, exit) of every move seen locked
        let mut locked: heapless::Vec<(u32, [f64; 3]), 512> = heapless::Vec::new();
        let mut position = xy(0.0, 0.0);

        for line in 0..400u32 {
            if planner.available() == 0 {
                let run = planner.ring_mut().run_buffer().unwrap();
                planner.ring_mut().release(run);
                planner.ring_mut().run_buffer();
            }
            let length = if random() < 0.2 {
                0.002 + 0.008 * random()
            } else {
                0.5 + 20.0 * random()
            };
            let angle = random() * core::f64::consts::TAU;
            let mut target = position;
            target[0] += length * libm::cos(angle);
            target[1] += length * libm::sin(angle);
            let d = libm::sqrt((0..AXES).map(|k| (target[k] - position[k]).powi(2)).sum());
            if d < MIN_LINE_LENGTH {
                continue;
            }
            let rate = 200.0 + 3000.0 * random();
            planner
                .aline(&cfg, &target, d / rate, PathControl::Continuous, line)
                .unwrap();
            position = target;

            let ring = planner.ring();
            let ids: heapless::Vec<u8, PLANNER_BUFFERS> = ring.queued().collect();
            for w in ids.windows(2) {
                let (p, n) = (ring.get(w[0]), ring.get(w[1]));
                assert_eq!(
                    p.exit_velocity, n.entry_velocity,
                    "line {}: exit of {} vs entry of {}",
                    line, p.line, n.line
                );
            }
            for &i in &ids {
                let b = ring.get(i);
                if b.replannable {
                    continue;
                }
                let now = [b.entry_velocity, b.cruise_velocity, b.exit_velocity];
                match locked.iter().find(|(l, _)| *l == b.line) {
                    Some((_, before)) => assert_eq!(*before, now, "line {} replanned", b.line),
                    None => locked.push((b.line, now)).unwrap(),
                }
            }
        }
    }

    #[test]
    fn test_reversal_stops_at_junction() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        feed(&mut planner, &cfg, xy(10.0, 0.0), 1000.0);
        feed(&mut planner, &cfg, xy(0.0, 0.0), 1000.0);
        let b = buffers(&planner);
        assert_eq!(b[1].entry_velocity_limit, 0.0);
        assert_eq!(b[0].exit_velocity, 0.0);
    }

    #[test]
    fn test_tiny_move_rejected() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        let err = planner
            .aline(&cfg, &xy(0.0001, 0.0), 0.001, PathControl::Continuous, 0)
            .unwrap_err();
        assert_eq!(err.status(), crate::error::Status::ZeroLengthMove);
        assert!(planner.is_empty());
        assert_eq!(planner.position(), [0.0; AXES]);
    }

    #[test]
    fn test_exact_stop_locks_move() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        feed(&mut planner, &cfg, xy(50.0, 0.0), 1000.0);
        planner
            .aline(&cfg, &xy(100.0, 0.0), 0.05, PathControl::ExactStop, 0)
            .unwrap();
        let b = buffers(&planner);
        assert_eq!(b[1].entry_velocity_limit, 0.0);
        assert!(!b[1].replannable);
        assert_eq!(b[0].exit_velocity, 0.0);
    }

    #[test]
    fn test_buffer_full() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        for k in 1..=PLANNER_BUFFERS {
            feed(&mut planner, &cfg, xy(k as f64, 0.0), 1000.0);
        }
        let err = planner
            .aline(&cfg, &xy(100.0, 0.0), 0.1, PathControl::Continuous, 0)
            .unwrap_err();
        assert_eq!(err.status(), crate::error::Status::BufferFullFatal);
    }

    #[test]
    fn test_line_after_arc_inherits_exit() {
        let cfg = MachineConfig::default();
        let mut planner = Planner::new();
        let geometry = ArcGeometry {
            radius: 5.0,
            angular_travel: core::f64::consts::PI,
            center_1: 5.0,
            theta: -core::f64::consts::FRAC_PI_2,
            ..ArcGeometry::default()
        };
        let length = 5.0 * core::f64::consts::PI;
        planner
            .arc(&cfg, &xy(10.0, 0.0), geometry, length, length / 600.0, 0)
            .unwrap();
        feed(&mut planner, &cfg, xy(10.0, -50.0), 600.0);

        let b = buffers(&planner);
        assert!(!b[0].replannable);
        assert!((b[1].entry_velocity_limit - 600.0).abs() < 1e-9);
        assert!((b[1].entry_velocity - 600.0).abs() < 1e-6);
        assert!((b[0].exit_velocity - 600.0).abs() < 1e-9);
    }
}
