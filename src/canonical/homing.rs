//! Homing cycle (G28).
//!
//! Each requested axis runs: optional backoff (switch already closed),
//! search, search backoff, latch, zero backoff, then its machine position is
//! set to `zero_offset`. The cycle then visits the waypoint given on the
//! block and finishes at the work zero of the homed axes.
//!
//! The cycle only decides; every step returns one [`HomingAction`] and the
//! caller runs it to completion before asking for the next.

use crate::config::{Axis, AxisMode, MachineConfig, AXES};
use crate::error::{MotionError, Result};

/// Axes are homed in this order.
pub const HOMING_ORDER: [Axis; AXES] = [Axis::Z, Axis::X, Axis::Y, Axis::A, Axis::B, Axis::C];

/// Where the cycle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HomingPhase {
    /// Choosing the next axis.
    Start,
    /// Moving off a switch that was closed at the start.
    InitialBackoff,
    /// Searching for the switch.
    Search,
    /// Backing off after the search.
    SearchBackoff,
    /// Approaching the switch slowly.
    Latch,
    /// Backing off to the zero position.
    ZeroBackoff,
    /// Moving to the block's waypoint.
    Waypoint,
    /// Moving to the work zero.
    WorkZero,
    /// Restoring the model.
    Finalize,
    /// Finished.
    Done,
}

/// Next thing the caller has to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HomingAction {
    /// Relative move of one axis.
    Jog {
        /// Axis to move.
        axis: Axis,
        /// Signed distance (mm or deg).
        distance: f64,
        /// Velocity (units/min).
        velocity: f64,
    },
    /// Assign a machine coordinate without moving.
    SetPosition {
        /// Axis.
        axis: Axis,
        /// New machine coordinate.
        value: f64,
    },
    /// Traverse to the block's axis words (input units, work coordinates).
    Waypoint([Option<f64>; AXES]),
    /// Traverse to machine coordinates; `None` axes stay put.
    Traverse([Option<f64>; AXES]),
    /// Cycle complete.
    Finish,
}

/// State of a running homing cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct HomingCycle {
    requested: [bool; AXES],
    waypoint: [Option<f64>; AXES],
    order: usize,
    axis: Option<Axis>,
    phase: HomingPhase,
    switch_hit: bool,
    homed: [bool; AXES],
}

impl HomingCycle {
    /// Cycle over the axes that carry a word on the block.
    pub fn new(words: &[Option<f64>; AXES]) -> Self {
        Self {
            requested: words.map(|w| w.is_some()),
            waypoint: *words,
            order: 0,
            axis: None,
            phase: HomingPhase::Start,
            switch_hit: false,
            homed: [false; AXES],
        }
    }

    /// Current phase.
    pub fn phase(&self) -> HomingPhase {
        self.phase
    }

    /// Axis being homed.
    pub fn axis(&self) -> Option<Axis> {
        self.axis
    }

    /// Axes homed so far.
    pub fn homed(&self) -> [bool; AXES] {
        self.homed
    }

    /// Record a switch closing. Returns true when the move in flight must be
    /// stopped.
    pub fn on_switch(&mut self, axis: Axis) -> bool {
        let searching = matches!(self.phase, HomingPhase::Search | HomingPhase::Latch);
        if searching && self.axis == Some(axis) {
            self.switch_hit = true;
            return true;
        }
        false
    }

    fn next_axis(&mut self, config: &MachineConfig) -> Option<Axis> {
        while self.order < HOMING_ORDER.len() {
            let axis = HOMING_ORDER[self.order];
            self.order += 1;
            let cfg = config.axis(axis);
            let enabled = !matches!(cfg.mode, AxisMode::Disabled | AxisMode::Inhibited);
            if self.requested[axis.index()] && enabled && cfg.switch_mode.homes() {
                return Some(axis);
            }
        }
        None
    }

    /// Advance to the next action.
    ///
    /// # Errors
    ///
    /// `HomingCycleFailed` when a search or latch move ended without its
    /// switch closing.
    pub fn next(&mut self, config: &MachineConfig, switches: &[bool; AXES]) -> Result<HomingAction> {
        loop {
            let axis = self.axis.unwrap_or(Axis::X);
            let h = config.axis(axis).homing;
            let sign = h.search_sign();

            match self.phase {
                HomingPhase::Start => match self.next_axis(config) {
                    Some(next) => {
                        self.axis = Some(next);
                        let h = config.axis(next).homing;
                        self.switch_hit = false;
                        info!("homing axis {}", next.index());
                        if switches[next.index()] {
                            self.phase = HomingPhase::InitialBackoff;
                            return Ok(HomingAction::Jog {
                                axis: next,
                                distance: -h.search_sign() * h.latch_backoff,
                                velocity: h.search_velocity,
                            });
                        }
                        self.phase = HomingPhase::Search;
                        return Ok(HomingAction::Jog {
                            axis: next,
                            distance: h.travel,
                            velocity: h.search_velocity,
                        });
                    }
                    None => {
                        self.axis = None;
                        self.phase = HomingPhase::Waypoint;
                    }
                },
                HomingPhase::InitialBackoff => {
                    self.phase = HomingPhase::Search;
                    self.switch_hit = false;
                    return Ok(HomingAction::Jog {
                        axis,
                        distance: h.travel,
                        velocity: h.search_velocity,
                    });
                }
                HomingPhase::Search => {
                    if !self.switch_hit {
                        return Err(MotionError::HomingCycleFailed("switch not found").into());
                    }
                    self.phase = HomingPhase::SearchBackoff;
                    return Ok(HomingAction::Jog {
                        axis,
                        distance: -sign * h.latch_backoff,
                        velocity: h.search_velocity,
                    });
                }
                HomingPhase::SearchBackoff => {
                    self.phase = HomingPhase::Latch;
                    self.switch_hit = false;
                    return Ok(HomingAction::Jog {
                        axis,
                        distance: sign * 2.0 * h.latch_backoff,
                        velocity: h.latch_velocity,
                    });
                }
                HomingPhase::Latch => {
                    if !self.switch_hit {
                        return Err(MotionError::HomingCycleFailed("switch not latched").into());
                    }
                    self.phase = HomingPhase::ZeroBackoff;
                    return Ok(HomingAction::Jog {
                        axis,
                        distance: -sign * h.zero_backoff,
                        velocity: h.search_velocity,
                    });
                }
                HomingPhase::ZeroBackoff => {
                    self.homed[axis.index()] = true;
                    self.phase = HomingPhase::Start;
                    return Ok(HomingAction::SetPosition {
                        axis,
                        value: h.zero_offset,
                    });
                }
                HomingPhase::Waypoint => {
                    self.phase = HomingPhase::WorkZero;
                    if self.homed.iter().any(|h| *h) {
                        return Ok(HomingAction::Waypoint(self.waypoint));
                    }
                }
                HomingPhase::WorkZero => {
                    self.phase = HomingPhase::Finalize;
                    if self.homed.iter().any(|h| *h) {
                        let mut target = [None; AXES];
                        for a in Axis::ALL {
                            if self.homed[a.index()] {
                                target[a.index()] = Some(config.axis(a).homing.work_offset);
                            }
                        }
                        return Ok(HomingAction::Traverse(target));
                    }
                }
                HomingPhase::Finalize | HomingPhase::Done => {
                    self.phase = HomingPhase::Done;
                    return Ok(HomingAction::Finish);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(axes: &[Axis]) -> [Option<f64>; AXES] {
        let mut w = [None; AXES];
        for a in axes {
            w[a.index()] = Some(0.0);
        }
        w
    }

    fn jog(action: HomingAction) -> (Axis, f64, f64) {
        match action {
            HomingAction::Jog {
                axis,
                distance,
                velocity,
            } => (axis, distance, velocity),
            other => panic!("expected a jog, got {:?}", other),
        }
    }

    #[test]
    fn test_single_axis_sequence() {
        let cfg = MachineConfig::default();
        let mut cycle = HomingCycle::new(&words(&[Axis::X]));
        let open = [false; AXES];

        assert_eq!(jog(cycle.next(&cfg, &open).unwrap()), (Axis::X, -400.0, 500.0));
        assert_eq!(cycle.phase(), HomingPhase::Search);
        assert!(cycle.on_switch(Axis::X));

        assert_eq!(jog(cycle.next(&cfg, &open).unwrap()), (Axis::X, 5.0, 500.0));
        assert!(!cycle.on_switch(Axis::X));
        assert_eq!(jog(cycle.next(&cfg, &open).unwrap()), (Axis::X, -10.0, 100.0));
        assert!(cycle.on_switch(Axis::X));
        assert_eq!(jog(cycle.next(&cfg, &open).unwrap()), (Axis::X, 2.0, 500.0));
        assert_eq!(
            cycle.next(&cfg, &open).unwrap(),
            HomingAction::SetPosition {
                axis: Axis::X,
                value: 0.0
            }
        );
        assert!(matches!(cycle.next(&cfg, &open).unwrap(), HomingAction::Waypoint(_)));
        assert!(matches!(cycle.next(&cfg, &open).unwrap(), HomingAction::Traverse(_)));
        assert_eq!(cycle.next(&cfg, &open).unwrap(), HomingAction::Finish);
        assert!(cycle.homed()[0]);
    }

    #[test]
    fn test_closed_switch_backs_off_first() {
        let cfg = MachineConfig::default();
        let mut cycle = HomingCycle::new(&words(&[Axis::X]));
        let mut switches = [false; AXES];
        switches[0] = true;
        assert_eq!(jog(cycle.next(&cfg, &switches).unwrap()), (Axis::X, 5.0, 500.0));
        assert_eq!(cycle.phase(), HomingPhase::InitialBackoff);
        assert!(!cycle.on_switch(Axis::X));
        assert_eq!(jog(cycle.next(&cfg, &[false; AXES]).unwrap()), (Axis::X, -400.0, 500.0));
    }

    #[test]
    fn test_order_and_skips() {
        let mut cfg = MachineConfig::default();
        cfg.axis_mut(Axis::Y).mode = AxisMode::Inhibited;
        let mut cycle = HomingCycle::new(&words(&[Axis::X, Axis::Y, Axis::Z, Axis::B]));
        let open = [false; AXES];
        assert_eq!(jog(cycle.next(&cfg, &open).unwrap()).0, Axis::Z);
        cycle.on_switch(Axis::Z);
        for _ in 0..4 {
            cycle.next(&cfg, &open).unwrap();
            cycle.on_switch(Axis::Z);
        }
        // Y inhibited, B disabled: X is next and last
        assert_eq!(jog(cycle.next(&cfg, &open).unwrap()).0, Axis::X);
    }

    #[test]
    fn test_missing_switch_fails() {
        let cfg = MachineConfig::default();
        let mut cycle = HomingCycle::new(&words(&[Axis::Y]));
        let open = [false; AXES];
        cycle.next(&cfg, &open).unwrap();
        let err = cycle.next(&cfg, &open).unwrap_err();
        assert_eq!(err.status(), crate::error::Status::HomingCycleFailed);
    }

    #[test]
    fn test_nothing_requested_finishes() {
        let cfg = MachineConfig::default();
        let mut cycle = HomingCycle::new(&[None; AXES]);
        assert_eq!(cycle.next(&cfg, &[false; AXES]).unwrap(), HomingAction::Finish);
    }
}
