//! End-to-end tests: Gcode blocks in, counted step pulses out.

mod common;

use common::{with_machine, Machine};
use tinyg_motion::canonical::MachineState;
use tinyg_motion::config::SwitchMode;
use tinyg_motion::planner::{HoldState, MoveBuffer};
use tinyg_motion::{Axis, HomingState, MachineConfig, Status};

fn queued(m: &Machine<'_>) -> Vec<MoveBuffer> {
    let ring = m.core.planner().ring();
    ring.queued().map(|i| *ring.get(i)).collect()
}

// =============================================================================
// Straight lines
// =============================================================================

#[test]
fn single_line_full_plateau() {
    with_machine(MachineConfig::default(), |m| {
        m.gcode(&[('G', 1.0), ('X', 100.0), ('F', 1000.0)]).unwrap();

        let b = queued(m)[0];
        assert!(b.head_length > 0.0 && b.body_length > 0.0 && b.tail_length > 0.0);
        assert!(b.head_length + b.tail_length < 100.0);
        assert!((b.cruise_velocity - 1000.0).abs() < 1e-9);

        assert!(m.run(10.0).unwrap());
        assert_eq!(m.stepper.position()[0], 32_000);
        assert_eq!(m.stepper.position()[1], 0);
        assert!((m.core.runtime().position()[0] - 100.0).abs() < 1e-9);
        assert_eq!(m.core.machine_state(), MachineState::Stop);
        // 6 s of cruise plus half of each ramp
        let t = m.seconds();
        assert!(t > 6.4 && t < 6.7, "{}", t);
    });
}

#[test]
fn collinear_lines_run_as_one_profile() {
    with_machine(MachineConfig::default(), |m| {
        m.gcode(&[('G', 1.0), ('X', 50.0), ('F', 1000.0)]).unwrap();
        m.gcode(&[('X', 100.0)]).unwrap();

        let b = queued(m);
        assert!((b[0].exit_velocity - 1000.0).abs() < 1e-6);
        assert!((b[1].entry_velocity - 1000.0).abs() < 1e-6);
        assert!(b[0].tail_length < 1e-9);

        assert!(m.run(10.0).unwrap());
        assert_eq!(m.stepper.position()[0], 32_000);
        let t = m.seconds();
        assert!(t < 6.7, "{}", t);
    });
}

#[test]
fn right_angle_corner_slows_down() {
    with_machine(MachineConfig::default(), |m| {
        m.gcode(&[('G', 1.0), ('X', 50.0), ('F', 1000.0)]).unwrap();
        m.gcode(&[('Y', 50.0)]).unwrap();

        let b = queued(m);
        let s = libm::sqrt(0.5);
        let corner = libm::sqrt(2.0e6 * 0.05 * s / (1.0 - s));
        assert!((b[0].exit_velocity - corner).abs() < 1e-6);
        assert!((b[1].entry_velocity - corner).abs() < 1e-6);
        assert!(b[0].tail_length > 0.0 && b[1].head_length > 0.0);

        assert!(m.run(15.0).unwrap());
        assert_eq!(m.stepper.position()[0], 16_000);
        assert_eq!(m.stepper.position()[1], 16_000);
        assert!(m.seconds() > 6.6);
    });
}

#[test]
fn tiny_move_is_rejected() {
    with_machine(MachineConfig::default(), |m| {
        let err = m
            .gcode(&[('G', 1.0), ('X', 0.0001), ('F', 1000.0)])
            .unwrap_err();
        assert_eq!(err.status(), Status::ZeroLengthMove);
        assert!(m.core.planner().is_empty());
        assert_eq!(m.core.planner().position(), [0.0; 6]);
        assert!(m.run(1.0).unwrap());
        assert_eq!(m.stepper.position(), [0; 4]);
    });
}

#[test]
fn inch_traverse_and_return() {
    with_machine(MachineConfig::default(), |m| {
        m.gcode(&[('G', 20.0), ('G', 0.0), ('X', 1.0), ('Y', -1.0)]).unwrap();
        m.gcode(&[('G', 21.0), ('X', 0.0), ('Y', 0.0)]).unwrap();
        assert!(m.run(10.0).unwrap());
        assert_eq!(m.stepper.position(), [0; 4]);
        assert!(m.stepper.motors().pulses[0] >= 2 * 8128);
    });
}

// =============================================================================
// Arcs
// =============================================================================

#[test]
fn clockwise_semicircle() {
    with_machine(MachineConfig::default(), |m| {
        m.gcode(&[('G', 2.0), ('X', 10.0), ('Y', 0.0), ('I', 5.0), ('J', 0.0), ('F', 600.0)])
            .unwrap();

        let b = queued(m)[0];
        assert!((b.length - 5.0 * core::f64::consts::PI).abs() < 1e-9);

        let mut max_y: f64 = 0.0;
        let done = m
            .run_until(5.0, |m| {
                max_y = max_y.max(m.physical()[1]);
                !m.core.is_busy()
            })
            .unwrap();
        assert!(done);
        assert_eq!(m.stepper.position()[0], 3200);
        assert_eq!(m.stepper.position()[1], 0);
        assert!((max_y - 5.0).abs() < 0.01, "{}", max_y);
        let t = m.seconds();
        assert!((t - 5.0 * core::f64::consts::PI / 10.0).abs() < 0.01, "{}", t);
    });
}

#[test]
fn radius_arc_then_line() {
    with_machine(MachineConfig::default(), |m| {
        m.gcode(&[('G', 2.0), ('X', 5.0), ('Y', 5.0), ('R', 5.0), ('F', 600.0)])
            .unwrap();
        m.gcode(&[('G', 1.0), ('X', 20.0)]).unwrap();

        let b = queued(m);
        assert!((b[1].entry_velocity - 600.0).abs() < 1e-6);

        assert!(m.run(10.0).unwrap());
        assert_eq!(m.stepper.position()[0], 6400);
        assert_eq!(m.stepper.position()[1], 1600);
    });
}

// =============================================================================
// Dwell, program flow and reports
// =============================================================================

#[test]
fn dwell_runs_on_dwell_timer() {
    with_machine(MachineConfig::default(), |m| {
        m.gcode(&[('G', 4.0), ('P', 0.5)]).unwrap();
        assert!(m.run(2.0).unwrap());
        assert_eq!(m.dwell_ticks, 5000);
        assert_eq!(m.dda_ticks, 0);
    });
}

#[test]
fn program_stop_waits_for_cycle_start() {
    with_machine(MachineConfig::default(), |m| {
        m.gcode(&[('G', 1.0), ('X', 10.0), ('F', 1000.0)]).unwrap();
        m.gcode(&[('M', 0.0)]).unwrap();
        m.gcode(&[('X', 20.0)]).unwrap();

        assert!(m.run_until(5.0, |m| m.link.is_stopped()).unwrap());
        assert_eq!(m.stepper.position()[0], 3200);
        assert_eq!(m.core.machine_state(), MachineState::Stop);

        m.run_for(0.5).unwrap();
        assert_eq!(m.stepper.position()[0], 3200);

        m.core.cycle_start();
        assert_eq!(m.core.machine_state(), MachineState::Run);
        assert!(m.run(5.0).unwrap());
        assert_eq!(m.stepper.position()[0], 6400);
    });
}

#[test]
fn program_end_releases_motors() {
    with_machine(MachineConfig::default(), |m| {
        assert!(m.stepper.motors().enabled.iter().all(|e| *e));
        m.gcode(&[('G', 1.0), ('X', 1.0), ('F', 1000.0), ('M', 30.0)]).unwrap();
        assert!(m.run(2.0).unwrap());
        assert!(m.stepper.motors().enabled.iter().all(|e| !*e));

        m.core.motors_on().unwrap();
        assert!(m.run(1.0).unwrap());
        assert!(m.stepper.motors().enabled.iter().all(|e| *e));
    });
}

#[test]
fn status_reports_follow_interval() {
    let mut cfg = MachineConfig::default();
    cfg.global.status_report_interval = 20;
    with_machine(cfg, |m| {
        m.gcode(&[('N', 7.0), ('G', 1.0), ('X', 10.0), ('F', 1000.0)]).unwrap();
        let mut reports = Vec::new();
        for _ in 0..200_000 {
            let _ = m.step();
            if let Some(sr) = m.core.take_status_report() {
                reports.push(sr);
            }
            if !m.core.is_busy() {
                break;
            }
        }
        assert!(!reports.is_empty());
        let first = reports[0];
        assert_eq!(first.line, 7);
        assert_eq!(first.stat, MachineState::Run);
        assert!(first.posx > 0.0 && first.posx < 10.0);
        assert!(first.vel > 0.0 && first.vel <= 1000.0 + 1e-6);
    });
}

// =============================================================================
// Feedhold and stops
// =============================================================================

#[test]
fn feedhold_then_resume() {
    with_machine(MachineConfig::default(), |m| {
        m.gcode(&[('G', 1.0), ('X', 100.0), ('F', 1000.0)]).unwrap();
        m.run_for(2.0).unwrap();
        m.core.feedhold();
        assert_eq!(m.core.machine_state(), MachineState::Hold);

        let held = m
            .run_until(5.0, |m| {
                m.core.runtime().hold() == HoldState::Hold && !m.link.is_busy()
            })
            .unwrap();
        assert!(held);
        let x = m.physical()[0];
        assert!(x > 25.0 && x < 100.0, "{}", x);

        m.run_for(0.5).unwrap();
        assert_eq!(m.physical()[0], x);

        m.core.cycle_start();
        assert!(m.run(20.0).unwrap());
        assert_eq!(m.stepper.position()[0], 32_000);
        assert_eq!(m.core.machine_state(), MachineState::Stop);
    });
}

#[test]
fn feedhold_during_arcs() {
    with_machine(MachineConfig::default(), |m| {
        for _ in 0..3 {
            m.gcode(&[('G', 2.0), ('X', 0.0), ('Y', 0.0), ('I', 5.0), ('J', 0.0), ('F', 600.0)])
                .unwrap();
        }
        m.run_for(0.5).unwrap();
        m.core.feedhold();

        let held = m
            .run_until(5.0, |m| {
                m.core.runtime().hold() == HoldState::Hold && !m.link.is_busy()
            })
            .unwrap();
        assert!(held);
        assert!(m.seconds() < 1.5, "held at {}", m.seconds());
        assert!(!m.core.planner().is_empty());
        let p = m.physical();
        let r = ((p[0] - 5.0).powi(2) + p[1] * p[1]).sqrt();
        assert!((r - 5.0).abs() < 0.01, "{}", r);

        m.run_for(0.5).unwrap();
        assert_eq!(m.physical(), p);

        m.core.cycle_start();
        assert!(m.run(20.0).unwrap());
        assert_eq!(m.stepper.position()[0], 0);
        assert_eq!(m.stepper.position()[1], 0);
        assert_eq!(m.core.machine_state(), MachineState::Stop);
    });
}

#[test]
fn limit_switch_halts_motion() {
    let mut cfg = MachineConfig::default();
    cfg.axis_mut(Axis::X).switch_mode = SwitchMode::HomingAndLimit;
    with_machine(cfg, |m| {
        m.add_switch(Axis::X, -5.0);
        m.gcode(&[('G', 1.0), ('X', -10.0), ('F', 1000.0)]).unwrap();
        assert!(m.run(5.0).unwrap());

        assert_eq!(m.switch_errors.len(), 1);
        assert_eq!(m.switch_errors[0].status(), Status::MaxTravelExceeded);
        assert_eq!(m.core.machine_state(), MachineState::Stop);
        let x = m.physical()[0];
        assert!(x <= -5.0 && x > -5.1, "{}", x);
    });
}

// =============================================================================
// Homing
// =============================================================================

#[test]
fn homing_x_then_y() {
    let mut cfg = MachineConfig::default();
    cfg.axis_mut(Axis::X).homing.work_offset = 10.0;
    with_machine(cfg, |m| {
        // X starts on its switch
        m.add_switch(Axis::X, 1.0);
        m.add_switch(Axis::Y, -20.0);

        m.gcode(&[('G', 28.0), ('X', 0.0), ('Y', 0.0)]).unwrap();
        assert_eq!(m.core.machine_state(), MachineState::Homing);
        assert!(m.run(60.0).unwrap());

        assert_eq!(m.core.machine_state(), MachineState::Stop);
        assert_eq!(m.core.homing_state(), HomingState::Homed);
        let gm = &m.core.canonical().gm;
        assert!((gm.position[0] - 10.0).abs() < 1e-9);
        assert!(gm.position[1].abs() < 1e-9);

        // latched on the switch, backed off by zero_backoff, then to work zero
        let p = m.physical();
        assert!(p[0] > 12.5 && p[0] < 13.1, "{}", p[0]);
        assert!(p[1] > -18.5 && p[1] < -17.8, "{}", p[1]);
        assert!(m.switches.iter().all(|s| !s.closed));
    });
}

#[test]
fn homing_without_switch_fails() {
    let mut cfg = MachineConfig::default();
    cfg.axis_mut(Axis::Y).homing.travel = -20.0;
    with_machine(cfg, |m| {
        m.gcode(&[('G', 91.0)]).unwrap();
        m.gcode(&[('G', 28.0), ('Y', 0.0)]).unwrap();
        let err = m.run(10.0).unwrap_err();
        assert_eq!(err.status(), Status::HomingCycleFailed);
        assert_eq!(m.core.machine_state(), MachineState::Stop);
        assert_eq!(m.core.homing_state(), HomingState::NotHomed);
        // the model from before the cycle is back
        assert_eq!(
            m.core.canonical().gm.distance_mode,
            tinyg_motion::canonical::DistanceMode::Incremental
        );
        assert!((m.core.canonical().gm.position[1] + 20.0).abs() < 1e-9);
    });
}

#[test]
fn soft_limits_after_homing() {
    let mut cfg = MachineConfig::default();
    cfg.axis_mut(Axis::X).travel_max = 200.0;
    with_machine(cfg, |m| {
        m.add_switch(Axis::X, -3.0);
        m.gcode(&[('G', 28.0), ('X', 0.0)]).unwrap();
        assert!(m.run(60.0).unwrap());
        assert_eq!(m.core.homing_state(), HomingState::Homed);

        let err = m.gcode(&[('G', 0.0), ('X', 250.0)]).unwrap_err();
        assert_eq!(err.status(), Status::MaxTravelExceeded);
        m.gcode(&[('G', 0.0), ('X', 150.0)]).unwrap();
    });
}
