//! Jerk-limited trapezoid math.
//!
//! A move is split into head (acceleration), body (cruise) and tail
//! (deceleration). Under constant jerk `J` a velocity change `dV` takes
//! `T = 2 sqrt(dV / J)` and covers `L = (V1 + V2) T / 2`.

use crate::config::AXES;

/// Tolerance for velocity and length comparisons.
pub const EPSILON: f64 = 0.0001;

/// Junction velocity returned for collinear moves.
pub const JUNCTION_NO_LIMIT: f64 = 10_000_000.0;

/// Iteration cap for the two-segment fit.
pub const MAX_ITERATIONS: u32 = 50;

/// Relative length tolerance of the two-segment fit.
pub const ITERATION_TOLERANCE: f64 = 0.001;

/// Relative length slack accepted when testing whether a tail fits.
const BRAKING_SLACK: f64 = 1e-9;

/// Length needed to change velocity between `v1` and `v2` under jerk `jerk`.
#[inline]
pub fn optimal_length(v1: f64, v2: f64, jerk: f64) -> f64 {
    libm::fabs(v1 + v2) * libm::sqrt(libm::fabs(v1 - v2) / jerk)
}

/// Velocity increase reachable over `length` starting from `entry`.
///
/// Solves `length = (2 entry + dV) sqrt(dV / jerk)` for `dV`. With a zero
/// entry velocity this is `jerk^(1/3) length^(2/3)`.
pub fn velocity_change(entry: f64, length: f64, jerk: f64) -> f64 {
    if length <= 0.0 || jerk <= 0.0 {
        return 0.0;
    }
    let from_rest = libm::cbrt(jerk) * libm::pow(length, 2.0 / 3.0);
    if entry <= 0.0 {
        return from_rest;
    }

    // `lo` always fits, so a move entered at `entry + dV` can brake back
    let span = |dv: f64| (2.0 * entry + dv) * libm::sqrt(dv / jerk);
    let (mut lo, mut hi) = (0.0, from_rest);
    for _ in 0..64 {
        let mid = 0.5 * (lo + hi);
        if span(mid) <= length {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 1e-12 * from_rest {
            break;
        }
    }
    lo
}

/// Highest exit at or below `exit` that a tail starting at `entry` reaches
/// within `length`.
///
/// `None` when the move cannot even stop over `length`. The length needed
/// to brake from `entry` to `x` rises until `x = entry / 3` and falls after,
/// so when `exit` itself is out of reach the answer lies below that peak.
pub fn braking_exit(entry: f64, exit: f64, length: f64, jerk: f64) -> Option<f64> {
    // same tests the backward pass uses to bound entries
    if exit >= entry || entry <= exit + velocity_change(exit, length, jerk) {
        return Some(exit);
    }
    if entry > velocity_change(0.0, length, jerk) {
        return None;
    }
    let budget = length * (1.0 + BRAKING_SLACK);
    let (mut lo, mut hi) = (0.0, exit.min(entry / 3.0));
    for _ in 0..64 {
        let mid = 0.5 * (lo + hi);
        if optimal_length(entry, mid, jerk) <= budget {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 1e-12 * entry {
            break;
        }
    }
    Some(lo)
}

/// Maximum velocity at a junction between unit vectors `a` and `b`.
///
/// Centripetal model: the junction is treated as an arc tangent to both
/// moves whose radius is set by the axis-weighted junction deviation.
pub fn junction_velocity(
    a: &[f64; AXES],
    b: &[f64; AXES],
    deviation: &[f64; AXES],
    corner_acceleration: f64,
) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let cos_theta = -dot;
    if libm::fabs(cos_theta + 1.0) < EPSILON {
        return JUNCTION_NO_LIMIT;
    }
    if libm::fabs(cos_theta - 1.0) < EPSILON {
        return 0.0;
    }

    let mut weighted = 0.0;
    let mut weight = 0.0;
    for i in 0..AXES {
        let w = libm::fabs(a[i]) + libm::fabs(b[i]);
        weighted += w * deviation[i];
        weight += w;
    }
    let delta = if weight > 0.0 { weighted / weight } else { 0.0 };

    let sin_half = libm::sqrt((1.0 - cos_theta) / 2.0);
    let radius = delta * sin_half / (1.0 - sin_half);
    libm::sqrt(corner_acceleration * radius)
}

/// Shape of a planned move.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Zoid {
    /// Achieved entry velocity.
    pub entry_velocity: f64,
    /// Achieved cruise velocity.
    pub cruise_velocity: f64,
    /// Achieved exit velocity.
    pub exit_velocity: f64,
    /// Acceleration length.
    pub head_length: f64,
    /// Cruise length.
    pub body_length: f64,
    /// Deceleration length.
    pub tail_length: f64,
    /// The two-segment fit ran out of iterations.
    pub unconverged: bool,
}

impl Zoid {
    /// Number of non-empty sections.
    pub fn segment_count(&self) -> u8 {
        [self.head_length, self.body_length, self.tail_length]
            .iter()
            .filter(|l| **l > 0.0)
            .count() as u8
    }

    /// Total length.
    pub fn length(&self) -> f64 {
        self.head_length + self.body_length + self.tail_length
    }

    /// Duration in minutes.
    pub fn time(&self) -> f64 {
        let mut t = 0.0;
        if self.head_length > 0.0 {
            t += 2.0 * self.head_length / (self.entry_velocity + self.cruise_velocity);
        }
        if self.body_length > 0.0 {
            t += self.body_length / self.cruise_velocity;
        }
        if self.tail_length > 0.0 {
            t += 2.0 * self.tail_length / (self.cruise_velocity + self.exit_velocity);
        }
        t
    }

    fn body_only(entry: f64, cruise: f64, exit: f64, length: f64) -> Self {
        Self {
            entry_velocity: entry,
            cruise_velocity: cruise,
            exit_velocity: exit,
            body_length: length,
            ..Self::default()
        }
    }

    /// Decelerate over the whole length, keeping the entry when possible.
    fn tail_only(entry: f64, exit: f64, length: f64, jerk: f64) -> Self {
        let (entry, exit) = match braking_exit(entry, exit, length, jerk) {
            Some(reachable) => (entry, reachable),
            None => (exit + velocity_change(exit, length, jerk), exit),
        };
        Self {
            entry_velocity: entry,
            cruise_velocity: entry,
            exit_velocity: exit,
            tail_length: length,
            ..Self::default()
        }
    }
}

/// Split `length` into head, body and tail for the requested velocities.
///
/// Entry and exit are first limited to the cruise velocity. Requests that
/// cannot be met over `length` are reduced: a tail-only move lowers its exit
/// to the fastest one it can brake to, and lowers its entry only when it
/// cannot stop at all. A head-only move lowers its exit, and a move with no
/// plateau lowers its cruise velocity until head and tail fill the length.
pub fn get_segments(
    entry: f64,
    cruise: f64,
    exit: f64,
    length: f64,
    jerk: f64,
    min_segment_len: f64,
) -> Zoid {
    if length < EPSILON {
        return Zoid {
            entry_velocity: entry,
            cruise_velocity: entry,
            exit_velocity: entry,
            ..Zoid::default()
        };
    }

    let vc = cruise.max(0.0);
    let ve = entry.clamp(0.0, vc);
    let vx = exit.clamp(0.0, vc);

    if length < min_segment_len {
        warn!("move too short to shape: {}", length);
        let exit = (ve + (vx - ve) * (length / min_segment_len)).min(vx);
        let velocity = if ve.max(exit) > EPSILON { ve.max(exit) } else { vc };
        return Zoid {
            entry_velocity: ve,
            cruise_velocity: velocity,
            exit_velocity: exit,
            body_length: length,
            ..Zoid::default()
        };
    }

    if libm::fabs(vc - ve) < EPSILON && libm::fabs(vc - vx) < EPSILON {
        return Zoid::body_only(ve, vc, vx, length);
    }

    let head = optimal_length(vc, ve, jerk);
    let tail = optimal_length(vc, vx, jerk);
    let body = length - head - tail;
    if body > 0.0 {
        let mut zoid = Zoid {
            entry_velocity: ve,
            cruise_velocity: vc,
            exit_velocity: vx,
            head_length: head,
            body_length: body,
            tail_length: tail,
            unconverged: false,
        };
        if zoid.head_length > 0.0 && zoid.head_length < min_segment_len {
            zoid.body_length += zoid.head_length;
            zoid.head_length = 0.0;
        }
        if zoid.tail_length > 0.0 && zoid.tail_length < min_segment_len {
            zoid.body_length += zoid.tail_length;
            zoid.tail_length = 0.0;
        }
        return zoid;
    }

    // tail only: enter at cruise and brake over the whole length
    if libm::fabs(vc - ve) < EPSILON {
        return Zoid::tail_only(ve, vx, length, jerk);
    }

    // head only: accelerate the whole way, exit wherever that ends
    if libm::fabs(vc - vx) < EPSILON {
        let vx = (ve + velocity_change(ve, length, jerk)).min(vx);
        return Zoid {
            entry_velocity: ve,
            cruise_velocity: vx,
            exit_velocity: vx,
            head_length: length,
            ..Zoid::default()
        };
    }

    // even a direct change from entry to exit does not fit
    if optimal_length(ve, vx, jerk) >= length {
        return if ve > vx {
            Zoid::tail_only(ve, vx, length, jerk)
        } else {
            let vx = (ve + velocity_change(ve, length, jerk)).min(vx);
            Zoid {
                entry_velocity: ve,
                cruise_velocity: vx,
                exit_velocity: vx,
                head_length: length,
                ..Zoid::default()
            }
        };
    }

    two_segment(ve, vc, vx, length, jerk)
}

/// Peak velocity fit for a move with no plateau.
fn two_segment(ve: f64, vc: f64, vx: f64, length: f64, jerk: f64) -> Zoid {
    let floor = ve.max(vx);
    let mut lo = floor;
    let mut hi = vc;
    let mut peak = vc;
    let mut head = 0.0;
    let mut tail = 0.0;
    let mut converged = false;

    for _ in 0..MAX_ITERATIONS {
        head = optimal_length(peak, ve, jerk);
        tail = optimal_length(peak, vx, jerk);
        let trapezoid = head + tail;
        if libm::fabs(trapezoid - length) < ITERATION_TOLERANCE * length {
            converged = true;
            break;
        }
        if trapezoid > length {
            hi = peak;
        } else {
            lo = peak;
        }
        let scaled = peak * length / trapezoid;
        peak = if scaled > lo && scaled < hi {
            scaled
        } else {
            0.5 * (lo + hi)
        };
    }

    if !converged {
        warn!("two segment fit failed to converge");
        let total = head + tail;
        if total > 0.0 {
            head *= length / total;
            tail = length - head;
        }
    } else {
        head = head.min(length);
        tail = length - head;
    }

    Zoid {
        entry_velocity: ve,
        cruise_velocity: peak,
        exit_velocity: vx,
        head_length: head,
        body_length: 0.0,
        tail_length: tail,
        unconverged: !converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JERK: f64 = 50_000_000.0;

    fn unit(x: f64, y: f64) -> [f64; AXES] {
        [x, y, 0.0, 0.0, 0.0, 0.0]
    }

    #[test]
    fn test_optimal_length() {
        // 0 -> 1000 mm/min at 5e7 mm/min^3: 1000 * sqrt(1000 / 5e7)
        let l = optimal_length(0.0, 1000.0, JERK);
        assert!((l - 1000.0 * libm::sqrt(2.0e-5)).abs() < 1e-12);
        assert_eq!(optimal_length(500.0, 500.0, JERK), 0.0);
    }

    #[test]
    fn test_velocity_change_inverts_optimal_length() {
        for &(v1, v2) in &[(0.0, 1000.0), (200.0, 900.0), (1000.0, 1001.0)] {
            let l = optimal_length(v1, v2, JERK);
            let dv = velocity_change(v1, l, JERK);
            assert!((dv - (v2 - v1)).abs() < 1e-3, "{} {} {}", v1, v2, dv);
        }
    }

    #[test]
    fn test_velocity_change_from_rest_closed_form() {
        let dv = velocity_change(0.0, 2.0, JERK);
        assert!((dv - libm::cbrt(JERK) * libm::pow(2.0, 2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_junction_collinear_and_reversal() {
        let dev = [0.05; AXES];
        assert_eq!(
            junction_velocity(&unit(1.0, 0.0), &unit(1.0, 0.0), &dev, 2e6),
            JUNCTION_NO_LIMIT
        );
        assert_eq!(
            junction_velocity(&unit(1.0, 0.0), &unit(-1.0, 0.0), &dev, 2e6),
            0.0
        );
    }

    #[test]
    fn test_junction_right_angle() {
        let dev = [0.05; AXES];
        let v = junction_velocity(&unit(1.0, 0.0), &unit(0.0, 1.0), &dev, 2e6);
        let s = libm::sqrt(0.5);
        let r = 0.05 * s / (1.0 - s);
        assert!((r - 0.1207).abs() < 1e-3);
        assert!((v - libm::sqrt(2e6 * r)).abs() < 1e-9);
        assert!(v > 480.0 && v < 500.0);
    }

    #[test]
    fn test_three_segment() {
        let z = get_segments(0.0, 1000.0, 0.0, 100.0, JERK, 0.01);
        assert_eq!(z.segment_count(), 3);
        assert!((z.length() - 100.0).abs() < 1e-9);
        assert_eq!(z.cruise_velocity, 1000.0);
        assert!(z.head_length + z.tail_length < 100.0);
    }

    #[test]
    fn test_body_only() {
        let z = get_segments(600.0, 600.0, 600.0, 5.0, JERK, 0.01);
        assert_eq!(z.segment_count(), 1);
        assert_eq!(z.body_length, 5.0);
    }

    #[test]
    fn test_two_segment_peak() {
        let z = get_segments(0.0, 10_000.0, 0.0, 1.0, JERK, 0.01);
        assert_eq!(z.body_length, 0.0);
        assert!(z.cruise_velocity < 10_000.0);
        assert!((z.length() - 1.0).abs() < 1e-9);
        assert!((optimal_length(z.cruise_velocity, 0.0, JERK) - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_tail_only_lowers_entry() {
        let z = get_segments(1000.0, 1000.0, 0.0, 0.05, JERK, 0.01);
        assert_eq!(z.head_length, 0.0);
        assert_eq!(z.tail_length, 0.05);
        assert!(z.entry_velocity < 1000.0);
        assert!((optimal_length(z.entry_velocity, 0.0, JERK) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_braking_exit() {
        // reachable as asked
        assert_eq!(braking_exit(1000.0, 900.0, 3.0, JERK), Some(900.0));
        assert_eq!(braking_exit(500.0, 800.0, 0.1, JERK), Some(800.0));

        // cannot stop at all
        assert_eq!(braking_exit(1000.0, 0.0, 0.05, JERK), None);

        // stopping fits but braking to 600 does not: a lower exit does
        let entry = 1000.0;
        let length = optimal_length(entry, 0.0, JERK) * 1.001;
        assert!(optimal_length(entry, 600.0, JERK) > length);
        let exit = braking_exit(entry, 600.0, length, JERK).unwrap();
        assert!(exit > 0.0 && exit < entry / 3.0, "{}", exit);
        assert!(optimal_length(entry, exit, JERK) <= length * (1.0 + 1e-9));
    }

    #[test]
    fn test_tail_only_keeps_entry_when_it_can_stop() {
        let entry = 1000.0;
        let length = optimal_length(entry, 0.0, JERK) * 1.001;
        let z = get_segments(entry, entry, 600.0, length, JERK, 0.01);
        assert_eq!(z.entry_velocity, entry);
        assert!(z.exit_velocity < 600.0);
        assert_eq!(z.tail_length, length);
    }

    #[test]
    fn test_head_only_lowers_exit() {
        let z = get_segments(0.0, 1000.0, 1000.0, 0.05, JERK, 0.01);
        assert_eq!(z.head_length, 0.05);
        assert!(z.exit_velocity < 1000.0);
        assert_eq!(z.exit_velocity, z.cruise_velocity);
    }

    #[test]
    fn test_too_short_and_zero_length() {
        let z = get_segments(100.0, 1000.0, 0.0, 0.005, JERK, 0.01);
        assert_eq!(z.segment_count(), 1);
        assert_eq!(z.body_length, 0.005);
        assert_eq!(z.entry_velocity, 100.0);
        assert_eq!(z.exit_velocity, 0.0);

        // never exits faster than asked
        let z = get_segments(400.0, 1000.0, 100.0, 0.005, JERK, 0.01);
        assert_eq!(z.exit_velocity, 100.0);
        let z = get_segments(100.0, 1000.0, 400.0, 0.005, JERK, 0.01);
        assert!((z.exit_velocity - 250.0).abs() < 1e-9);

        let z = get_segments(0.0, 1000.0, 0.0, 0.0, JERK, 0.01);
        assert_eq!(z.segment_count(), 0);
    }
}
