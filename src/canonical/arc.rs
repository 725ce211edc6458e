//! Arc center and sweep computation for G2/G3.

use core::f64::consts::PI;

use super::model::Plane;
use crate::config::AXES;
use crate::error::{GcodeError, Result};
use crate::planner::ArcGeometry;

/// Absolute tolerance on the start and end radius mismatch (mm).
const RADIUS_TOLERANCE: f64 = 0.005;

/// Relative tolerance on the start and end radius mismatch.
const RADIUS_TOLERANCE_RELATIVE: f64 = 0.001;

/// How the arc center is given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArcCenter {
    /// I, J, K offsets from the start point (canonical units, None when absent).
    Offsets([Option<f64>; 3]),
    /// R word; negative selects the arc longer than 180 degrees.
    Radius(f64),
}

/// Geometry of an arc from `position` to `target`.
///
/// Returns the geometry and the helical path length. Clockwise sweeps are
/// positive; a start point equal to the end point with offsets is a full
/// circle.
pub fn arc_geometry(
    position: &[f64; AXES],
    target: &[f64; AXES],
    center: ArcCenter,
    plane: Plane,
    clockwise: bool,
) -> Result<(ArcGeometry, f64)> {
    let (axis_1, axis_2, axis_linear) = plane.axes();
    let (a1, a2, al) = (axis_1.index(), axis_2.index(), axis_linear.index());

    let (offset_1, offset_2) = match center {
        ArcCenter::Offsets(ijk) => {
            let o1 = ijk[a1];
            let o2 = ijk[a2];
            if o1.is_none() && o2.is_none() {
                return Err(GcodeError::ArcSpecification("missing center offsets").into());
            }
            (o1.unwrap_or(0.0), o2.unwrap_or(0.0))
        }
        ArcCenter::Radius(r) => radius_center(
            target[a1] - position[a1],
            target[a2] - position[a2],
            r,
            clockwise,
        )?,
    };

    let center_1 = position[a1] + offset_1;
    let center_2 = position[a2] + offset_2;
    let radius = libm::hypot(offset_1, offset_2);
    if radius <= 0.0 || !radius.is_finite() {
        return Err(GcodeError::ArcSpecification("zero radius").into());
    }

    let end_radius = libm::hypot(target[a1] - center_1, target[a2] - center_2);
    let tolerance = RADIUS_TOLERANCE.max(RADIUS_TOLERANCE_RELATIVE * radius);
    if libm::fabs(end_radius - radius) > tolerance {
        return Err(GcodeError::ArcSpecification("endpoint not on arc").into());
    }

    let theta = libm::atan2(position[a1] - center_1, position[a2] - center_2);
    let theta_end = libm::atan2(target[a1] - center_1, target[a2] - center_2);
    let mut angular_travel = theta_end - theta;
    if clockwise {
        if angular_travel <= 0.0 {
            angular_travel += 2.0 * PI;
        }
    } else if angular_travel >= 0.0 {
        angular_travel -= 2.0 * PI;
    }

    let linear_travel = target[al] - position[al];
    let length = libm::hypot(angular_travel * radius, linear_travel);

    Ok((
        ArcGeometry {
            theta,
            radius,
            angular_travel,
            linear_travel,
            axis_1,
            axis_2,
            axis_linear,
            center_1,
            center_2,
        },
        length,
    ))
}

/// Center offsets for an R-word arc with chord (`x`, `y`).
fn radius_center(x: f64, y: f64, radius: f64, clockwise: bool) -> Result<(f64, f64)> {
    let chord = libm::hypot(x, y);
    if chord <= 0.0 {
        return Err(GcodeError::ArcSpecification("radius arc needs distinct endpoints").into());
    }
    let d = 4.0 * radius * radius - x * x - y * y;
    if d < 0.0 {
        return Err(GcodeError::ArcSpecification("radius too small for endpoints").into());
    }

    let mut h = -libm::sqrt(d) / chord;
    if !clockwise {
        h = -h;
    }
    if radius < 0.0 {
        h = -h;
    }
    Ok((0.5 * (x - y * h), 0.5 * (y + x * h)))
}
