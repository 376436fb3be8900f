use super::GeometryError;
use super::cell::SimulationBox;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Tolerance below which an improper vector or plane normal is considered degenerate.
pub const DEFAULT_GEOMETRY_TOLERANCE: f64 = 1e-10;

/// One improper angle to evaluate, with atoms given as relative indexes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImproperQuad {
    /// Index of the owning definition, reported back on degenerate geometry.
    pub definition: usize,
    pub improper: usize,
    pub origin: usize,
    pub x: usize,
    pub y: usize,
    /// Lower bound in radians.
    pub lower: f64,
    /// Upper bound in radians.
    pub upper: f64,
}

/// Measured value of one improper angle and its deviation from the bounds, in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AngleMeasure {
    pub angle: f64,
    pub reduced: f64,
}

/// Signed distance of `angle` outside `[lower, upper]`, or zero inside the window.
#[inline]
pub fn reduce_to_bounds(angle: f64, lower: f64, upper: f64) -> f64 {
    if angle < lower {
        angle - lower
    } else if angle > upper {
        angle - upper
    } else {
        0.0
    }
}

/// Computes the angle between the vector `origin -> improper` and the plane spanned by
/// `origin -> x` and `origin -> y`.
///
/// The result lies in `[-pi/2, pi/2]` and is positive when the improper atom sits on the
/// side of the plane pointed to by `(origin -> x) x (origin -> y)`.
pub fn improper_angle(
    positions: &[Point3<f64>],
    cell: &SimulationBox,
    quad: &ImproperQuad,
    tolerance: f64,
) -> Result<f64, GeometryError> {
    let len = positions.len();
    for index in [quad.improper, quad.origin, quad.x, quad.y] {
        if index >= len {
            return Err(GeometryError::PositionOutOfRange { index, len });
        }
    }

    let origin = &positions[quad.origin];
    let to_improper = cell.displacement(origin, &positions[quad.improper]);
    let to_x = cell.displacement(origin, &positions[quad.x]);
    let to_y = cell.displacement(origin, &positions[quad.y]);

    let improper_norm = to_improper.norm();
    if improper_norm < tolerance {
        return Err(GeometryError::DegenerateAngle {
            definition: quad.definition,
            reason: "improper atom coincides with the origin",
        });
    }
    let normal = to_x.cross(&to_y);
    let normal_norm = normal.norm();
    if normal_norm < tolerance {
        return Err(GeometryError::DegenerateAngle {
            definition: quad.definition,
            reason: "origin, x and y atoms are collinear",
        });
    }

    let sine = to_improper.dot(&normal) / (improper_norm * normal_norm);
    Ok(sine.clamp(-1.0, 1.0).asin())
}

/// Measures one improper angle and reduces it against the quad's bounds.
pub fn measure_improper(
    positions: &[Point3<f64>],
    cell: &SimulationBox,
    quad: &ImproperQuad,
    tolerance: f64,
) -> Result<AngleMeasure, GeometryError> {
    let angle = improper_angle(positions, cell, quad, tolerance)?;
    Ok(AngleMeasure {
        angle,
        reduced: reduce_to_bounds(angle, quad.lower, quad.upper),
    })
}

/// Measures a batch of improper angles, preserving input order.
///
/// Fails on the first degenerate angle found; no partial result is returned.
pub fn measure_impropers(
    positions: &[Point3<f64>],
    cell: &SimulationBox,
    quads: &[ImproperQuad],
    tolerance: f64,
) -> Result<Vec<AngleMeasure>, GeometryError> {
    let measure = |quad: &ImproperQuad| measure_improper(positions, cell, quad, tolerance);

    #[cfg(not(feature = "parallel"))]
    let measures = quads.iter().map(measure).collect();

    #[cfg(feature = "parallel")]
    let measures = quads.par_iter().map(measure).collect();

    measures
}
