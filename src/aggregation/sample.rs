//! Nearest-cell sampling of a clipped grid at a unit's representative point.

use std::fmt;

use crate::boundary::BoundaryUnit;
use crate::grid::{Grid, GridCoords};

/// Why a unit has no value for a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MissingReason {
    /// The representative point lies outside the grid footprint
    OutOfBounds,
    /// The nearest cell holds no value (clipped away, or no slice contributed)
    UndefinedCell,
    /// The nearest cell is the raster's nodata sentinel
    NoData,
}

impl fmt::Display for MissingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MissingReason::OutOfBounds => "out of bounds",
            MissingReason::UndefinedCell => "undefined cell",
            MissingReason::NoData => "nodata",
        })
    }
}

/// Result of sampling one unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Value(f64),
    Missing(MissingReason),
}

impl Sample {
    pub fn value(&self) -> Option<f64> {
        match *self {
            Sample::Value(v) => Some(v),
            Sample::Missing(_) => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Sample::Missing(_))
    }
}

/// Sample a grid at a unit's representative point.
///
/// The grid must be in the reference system of the unit's boundary set,
/// which is what [`clip`](super::clip) produces.
pub fn sample(grid: &Grid, unit: &BoundaryUnit) -> Sample {
    let p = unit.representative_point();
    sample_point(grid, p.x(), p.y())
}

/// Value of the grid cell nearest to (x, y).
///
/// Distance is Euclidean in the grid's reference system. Ties go to the cell
/// with the lowest (row, col).
pub fn sample_point(grid: &Grid, x: f64, y: f64) -> Sample {
    let Some((row, col)) = nearest_cell(grid.coords(), x, y) else {
        return Sample::Missing(MissingReason::OutOfBounds);
    };

    let v = grid.raw(row, col);
    if v.is_nan() {
        Sample::Missing(MissingReason::UndefinedCell)
    } else if grid.is_defined(v) {
        Sample::Value(v)
    } else {
        Sample::Missing(MissingReason::NoData)
    }
}

/// Nearest cell to (x, y), or None when the point is outside the footprint.
fn nearest_cell(coords: &GridCoords, x: f64, y: f64) -> Option<(usize, usize)> {
    match coords {
        GridCoords::Regular { x: xs, y: ys } => {
            let half_x = half_spacing(xs);
            let half_y = half_spacing(ys);
            // A single-cell axis borrows the other axis' spacing
            let (half_x, half_y) = match (half_x, half_y) {
                (Some(hx), Some(hy)) => (hx, hy),
                (Some(hx), None) => (hx, hx),
                (None, Some(hy)) => (hy, hy),
                (None, None) => (f64::INFINITY, f64::INFINITY),
            };
            if !within_axis(xs, x, half_x) || !within_axis(ys, y, half_y) {
                return None;
            }
            Some((nearest_index(ys, y), nearest_index(xs, x)))
        }
        GridCoords::Curvilinear { nx, ny, x: xs, y: ys } => {
            let mut best = (0usize, f64::INFINITY);
            for (idx, (&cx, &cy)) in xs.iter().zip(ys.iter()).enumerate() {
                let d2 = (cx - x).powi(2) + (cy - y).powi(2);
                if d2 < best.1 {
                    best = (idx, d2);
                }
            }
            let (row, col) = (best.0 / nx, best.0 % nx);
            let tolerance = half_cell_diagonal(coords, *nx, *ny, row, col);
            (best.1.sqrt() <= tolerance).then_some((row, col))
        }
    }
}

fn nearest_index(axis: &[f64], v: f64) -> usize {
    let mut best = (0usize, f64::INFINITY);
    for (i, &a) in axis.iter().enumerate() {
        let d = (a - v).abs();
        if d < best.1 {
            best = (i, d);
        }
    }
    best.0
}

/// Half the spacing of a monotonic axis, taken from the larger end gap.
fn half_spacing(axis: &[f64]) -> Option<f64> {
    let n = axis.len();
    if n < 2 {
        return None;
    }
    let first = (axis[1] - axis[0]).abs();
    let last = (axis[n - 1] - axis[n - 2]).abs();
    Some(first.max(last) / 2.0)
}

fn within_axis(axis: &[f64], v: f64, half: f64) -> bool {
    let (lo, hi) = axis
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &a| (lo.min(a), hi.max(a)));
    v >= lo - half && v <= hi + half
}

/// Half the diagonal of the cell at (row, col), measured from its neighbours.
fn half_cell_diagonal(coords: &GridCoords, nx: usize, ny: usize, row: usize, col: usize) -> f64 {
    let dist = |r: usize, c: usize| {
        let (ax, ay) = coords.at(row, col);
        let (bx, by) = coords.at(r, c);
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    };

    let mut dx: Option<f64> = None;
    if col > 0 {
        dx = Some(dist(row, col - 1));
    }
    if col + 1 < nx {
        dx = Some(dx.map_or(dist(row, col + 1), |d| d.max(dist(row, col + 1))));
    }
    let mut dy: Option<f64> = None;
    if row > 0 {
        dy = Some(dist(row - 1, col));
    }
    if row + 1 < ny {
        dy = Some(dy.map_or(dist(row + 1, col), |d| d.max(dist(row + 1, col))));
    }

    match (dx, dy) {
        (Some(dx), Some(dy)) => 0.5 * (dx * dx + dy * dy).sqrt(),
        (Some(d), None) | (None, Some(d)) => 0.5 * (2.0 * d * d).sqrt(),
        (None, None) => f64::INFINITY,
    }
}
