//! Grid clipping against a boundary set.
//!
//! Clipping reprojects the grid into the boundary set's reference system,
//! keeps the cells whose coordinate falls inside the union of the unit
//! polygons, and crops to the smallest row/column window holding all of them.
//! Cells inside the window but outside every polygon become undefined (NaN),
//! never zero.

use std::ops::{Deref, Range};

use thiserror::Error;

use crate::boundary::BoundarySet;
use crate::grid::{Crs, CrsError, Grid, GridCoords, GridError};

/// Error type for clipping.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClipError {
    /// The grid cannot be brought into the boundary reference system
    #[error("reference system error: {0}")]
    ReferenceSystem(#[from] CrsError),

    /// No grid cell falls inside the boundary coverage
    #[error("no grid cell falls inside the boundary coverage")]
    EmptyIntersection,

    /// The clipped grid could not be assembled
    #[error("grid error: {0}")]
    Grid(#[from] GridError),
}

/// A grid restricted to a boundary set's coverage, in the set's reference
/// system.
#[derive(Debug, Clone)]
pub struct ClippedGrid {
    grid: Grid,
    covered_cells: usize,
}

impl ClippedGrid {
    /// Number of cells inside the coverage.
    pub fn covered_cells(&self) -> usize {
        self.covered_cells
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn into_grid(self) -> Grid {
        self.grid
    }
}

impl Deref for ClippedGrid {
    type Target = Grid;

    fn deref(&self) -> &Grid {
        &self.grid
    }
}

/// Clip a grid to the union of a boundary set's polygons.
///
/// Clipping an already clipped grid returns an identical grid.
pub fn clip(grid: &Grid, boundaries: &BoundarySet) -> Result<ClippedGrid, ClipError> {
    let target = boundaries.crs();
    let coords = reproject_coords(grid, &target)?;
    let (nx, ny) = coords.shape();

    let mut covered = vec![false; nx * ny];
    let mut rows: Option<Range<usize>> = None;
    let mut cols: Option<Range<usize>> = None;
    let mut covered_cells = 0usize;

    for row in 0..ny {
        for col in 0..nx {
            let (x, y) = coords.at(row, col);
            if boundaries.covers(x, y) {
                covered[row * nx + col] = true;
                covered_cells += 1;
                rows = Some(extend(rows, row));
                cols = Some(extend(cols, col));
            }
        }
    }

    let (Some(rows), Some(cols)) = (rows, cols) else {
        return Err(ClipError::EmptyIntersection);
    };
    // A window at least two cells wide keeps the cell spacing that sampling
    // needs to tell inside from outside
    let rows = pad(rows, ny);
    let cols = pad(cols, nx);

    let mut values = Vec::with_capacity(rows.len() * cols.len());
    for row in rows.clone() {
        for col in cols.clone() {
            let idx = row * nx + col;
            values.push(if covered[idx] {
                grid.values()[idx]
            } else {
                f64::NAN
            });
        }
    }

    let clipped = Grid::from_coords(coords.window(rows, cols), values, target)?
        .with_nodata(grid.nodata());

    Ok(ClippedGrid {
        grid: clipped,
        covered_cells,
    })
}

/// Grid coordinates expressed in `target`.
///
/// A grid already in `target` keeps its coordinates; otherwise every cell is
/// transformed and the result is curvilinear.
fn reproject_coords(grid: &Grid, target: &Crs) -> Result<GridCoords, CrsError> {
    let source = grid.crs();
    if source == *target {
        return Ok(grid.coords().clone());
    }
    Crs::check_transform(&source, target)?;

    let (nx, ny) = grid.shape();
    let mut xs = Vec::with_capacity(nx * ny);
    let mut ys = Vec::with_capacity(nx * ny);
    for row in 0..ny {
        for col in 0..nx {
            let (x, y) = grid.coord(row, col);
            let (tx, ty) = Crs::transform(&source, target, x, y)?;
            xs.push(tx);
            ys.push(ty);
        }
    }
    Ok(GridCoords::Curvilinear {
        nx,
        ny,
        x: xs,
        y: ys,
    })
}

fn extend(range: Option<Range<usize>>, idx: usize) -> Range<usize> {
    match range {
        None => idx..idx + 1,
        Some(r) => r.start.min(idx)..r.end.max(idx + 1),
    }
}

fn pad(range: Range<usize>, len: usize) -> Range<usize> {
    if range.len() > 1 || len < 2 {
        range
    } else if range.end < len {
        range.start..range.end + 1
    } else {
        range.start - 1..range.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryUnit;
    use geo::{Coord, Rect};

    fn square_set(x0: f64, y0: f64, x1: f64, y1: f64, crs: Crs) -> BoundarySet {
        let poly = Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 }).to_polygon();
        BoundarySet::new(vec![BoundaryUnit::from_polygon("A", poly).unwrap()], crs).unwrap()
    }

    /// 5x5 grid on 0..4 with value = 10*row + col.
    fn grid_5x5() -> Grid {
        let axis: Vec<f64> = (0..5).map(|i| i as f64).collect();
        let values = (0..25).map(|i| (10 * (i / 5) + i % 5) as f64).collect();
        Grid::new(axis.clone(), axis, values, Crs::Geographic).unwrap()
    }

    #[test]
    fn test_clip_crops_to_coverage() {
        let set = square_set(0.5, 0.5, 2.5, 3.5, Crs::Geographic);
        let clipped = clip(&grid_5x5(), &set).unwrap();

        // x in {1, 2}, y in {1, 2, 3}
        assert_eq!(clipped.shape(), (2, 3));
        assert_eq!(clipped.covered_cells(), 6);
        assert_eq!(clipped.coord(0, 0), (1.0, 1.0));
        assert_eq!(clipped.cell(0, 0), Some(11.0));
        assert_eq!(clipped.cell(2, 1), Some(32.0));
    }

    #[test]
    fn test_uncovered_cells_are_undefined_not_zero() {
        // Two separated squares: cells between them fall in the window but not the union
        let left = Rect::new(Coord { x: -0.5, y: -0.5 }, Coord { x: 0.5, y: 0.5 }).to_polygon();
        let right = Rect::new(Coord { x: 2.5, y: -0.5 }, Coord { x: 3.5, y: 0.5 }).to_polygon();
        let set = BoundarySet::new(
            vec![
                BoundaryUnit::from_polygon("L", left).unwrap(),
                BoundaryUnit::from_polygon("R", right).unwrap(),
            ],
            Crs::Geographic,
        )
        .unwrap();

        let clipped = clip(&grid_5x5(), &set).unwrap();
        // One covered row, padded with its neighbour
        assert_eq!(clipped.shape(), (4, 2));
        assert_eq!(clipped.cell(1, 1), None);
        assert_eq!(clipped.cell(0, 0), Some(0.0));
        assert_eq!(clipped.cell(0, 1), None);
        assert!(clipped.raw(0, 2).is_nan());
        assert_eq!(clipped.cell(0, 3), Some(3.0));
    }

    #[test]
    fn test_clip_is_idempotent() {
        let set = square_set(0.5, 0.5, 3.2, 2.7, Crs::Geographic);
        let once = clip(&grid_5x5(), &set).unwrap();
        let twice = clip(once.grid(), &set).unwrap();
        assert!(once.same_cells(&twice));
        assert_eq!(once.covered_cells(), twice.covered_cells());
    }

    #[test]
    fn test_empty_intersection() {
        let set = square_set(10.0, 10.0, 11.0, 11.0, Crs::Geographic);
        assert_eq!(
            clip(&grid_5x5(), &set).unwrap_err(),
            ClipError::EmptyIntersection
        );
    }

    #[test]
    fn test_reference_system_error() {
        let set = square_set(0.0, 0.0, 4.0, 4.0, Crs::Epsg(3857));
        let err = clip(&grid_5x5(), &set).unwrap_err();
        assert!(matches!(err, ClipError::ReferenceSystem(_)));
    }

    #[test]
    fn test_clip_reprojects_to_boundary_crs() {
        // Geographic grid around Nairobi, boundaries in UTM 37S
        let lons: Vec<f64> = (0..5).map(|i| 36.6 + 0.1 * i as f64).collect();
        let lats: Vec<f64> = (0..5).map(|i| -1.1 - 0.1 * i as f64).collect();
        let grid = Grid::new(lons, lats, vec![0.25; 25], Crs::Geographic).unwrap();

        let utm = Crs::Utm {
            zone: 37,
            north: false,
        };
        let (x0, y0) = Crs::transform(&Crs::Geographic, &utm, 36.75, -1.45).unwrap();
        let (x1, y1) = Crs::transform(&Crs::Geographic, &utm, 36.95, -1.25).unwrap();
        let set = square_set(x0, y0, x1, y1, utm);

        let clipped = clip(&grid, &set).unwrap();
        assert_eq!(clipped.crs(), utm);
        assert!(matches!(clipped.coords(), GridCoords::Curvilinear { .. }));
        // lon 36.8, 36.9 and lat -1.3, -1.4
        assert_eq!(clipped.covered_cells(), 4);
        assert_eq!(clipped.value_range(), Some((0.25, 0.25)));

        let again = clip(clipped.grid(), &set).unwrap();
        assert!(clipped.same_cells(&again));
    }

    #[test]
    fn test_nodata_sentinel_survives_clip() {
        let grid = grid_5x5().with_nodata(Some(11.0));
        let set = square_set(0.5, 0.5, 1.5, 1.5, Crs::Geographic);
        let clipped = clip(&grid, &set).unwrap();
        assert_eq!(clipped.shape(), (2, 2));
        assert_eq!(clipped.raw(0, 0), 11.0);
        assert_eq!(clipped.cell(0, 0), None);
    }

    #[test]
    fn test_single_cell_coverage_keeps_spacing() {
        let set = square_set(3.5, 3.5, 4.5, 4.5, Crs::Geographic);
        let clipped = clip(&grid_5x5(), &set).unwrap();
        // Last row and column: padded towards the interior
        assert_eq!(clipped.shape(), (2, 2));
        assert_eq!(clipped.coord(1, 1), (4.0, 4.0));
        assert_eq!(clipped.cell(1, 1), Some(44.0));
        assert_eq!(clipped.covered_cells(), 1);

        let again = clip(clipped.grid(), &set).unwrap();
        assert!(clipped.same_cells(&again));
    }
}
