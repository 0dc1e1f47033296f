//! In-memory raster grids.
//!
//! A [`Grid`] is a row-major 2D array of samples with explicit coordinates and
//! reference system. Coordinates are either two 1D axes (as read from a file)
//! or one coordinate pair per cell (after reprojection).
//!
//! Cells are *defined* when their value is finite and not the nodata
//! sentinel. NaN is used internally for "undefined", e.g. cells removed by
//! clipping or cells no time slice contributed to.

use chrono::NaiveDateTime;
use thiserror::Error;

use super::crs::Crs;

/// Error type for grid construction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    /// Value count does not match the coordinate shape
    #[error("shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// An axis is empty
    #[error("empty {0} axis")]
    EmptyAxis(&'static str),

    /// An axis is not strictly monotonic
    #[error("{0} axis is not strictly monotonic")]
    NonMonotonic(&'static str),
}

/// Grid coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum GridCoords {
    /// Rectilinear grid with 1D axes: x has `nx` entries, y has `ny`
    Regular { x: Vec<f64>, y: Vec<f64> },
    /// One (x, y) per cell, row-major `ny * nx`
    Curvilinear {
        nx: usize,
        ny: usize,
        x: Vec<f64>,
        y: Vec<f64>,
    },
}

impl GridCoords {
    /// (nx, ny)
    pub fn shape(&self) -> (usize, usize) {
        match self {
            GridCoords::Regular { x, y } => (x.len(), y.len()),
            GridCoords::Curvilinear { nx, ny, .. } => (*nx, *ny),
        }
    }

    /// Coordinate of cell (row, col).
    pub fn at(&self, row: usize, col: usize) -> (f64, f64) {
        match self {
            GridCoords::Regular { x, y } => (x[col], y[row]),
            GridCoords::Curvilinear { nx, x, y, .. } => {
                let idx = row * nx + col;
                (x[idx], y[idx])
            }
        }
    }

    /// Restrict to the window `rows` × `cols`.
    pub fn window(
        &self,
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
    ) -> GridCoords {
        match self {
            GridCoords::Regular { x, y } => GridCoords::Regular {
                x: x[cols].to_vec(),
                y: y[rows].to_vec(),
            },
            GridCoords::Curvilinear { nx, x, y, .. } => {
                let mut wx = Vec::with_capacity(rows.len() * cols.len());
                let mut wy = Vec::with_capacity(rows.len() * cols.len());
                for row in rows.clone() {
                    let start = row * nx;
                    wx.extend_from_slice(&x[start + cols.start..start + cols.end]);
                    wy.extend_from_slice(&y[start + cols.start..start + cols.end]);
                }
                GridCoords::Curvilinear {
                    nx: cols.len(),
                    ny: rows.len(),
                    x: wx,
                    y: wy,
                }
            }
        }
    }
}

/// A 2D raster of scalar samples.
#[derive(Debug, Clone)]
pub struct Grid {
    coords: GridCoords,
    values: Vec<f64>,
    crs: Crs,
    nodata: Option<f64>,
}

impl Grid {
    /// Create a grid on regular 1D axes.
    ///
    /// `values` is row-major with `y.len()` rows of `x.len()` columns.
    /// Both axes must be strictly increasing or strictly decreasing.
    pub fn new(x: Vec<f64>, y: Vec<f64>, values: Vec<f64>, crs: Crs) -> Result<Self, GridError> {
        check_axis(&x, "x")?;
        check_axis(&y, "y")?;
        Self::from_coords(GridCoords::Regular { x, y }, values, crs)
    }

    /// Create a grid from any coordinate layout.
    pub fn from_coords(coords: GridCoords, values: Vec<f64>, crs: Crs) -> Result<Self, GridError> {
        let (nx, ny) = coords.shape();
        if nx == 0 {
            return Err(GridError::EmptyAxis("x"));
        }
        if ny == 0 {
            return Err(GridError::EmptyAxis("y"));
        }
        if let GridCoords::Curvilinear { x, y, .. } = &coords {
            if x.len() != nx * ny || y.len() != nx * ny {
                return Err(GridError::ShapeMismatch {
                    expected: nx * ny,
                    actual: x.len().min(y.len()),
                });
            }
        }
        if values.len() != nx * ny {
            return Err(GridError::ShapeMismatch {
                expected: nx * ny,
                actual: values.len(),
            });
        }
        Ok(Self {
            coords,
            values,
            crs,
            nodata: None,
        })
    }

    /// Set the nodata sentinel.
    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn coords(&self) -> &GridCoords {
        &self.coords
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Raw row-major values, including sentinels and NaN.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// (nx, ny)
    pub fn shape(&self) -> (usize, usize) {
        self.coords.shape()
    }

    pub fn n_cells(&self) -> usize {
        self.values.len()
    }

    /// Coordinate of cell (row, col) in the grid's reference system.
    pub fn coord(&self, row: usize, col: usize) -> (f64, f64) {
        self.coords.at(row, col)
    }

    /// Raw value at (row, col).
    pub fn raw(&self, row: usize, col: usize) -> f64 {
        let (nx, _) = self.shape();
        self.values[row * nx + col]
    }

    /// Check if a value is defined (finite and not the nodata sentinel).
    #[inline]
    pub fn is_defined(&self, v: f64) -> bool {
        v.is_finite() && self.nodata.map_or(true, |nd| v != nd)
    }

    /// Defined value at (row, col), or None.
    pub fn cell(&self, row: usize, col: usize) -> Option<f64> {
        let v = self.raw(row, col);
        self.is_defined(v).then_some(v)
    }

    /// All cells as options, row-major.
    pub fn cells(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.values
            .iter()
            .map(move |&v| self.is_defined(v).then_some(v))
    }

    /// Number of defined cells.
    pub fn defined_count(&self) -> usize {
        self.cells().filter(Option::is_some).count()
    }

    /// (min, max) over defined cells, None when nothing is defined.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.cells().flatten().fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// Same shape, coordinates, reference system and defined cells.
    ///
    /// Undefined cells compare equal regardless of whether they hold NaN or the
    /// sentinel.
    pub fn same_cells(&self, other: &Grid) -> bool {
        self.crs == other.crs
            && self.coords == other.coords
            && self.cells().zip(other.cells()).all(|(a, b)| a == b)
    }

    /// Replace values, keeping coordinates.
    pub(crate) fn with_values(&self, values: Vec<f64>) -> Result<Grid, GridError> {
        Grid::from_coords(self.coords.clone(), values, self.crs).map(|g| g.with_nodata(self.nodata))
    }
}

/// One timestamped grid, as produced by a raster loader.
#[derive(Debug, Clone)]
pub struct TimeSlice {
    /// Acquisition time, when the source records one
    pub timestamp: Option<NaiveDateTime>,
    pub grid: Grid,
}

impl TimeSlice {
    pub fn new(timestamp: Option<NaiveDateTime>, grid: Grid) -> Self {
        Self { timestamp, grid }
    }
}

fn check_axis(axis: &[f64], name: &'static str) -> Result<(), GridError> {
    if axis.is_empty() {
        return Err(GridError::EmptyAxis(name));
    }
    if axis.iter().any(|v| !v.is_finite()) {
        return Err(GridError::NonMonotonic(name));
    }
    let increasing = axis.windows(2).all(|w| w[1] > w[0]);
    let decreasing = axis.windows(2).all(|w| w[1] < w[0]);
    if increasing || decreasing {
        Ok(())
    } else {
        Err(GridError::NonMonotonic(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_grid() -> Grid {
        Grid::new(
            vec![0.0, 1.0, 2.0],
            vec![10.0, 9.0],
            vec![1.0, 2.0, -9999.0, 4.0, f64::NAN, 6.0],
            Crs::Geographic,
        )
        .unwrap()
        .with_nodata(Some(-9999.0))
    }

    #[test]
    fn test_shape_and_coords() {
        let g = small_grid();
        assert_eq!(g.shape(), (3, 2));
        assert_eq!(g.coord(1, 2), (2.0, 9.0));
        assert_eq!(g.raw(0, 1), 2.0);
    }

    #[test]
    fn test_defined_cells() {
        let g = small_grid();
        assert_eq!(g.cell(0, 0), Some(1.0));
        assert_eq!(g.cell(0, 2), None, "sentinel is undefined");
        assert_eq!(g.cell(1, 1), None, "NaN is undefined");
        assert_eq!(g.defined_count(), 4);
        assert_eq!(g.value_range(), Some((1.0, 6.0)));
    }

    #[test]
    fn test_rejects_bad_axes() {
        let err = Grid::new(vec![0.0, 0.0], vec![1.0], vec![1.0, 2.0], Crs::Geographic);
        assert_eq!(err.unwrap_err(), GridError::NonMonotonic("x"));

        let err = Grid::new(vec![], vec![1.0], vec![], Crs::Geographic);
        assert_eq!(err.unwrap_err(), GridError::EmptyAxis("x"));

        let err = Grid::new(vec![0.0, 1.0], vec![1.0], vec![1.0], Crs::Geographic);
        assert!(matches!(err, Err(GridError::ShapeMismatch { expected: 2, actual: 1 })));
    }

    #[test]
    fn test_window_curvilinear() {
        let coords = GridCoords::Curvilinear {
            nx: 3,
            ny: 2,
            x: vec![0.0, 1.0, 2.0, 0.5, 1.5, 2.5],
            y: vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        };
        let w = coords.window(1..2, 1..3);
        assert_eq!(w.shape(), (2, 1));
        assert_eq!(w.at(0, 0), (1.5, 1.0));
        assert_eq!(w.at(0, 1), (2.5, 1.0));
    }

    #[test]
    fn test_same_cells_ignores_undefined_representation() {
        let a = small_grid();
        let mut values = a.values().to_vec();
        values[2] = f64::NAN;
        let b = a.with_values(values).unwrap();
        assert!(a.same_cells(&b));
    }
}
