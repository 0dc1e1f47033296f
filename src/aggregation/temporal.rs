//! Temporal aggregation: collapse the slices of one period into a mean grid.

use thiserror::Error;

use crate::grid::{Grid, GridError, TimeSlice};

/// Error type for temporal aggregation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemporalError {
    /// No slices were supplied for the period
    #[error("no slices for period")]
    EmptyPeriod,

    /// A slice does not share the first slice's coordinates
    #[error("slice {index} does not match the grid of slice 0")]
    ShapeMismatch { index: usize },

    #[error("grid error: {0}")]
    Grid(#[from] GridError),
}

/// Cell-wise arithmetic mean over the slices that define each cell.
///
/// A cell undefined in some slices is averaged over the remaining ones; a
/// cell undefined everywhere stays undefined. A single slice is returned
/// unchanged.
pub fn aggregate(slices: &[Grid]) -> Result<Grid, TemporalError> {
    let (first, rest) = slices.split_first().ok_or(TemporalError::EmptyPeriod)?;
    if rest.is_empty() {
        return Ok(first.clone());
    }

    for (i, g) in rest.iter().enumerate() {
        if g.crs() != first.crs() || g.coords() != first.coords() {
            return Err(TemporalError::ShapeMismatch { index: i + 1 });
        }
    }

    let n = first.n_cells();
    let mut sum = vec![0.0f64; n];
    let mut count = vec![0u32; n];

    for g in slices {
        for (idx, v) in g.cells().enumerate() {
            if let Some(v) = v {
                sum[idx] += v;
                count[idx] += 1;
            }
        }
    }

    let mean = sum
        .into_iter()
        .zip(count)
        .map(|(s, c)| if c > 0 { s / c as f64 } else { f64::NAN })
        .collect();

    Ok(first.with_values(mean)?.with_nodata(None))
}

/// [`aggregate`] over loader output, ignoring timestamps.
pub fn aggregate_slices(slices: &[TimeSlice]) -> Result<Grid, TemporalError> {
    let grids: Vec<Grid> = slices.iter().map(|s| s.grid.clone()).collect();
    aggregate(&grids)
}
