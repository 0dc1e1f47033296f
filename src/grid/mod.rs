//! Raster grids and coordinate reference systems.

mod crs;
mod raster;
mod utm;

pub use crs::{Crs, CrsError};
pub use raster::{Grid, GridCoords, GridError, TimeSlice};
pub use utm::{Projection, UtmZone};
