//! # raster-ward
//!
//! Aggregate archives of gridded raster data into per-region time series.
//!
//! This crate provides the building blocks of a zonal time-series run:
//! - Grids with explicit reference systems (geographic, UTM)
//! - Named boundary units loaded from shapefiles
//! - Grid clipping to the union of the boundaries
//! - Temporal binning (day, dekad, month, quarter) and period means
//! - Nearest-cell sampling at each unit's centroid
//! - A unit × period result matrix with explicit missing values
//! - CSV export in per-unit, per-period, long-form and pivot layouts

pub mod aggregation;
pub mod boundary;
pub mod config;
pub mod grid;
pub mod io;

// Re-export main types for convenience
pub use aggregation::{
    aggregate, bin, clip, sample, AggregationDriver, BinningMode, CancelFlag, DriverError,
    MissingReason, PeriodKey, ResultMatrix, RunOutcome, RunReport, Sample, SkipEntry, SkipKind,
};
pub use boundary::{BoundarySet, BoundaryUnit};
pub use config::{ConfigError, OutputConfig, RunConfig};
pub use grid::{Crs, Grid, GridCoords, TimeSlice};
#[cfg(feature = "netcdf")]
pub use io::NetcdfLoader;
pub use io::{
    read_boundary_shapefile, Exporter, GeoTiffLoader, OutputLayout, RasterError, RasterLoader,
};
