//! Spatial-temporal aggregation engine.
//!
//! The pipeline for one raster file is: load, bin each slice into a
//! [`PeriodKey`], [`clip`] it to the boundary coverage, average the slices of
//! each period ([`aggregate`]) and [`sample`] every unit at its representative
//! point. The [`AggregationDriver`] runs that pipeline over a
//! `<year>/<month>/<file>` archive and collects the results in a
//! [`ResultMatrix`]; everything it had to skip ends up in the [`RunReport`].

mod clip;
mod driver;
mod matrix;
mod period;
mod report;
mod sample;
mod temporal;

pub use clip::{clip, ClipError, ClippedGrid};
pub use driver::{AggregationDriver, CancelFlag, DriverError, RunOutcome};
pub use matrix::{CellState, MatrixError, ResultMatrix, SampleRecord};
pub use period::{
    bin, bin_slice, dekad_of_day, BinningMode, PeriodBin, PeriodError, PeriodKey, PeriodToken,
    Quarter, SourceId, QUARTERS,
};
pub use report::{RunReport, SkipEntry, SkipKind};
pub use sample::{sample, sample_point, MissingReason, Sample};
pub use temporal::{aggregate, aggregate_slices, TemporalError};
