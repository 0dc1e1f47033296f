//! Aggregation driver: walks the `<year>/<month>/<file>` archive and fills
//! the result matrix.
//!
//! Per year the driver loads every raster file, bins its slices, clips them
//! to the boundary coverage, averages each period and samples every unit.
//! Failures are scoped to the file, period or unit they occur in; each one
//! becomes a [`SkipEntry`] and the run carries on. Only configuration errors
//! found at start-up abort a run.
//!
//! With the `parallel` feature, years are processed on the rayon pool. Each
//! worker owns its partial result and the driver merges them into the matrix
//! in year order.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use super::clip::{clip, ClipError};
use super::matrix::{ResultMatrix, SampleRecord};
use super::period::{bin_slice, BinningMode, PeriodBin, PeriodKey, SourceId};
use super::report::{RunReport, SkipEntry, SkipKind};
use super::sample::{sample, Sample};
use super::temporal::aggregate;
use crate::boundary::BoundarySet;
use crate::config::{ConfigError, RunConfig};
use crate::grid::Grid;
use crate::io::{ExportError, Exporter, RasterLoader};

/// Error type for a whole run.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Invalid run configuration
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    /// The raster archive root does not exist
    #[error("base directory {0} does not exist")]
    BaseDirMissing(PathBuf),

    /// Writing results failed
    #[error("export: {0}")]
    Export(#[from] ExportError),
}

/// Shared stop signal. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop dispatching further years and files.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Matrix and diagnostics of a finished (or cancelled) run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub matrix: ResultMatrix,
    pub report: RunReport,
}

impl RunOutcome {
    /// Whether every cell was computed; false only after cancellation.
    pub fn is_complete(&self) -> bool {
        self.matrix.pending_count() == 0
    }
}

/// A worker's private result for one year.
#[derive(Debug)]
struct YearOutcome {
    year: i32,
    records: Vec<SampleRecord>,
    report: RunReport,
    cancelled: bool,
}

impl YearOutcome {
    fn new(year: i32) -> Self {
        Self {
            year,
            records: Vec::new(),
            report: RunReport::new(),
            cancelled: false,
        }
    }
}

/// Clipped grids per period, before averaging.
type PeriodGroups = BTreeMap<PeriodKey, Vec<Grid>>;

/// Runs one configured aggregation.
pub struct AggregationDriver<L: RasterLoader> {
    config: RunConfig,
    boundaries: BoundarySet,
    loader: L,
    cancel: CancelFlag,
}

impl<L: RasterLoader> AggregationDriver<L> {
    pub fn new(config: RunConfig, boundaries: BoundarySet, loader: L) -> Self {
        Self {
            config,
            boundaries,
            loader,
            cancel: CancelFlag::new(),
        }
    }

    /// Use an externally owned cancel flag.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn boundaries(&self) -> &BoundarySet {
        &self.boundaries
    }

    /// Process every configured year.
    pub fn run(&self) -> Result<RunOutcome, DriverError> {
        self.config.validate()?;
        if !self.config.base_dir.is_dir() {
            return Err(DriverError::BaseDirMissing(self.config.base_dir.clone()));
        }

        let mode = self.config.mode;
        let years: Vec<i32> = self.config.years().collect();
        let periods = years
            .iter()
            .flat_map(|y| mode.expected_periods(*y))
            .collect();
        let units = self.boundaries.names().map(str::to_string).collect();
        let mut matrix = ResultMatrix::new(units, periods);

        info!(
            base_dir = %self.config.base_dir.display(),
            start_year = self.config.start_year,
            end_year = self.config.end_year,
            %mode,
            units = self.boundaries.len(),
            "starting aggregation run"
        );

        let mut report = RunReport::new();
        for outcome in self.process_years(&years) {
            let year = outcome.year;
            for conflict in matrix.merge(outcome.records) {
                report.skip(SkipEntry::new(SkipKind::MatrixConflict, conflict.to_string()).year(year));
            }
            report.merge(outcome.report);
            if !outcome.cancelled {
                for period in mode.expected_periods(year) {
                    matrix.close_period(&period);
                }
            }
        }

        info!(
            filled = matrix.filled_count(),
            missing = matrix.missing_count(),
            pending = matrix.pending_count(),
            skipped = report.len(),
            "aggregation run finished"
        );
        Ok(RunOutcome { matrix, report })
    }

    /// [`run`](Self::run), then hand the matrix to an exporter.
    pub fn run_and_export(&self, exporter: &dyn Exporter) -> Result<RunOutcome, DriverError> {
        let outcome = self.run()?;
        let files = exporter.export(&outcome.matrix)?;
        info!(files = files.len(), "export complete");
        Ok(outcome)
    }

    #[cfg(feature = "parallel")]
    fn process_years(&self, years: &[i32]) -> Vec<YearOutcome> {
        years.par_iter().map(|y| self.process_year(*y)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn process_years(&self, years: &[i32]) -> Vec<YearOutcome> {
        years.iter().map(|y| self.process_year(*y)).collect()
    }

    fn process_year(&self, year: i32) -> YearOutcome {
        let mut out = YearOutcome::new(year);
        if self.cancel.is_cancelled() {
            out.cancelled = true;
            out.report
                .skip(SkipEntry::new(SkipKind::Cancelled, "run cancelled before year started").year(year));
            return out;
        }

        let year_dir = self.config.base_dir.join(year.to_string());
        if !year_dir.is_dir() {
            out.report.skip(
                SkipEntry::new(SkipKind::MissingYear, format!("{} not found", year_dir.display()))
                    .year(year),
            );
            return out;
        }

        let month_dirs = match list_month_dirs(&year_dir) {
            Ok(dirs) => dirs,
            Err(e) => {
                out.report.skip(
                    SkipEntry::new(SkipKind::UnreadableDirectory, e.to_string()).year(year),
                );
                return out;
            }
        };
        debug!(year, months = month_dirs.len(), "processing year");

        let stage_mode = self.config.mode.intermediate().unwrap_or(self.config.mode);
        let mut groups = PeriodGroups::new();
        let mut months_with_files = BTreeSet::new();

        for month in 1..=12u32 {
            let Some((month_name, month_dir)) = month_dirs.get(&month) else {
                out.report.skip(
                    SkipEntry::new(SkipKind::MissingMonth, "month directory not found")
                        .year(year)
                        .month(format!("{month:02}")),
                );
                continue;
            };

            let files = match self.list_raster_files(month_dir) {
                Ok(files) => files,
                Err(e) => {
                    out.report.skip(
                        SkipEntry::new(SkipKind::UnreadableDirectory, e.to_string())
                            .year(year)
                            .month(month_name.as_str()),
                    );
                    continue;
                }
            };
            if files.is_empty() {
                out.report.skip(
                    SkipEntry::new(SkipKind::MissingMonth, "no raster files")
                        .year(year)
                        .month(month_name.as_str()),
                );
                continue;
            }
            months_with_files.insert(month);

            for file in files {
                if self.cancel.is_cancelled() {
                    out.cancelled = true;
                    out.report.skip(
                        SkipEntry::new(SkipKind::Cancelled, "run cancelled, partial year discarded")
                            .year(year)
                            .month(month_name.as_str()),
                    );
                    return out;
                }
                self.process_file(year, month_name, &file, stage_mode, &mut groups, &mut out.report);
            }
        }

        let mut means = reduce(groups, year, &mut out.report);
        if self.config.mode.intermediate().is_some() {
            means = reduce(
                self.regroup(means, year, &mut out.report),
                year,
                &mut out.report,
            );
        }

        for period in self.config.mode.expected_periods(year) {
            let had_files = period_months(&period)
                .iter()
                .any(|m| months_with_files.contains(m));
            if had_files && !means.contains_key(&period) {
                out.report.skip(
                    SkipEntry::new(SkipKind::EmptyPeriod, "no slices for period")
                        .year(year)
                        .period(period),
                );
            }
        }

        for (period, grid) in means {
            self.sample_units(period, grid.as_ref(), &mut out);
        }

        info!(year, records = out.records.len(), "year processed");
        out
    }

    /// Load, bin and clip one file into `groups`.
    fn process_file(
        &self,
        year: i32,
        month_dir: &str,
        path: &Path,
        stage_mode: BinningMode,
        groups: &mut PeriodGroups,
        report: &mut RunReport,
    ) {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let entry = |kind: SkipKind, detail: String| {
            SkipEntry::new(kind, detail)
                .year(year)
                .month(month_dir)
                .file(file_name.as_str())
        };

        let slices = match self.loader.load(path) {
            Ok(slices) => slices,
            Err(e) => {
                report.skip(entry(SkipKind::UnreadableFile, e.to_string()));
                return;
            }
        };
        if slices.is_empty() {
            report.skip(entry(SkipKind::UnreadableFile, "file holds no slices".to_string()));
            return;
        }

        let id = SourceId {
            year,
            month_dir,
            file_name: &file_name,
        };

        for slice in slices {
            let key = match bin_slice(slice.timestamp, id, stage_mode) {
                Ok(key) if key.year == year => key,
                Ok(key) => {
                    report.skip(entry(
                        SkipKind::UnparsablePeriod,
                        format!("period {key} lies outside year directory {year}"),
                    ));
                    continue;
                }
                Err(e) => {
                    report.skip(entry(SkipKind::UnparsablePeriod, e.to_string()));
                    continue;
                }
            };

            match clip(&slice.grid, &self.boundaries) {
                Ok(clipped) => groups.entry(key).or_default().push(clipped.into_grid()),
                Err(ClipError::EmptyIntersection) => {
                    groups.entry(key).or_default();
                    report.skip(entry(SkipKind::EmptyIntersection, format!("no cell of {key} inside the boundaries")));
                }
                Err(ClipError::ReferenceSystem(e)) => {
                    report.skip(entry(SkipKind::ReferenceSystem, e.to_string()));
                    return;
                }
                Err(e @ ClipError::Grid(_)) => {
                    report.skip(entry(SkipKind::UnreadableFile, e.to_string()));
                    return;
                }
            }
        }
    }

    /// Move intermediate period means into the run's final periods.
    fn regroup(
        &self,
        means: BTreeMap<PeriodKey, Option<Grid>>,
        year: i32,
        report: &mut RunReport,
    ) -> PeriodGroups {
        let mut groups = PeriodGroups::new();
        for (key, grid) in means {
            let Some(target) = key.coarsen(self.config.mode) else {
                report.skip(
                    SkipEntry::new(SkipKind::UnparsablePeriod, format!("{key} has no {} period", self.config.mode))
                        .year(year)
                        .period(key),
                );
                continue;
            };
            let group = groups.entry(target).or_default();
            group.extend(grid);
        }
        groups
    }

    /// Sample every unit for one period and record the results.
    fn sample_units(&self, period: PeriodKey, grid: Option<&Grid>, out: &mut YearOutcome) {
        for unit in self.boundaries.units() {
            let value = match grid.map(|g| sample(g, unit)) {
                Some(Sample::Value(v)) => Some(v),
                Some(Sample::Missing(reason)) => {
                    out.report.skip(
                        SkipEntry::new(SkipKind::MissingSample(reason), "no value at representative point")
                            .year(period.year)
                            .unit(unit.name())
                            .period(period),
                    );
                    None
                }
                // Already reported at period level
                None => None,
            };
            out.records.push(SampleRecord::new(unit.name(), period, value));
        }
    }

    /// Raster files of a month directory accepted by the loader, sorted by name.
    fn list_raster_files(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && self.loader.accepts(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Average each group. Empty groups (and failed averages) map to None.
fn reduce(groups: PeriodGroups, year: i32, report: &mut RunReport) -> BTreeMap<PeriodKey, Option<Grid>> {
    groups
        .into_iter()
        .map(|(key, grids)| {
            let mean = match aggregate(&grids) {
                Ok(grid) => Some(grid),
                Err(e) => {
                    report.skip(
                        SkipEntry::new(SkipKind::EmptyPeriod, e.to_string())
                            .year(year)
                            .period(key),
                    );
                    None
                }
            };
            (key, mean)
        })
        .collect()
}

/// Month directories of a year, keyed by month number.
///
/// Names that are not `1`..`12` (zero padding optional) are ignored.
fn list_month_dirs(year_dir: &Path) -> std::io::Result<BTreeMap<u32, (String, PathBuf)>> {
    let mut months = BTreeMap::new();
    for entry in fs::read_dir(year_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match name.parse::<u32>() {
            Ok(m) if (1..=12).contains(&m) && name.len() <= 2 => {
                months.insert(m, (name, path));
            }
            _ => debug!(dir = %path.display(), "ignoring non-month directory"),
        }
    }
    Ok(months)
}

/// Calendar months a period spans.
fn period_months(period: &PeriodKey) -> Vec<u32> {
    match period.bin {
        PeriodBin::Quarter(q) => q.months().to_vec(),
        _ => period.month().into_iter().collect(),
    }
}
