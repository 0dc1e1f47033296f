//! Tabular export of a result matrix.
//!
//! All layouts are written as CSV. A Missing cell is an empty field, so a
//! computed zero (`0`) and "no data" stay distinct.
//!
//! | Layout     | Files                          | Rows            | Columns        |
//! |------------|--------------------------------|-----------------|----------------|
//! | per_unit   | `<unit>.csv` per unit          | period labels   | years          |
//! | per_period | `<year>_<period>.csv` per bin  | units           | value          |
//! | long_form  | `long_form.csv`                | (unit, period)  | unit,year,period,value |
//! | pivot      | `pivot.csv`                    | (year, period)  | one per unit   |

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::aggregation::{PeriodBin, PeriodKey, ResultMatrix};

/// Error type for export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes a finished result matrix somewhere.
pub trait Exporter {
    /// Write the matrix, returning the files created.
    fn export(&self, matrix: &ResultMatrix) -> Result<Vec<PathBuf>, ExportError>;
}

/// Output layout selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// One sheet per unit, periods as rows, years as columns
    #[default]
    PerUnit,
    /// One sheet per (year, period), units as rows
    PerPeriod,
    /// One long table
    LongForm,
    /// One table, (year, period) rows and a column per unit
    Pivot,
}

impl OutputLayout {
    /// Exporter writing this layout into `dir`.
    pub fn exporter(&self, dir: impl Into<PathBuf>) -> Box<dyn Exporter + Send + Sync> {
        let dir = dir.into();
        match self {
            OutputLayout::PerUnit => Box::new(PerUnitExporter::new(dir)),
            OutputLayout::PerPeriod => Box::new(PerPeriodExporter::new(dir)),
            OutputLayout::LongForm => Box::new(LongFormExporter::new(dir)),
            OutputLayout::Pivot => Box::new(PivotExporter::new(dir)),
        }
    }
}

impl std::str::FromStr for OutputLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "per_unit" => Ok(OutputLayout::PerUnit),
            "per_period" => Ok(OutputLayout::PerPeriod),
            "long_form" | "long" => Ok(OutputLayout::LongForm),
            "pivot" => Ok(OutputLayout::Pivot),
            other => Err(format!("unknown output layout: {other}")),
        }
    }
}

/// Replace every character other than alphanumerics, space and `_` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' || c == '_' { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// One sheet per unit.
#[derive(Debug, Clone)]
pub struct PerUnitExporter {
    dir: PathBuf,
}

impl PerUnitExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Exporter for PerUnitExporter {
    fn export(&self, matrix: &ResultMatrix) -> Result<Vec<PathBuf>, ExportError> {
        fs::create_dir_all(&self.dir)?;
        let years = matrix.years();
        let bins: BTreeSet<PeriodBin> = matrix.periods().iter().map(|p| p.bin).collect();
        let mut names = UniqueNames::default();
        let mut written = Vec::with_capacity(matrix.units().len());

        for unit in matrix.units() {
            let path = self.dir.join(format!("{}.csv", names.claim(unit)));
            let mut out = BufWriter::new(File::create(&path)?);

            write!(out, "period")?;
            for year in &years {
                write!(out, ",{year}")?;
            }
            writeln!(out)?;

            for bin in &bins {
                write!(out, "{}", csv_field(&bin_label(bin)))?;
                for year in &years {
                    let value = matrix.get(unit, &PeriodKey::new(*year, *bin));
                    write!(out, ",{}", format_value(value))?;
                }
                writeln!(out)?;
            }
            out.flush()?;
            written.push(path);
        }

        info!(dir = %self.dir.display(), files = written.len(), "wrote per-unit sheets");
        Ok(written)
    }
}

/// One sheet per (year, period).
#[derive(Debug, Clone)]
pub struct PerPeriodExporter {
    dir: PathBuf,
}

impl PerPeriodExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Exporter for PerPeriodExporter {
    fn export(&self, matrix: &ResultMatrix) -> Result<Vec<PathBuf>, ExportError> {
        fs::create_dir_all(&self.dir)?;
        let mut written = Vec::with_capacity(matrix.periods().len());

        for period in matrix.periods() {
            let Some(column) = matrix.period_column(period) else {
                continue;
            };
            let stem = match period.bin {
                PeriodBin::Day { .. } => period.label(),
                _ => format!("{}_{}", period.year, period.label()),
            };
            let path = self.dir.join(format!("{}.csv", sanitize_filename(&stem)));
            let mut out = BufWriter::new(File::create(&path)?);

            writeln!(out, "unit,value")?;
            for (unit, value) in column {
                writeln!(out, "{},{}", csv_field(unit), format_value(value))?;
            }
            out.flush()?;
            written.push(path);
        }

        info!(dir = %self.dir.display(), files = written.len(), "wrote per-period sheets");
        Ok(written)
    }
}

/// One `unit,year,period,value` table.
#[derive(Debug, Clone)]
pub struct LongFormExporter {
    dir: PathBuf,
}

impl LongFormExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Exporter for LongFormExporter {
    fn export(&self, matrix: &ResultMatrix) -> Result<Vec<PathBuf>, ExportError> {
        let path = create_in(&self.dir, "long_form.csv")?;
        let mut out = BufWriter::new(File::create(&path)?);

        writeln!(out, "unit,year,period,value")?;
        for record in matrix.records() {
            writeln!(
                out,
                "{},{},{},{}",
                csv_field(&record.unit),
                record.period.year,
                csv_field(&record.period.label()),
                format_value(record.value)
            )?;
        }
        out.flush()?;

        info!(path = %path.display(), "wrote long-form table");
        Ok(vec![path])
    }
}

/// One table with a column per unit.
#[derive(Debug, Clone)]
pub struct PivotExporter {
    dir: PathBuf,
}

impl PivotExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Exporter for PivotExporter {
    fn export(&self, matrix: &ResultMatrix) -> Result<Vec<PathBuf>, ExportError> {
        let path = create_in(&self.dir, "pivot.csv")?;
        let mut out = BufWriter::new(File::create(&path)?);

        write!(out, "year,period")?;
        for unit in matrix.units() {
            write!(out, ",{}", csv_field(unit))?;
        }
        writeln!(out)?;

        for period in matrix.periods() {
            write!(out, "{},{}", period.year, csv_field(&period.label()))?;
            if let Some(column) = matrix.period_column(period) {
                for (_, value) in column {
                    write!(out, ",{}", format_value(value))?;
                }
            }
            writeln!(out)?;
        }
        out.flush()?;

        info!(path = %path.display(), "wrote pivot table");
        Ok(vec![path])
    }
}

fn create_in(dir: &Path, file_name: &str) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir)?;
    Ok(dir.join(file_name))
}

/// Row label of a bin in a per-unit sheet, where the year is a column.
fn bin_label(bin: &PeriodBin) -> String {
    match *bin {
        PeriodBin::Day { month, day } => format!("{month:02}-{day:02}"),
        _ => PeriodKey::new(0, *bin).label(),
    }
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Quote a field when it holds a separator, quote or line break.
fn csv_field(text: &str) -> Cow<'_, str> {
    if text.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", text.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(text)
    }
}

/// Sanitised file stems, suffixed when two names collide.
#[derive(Default)]
struct UniqueNames {
    seen: HashMap<String, usize>,
}

impl UniqueNames {
    fn claim(&mut self, name: &str) -> String {
        let base = sanitize_filename(name);
        let count = self.seen.entry(base.to_lowercase()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}_{count}")
        }
    }
}
