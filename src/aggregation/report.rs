//! Run diagnostics: every skipped unit of work, kept and logged.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

use super::period::PeriodKey;
use super::sample::MissingReason;

/// What kind of work was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipKind {
    /// Year directory absent
    MissingYear,
    /// Month directory absent, or holding no raster files
    MissingMonth,
    /// A directory could not be listed
    UnreadableDirectory,
    /// A raster file failed to load
    UnreadableFile,
    /// Raster and boundary reference systems cannot be reconciled
    ReferenceSystem,
    /// A slice had no cell inside the boundary coverage
    EmptyIntersection,
    /// No period could be derived for a slice
    UnparsablePeriod,
    /// A period had nothing to aggregate, or aggregation failed
    EmptyPeriod,
    /// A unit had no value for a period
    MissingSample(MissingReason),
    /// A result conflicted with one already recorded
    MatrixConflict,
    /// Work not started because the run was cancelled
    Cancelled,
}

impl fmt::Display for SkipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipKind::MissingYear => f.write_str("missing year"),
            SkipKind::MissingMonth => f.write_str("missing month"),
            SkipKind::UnreadableDirectory => f.write_str("unreadable directory"),
            SkipKind::UnreadableFile => f.write_str("unreadable file"),
            SkipKind::ReferenceSystem => f.write_str("reference system"),
            SkipKind::EmptyIntersection => f.write_str("empty intersection"),
            SkipKind::UnparsablePeriod => f.write_str("unparsable period"),
            SkipKind::EmptyPeriod => f.write_str("empty period"),
            SkipKind::MissingSample(reason) => write!(f, "missing sample ({reason})"),
            SkipKind::MatrixConflict => f.write_str("matrix conflict"),
            SkipKind::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// One skipped unit of work, keyed by whatever identifies it.
#[derive(Debug, Clone, PartialEq)]
pub struct SkipEntry {
    pub kind: SkipKind,
    pub year: Option<i32>,
    pub month: Option<String>,
    pub file: Option<String>,
    pub unit: Option<String>,
    pub period: Option<PeriodKey>,
    pub detail: String,
}

impl SkipEntry {
    pub fn new(kind: SkipKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            year: None,
            month: None,
            file: None,
            unit: None,
            period: None,
            detail: detail.into(),
        }
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn month(mut self, month: impl Into<String>) -> Self {
        self.month = Some(month.into());
        self
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn period(mut self, period: PeriodKey) -> Self {
        self.period = Some(period);
        self
    }

    fn log(&self) {
        let period = self.period.map(|p| p.to_string());
        warn!(
            kind = %self.kind,
            year = self.year,
            month = self.month.as_deref(),
            file = self.file.as_deref(),
            unit = self.unit.as_deref(),
            period = period.as_deref(),
            reason = %self.detail,
            "skipped"
        );
    }
}

impl fmt::Display for SkipEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(year) = self.year {
            write!(f, " year={year}")?;
        }
        if let Some(month) = &self.month {
            write!(f, " month={month}")?;
        }
        if let Some(file) = &self.file {
            write!(f, " file={file}")?;
        }
        if let Some(unit) = &self.unit {
            write!(f, " unit={unit}")?;
        }
        if let Some(period) = &self.period {
            write!(f, " period={period}")?;
        }
        write!(f, ": {}", self.detail)
    }
}

/// Skips collected over a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    entries: Vec<SkipEntry>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log an entry and keep it.
    pub fn skip(&mut self, entry: SkipEntry) {
        entry.log();
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[SkipEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn of_kind(&self, kind: SkipKind) -> impl Iterator<Item = &SkipEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// Entry count per kind.
    pub fn summary(&self) -> BTreeMap<SkipKind, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.entries {
            *counts.entry(e.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Append another report's entries without logging them again.
    pub fn merge(&mut self, other: RunReport) {
        self.entries.extend(other.entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::period::{PeriodBin, PeriodKey};

    #[test]
    fn test_entry_display_names_keys() {
        let entry = SkipEntry::new(SkipKind::MissingSample(MissingReason::OutOfBounds), "no cell")
            .year(2020)
            .unit("Ward A")
            .period(PeriodKey::new(2020, PeriodBin::Month(1)));
        assert_eq!(
            entry.to_string(),
            "missing sample (out of bounds) year=2020 unit=Ward A period=2020 Jan: no cell"
        );
    }

    #[test]
    fn test_summary_and_merge() {
        let mut a = RunReport::new();
        a.skip(SkipEntry::new(SkipKind::MissingMonth, "not found").year(2020).month("01"));
        a.skip(SkipEntry::new(SkipKind::MissingMonth, "not found").year(2020).month("02"));

        let mut b = RunReport::new();
        b.skip(SkipEntry::new(SkipKind::UnreadableFile, "bad header").file("x.tif"));
        a.merge(b);

        assert_eq!(a.len(), 3);
        let summary = a.summary();
        assert_eq!(summary[&SkipKind::MissingMonth], 2);
        assert_eq!(summary[&SkipKind::UnreadableFile], 1);
        assert_eq!(a.of_kind(SkipKind::MissingMonth).count(), 2);
    }
}
