//! Unit × period result matrix.
//!
//! Every (unit, period) cell starts [`CellState::Pending`]. The driver records
//! each cell exactly once, either as a value or as an explicit
//! [`CellState::Missing`], so "never computed", "computed, no data" and
//! "computed as zero" stay distinguishable downstream.

use std::collections::HashMap;

use thiserror::Error;

use super::period::PeriodKey;

/// Error type for matrix updates.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatrixError {
    #[error("unknown boundary unit: {0}")]
    UnknownUnit(String),

    #[error("period {0} is outside the run")]
    UnknownPeriod(PeriodKey),

    #[error("{unit} already has an entry for {period}")]
    DuplicateEntry { unit: String, period: PeriodKey },
}

/// State of one (unit, period) cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellState {
    /// Not computed (e.g. the run was cancelled first)
    Pending,
    /// Computed, no value available
    Missing,
    Value(f64),
}

impl CellState {
    pub fn value(&self) -> Option<f64> {
        match *self {
            CellState::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// One (unit, period, value) entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub unit: String,
    pub period: PeriodKey,
    pub value: Option<f64>,
}

impl SampleRecord {
    pub fn new(unit: impl Into<String>, period: PeriodKey, value: Option<f64>) -> Self {
        Self {
            unit: unit.into(),
            period,
            value,
        }
    }
}

/// Dense unit × period matrix.
#[derive(Debug, Clone)]
pub struct ResultMatrix {
    units: Vec<String>,
    unit_index: HashMap<String, usize>,
    periods: Vec<PeriodKey>,
    period_index: HashMap<PeriodKey, usize>,
    cells: Vec<CellState>,
}

impl ResultMatrix {
    /// Create a matrix with every cell pending.
    ///
    /// Periods are sorted and deduplicated; units keep their order.
    pub fn new(units: Vec<String>, mut periods: Vec<PeriodKey>) -> Self {
        periods.sort();
        periods.dedup();

        let unit_index = units
            .iter()
            .enumerate()
            .map(|(i, u)| (u.clone(), i))
            .collect();
        let period_index = periods.iter().enumerate().map(|(i, p)| (*p, i)).collect();
        let cells = vec![CellState::Pending; units.len() * periods.len()];

        Self {
            units,
            unit_index,
            periods,
            period_index,
            cells,
        }
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn periods(&self) -> &[PeriodKey] {
        &self.periods
    }

    /// Distinct years, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.periods.iter().map(|p| p.year).collect();
        years.dedup();
        years
    }

    fn index(&self, unit: &str, period: &PeriodKey) -> Result<usize, MatrixError> {
        let u = *self
            .unit_index
            .get(unit)
            .ok_or_else(|| MatrixError::UnknownUnit(unit.to_string()))?;
        let p = *self
            .period_index
            .get(period)
            .ok_or(MatrixError::UnknownPeriod(*period))?;
        Ok(p * self.units.len() + u)
    }

    /// Record a cell. `None` records an explicit Missing.
    pub fn record(&mut self, unit: &str, period: PeriodKey, value: Option<f64>) -> Result<(), MatrixError> {
        let idx = self.index(unit, &period)?;
        if self.cells[idx] != CellState::Pending {
            return Err(MatrixError::DuplicateEntry {
                unit: unit.to_string(),
                period,
            });
        }
        self.cells[idx] = match value {
            Some(v) => CellState::Value(v),
            None => CellState::Missing,
        };
        Ok(())
    }

    /// Merge a worker's partial result, returning the entries that conflicted.
    pub fn merge(&mut self, records: impl IntoIterator<Item = SampleRecord>) -> Vec<MatrixError> {
        records
            .into_iter()
            .filter_map(|r| self.record(&r.unit, r.period, r.value).err())
            .collect()
    }

    /// Turn every pending cell of a period into Missing. Returns how many changed.
    pub fn close_period(&mut self, period: &PeriodKey) -> usize {
        let Some(&p) = self.period_index.get(period) else {
            return 0;
        };
        let n = self.units.len();
        let mut changed = 0;
        for cell in &mut self.cells[p * n..(p + 1) * n] {
            if *cell == CellState::Pending {
                *cell = CellState::Missing;
                changed += 1;
            }
        }
        changed
    }

    pub fn state(&self, unit: &str, period: &PeriodKey) -> Option<CellState> {
        self.index(unit, period).ok().map(|i| self.cells[i])
    }

    /// Value of a cell, None when missing, pending or unknown.
    pub fn get(&self, unit: &str, period: &PeriodKey) -> Option<f64> {
        self.state(unit, period).and_then(|s| s.value())
    }

    /// Long-form records in period then unit order.
    pub fn records(&self) -> impl Iterator<Item = SampleRecord> + '_ {
        let n = self.units.len();
        self.cells.iter().enumerate().map(move |(idx, cell)| SampleRecord {
            unit: self.units[idx % n].clone(),
            period: self.periods[idx / n],
            value: cell.value(),
        })
    }

    /// All periods of one unit.
    pub fn unit_series(&self, unit: &str) -> Option<Vec<(PeriodKey, Option<f64>)>> {
        let u = *self.unit_index.get(unit)?;
        let n = self.units.len();
        Some(
            self.periods
                .iter()
                .enumerate()
                .map(|(p, key)| (*key, self.cells[p * n + u].value()))
                .collect(),
        )
    }

    /// All units for one period, in unit order.
    pub fn period_column(&self, period: &PeriodKey) -> Option<Vec<(&str, Option<f64>)>> {
        let p = *self.period_index.get(period)?;
        let n = self.units.len();
        Some(
            self.units
                .iter()
                .zip(&self.cells[p * n..(p + 1) * n])
                .map(|(u, c)| (u.as_str(), c.value()))
                .collect(),
        )
    }

    pub fn filled_count(&self) -> usize {
        self.cells.iter().filter(|c| matches!(c, CellState::Value(_))).count()
    }

    pub fn missing_count(&self) -> usize {
        self.cells.iter().filter(|c| **c == CellState::Missing).count()
    }

    pub fn pending_count(&self) -> usize {
        self.cells.iter().filter(|c| **c == CellState::Pending).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::period::{BinningMode, PeriodBin, Quarter};

    fn matrix() -> ResultMatrix {
        ResultMatrix::new(
            vec!["A".to_string(), "B".to_string()],
            BinningMode::Quarter.expected_periods(2020),
        )
    }

    fn q1() -> PeriodKey {
        PeriodKey::new(2020, PeriodBin::Quarter(Quarter::JanMar))
    }

    #[test]
    fn test_new_matrix_is_pending() {
        let m = matrix();
        assert_eq!(m.pending_count(), 8);
        assert_eq!(m.state("A", &q1()), Some(CellState::Pending));
        assert_eq!(m.get("A", &q1()), None);
        assert_eq!(m.years(), vec![2020]);
    }

    #[test]
    fn test_record_value_zero_and_missing() {
        let mut m = matrix();
        m.record("A", q1(), Some(0.0)).unwrap();
        m.record("B", q1(), None).unwrap();

        assert_eq!(m.state("A", &q1()), Some(CellState::Value(0.0)));
        assert_eq!(m.state("B", &q1()), Some(CellState::Missing));
        assert_eq!(m.filled_count(), 1);
        assert_eq!(m.missing_count(), 1);
    }

    #[test]
    fn test_at_most_one_value_per_cell() {
        let mut m = matrix();
        m.record("A", q1(), Some(0.2)).unwrap();
        let err = m.record("A", q1(), Some(0.3)).unwrap_err();
        assert!(matches!(err, MatrixError::DuplicateEntry { .. }));
        assert_eq!(m.get("A", &q1()), Some(0.2));
    }

    #[test]
    fn test_unknown_keys() {
        let mut m = matrix();
        assert!(matches!(
            m.record("Z", q1(), Some(1.0)),
            Err(MatrixError::UnknownUnit(_))
        ));
        let other_year = PeriodKey::new(1999, PeriodBin::Quarter(Quarter::JanMar));
        assert!(matches!(
            m.record("A", other_year, Some(1.0)),
            Err(MatrixError::UnknownPeriod(_))
        ));
    }

    #[test]
    fn test_close_period_and_views() {
        let mut m = matrix();
        m.record("B", q1(), Some(0.5)).unwrap();
        assert_eq!(m.close_period(&q1()), 1);
        assert_eq!(m.state("A", &q1()), Some(CellState::Missing));

        let column = m.period_column(&q1()).unwrap();
        assert_eq!(column, vec![("A", None), ("B", Some(0.5))]);

        let series = m.unit_series("B").unwrap();
        assert_eq!(series.len(), 4);
        assert_eq!(series[0], (q1(), Some(0.5)));

        let records: Vec<SampleRecord> = m.records().collect();
        assert_eq!(records.len(), 8);
        assert_eq!(records[1], SampleRecord::new("B", q1(), Some(0.5)));
    }

    #[test]
    fn test_merge_reports_conflicts() {
        let mut m = matrix();
        let errors = m.merge(vec![
            SampleRecord::new("A", q1(), Some(1.0)),
            SampleRecord::new("A", q1(), Some(2.0)),
            SampleRecord::new("B", q1(), None),
        ]);
        assert_eq!(errors.len(), 1);
        assert_eq!(m.get("A", &q1()), Some(1.0));
        assert_eq!(m.state("B", &q1()), Some(CellState::Missing));
    }
}
