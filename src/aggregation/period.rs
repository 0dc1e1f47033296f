//! Period binning: map timestamps and file identifiers to temporal bins.
//!
//! Bins are calendar based and fixed:
//!
//! | Mode    | Bins per year | Label        |
//! |---------|---------------|--------------|
//! | day     | 365/366       | `2020-01-05` |
//! | dekad   | 36            | `Jan-dk1`    |
//! | month   | 12            | `Jan`        |
//! | quarter | 4             | `Jan-Mar`    |
//!
//! Dekads split a month at days 10 and 20 (1-10, 11-20, 21-end). Quarters
//! come from the static [`QUARTERS`] table.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for period binning.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PeriodError {
    /// The identifier does not follow the expected naming convention
    #[error("cannot derive a {mode} period from '{identifier}'")]
    Unparsable { identifier: String, mode: BinningMode },

    /// Unknown binning mode name
    #[error("unknown binning mode: {0}")]
    UnknownMode(String),
}

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// The four three-month groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quarter {
    JanMar,
    AprJun,
    JulSep,
    OctDec,
}

/// Quarter lookup table: (quarter, label, member months).
pub const QUARTERS: [(Quarter, &str, [u32; 3]); 4] = [
    (Quarter::JanMar, "Jan-Mar", [1, 2, 3]),
    (Quarter::AprJun, "Apr-Jun", [4, 5, 6]),
    (Quarter::JulSep, "Jul-Sep", [7, 8, 9]),
    (Quarter::OctDec, "Oct-Dec", [10, 11, 12]),
];

impl Quarter {
    /// Quarter containing a calendar month, by table lookup.
    pub fn of_month(month: u32) -> Option<Quarter> {
        QUARTERS
            .iter()
            .find(|(_, _, months)| months.contains(&month))
            .map(|(q, _, _)| *q)
    }

    pub fn label(&self) -> &'static str {
        QUARTERS
            .iter()
            .find(|(q, _, _)| q == self)
            .map(|(_, label, _)| *label)
            .unwrap_or_default()
    }

    pub fn months(&self) -> [u32; 3] {
        QUARTERS
            .iter()
            .find(|(q, _, _)| q == self)
            .map(|(_, _, months)| *months)
            .unwrap_or_default()
    }
}

/// Temporal binning mode of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinningMode {
    Day,
    Dekad,
    Month,
    Quarter,
}

impl BinningMode {
    /// Mode slices are averaged at before this mode's bins.
    ///
    /// Quarters are the mean of their monthly means.
    pub fn intermediate(&self) -> Option<BinningMode> {
        match self {
            BinningMode::Quarter => Some(BinningMode::Month),
            _ => None,
        }
    }

    /// Every period of a year under this mode, in calendar order.
    pub fn expected_periods(&self, year: i32) -> Vec<PeriodKey> {
        match self {
            BinningMode::Day => {
                let mut days = Vec::with_capacity(366);
                let mut date = NaiveDate::from_ymd_opt(year, 1, 1);
                while let Some(d) = date.filter(|d| d.year() == year) {
                    days.push(PeriodKey::new(
                        year,
                        PeriodBin::Day {
                            month: d.month(),
                            day: d.day(),
                        },
                    ));
                    date = d.succ_opt();
                }
                days
            }
            BinningMode::Dekad => (1..=12)
                .flat_map(|month| {
                    (1..=3).map(move |dekad| PeriodKey::new(year, PeriodBin::Dekad { month, dekad }))
                })
                .collect(),
            BinningMode::Month => (1..=12)
                .map(|m| PeriodKey::new(year, PeriodBin::Month(m)))
                .collect(),
            BinningMode::Quarter => QUARTERS
                .iter()
                .map(|(q, _, _)| PeriodKey::new(year, PeriodBin::Quarter(*q)))
                .collect(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinningMode::Day => "day",
            BinningMode::Dekad => "dekad",
            BinningMode::Month => "month",
            BinningMode::Quarter => "quarter",
        }
    }
}

impl fmt::Display for BinningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BinningMode {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(BinningMode::Day),
            "dekad" | "dekadal" => Ok(BinningMode::Dekad),
            "month" | "monthly" => Ok(BinningMode::Month),
            "quarter" | "quarterly" => Ok(BinningMode::Quarter),
            other => Err(PeriodError::UnknownMode(other.to_string())),
        }
    }
}

/// A bin within a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeriodBin {
    Day { month: u32, day: u32 },
    Dekad { month: u32, dekad: u32 },
    Month(u32),
    Quarter(Quarter),
}

/// A temporal bin: year plus bin within the year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeriodKey {
    pub year: i32,
    pub bin: PeriodBin,
}

impl PeriodKey {
    pub fn new(year: i32, bin: PeriodBin) -> Self {
        Self { year, bin }
    }

    /// Bin label without the year (`Jan-dk2`, `Apr-Jun`, ...).
    pub fn label(&self) -> String {
        match self.bin {
            PeriodBin::Day { month, day } => format!("{:04}-{:02}-{:02}", self.year, month, day),
            PeriodBin::Dekad { month, dekad } => format!("{}-dk{}", month_name(month), dekad),
            PeriodBin::Month(month) => month_name(month).to_string(),
            PeriodBin::Quarter(q) => q.label().to_string(),
        }
    }

    /// Calendar month for day, dekad and month bins.
    pub fn month(&self) -> Option<u32> {
        match self.bin {
            PeriodBin::Day { month, .. } | PeriodBin::Dekad { month, .. } | PeriodBin::Month(month) => {
                Some(month)
            }
            PeriodBin::Quarter(_) => None,
        }
    }

    /// Re-bin into a coarser mode. Returns None when the conversion would need
    /// information the key does not hold (e.g. month to dekad).
    pub fn coarsen(&self, mode: BinningMode) -> Option<PeriodKey> {
        let bin = match (mode, self.bin) {
            (BinningMode::Day, PeriodBin::Day { .. }) => self.bin,
            (BinningMode::Dekad, PeriodBin::Day { month, day }) => PeriodBin::Dekad {
                month,
                dekad: dekad_of_day(day),
            },
            (BinningMode::Dekad, PeriodBin::Dekad { .. }) => self.bin,
            (BinningMode::Month, _) => PeriodBin::Month(self.month()?),
            (BinningMode::Quarter, PeriodBin::Quarter(_)) => self.bin,
            (BinningMode::Quarter, _) => PeriodBin::Quarter(Quarter::of_month(self.month()?)?),
            _ => return None,
        };
        Some(PeriodKey::new(self.year, bin))
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bin {
            PeriodBin::Day { .. } => f.write_str(&self.label()),
            _ => write!(f, "{} {}", self.year, self.label()),
        }
    }
}

/// Identifier of a raster source: `base/<year>/<month_dir>/<file_name>`.
#[derive(Debug, Clone, Copy)]
pub struct SourceId<'a> {
    pub year: i32,
    pub month_dir: &'a str,
    pub file_name: &'a str,
}

impl SourceId<'_> {
    fn describe(&self) -> String {
        format!("{}/{}/{}", self.year, self.month_dir, self.file_name)
    }
}

/// What a period gets derived from.
#[derive(Debug, Clone, Copy)]
pub enum PeriodToken<'a> {
    /// Time recorded in the raster itself
    Timestamp(NaiveDateTime),
    /// Location and name of the raster file
    Identifier(SourceId<'a>),
}

/// Day-of-month to dekad ordinal (1-10 → 1, 11-20 → 2, 21-end → 3).
pub fn dekad_of_day(day: u32) -> u32 {
    match day {
        0..=10 => 1,
        11..=20 => 2,
        _ => 3,
    }
}

/// Assign a token to its period under a binning mode.
///
/// Pure: the same token and mode always give the same key.
pub fn bin(token: PeriodToken<'_>, mode: BinningMode) -> Result<PeriodKey, PeriodError> {
    match token {
        PeriodToken::Timestamp(ts) => Ok(bin_date(ts.date(), mode)),
        PeriodToken::Identifier(id) => bin_identifier(&id, mode),
    }
}

/// Bin one slice of a file, choosing between its timestamp and its identifier.
///
/// An explicit `-dk<N>` token wins in dekad mode. Otherwise the slice
/// timestamp is used when it falls in the source's year and month
/// directory; a timestamp that contradicts the archive layout is ignored.
pub fn bin_slice(
    timestamp: Option<NaiveDateTime>,
    id: SourceId<'_>,
    mode: BinningMode,
) -> Result<PeriodKey, PeriodError> {
    if mode == BinningMode::Dekad && dekad_token(id.file_name).is_some() {
        return bin(PeriodToken::Identifier(id), mode);
    }
    match timestamp {
        Some(ts) if within_source(ts, &id) => bin(PeriodToken::Timestamp(ts), mode),
        _ => bin(PeriodToken::Identifier(id), mode),
    }
}

fn within_source(ts: NaiveDateTime, id: &SourceId<'_>) -> bool {
    ts.year() == id.year && parse_month_dir(id.month_dir).map_or(true, |m| ts.month() == m)
}

fn bin_date(date: NaiveDate, mode: BinningMode) -> PeriodKey {
    let year = date.year();
    let month = date.month();
    let bin = match mode {
        BinningMode::Day => PeriodBin::Day {
            month,
            day: date.day(),
        },
        BinningMode::Dekad => PeriodBin::Dekad {
            month,
            dekad: dekad_of_day(date.day()),
        },
        BinningMode::Month => PeriodBin::Month(month),
        BinningMode::Quarter => match Quarter::of_month(month) {
            Some(q) => PeriodBin::Quarter(q),
            None => unreachable!("chrono months are 1-12"),
        },
    };
    PeriodKey::new(year, bin)
}

fn bin_identifier(id: &SourceId<'_>, mode: BinningMode) -> Result<PeriodKey, PeriodError> {
    let unparsable = || PeriodError::Unparsable {
        identifier: id.describe(),
        mode,
    };
    let dir_month = parse_month_dir(id.month_dir);
    let file_date = date_token(id.file_name);

    match mode {
        BinningMode::Day => file_date.map(|d| bin_date(d, mode)).ok_or_else(unparsable),
        BinningMode::Dekad => {
            if let (Some(dekad), Some(month)) = (dekad_token(id.file_name), dir_month) {
                Ok(PeriodKey::new(id.year, PeriodBin::Dekad { month, dekad }))
            } else {
                file_date.map(|d| bin_date(d, mode)).ok_or_else(unparsable)
            }
        }
        BinningMode::Month | BinningMode::Quarter => {
            let month = dir_month
                .map(|m| (id.year, m))
                .or_else(|| file_date.map(|d| (d.year(), d.month())))
                .ok_or_else(unparsable)?;
            let date = NaiveDate::from_ymd_opt(month.0, month.1, 1).ok_or_else(unparsable)?;
            Ok(bin_date(date, mode))
        }
    }
}

/// Month directory name `01`..`12` (leading zero optional).
fn parse_month_dir(name: &str) -> Option<u32> {
    let name = name.trim();
    if name.is_empty() || name.len() > 2 || !name.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    name.parse().ok().filter(|m| (1..=12).contains(m))
}

/// The digit following the last `-dk` in a file name, if it is 1-3.
fn dekad_token(file_name: &str) -> Option<u32> {
    let lower = file_name.to_ascii_lowercase();
    let pos = lower.rfind("-dk")?;
    lower[pos + 3..]
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .filter(|d| (1..=3).contains(d))
}

/// First `YYYYMMDD`, `YYYY-MM-DD` or `YYYY_MM_DD` date embedded in a name.
fn date_token(file_name: &str) -> Option<NaiveDate> {
    let bytes = file_name.as_bytes();
    let digit_at = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);
    let bounded = |start: usize, len: usize| {
        (start == 0 || !digit_at(start - 1)) && !digit_at(start + len)
    };

    for start in 0..bytes.len() {
        if bounded(start, 8) && (start..start + 8).all(digit_at) {
            if let Ok(d) = NaiveDate::parse_from_str(&file_name[start..start + 8], "%Y%m%d") {
                return Some(d);
            }
        }
        let Some(candidate) = file_name.get(start..start + 10) else {
            continue;
        };
        if bounded(start, 10) {
            let sep = candidate.as_bytes()[4];
            if (sep == b'-' || sep == b'_') && candidate.as_bytes()[7] == sep {
                let fmt = if sep == b'-' { "%Y-%m-%d" } else { "%Y_%m_%d" };
                if let Ok(d) = NaiveDate::parse_from_str(candidate, fmt) {
                    return Some(d);
                }
            }
        }
    }
    None
}

fn month_name(month: u32) -> &'static str {
    MONTH_NAMES
        .get(month.wrapping_sub(1) as usize)
        .copied()
        .unwrap_or("???")
}
