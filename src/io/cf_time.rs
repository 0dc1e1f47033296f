//! CF-convention time axes: `<unit> since <reference date>`.

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// A parsed CF time unit string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CfTimeUnits {
    /// Seconds per unit
    seconds: f64,
    reference: NaiveDateTime,
}

impl CfTimeUnits {
    /// Parse e.g. `days since 2020-01-01` or `hours since 1900-1-1 00:00:00`.
    pub fn parse(units: &str) -> Option<Self> {
        let lower = units.trim().to_ascii_lowercase();
        let (unit, reference) = lower.split_once(" since ")?;
        let seconds = match unit.trim() {
            "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
            "minutes" | "minute" | "mins" | "min" => 60.0,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
            "days" | "day" | "d" => 86_400.0,
            _ => return None,
        };
        Some(Self {
            seconds,
            reference: parse_reference(reference)?,
        })
    }

    /// Timestamp of an offset along the axis.
    pub fn at(&self, offset: f64) -> Option<NaiveDateTime> {
        if !offset.is_finite() {
            return None;
        }
        let millis = (offset * self.seconds * 1000.0).round();
        if millis.abs() > i64::MAX as f64 {
            return None;
        }
        self.reference
            .checked_add_signed(Duration::milliseconds(millis as i64))
    }
}

fn parse_reference(text: &str) -> Option<NaiveDateTime> {
    let text = text
        .trim()
        .trim_end_matches("utc")
        .trim_end_matches('z')
        .trim()
        .replace('t', " ");
    let text = text.as_str();

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    let date_part = text.split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_since() {
        let units = CfTimeUnits::parse("days since 2020-01-01").unwrap();
        let ts = units.at(45.0).unwrap();
        assert_eq!(ts.format("%Y-%m-%d").to_string(), "2020-02-15");
    }

    #[test]
    fn test_hours_since_unpadded_reference() {
        let units = CfTimeUnits::parse("hours since 1900-1-1 00:00:00").unwrap();
        let ts = units.at(24.0 * 365.0 + 12.0).unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H").to_string(), "1901-01-01 12");
    }

    #[test]
    fn test_iso_reference_with_zone() {
        let units = CfTimeUnits::parse("seconds since 1970-01-01T00:00:00Z").unwrap();
        let ts = units.at(86_400.0).unwrap();
        assert_eq!(ts.format("%Y-%m-%d").to_string(), "1970-01-02");
    }

    #[test]
    fn test_rejects_unknown() {
        assert!(CfTimeUnits::parse("fortnights since 2020-01-01").is_none());
        assert!(CfTimeUnits::parse("days").is_none());
        let units = CfTimeUnits::parse("days since 2020-01-01").unwrap();
        assert!(units.at(f64::NAN).is_none());
    }
}
