use chrono::{Datelike, NaiveDate};

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// MonthWindow
// ---------------------------------------------------------------------------

/// A resolved calendar month: inclusive `[start, end]` dates plus the
/// canonical `YYYY-MM` key. Every month-scoped computation takes one of
/// these explicitly; the engine has no implicit "current month".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthWindow {
    pub year: i32,
    pub month: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MonthWindow {
    pub fn new(year: i32, month: u32) -> Result<Self, EngineError> {
        let bad = || EngineError::MonthKey(format!("{year:04}-{month:02}"));
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(bad)?;
        let next_first = match month {
            12 => NaiveDate::from_ymd_opt(year + 1, 1, 1),
            _ => NaiveDate::from_ymd_opt(year, month + 1, 1),
        };
        let end = next_first.and_then(|d| d.pred_opt()).ok_or_else(bad)?;
        Ok(Self { year, month, start, end })
    }

    /// Parse a `YYYY-MM` key. Strict: four-digit year, two-digit month 01-12.
    pub fn from_key(key: &str) -> Result<Self, EngineError> {
        let bad = || EngineError::MonthKey(key.to_string());
        let (y, m) = key.split_once('-').ok_or_else(bad)?;
        if y.len() != 4
            || m.len() != 2
            || !y.bytes().all(|b| b.is_ascii_digit())
            || !m.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(bad());
        }
        let year: i32 = y.parse().map_err(|_| bad())?;
        let month: u32 = m.parse().map_err(|_| bad())?;
        if !(1..=12).contains(&month) {
            return Err(bad());
        }
        Self::new(year, month)
    }

    /// The window containing the given date.
    pub fn containing(date: NaiveDate) -> Self {
        Self::new(date.year(), date.month()).expect("a valid date implies a valid month")
    }

    /// The calendar month immediately before this one, with year rollover
    /// at January.
    pub fn prior(&self) -> Self {
        let (year, month) = match self.month {
            1 => (self.year - 1, 12),
            _ => (self.year, self.month - 1),
        };
        Self::new(year, month).expect("prior month of a valid window is valid")
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// Long-form label, e.g. "February 2026".
    pub fn label(&self) -> String {
        self.start.format("%B %Y").to_string()
    }
}

/// Month keys from `origin` through the month containing `as_of`, oldest
/// first. Empty when `as_of` predates the origin month.
pub fn available_months(origin: &MonthWindow, as_of: NaiveDate) -> Vec<String> {
    let current = MonthWindow::containing(as_of);
    let mut months = Vec::new();
    let (mut year, mut month) = (origin.year, origin.month);
    while (year, month) <= (current.year, current.month) {
        months.push(format!("{year:04}-{month:02}"));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    months
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn from_key_resolves_bounds() {
        let w = MonthWindow::from_key("2026-02").unwrap();
        assert_eq!(w.start, date("2026-02-01"));
        assert_eq!(w.end, date("2026-02-28"));
        assert_eq!(w.key(), "2026-02");
        assert_eq!(w.label(), "February 2026");
    }

    #[test]
    fn from_key_handles_leap_february() {
        let w = MonthWindow::from_key("2028-02").unwrap();
        assert_eq!(w.end, date("2028-02-29"));
    }

    #[test]
    fn from_key_rejects_malformed_keys() {
        for bad in ["2026-2", "2026-13", "2026-00", "abcd-ef", "2026-02-10", "202602", ""] {
            assert!(MonthWindow::from_key(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn contains_is_inclusive() {
        let w = MonthWindow::from_key("2026-03").unwrap();
        assert!(w.contains(date("2026-03-01")));
        assert!(w.contains(date("2026-03-31")));
        assert!(!w.contains(date("2026-02-28")));
        assert!(!w.contains(date("2026-04-01")));
    }

    #[test]
    fn prior_rolls_over_january() {
        let w = MonthWindow::from_key("2026-01").unwrap();
        let p = w.prior();
        assert_eq!(p.key(), "2025-12");
        assert_eq!(p.end, date("2025-12-31"));
    }

    #[test]
    fn available_months_spans_year_boundary() {
        let origin = MonthWindow::from_key("2025-11").unwrap();
        let months = available_months(&origin, date("2026-02-15"));
        assert_eq!(months, vec!["2025-11", "2025-12", "2026-01", "2026-02"]);
    }

    #[test]
    fn available_months_empty_before_origin() {
        let origin = MonthWindow::from_key("2025-11").unwrap();
        assert!(available_months(&origin, date("2025-10-31")).is_empty());
    }
}
