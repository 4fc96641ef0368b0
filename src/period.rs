//! Billing period resolution
//!
//! Cost Explorer takes an inclusive start date and an exclusive end date,
//! both as `YYYY-MM-DD` strings.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{CostError, Result};

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// A date range handed to the cost ledger, end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BillingPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end <= start {
            return Err(CostError::Config(format!(
                "billing period end {end} must be after start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse explicit `YYYY-MM-DD` overrides
    pub fn from_iso(start: &str, end: &str) -> Result<Self> {
        let parse = |value: &str| {
            NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                .map_err(|e| CostError::Config(format!("invalid date {value:?}: {e}")))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    /// Month-to-date: first of the month through today.
    ///
    /// On the first day of a month the end is pushed to tomorrow so the range is never empty.
    pub fn current(today: NaiveDate) -> Self {
        let start = today - Duration::days(i64::from(today.day0()));
        let end = if today > start {
            today
        } else {
            today + Duration::days(1)
        };
        Self { start, end }
    }

    /// A whole calendar month
    pub fn month(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(CostError::Config(format!("invalid month number {month}")));
        }
        let start = first_of_month(year, month)?;
        let end = if month == 12 {
            first_of_month(year.saturating_add(1), 1)?
        } else {
            first_of_month(year, month + 1)?
        };
        Self::new(start, end)
    }

    pub fn start_iso(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_iso(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start_iso(), self.end_iso())
    }
}

/// Which month the widget should display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPeriod {
    Current,
    Month { year: i32, month: u32 },
}

impl DisplayPeriod {
    /// Parse `"current"`, a month name, or `"YYYY-MM"`.
    ///
    /// A bare month name means its most recent completed occurrence relative to `today`.
    pub fn parse(value: &str, today: NaiveDate) -> Result<Self> {
        let normalized = value.trim().to_lowercase();
        if normalized.is_empty() || normalized == "current" {
            return Ok(Self::Current);
        }

        if let Some(index) = MONTH_NAMES.iter().position(|name| *name == normalized) {
            let month = index as u32 + 1;
            let year = if month < today.month() {
                today.year()
            } else {
                today.year() - 1
            };
            return Ok(Self::Month { year, month });
        }

        if let Some((year, month)) = normalized.split_once('-') {
            if let (Ok(year), Ok(month)) = (year.parse::<i32>(), month.parse::<u32>()) {
                if (1..=12).contains(&month) {
                    // Only closed months have a final bill
                    if (year, month) >= (today.year(), today.month()) {
                        return Err(CostError::Config(format!(
                            "display_month {value:?} has not ended yet; use \"current\" for month to date"
                        )));
                    }
                    return Ok(Self::Month { year, month });
                }
            }
        }

        Err(CostError::Config(format!(
            "unrecognized display_month {value:?}; use \"current\", a month name, or YYYY-MM"
        )))
    }

    pub fn is_current(&self) -> bool {
        matches!(self, Self::Current)
    }

    pub fn resolve(&self, today: NaiveDate) -> Result<BillingPeriod> {
        match *self {
            Self::Current => Ok(BillingPeriod::current(today)),
            Self::Month { year, month } => BillingPeriod::month(year, month),
        }
    }

    pub fn label(&self) -> String {
        match *self {
            Self::Current => "current month".to_string(),
            Self::Month { year, month } => {
                let name = MONTH_NAMES[(month - 1) as usize];
                let mut chars = name.chars();
                let capitalized = match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                };
                format!("{capitalized} {year}")
            }
        }
    }
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| CostError::Config(format!("{year}-{month:02} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn current_period_runs_from_first_of_month_to_today() {
        let period = BillingPeriod::current(date(2026, 10, 17));
        assert_eq!(period.start_iso(), "2026-10-01");
        assert_eq!(period.end_iso(), "2026-10-17");
    }

    #[test]
    fn current_period_on_first_day_is_not_empty() {
        let period = BillingPeriod::current(date(2026, 10, 1));
        assert_eq!(period.start_iso(), "2026-10-01");
        assert_eq!(period.end_iso(), "2026-10-02");
    }

    #[test]
    fn month_period_ends_on_first_of_next_month() {
        let november = BillingPeriod::month(2025, 11).unwrap();
        assert_eq!(november.to_string(), "2025-11-01..2025-12-01");

        let december = BillingPeriod::month(2025, 12).unwrap();
        assert_eq!(december.end_iso(), "2026-01-01");
    }

    #[test]
    fn month_name_resolves_to_most_recent_completed_month() {
        let today = date(2026, 10, 17);
        assert_eq!(
            DisplayPeriod::parse("November", today).unwrap(),
            DisplayPeriod::Month { year: 2025, month: 11 }
        );
        assert_eq!(
            DisplayPeriod::parse("september", today).unwrap(),
            DisplayPeriod::Month { year: 2026, month: 9 }
        );
        // The running month is not complete yet
        assert_eq!(
            DisplayPeriod::parse("october", today).unwrap(),
            DisplayPeriod::Month { year: 2025, month: 10 }
        );
    }

    #[test]
    fn parses_current_and_explicit_months() {
        let today = date(2026, 10, 17);
        assert!(DisplayPeriod::parse("current", today).unwrap().is_current());
        assert_eq!(
            DisplayPeriod::parse("2025-11", today).unwrap(),
            DisplayPeriod::Month { year: 2025, month: 11 }
        );
        assert!(DisplayPeriod::parse("2025-13", today).is_err());
        assert!(DisplayPeriod::parse("2026-09", today).is_ok());
        assert!(DisplayPeriod::parse("someday", today).is_err());
    }

    #[test]
    fn running_and_future_months_are_not_historical() {
        let today = date(2026, 10, 17);
        let err = DisplayPeriod::parse("2026-10", today).unwrap_err();
        assert!(matches!(err, CostError::Config(_)));
        assert!(err.to_string().contains("has not ended"));
        assert!(DisplayPeriod::parse("2027-01", today).is_err());
    }

    #[test]
    fn out_of_range_years_are_rejected() {
        assert!(matches!(
            BillingPeriod::month(i32::MAX, 12),
            Err(CostError::Config(_))
        ));
        assert!(BillingPeriod::month(300_000, 1).is_err());
    }

    #[test]
    fn explicit_overrides_must_be_ordered() {
        assert!(BillingPeriod::from_iso("2025-11-01", "2025-12-01").is_ok());
        assert!(BillingPeriod::from_iso("2025-12-01", "2025-11-01").is_err());
        assert!(BillingPeriod::from_iso("2025-11-xx", "2025-12-01").is_err());
    }

    #[test]
    fn labels_are_human_readable() {
        assert_eq!(DisplayPeriod::Month { year: 2025, month: 11 }.label(), "November 2025");
        assert_eq!(DisplayPeriod::Current.label(), "current month");
    }
}
