//! Calendar-month windows in UTC.

use chrono::{DateTime, Datelike, Month, NaiveDate, Utc};
use domain::TimeRange;

use crate::{ReportingError, Result};

/// One calendar month, `[first day 00:00, first day of next month 00:00)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    month: Month,
    year: i32,
    range: TimeRange,
}

impl MonthWindow {
    /// The calendar month before the one containing `now`.
    pub fn previous(now: DateTime<Utc>) -> Result<Self> {
        let (year, month) = match now.month() {
            1 => (now.year() - 1, 12),
            m => (now.year(), m - 1),
        };
        let start = month_start(year, month).ok_or(ReportingError::InvalidDate(now))?;
        let end = month_start(now.year(), now.month()).ok_or(ReportingError::InvalidDate(now))?;
        let month = u8::try_from(month)
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .ok_or(ReportingError::InvalidDate(now))?;

        Ok(Self {
            month,
            year,
            range: TimeRange { start, end },
        })
    }

    /// English month name, e.g. `"September"`.
    pub fn name(&self) -> &'static str {
        self.month.name()
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }
}

fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, 1)?
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
}
