//! Calendar-date time windows for catalog queries.

use chrono::{Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default lookback applied when a caller omits the start date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    Days(i64),
    Months(u32),
}

impl Lookback {
    /// Lookback for interactive scene search.
    pub const SEARCH: Lookback = Lookback::Days(60);
    /// Lookback for tile rendering.
    pub const TILE: Lookback = Lookback::Months(12);
    /// Lookback for area computations.
    pub const COMPUTE: Lookback = Lookback::Days(365);

    fn before(&self, end: NaiveDate) -> NaiveDate {
        match *self {
            Lookback::Days(days) => Duration::try_days(days)
                .and_then(|span| end.checked_sub_signed(span))
                .unwrap_or(NaiveDate::MIN),
            Lookback::Months(months) => end
                .checked_sub_months(Months::new(months))
                .unwrap_or(NaiveDate::MIN),
        }
    }
}

/// An inclusive (start, end) pair of calendar dates.
///
/// `start <= end` is not enforced; the catalog decides what an inverted
/// window means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Window ending `today` and reaching back by `lookback`.
    pub fn ending(today: NaiveDate, lookback: Lookback) -> Self {
        Self {
            start: lookback.before(today),
            end: today,
        }
    }

    /// Parse optional YYYY-MM-DD query values, filling gaps from `lookback`
    /// relative to `today`.
    pub fn from_query(
        start: Option<&str>,
        end: Option<&str>,
        lookback: Lookback,
        today: NaiveDate,
    ) -> Result<Self, TimeParseError> {
        let end = match end.filter(|s| !s.trim().is_empty()) {
            Some(s) => parse_date(s)?,
            None => today,
        };
        let start = match start.filter(|s| !s.trim().is_empty()) {
            Some(s) => parse_date(s)?,
            None => lookback.before(end),
        };
        Ok(Self { start, end })
    }

    /// Same as [`TimeWindow::from_query`] using the current UTC date.
    pub fn from_query_now(
        start: Option<&str>,
        end: Option<&str>,
        lookback: Lookback,
    ) -> Result<Self, TimeParseError> {
        Self::from_query(start, end, lookback, Utc::now().date_naive())
    }

    /// STAC `datetime` interval covering both days entirely.
    pub fn stac_interval(&self) -> String {
        format!(
            "{}T00:00:00Z/{}T23:59:59Z",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.start, self.end)
    }
}

/// Parse a YYYY-MM-DD date.
pub fn parse_date(s: &str) -> Result<NaiveDate, TimeParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| TimeParseError::InvalidFormat(s.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid date: {0}. Expected YYYY-MM-DD")]
    InvalidFormat(String),
}
