//! Time types for calendar queries.
//!
//! This module provides [`EventTime`] for upstream timestamps (which may be
//! either a specific datetime or an all-day date), [`DateRange`] for query
//! ranges, and [`MonthDay`] for yearly cutoff dates.

use chrono::{DateTime, Datelike, Duration, DurationRound, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Errors raised while building a [`DateRange`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// The range ends before it starts.
    #[error("range start {start} is after end {end}")]
    Inverted {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Month outside 1..=12.
    #[error("invalid month: {0}")]
    InvalidMonth(u32),

    /// A calendar date that does not exist (e.g. February 30th).
    #[error("invalid date: {year}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    /// The range end does not fit in a timestamp.
    #[error("{days} days from {start} is out of range")]
    OutOfBounds { start: DateTime<Utc>, days: u32 },
}

/// A timestamp as sent by an upstream source.
///
/// Upstreams send either a full datetime or a bare date for all-day events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A specific datetime, stored in UTC.
    DateTime(DateTime<Utc>),
    /// An all-day event date (no specific time).
    AllDay(NaiveDate),
}

impl EventTime {
    /// Parses an upstream timestamp.
    ///
    /// Accepts RFC 3339 (`2025-07-15T09:00:00+02:00`), naive datetimes
    /// (`2025-07-15T09:00:00`, `2025-07-15 09:00:00`, `2025-07-15T09:00`),
    /// which are taken as UTC, and bare dates (`2025-07-15`).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(Self::DateTime(dt.with_timezone(&Utc)));
        }

        for format in [
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%dT%H:%M",
            "%Y-%m-%d %H:%M",
        ] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Some(Self::DateTime(naive.and_utc()));
            }
        }

        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .map(Self::AllDay)
    }

    /// Returns `true` if this is an all-day event time.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Converts to a UTC datetime.
    ///
    /// For all-day values, returns midnight UTC on that date.
    pub fn to_utc_datetime(&self) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => start_of_day(*date),
        }
    }

    /// Returns the date portion of this event time.
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::DateTime(dt) => dt.date_naive(),
            Self::AllDay(date) => *date,
        }
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_utc_datetime().cmp(&other.to_utc_datetime())
    }
}

/// Midnight UTC on the given date.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// A month and day without a year, e.g. the end of the academic year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    /// Creates a new month/day pair.
    pub const fn new(month: u32, day: u32) -> Self {
        Self { month, day }
    }

    /// Resolves this month/day in the given year.
    ///
    /// February 29th falls back to February 28th in non-leap years.
    pub fn in_year(&self, year: i32) -> Result<NaiveDate, RangeError> {
        if !(1..=12).contains(&self.month) {
            return Err(RangeError::InvalidMonth(self.month));
        }
        let invalid = RangeError::InvalidDate {
            year,
            month: self.month,
            day: self.day,
        };
        if let Some(date) = NaiveDate::from_ymd_opt(year, self.month, self.day) {
            return Ok(date);
        }
        if self.month == 2 && self.day == 29 {
            return NaiveDate::from_ymd_opt(year, 2, 28).ok_or(invalid);
        }
        Err(invalid)
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

/// A date range for querying calendar events.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// Start of the range (inclusive).
    pub start: DateTime<Utc>,
    /// End of the range (exclusive).
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Creates a new date range.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError::Inverted`] if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates a range from a start time and a non-negative duration.
    pub fn from_duration(start: DateTime<Utc>, duration: Duration) -> Result<Self, RangeError> {
        Self::new(start, start + duration)
    }

    /// The next `days` days starting at the minute of `now`.
    ///
    /// Sub-minute precision is dropped so repeated queries within the same
    /// minute produce the same range.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError::OutOfBounds`] if the end does not fit in a
    /// timestamp.
    pub fn upcoming_days(now: DateTime<Utc>, days: u32) -> Result<Self, RangeError> {
        let start = now.duration_trunc(Duration::minutes(1)).unwrap_or(now);
        let end = start
            .checked_add_signed(Duration::days(i64::from(days)))
            .ok_or(RangeError::OutOfBounds { start, days })?;
        Ok(Self { start, end })
    }

    /// Whole days from `first` through `last`, both inclusive.
    pub fn for_dates(first: NaiveDate, last: NaiveDate) -> Result<Self, RangeError> {
        let end = last
            .succ_opt()
            .ok_or(RangeError::InvalidDate {
                year: last.year(),
                month: last.month(),
                day: last.day(),
            })?;
        Self::new(start_of_day(first), start_of_day(end))
    }

    /// The calendar month `month` of `year`.
    ///
    /// December rolls over into January of the following year.
    pub fn month(year: i32, month: u32) -> Result<Self, RangeError> {
        if !(1..=12).contains(&month) {
            return Err(RangeError::InvalidMonth(month));
        }
        let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or(RangeError::InvalidDate {
            year,
            month,
            day: 1,
        })?;
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let next = NaiveDate::from_ymd_opt(next_year, next_month, 1).ok_or(
            RangeError::InvalidDate {
                year: next_year,
                month: next_month,
                day: 1,
            },
        )?;
        Self::new(start_of_day(first), start_of_day(next))
    }

    /// From `now` until the end of the `cutoff` day.
    ///
    /// The cutoff is taken in the current year; once that day has passed the
    /// next year's cutoff is used instead.
    pub fn until_cutoff(now: DateTime<Utc>, cutoff: MonthDay) -> Result<Self, RangeError> {
        let today = now.date_naive();
        let mut cutoff_date = cutoff.in_year(today.year())?;
        if cutoff_date < today {
            cutoff_date = cutoff.in_year(today.year() + 1)?;
        }
        let end = cutoff_date.succ_opt().ok_or(RangeError::InvalidDate {
            year: cutoff_date.year(),
            month: cutoff_date.month(),
            day: cutoff_date.day(),
        })?;
        Self::new(now, start_of_day(end))
    }

    /// Returns the duration of this range.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Checks if a datetime falls within this range (`[start, end)`).
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }

    /// Checks if an interval overlaps with this range.
    ///
    /// Zero-length intervals overlap when their instant lies inside the range.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if start == end {
            return self.contains(start);
        }
        start < self.end && end > self.start
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}
