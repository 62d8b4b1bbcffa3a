//! School backend sources.
//!
//! - [`AcademicSource`] reads `/calendar/data`: per-branch academic calendar,
//!   school-wide events and Google events relayed by the backend
//! - [`PersonalSource`] reads `/calendar/personal`: the user's own events
//!   and notifications

mod academic;
mod personal;
pub mod wire;

pub use academic::AcademicSource;
pub use personal::PersonalSource;

use chrono::Duration;
use edusis_core::DateRange;

/// `start_date` / `end_date` query parameters for a range.
///
/// The backend treats `end_date` as inclusive, so it is the last day the
/// half-open range touches.
pub(crate) fn range_query(range: &DateRange) -> Vec<(&'static str, String)> {
    let last = if range.end > range.start {
        range.end - Duration::nanoseconds(1)
    } else {
        range.start
    };
    vec![
        ("start_date", range.start.date_naive().format("%Y-%m-%d").to_string()),
        ("end_date", last.date_naive().format("%Y-%m-%d").to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn range_query_uses_inclusive_last_day() {
        let range = DateRange::month(2025, 9).unwrap();
        assert_eq!(
            range_query(&range),
            vec![
                ("start_date", "2025-09-01".to_string()),
                ("end_date", "2025-09-30".to_string()),
            ]
        );

        let day = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let single = DateRange::for_dates(day, day).unwrap();
        assert_eq!(range_query(&single)[1].1, "2025-09-01");
    }
}
