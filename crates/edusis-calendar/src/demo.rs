//! Sample events for demo sessions.

use chrono::{Duration, Timelike};
use edusis_core::{Audience, CalendarEvent, DateRange, EventCategory};

/// Source id carried by sample events.
pub const DEMO_SOURCE: &str = "demo";

const SAMPLES: [(&str, &str, EventCategory); 4] = [
    ("Welcome assembly", "Main hall", EventCategory::SchoolEvent),
    ("Mid-term review week", "", EventCategory::Academic),
    ("Science quiz", "Lab 2", EventCategory::Exam),
    ("Parent-teacher meeting", "Library", EventCategory::SchoolEvent),
];

/// Builds labelled sample events spread over `range`.
///
/// The output only depends on the range, so repeated calls agree.
pub fn sample_events(range: &DateRange) -> Vec<CalendarEvent> {
    let span = range.duration();
    let slots = i32::try_from(SAMPLES.len()).unwrap_or(1) + 1;

    SAMPLES
        .iter()
        .enumerate()
        .filter_map(|(i, (title, location, category))| {
            let slot = i32::try_from(i).ok()? + 1;
            let offset = span * slot / slots;
            let day_start = (range.start + offset)
                .with_hour(0)?
                .with_minute(0)?
                .with_second(0)?
                .with_nanosecond(0)?;
            let start = (day_start + Duration::hours(9)).max(range.start);
            let end = start + Duration::hours(1);
            if !range.overlaps(start, end) {
                return None;
            }

            Some(
                CalendarEvent::new(
                    format!("sample_{}", i + 1),
                    format!("[Sample] {title}"),
                    start,
                    end,
                    *category,
                    DEMO_SOURCE,
                )
                .with_description("Sample event shown in demo mode")
                .with_location(*location)
                .with_audience(Audience::public()),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn samples_are_labelled_and_inside_range() {
        let start = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
        let range = DateRange::upcoming_days(start, 30).unwrap();
        let events = sample_events(&range);

        assert_eq!(events.len(), 4);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.id, format!("sample_{}", i + 1));
            assert!(event.title.starts_with("[Sample] "));
            assert_eq!(event.source_id, DEMO_SOURCE);
            assert!(event.overlaps(&range));
        }
        assert_eq!(events, sample_events(&range));
    }

    #[test]
    fn short_range_still_gets_samples() {
        let start = Utc.with_ymd_and_hms(2025, 9, 1, 15, 30, 0).unwrap();
        let range = DateRange::from_duration(start, Duration::hours(2)).unwrap();
        let events = sample_events(&range);

        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.overlaps(&range)));
    }
}
