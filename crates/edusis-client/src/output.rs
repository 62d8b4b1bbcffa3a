//! Terminal and JSON rendering of event lists.

use std::fmt::Display;

use chrono::{Duration, TimeZone};
use edusis_calendar::SourceStatus;
use edusis_core::CalendarEvent;

use crate::error::{ClientError, ClientResult};

const WHEN_WIDTH: usize = 22;
const CATEGORY_WIDTH: usize = 18;

/// Formats the date/time column of an event in `tz`.
fn format_when<Tz>(event: &CalendarEvent, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let start = event.start.with_timezone(tz);
    let end = event.end.with_timezone(tz);

    if event.is_all_day {
        // All-day ends are exclusive midnights.
        let first = event.start.date_naive();
        let last = (event.end - Duration::days(1)).date_naive().max(first);
        if first == last {
            format!("{} all day", first.format("%Y-%m-%d"))
        } else {
            format!("{}..{}", first.format("%Y-%m-%d"), last.format("%Y-%m-%d"))
        }
    } else if start.date_naive() == end.date_naive() {
        format!("{}-{}", start.format("%Y-%m-%d %H:%M"), end.format("%H:%M"))
    } else {
        format!("{}..{}", start.format("%Y-%m-%d %H:%M"), end.format("%m-%d"))
    }
}

/// Formats one event as a single terminal line.
pub fn format_event_line<Tz>(event: &CalendarEvent, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut line = format!(
        "{:<WHEN_WIDTH$}  {:<CATEGORY_WIDTH$} {}",
        format_when(event, tz),
        format!("[{}]", event.category),
        event.title
    );
    if !event.location.is_empty() {
        line.push_str(" @ ");
        line.push_str(&event.location);
    }
    if event.editable {
        line.push_str(" (editable)");
    }
    line
}

/// Renders events for the terminal, one per line.
pub fn render_events<Tz>(events: &[CalendarEvent], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if events.is_empty() {
        return "No events".to_string();
    }
    events
        .iter()
        .map(|event| format_event_line(event, tz))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders events as a pretty JSON array.
pub fn render_json(events: &[CalendarEvent]) -> ClientResult<String> {
    serde_json::to_string_pretty(events).map_err(|e| ClientError::Output(e.to_string()))
}

/// Renders per-source health.
pub fn render_statuses(statuses: &[SourceStatus]) -> String {
    statuses
        .iter()
        .map(|status| match &status.error {
            None => format!("{:<16} ok      {} events", status.name, status.event_count),
            Some(error) => format!("{:<16} FAILED  {}", status.name, error),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
