//! School backend event records and their normalization.

use std::fmt;

use chrono::Duration;
use edusis_core::{Audience, CalendarEvent, EventCategory, EventTime, Priority, start_of_day};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// An identifier the backend sends either as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// An event record as sent by the school backend.
///
/// Every field is optional; records missing an id or a start are skipped
/// during normalization.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WireEvent {
    pub id: Option<WireId>,
    #[serde(alias = "event_title")]
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "start_time")]
    pub start_date: Option<String>,
    #[serde(alias = "end_time")]
    pub end_date: Option<String>,
    #[serde(alias = "is_all_day")]
    pub all_day: Option<bool>,
    pub location: Option<String>,
    #[serde(alias = "event_type")]
    pub category: Option<String>,
    pub priority: Option<String>,
    pub created_by: Option<WireId>,
    pub target_student_ids: Vec<WireId>,
    pub target_class_ids: Vec<WireId>,
    pub target_grades: Vec<WireId>,
    pub teacher_ids: Vec<WireId>,
    pub recipient_ids: Vec<WireId>,
    pub is_public: bool,
}

impl WireEvent {
    fn audience(&self) -> Audience {
        fn ids(values: &[WireId]) -> Vec<String> {
            values.iter().map(ToString::to_string).collect()
        }

        Audience {
            student_ids: ids(&self.target_student_ids),
            class_ids: ids(&self.target_class_ids),
            grades: ids(&self.target_grades),
            teacher_ids: ids(&self.teacher_ids),
            recipient_ids: ids(&self.recipient_ids),
            is_public: self.is_public,
        }
    }
}

/// Id prefix for events of a category.
pub fn id_prefix(category: EventCategory) -> &'static str {
    match category {
        EventCategory::GoogleWorkspace => "google",
        other => other.as_str(),
    }
}

/// How to normalize records from one upstream bucket.
#[derive(Debug, Clone, Copy)]
pub struct Normalize<'a> {
    /// Category used when the record names none, or an unknown one.
    pub default_category: EventCategory,
    /// Fixed id prefix; when `None` the prefix follows the category.
    pub id_prefix: Option<&'a str>,
    pub source_id: &'a str,
}

impl Normalize<'_> {
    /// Converts one raw record into a [`CalendarEvent`].
    ///
    /// All-day end dates from the school backend are inclusive and become the
    /// exclusive next midnight. Returns `None` for records without an id or a
    /// parsable start.
    pub fn record(&self, raw: Value) -> Option<CalendarEvent> {
        let wire: WireEvent = serde_json::from_value(raw.clone())
            .map_err(|e| warn!(source = self.source_id, error = %e, "Skipping undecodable record"))
            .ok()?;

        let Some(id) = wire.id.as_ref() else {
            warn!(source = self.source_id, "Skipping record without id");
            return None;
        };

        let Some(start) = wire.start_date.as_deref().and_then(EventTime::parse) else {
            warn!(source = self.source_id, id = %id, "Skipping record without a valid start");
            return None;
        };
        let end = wire.end_date.as_deref().and_then(EventTime::parse);

        let all_day = wire.all_day.unwrap_or_else(|| start.is_all_day());
        let start_at = if all_day {
            start_of_day(start.date())
        } else {
            start.to_utc_datetime()
        };
        let end_at = match end {
            Some(end) if all_day => start_of_day(end.date()) + Duration::days(1),
            Some(end) => end.to_utc_datetime(),
            None if all_day => start_at + Duration::days(1),
            None => start_at,
        };

        let category = wire
            .category
            .as_deref()
            .and_then(EventCategory::from_upstream)
            .unwrap_or(self.default_category);
        let prefix = self.id_prefix.unwrap_or_else(|| id_prefix(category));
        let priority = wire
            .priority
            .as_deref()
            .map(Priority::from_upstream)
            .unwrap_or_default();

        let mut event = CalendarEvent::new(
            format!("{}_{}", prefix, id),
            wire.title.clone().unwrap_or_else(|| "(untitled)".to_string()),
            start_at,
            end_at,
            category,
            self.source_id,
        )
        .with_description(wire.description.clone().unwrap_or_default())
        .with_location(wire.location.clone().unwrap_or_default())
        .with_all_day(all_day)
        .with_priority(priority)
        .with_audience(wire.audience())
        .with_original_data(raw);

        if let Some(ref creator) = wire.created_by {
            event = event.with_created_by(creator.to_string());
        }

        Some(event)
    }

    /// Converts a list of raw records, skipping invalid ones.
    pub fn records(&self, raw: Vec<Value>) -> Vec<CalendarEvent> {
        raw.into_iter().filter_map(|record| self.record(record)).collect()
    }
}
