//! Event types for the aggregated school calendar.
//!
//! This module provides the normalized event shape every source adapter
//! produces:
//! - [`CalendarEvent`]: A source-agnostic event ready for filtering and display
//! - [`EventCategory`]: The kind of event, driving permissions and color
//! - [`Priority`]: Upstream importance hint
//! - [`Audience`]: Who an event is addressed to

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::DateRange;

/// The kind of a calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Academic calendar entries (term dates, holidays).
    Academic,
    /// Tenant-wide school events.
    SchoolEvent,
    /// Events from a Google Workspace calendar.
    GoogleWorkspace,
    /// Homework and assignment due dates.
    Homework,
    /// Exams, tests and quizzes.
    Exam,
    /// Student and staff birthdays.
    Birthday,
    /// Timetable sessions.
    Timetable,
    /// Notifications addressed to specific users.
    Notification,
}

impl EventCategory {
    /// All categories, in declaration order.
    pub const ALL: [EventCategory; 8] = [
        Self::Academic,
        Self::SchoolEvent,
        Self::GoogleWorkspace,
        Self::Homework,
        Self::Exam,
        Self::Birthday,
        Self::Timetable,
        Self::Notification,
    ];

    /// Returns the wire name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::SchoolEvent => "school_event",
            Self::GoogleWorkspace => "google_workspace",
            Self::Homework => "homework",
            Self::Exam => "exam",
            Self::Birthday => "birthday",
            Self::Timetable => "timetable",
            Self::Notification => "notification",
        }
    }

    /// Maps an upstream category or event-type label onto a category.
    ///
    /// Matching is case-insensitive and accepts the aliases the school
    /// backend uses. Returns `None` for labels with no known mapping so the
    /// caller can fall back to its bucket default.
    pub fn from_upstream(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let category = match label.as_str() {
            "academic" | "academic_calendar" | "holiday" | "term" => Self::Academic,
            "school_event" | "event" | "events" | "global" | "local_global" => Self::SchoolEvent,
            "google_workspace" | "google" | "google_calendar" => Self::GoogleWorkspace,
            "homework" | "assignment" => Self::Homework,
            "exam" | "test" | "quiz" | "assessment" => Self::Exam,
            "birthday" => Self::Birthday,
            "timetable" | "schedule" | "lesson" => Self::Timetable,
            "notification" | "announcement" | "reminder" => Self::Notification,
            _ => return None,
        };
        Some(category)
    }

    /// Returns the presentation color for this category at a priority.
    pub fn color(&self, priority: Priority) -> &'static str {
        match (self, priority) {
            (Self::Academic, Priority::High) => "#1F5FAD",
            (Self::Academic, _) => "#4A90D9",
            (Self::SchoolEvent, Priority::High) => "#5B3FD6",
            (Self::SchoolEvent, _) => "#7B61FF",
            (Self::GoogleWorkspace, Priority::High) => "#1E7E34",
            (Self::GoogleWorkspace, _) => "#34A853",
            (Self::Homework, Priority::High) => "#D9822B",
            (Self::Homework, _) => "#F5A623",
            (Self::Exam, Priority::High) => "#8B0000",
            (Self::Exam, _) => "#D0021B",
            (Self::Birthday, Priority::High) => "#B0124F",
            (Self::Birthday, _) => "#E91E63",
            (Self::Timetable, Priority::High) => "#2BAE8E",
            (Self::Timetable, _) => "#50E3C2",
            (Self::Notification, Priority::High) => "#4A4A4A",
            (Self::Notification, _) => "#9B9B9B",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream importance hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Parses an upstream priority label, defaulting to [`Priority::Normal`].
    pub fn from_upstream(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" | "urgent" | "important" => Self::High,
            _ => Self::Normal,
        }
    }
}

/// Who an event is addressed to.
///
/// Empty lists mean "no restriction of that kind". The permission rules
/// decide how these fields combine for each category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Audience {
    /// Individual students the event targets.
    pub student_ids: Vec<String>,
    /// Classes (sections) the event targets.
    pub class_ids: Vec<String>,
    /// Grades the event targets.
    pub grades: Vec<String>,
    /// Teachers assigned to the event (timetable sessions).
    pub teacher_ids: Vec<String>,
    /// Intended recipients (notifications).
    pub recipient_ids: Vec<String>,
    /// Whether the event is addressed to everyone.
    pub is_public: bool,
}

impl Audience {
    /// An audience addressed to everyone.
    pub fn public() -> Self {
        Self {
            is_public: true,
            ..Self::default()
        }
    }

    /// Returns true if no targeting information is present.
    pub fn is_untargeted(&self) -> bool {
        self.student_ids.is_empty()
            && self.class_ids.is_empty()
            && self.grades.is_empty()
            && self.teacher_ids.is_empty()
            && self.recipient_ids.is_empty()
    }
}

/// A normalized calendar event from any source.
///
/// This is the canonical representation of an event after fetching from a
/// source adapter. It contains all the information needed for permission
/// filtering, sanitizing and display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Session-unique identifier, prefixed by the producing adapter.
    pub id: String,
    /// The event title.
    pub title: String,
    /// The event description (may be empty).
    pub description: String,
    /// When the event starts.
    pub start: DateTime<Utc>,
    /// When the event ends (never before `start`).
    pub end: DateTime<Utc>,
    /// Whether the event spans whole days.
    pub is_all_day: bool,
    /// Free-text location (may be empty).
    pub location: String,
    /// The event category.
    pub category: EventCategory,
    /// Upstream importance hint.
    pub priority: Priority,
    /// The adapter that produced this event.
    pub source_id: String,
    /// Presentation color derived from category and priority.
    pub color: String,
    /// Whether the current user may edit this event.
    ///
    /// Always `false` coming out of an adapter; set by the permission filter.
    pub editable: bool,
    /// The user who created the event, if known.
    pub created_by: Option<String>,
    /// Who the event is addressed to.
    pub audience: Audience,
    /// The raw upstream record, for detail views.
    pub original_data: serde_json::Value,
}

impl CalendarEvent {
    /// Creates a new event with required fields.
    ///
    /// An `end` before `start` is clamped to `start`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        category: EventCategory,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            start,
            end: end.max(start),
            is_all_day: false,
            location: String::new(),
            category,
            priority: Priority::Normal,
            source_id: source_id.into(),
            color: category.color(Priority::Normal).to_string(),
            editable: false,
            created_by: None,
            audience: Audience::default(),
            original_data: serde_json::Value::Null,
        }
    }

    /// Returns the duration of the event in minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Checks if the event overlaps the given range.
    pub fn overlaps(&self, range: &DateRange) -> bool {
        range.overlaps(self.start, self.end)
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Builder method to mark as an all-day event.
    pub fn with_all_day(mut self, is_all_day: bool) -> Self {
        self.is_all_day = is_all_day;
        self
    }

    /// Builder method to set the priority (recomputes the color).
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self.color = self.category.color(priority).to_string();
        self
    }

    /// Builder method to set the creator.
    pub fn with_created_by(mut self, user_id: impl Into<String>) -> Self {
        self.created_by = Some(user_id.into());
        self
    }

    /// Builder method to set the audience.
    pub fn with_audience(mut self, audience: Audience) -> Self {
        self.audience = audience;
        self
    }

    /// Builder method to attach the raw upstream record.
    pub fn with_original_data(mut self, data: serde_json::Value) -> Self {
        self.original_data = data;
        self
    }
}
