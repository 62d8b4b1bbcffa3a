//! EventSource trait definition.
//!
//! An [`EventSource`] is one upstream of calendar events: the school API's
//! calendar data, the user's personal events, or a Google calendar. The
//! aggregator fans out to every enabled source and merges the results.
//!
//! Sources implement the raw [`EventSource::fetch`]. Callers use
//! [`EventSource::fetch_events`], which isolates failures: a failing source
//! yields an empty [`SourceOutcome`] carrying the error, so one broken
//! upstream never takes the others down. Policy violations
//! ([`ProviderError::is_policy_violation`]) are the exception and are
//! returned as errors.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use edusis_core::{CalendarEvent, DateRange, SchoolConfig, UserProfile};
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};

/// A boxed future for async trait methods.
///
/// Boxed futures keep the trait object-safe so sources can be stored as
/// `Arc<dyn EventSource>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The kind of upstream a source talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// School calendar data (academic, school-wide and relayed Google events).
    SchoolCalendar,
    /// The user's personal events and notifications.
    Personal,
    /// Google Calendar, read directly.
    Google,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchoolCalendar => "school_calendar",
            Self::Personal => "personal",
            Self::Google => "google",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a source needs to fetch events for one user.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub profile: Arc<UserProfile>,
    pub school: Arc<SchoolConfig>,
    pub range: DateRange,
}

impl FetchRequest {
    pub fn new(profile: Arc<UserProfile>, school: Arc<SchoolConfig>, range: DateRange) -> Self {
        Self {
            profile,
            school,
            range,
        }
    }
}

/// The result of asking one source for events.
#[derive(Debug)]
pub struct SourceOutcome {
    /// Name of the source that produced this outcome.
    pub source: String,
    pub events: Vec<CalendarEvent>,
    /// Set when the source failed and contributed no events.
    pub error: Option<ProviderError>,
}

impl SourceOutcome {
    /// A successful fetch.
    pub fn fetched(source: impl Into<String>, events: Vec<CalendarEvent>) -> Self {
        Self {
            source: source.into(),
            events,
            error: None,
        }
    }

    /// A contained failure.
    pub fn failed(source: impl Into<String>, error: ProviderError) -> Self {
        Self {
            source: source.into(),
            events: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// An upstream of calendar events.
pub trait EventSource: Send + Sync {
    /// Returns the name of this source (e.g., "academic", "personal", "google").
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Fetches events overlapping `request.range`, already normalized.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` on network errors, non-success responses,
    /// undecodable payloads, and policy violations.
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, ProviderResult<Vec<CalendarEvent>>>;

    /// Fetches events with failure isolation.
    ///
    /// # Errors
    ///
    /// Only policy violations are returned as errors. Every other failure is
    /// logged and reported through [`SourceOutcome::error`].
    fn fetch_events(&self, request: FetchRequest) -> BoxFuture<'_, ProviderResult<SourceOutcome>> {
        Box::pin(async move {
            match self.fetch(request).await {
                Ok(events) => {
                    debug!(source = self.name(), count = events.len(), "Fetched events");
                    Ok(SourceOutcome::fetched(self.name(), events))
                }
                Err(error) if error.is_policy_violation() => Err(error.with_provider(self.name())),
                Err(error) => {
                    let error = error.with_provider(self.name());
                    warn!(source = self.name(), error = %error, "Source failed, contributing no events");
                    Ok(SourceOutcome::failed(self.name(), error))
                }
            }
        })
    }
}

/// A source that always fails.
///
/// Stands in for a source that could not be constructed, so the failure is
/// reported on every fetch instead of silently dropping the source.
#[derive(Debug)]
pub struct FailingSource {
    name: String,
    kind: SourceKind,
    error: ProviderError,
}

impl FailingSource {
    pub fn new(name: impl Into<String>, kind: SourceKind, error: ProviderError) -> Self {
        Self {
            name: name.into(),
            kind,
            error,
        }
    }
}

impl EventSource for FailingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn fetch(&self, _request: FetchRequest) -> BoxFuture<'_, ProviderResult<Vec<CalendarEvent>>> {
        // ProviderError is not Clone; rebuild it from its parts
        let error = ProviderError::new(self.error.code(), self.error.message());
        Box::pin(async move { Err(error) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use chrono::{TimeZone, Utc};
    use edusis_core::{EventCategory, Role};

    fn request() -> FetchRequest {
        let now = Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap();
        FetchRequest::new(
            Arc::new(UserProfile::new("u1", Role::Student)),
            Arc::new(SchoolConfig::new("s1", "school.edu")),
            DateRange::upcoming_days(now, 7).unwrap(),
        )
    }

    struct FixedSource(Vec<CalendarEvent>);

    impl EventSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        fn kind(&self) -> SourceKind {
            SourceKind::Personal
        }

        fn fetch(&self, _request: FetchRequest) -> BoxFuture<'_, ProviderResult<Vec<CalendarEvent>>> {
            let events = self.0.clone();
            Box::pin(async move { Ok(events) })
        }
    }

    #[tokio::test]
    async fn successful_fetch_is_wrapped() {
        let start = Utc.with_ymd_and_hms(2025, 9, 2, 9, 0, 0).unwrap();
        let event = CalendarEvent::new(
            "personal_1",
            "Reminder",
            start,
            start,
            EventCategory::Notification,
            "fixed",
        );
        let outcome = FixedSource(vec![event]).fetch_events(request()).await.unwrap();

        assert_eq!(outcome.source, "fixed");
        assert_eq!(outcome.events.len(), 1);
        assert!(!outcome.is_failure());
    }

    #[tokio::test]
    async fn ordinary_failure_is_contained() {
        let source = FailingSource::new(
            "academic",
            SourceKind::SchoolCalendar,
            ProviderError::network("connection refused"),
        );

        let outcome = source.fetch_events(request()).await.unwrap();
        assert!(outcome.is_failure());
        assert!(outcome.events.is_empty());

        let error = outcome.error.unwrap();
        assert_eq!(error.code(), ProviderErrorCode::NetworkError);
        assert_eq!(error.provider(), Some("academic"));
    }

    #[tokio::test]
    async fn policy_violation_is_surfaced() {
        let source = FailingSource::new(
            "google",
            SourceKind::Google,
            ProviderError::domain_violation("wrong domain"),
        );

        let error = source.fetch_events(request()).await.unwrap_err();
        assert_eq!(error.code(), ProviderErrorCode::DomainViolation);
        assert_eq!(error.provider(), Some("google"));
    }

    #[test]
    fn source_kind_names() {
        assert_eq!(SourceKind::SchoolCalendar.to_string(), "school_calendar");
        assert_eq!(SourceKind::Google.as_str(), "google");
    }
}
