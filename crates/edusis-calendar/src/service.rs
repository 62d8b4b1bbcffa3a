//! The calendar aggregator.
//!
//! [`CalendarService`] fans out to every applicable source for one user,
//! merges what comes back and runs the result through the event pipeline:
//! dedup, permission filter, sanitize, sort. Results are cached per
//! (user, range, session options).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use edusis_core::{
    CalendarEvent, Clock, DateRange, EventCategory, SchoolConfig, SystemClock, UserProfile,
    sanitize_event,
};
use edusis_providers::{EventSource, FetchRequest, SourceKind, SourceOutcome};
#[cfg(feature = "google")]
use edusis_providers::google::GoogleCalendarSource;
use futures_util::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{CachePolicy, EventCache, cache_key};
use crate::config::ServiceConfig;
use crate::demo::sample_events;
use crate::error::{CalendarError, CalendarResult};
use crate::permissions::filter_events_for_user;
use crate::rate_limit::{RateLimitAction, RateLimiter};
use crate::storage::{KeyValueStore, MemoryStore};

/// Health of one source after the last fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    pub name: String,
    pub healthy: bool,
    pub event_count: usize,
    pub error: Option<String>,
}

impl From<&SourceOutcome> for SourceStatus {
    fn from(outcome: &SourceOutcome) -> Self {
        Self {
            name: outcome.source.clone(),
            healthy: !outcome.is_failure(),
            event_count: outcome.events.len(),
            error: outcome.error.as_ref().map(ToString::to_string),
        }
    }
}

/// Aggregates calendar sources for one signed-in user.
pub struct CalendarService {
    profile: Arc<UserProfile>,
    school: Arc<SchoolConfig>,
    config: ServiceConfig,
    sources: Vec<Arc<dyn EventSource>>,
    #[cfg(feature = "google")]
    google: Option<Arc<GoogleCalendarSource>>,
    cache: RwLock<EventCache>,
    policy: CachePolicy,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    statuses: RwLock<Vec<SourceStatus>>,
}

/// Builder for [`CalendarService`].
pub struct CalendarServiceBuilder {
    profile: Arc<UserProfile>,
    school: Arc<SchoolConfig>,
    config: ServiceConfig,
    sources: Vec<Arc<dyn EventSource>>,
    #[cfg(feature = "google")]
    google: Option<Arc<GoogleCalendarSource>>,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
}

impl CalendarServiceBuilder {
    /// Builder: set service configuration.
    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Builder: add a source. Sources are queried and merged in the order added.
    pub fn with_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Builder: add the interactive Google source, enabling sign-in.
    #[cfg(feature = "google")]
    pub fn with_google(mut self, source: Arc<GoogleCalendarSource>) -> Self {
        self.sources.push(source.clone());
        self.google = Some(source);
        self
    }

    /// Builder: set durable storage for rate limits and the cache.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builder: set the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> CalendarService {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let limiter = RateLimiter::new(
            store.clone(),
            self.clock.clone(),
            self.config.rate_limits.clone(),
        );

        CalendarService {
            policy: CachePolicy::new(self.config.cache_ttl),
            profile: self.profile,
            school: self.school,
            config: self.config,
            sources: self.sources,
            #[cfg(feature = "google")]
            google: self.google,
            cache: RwLock::new(EventCache::new(Some(store))),
            limiter,
            clock: self.clock,
            statuses: RwLock::new(Vec::new()),
        }
    }
}

impl CalendarService {
    /// Starts building a service for a user.
    pub fn builder(profile: UserProfile, school: SchoolConfig) -> CalendarServiceBuilder {
        CalendarServiceBuilder {
            profile: Arc::new(profile),
            school: Arc::new(school),
            config: ServiceConfig::default(),
            sources: Vec::new(),
            #[cfg(feature = "google")]
            google: None,
            store: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn school(&self) -> &SchoolConfig {
        &self.school
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the status of each source from the last fetch.
    pub async fn source_statuses(&self) -> Vec<SourceStatus> {
        self.statuses.read().await.clone()
    }

    /// Calls of `action` left in the current rate-limit window.
    pub fn remaining_calls(&self, action: RateLimitAction) -> u32 {
        self.limiter.remaining(&self.profile.id, action)
    }

    fn applicable_sources(&self) -> impl Iterator<Item = &Arc<dyn EventSource>> {
        let session = self.config.session;
        self.sources.iter().filter(move |source| match source.kind() {
            SourceKind::SchoolCalendar => true,
            SourceKind::Personal => session.include_personal,
            SourceKind::Google => session.include_google,
        })
    }

    /// Returns every event the user may see in `range`.
    ///
    /// A cached list younger than the TTL is returned unless `force_refresh`
    /// is set. Sources that fail contribute nothing; when all of them fail
    /// the last cached list for the same key is served regardless of age.
    ///
    /// # Errors
    ///
    /// - [`CalendarError::RateLimitExceeded`] when the fetch limit is hit
    /// - [`CalendarError::PermissionDenied`] / [`CalendarError::DomainViolation`]
    ///   when a source reports a policy violation
    /// - [`CalendarError::TotalFetchFailure`] when every source failed and
    ///   nothing is cached
    pub async fn get_all_events(
        &self,
        range: DateRange,
        force_refresh: bool,
    ) -> CalendarResult<Vec<CalendarEvent>> {
        self.limiter
            .check(&self.profile.id, RateLimitAction::FetchEvents)?;

        let session = self.config.session;
        let key = cache_key(&self.profile.id, &range, &session);

        if !force_refresh {
            let cached = self
                .cache
                .read()
                .await
                .get_fresh(&key, &self.policy, self.clock.now());
            if let Some(entry) = cached {
                debug!(key = %key, event_count = entry.events.len(), "Serving cached events");
                return Ok(entry.events);
            }
        }

        let request = FetchRequest::new(self.profile.clone(), self.school.clone(), range);
        let sources: Vec<_> = self.applicable_sources().collect();
        let results = join_all(
            sources
                .iter()
                .map(|source| source.fetch_events(request.clone())),
        )
        .await;

        let mut outcomes = Vec::with_capacity(results.len());
        for (source, result) in sources.iter().zip(results) {
            outcomes.push(result.map_err(|e| CalendarError::from_source(source.name(), e))?);
        }
        *self.statuses.write().await = outcomes.iter().map(SourceStatus::from).collect();

        let failed = outcomes.iter().filter(|o| o.is_failure()).count();
        let all_failed = !outcomes.is_empty() && failed == outcomes.len();
        if all_failed && !session.demo_mode {
            return match self.cache.read().await.get(&key) {
                Some(entry) => {
                    warn!(
                        key = %key,
                        failed,
                        age_secs = entry.age(self.clock.now()).as_secs(),
                        "All sources failed, serving stale events"
                    );
                    Ok(entry.events)
                }
                None => Err(CalendarError::TotalFetchFailure { failed }),
            };
        }

        let mut merged: Vec<CalendarEvent> =
            outcomes.into_iter().flat_map(|o| o.events).collect();
        if merged.is_empty() && session.demo_mode {
            info!("No events available, using demo samples");
            merged = sample_events(&range);
        }

        let events = process_events(merged, &self.profile, &self.school);
        info!(
            user = %self.profile.id,
            range = %range,
            event_count = events.len(),
            failed_sources = failed,
            "Aggregated events"
        );

        let now = self.clock.now();
        let mut cache = self.cache.write().await;
        cache.evict_expired(&self.policy, now);
        cache.insert(key, events.clone(), now);
        Ok(events)
    }

    /// Events from the current minute over the next `days` days.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidRange`] if the window overflows.
    pub async fn get_upcoming_events(&self, days: u32) -> CalendarResult<Vec<CalendarEvent>> {
        let range = DateRange::upcoming_days(self.clock.now(), days)?;
        self.get_all_events(range, false).await
    }

    /// Events in a calendar month.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidRange`] for a month outside 1..=12.
    pub async fn get_monthly_events(&self, year: i32, month: u32) -> CalendarResult<Vec<CalendarEvent>> {
        let range = DateRange::month(year, month)?;
        self.get_all_events(range, false).await
    }

    /// Events from now until the end of the academic year.
    pub async fn get_academic_year_events(&self) -> CalendarResult<Vec<CalendarEvent>> {
        let range = DateRange::until_cutoff(self.clock.now(), self.school.academic_year_end)?;
        self.get_all_events(range, false).await
    }

    /// Drops every cached list for this user.
    pub async fn clear_cache(&self) -> CalendarResult<usize> {
        self.limiter
            .check(&self.profile.id, RateLimitAction::ClearCache)?;
        let removed = self.cache.write().await.clear_user(&self.profile.id);
        info!(user = %self.profile.id, removed, "Cleared calendar cache");
        Ok(removed)
    }

    /// Signs in to Google interactively and returns the account email.
    ///
    /// Cached lists are dropped so the next fetch includes Google events.
    #[cfg(feature = "google")]
    pub async fn sign_in_google(&self) -> CalendarResult<String> {
        self.limiter
            .check(&self.profile.id, RateLimitAction::GoogleSignIn)?;
        let google = self.google_source()?;

        let email = google
            .sign_in(&self.profile, &self.school)
            .await
            .map_err(|e| CalendarError::from_source(google.name(), e))?;
        self.cache.write().await.clear_user(&self.profile.id);
        info!(user = %self.profile.id, "Signed in to Google Calendar");
        Ok(email)
    }

    /// Signs out of Google and revokes the session.
    #[cfg(feature = "google")]
    pub async fn sign_out_google(&self) -> CalendarResult<()> {
        let google = self.google_source()?;
        google
            .sign_out()
            .await
            .map_err(|e| CalendarError::from_source(google.name(), e))?;
        self.cache.write().await.clear_user(&self.profile.id);
        Ok(())
    }

    #[cfg(feature = "google")]
    fn google_source(&self) -> CalendarResult<&Arc<GoogleCalendarSource>> {
        self.google
            .as_ref()
            .ok_or_else(|| CalendarError::config("Google sign-in is not configured"))
    }
}

fn is_google_origin(event: &CalendarEvent) -> bool {
    event.category == EventCategory::GoogleWorkspace || event.source_id.starts_with("google")
}

/// Drops repeated events, keeping the first occurrence.
///
/// Events repeat by id. Google events also repeat by title and time, since
/// the school backend relays some of the calendars read directly.
pub fn dedup_events(events: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
    let mut seen_ids = HashSet::new();
    let mut seen_google: HashSet<(String, DateTime<Utc>, DateTime<Utc>)> = HashSet::new();

    events
        .into_iter()
        .filter(|event| {
            if !seen_ids.insert(event.id.clone()) {
                return false;
            }
            if is_google_origin(event) {
                return seen_google.insert((event.title.to_lowercase(), event.start, event.end));
            }
            true
        })
        .collect()
}

/// Runs merged source events through dedup, permission filter, sanitizing
/// and a stable sort by start.
pub fn process_events(
    events: Vec<CalendarEvent>,
    profile: &UserProfile,
    school: &SchoolConfig,
) -> Vec<CalendarEvent> {
    let mut events: Vec<CalendarEvent> = filter_events_for_user(dedup_events(events), profile, school)
        .into_iter()
        .map(sanitize_event)
        .collect();
    events.sort_by_key(|event| event.start);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::TimeZone;
    use edusis_core::{Audience, ManualClock, Role};
    use edusis_providers::{
        BoxFuture, FailingSource, ProviderError, ProviderErrorCode, ProviderResult,
    };
    use serde_json::json;

    use crate::config::{RateLimitConfig, RateLimitRule, SessionOptions};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap()
    }

    fn at(hours: i64) -> DateTime<Utc> {
        now() + chrono::Duration::hours(hours)
    }

    fn event(id: &str, start_hours: i64, category: EventCategory) -> CalendarEvent {
        CalendarEvent::new(id, id, at(start_hours), at(start_hours + 1), category, "test")
    }

    /// A source returning fixed events and counting calls.
    struct CountingSource {
        name: &'static str,
        kind: SourceKind,
        events: Vec<CalendarEvent>,
        calls: AtomicUsize,
    }

    impl CountingSource {
        fn new(name: &'static str, kind: SourceKind, events: Vec<CalendarEvent>) -> Arc<Self> {
            Arc::new(Self {
                name,
                kind,
                events,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl EventSource for CountingSource {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn fetch(&self, _request: FetchRequest) -> BoxFuture<'_, ProviderResult<Vec<CalendarEvent>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let events = self.events.clone();
            Box::pin(async move { Ok(events) })
        }
    }

    fn student() -> UserProfile {
        UserProfile::new("s1", Role::Student).with_class("7", "7B")
    }

    fn school() -> SchoolConfig {
        SchoolConfig::new("paragon", "school.edu")
    }

    fn failing(name: &str, kind: SourceKind) -> Arc<FailingSource> {
        Arc::new(FailingSource::new(name, kind, ProviderError::network("connection refused")))
    }

    fn range() -> DateRange {
        DateRange::upcoming_days(now(), 7).unwrap()
    }

    #[tokio::test]
    async fn failing_source_does_not_hide_others() {
        let academic = CountingSource::new(
            "academic",
            SourceKind::SchoolCalendar,
            vec![event("a1", 2, EventCategory::Academic)],
        );
        let service = CalendarService::builder(student(), school())
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_source(academic)
            .with_source(failing("personal", SourceKind::Personal))
            .build();

        let events = service.get_all_events(range(), false).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "a1");

        let statuses = service.source_statuses().await;
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].healthy);
        assert!(!statuses[1].healthy);
        assert!(statuses[1].error.as_deref().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn repeated_calls_hit_cache_until_ttl() {
        let clock = Arc::new(ManualClock::new(now()));
        let academic = CountingSource::new(
            "academic",
            SourceKind::SchoolCalendar,
            vec![event("a1", 2, EventCategory::Academic)],
        );
        let service = CalendarService::builder(student(), school())
            .with_clock(clock.clone())
            .with_source(academic.clone())
            .build();

        let first = service.get_all_events(range(), false).await.unwrap();
        let second = service.get_all_events(range(), false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(academic.calls(), 1);

        service.get_all_events(range(), true).await.unwrap();
        assert_eq!(academic.calls(), 2);

        clock.advance(chrono::Duration::minutes(5));
        service.get_all_events(range(), false).await.unwrap();
        assert_eq!(academic.calls(), 3);
    }

    #[tokio::test]
    async fn events_sorted_by_start_and_sanitized() {
        let mut scripted = event("x", 1, EventCategory::SchoolEvent);
        scripted.title = "<script>alert(1)</script>Assembly".into();
        scripted.original_data = json!({"title": "Assembly", "access_token": "secret"});

        let academic = CountingSource::new(
            "academic",
            SourceKind::SchoolCalendar,
            vec![
                event("late", 30, EventCategory::Academic),
                event("early", 3, EventCategory::Academic),
            ],
        );
        let personal = CountingSource::new("personal", SourceKind::Personal, vec![scripted]);
        let service = CalendarService::builder(student(), school())
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_source(academic)
            .with_source(personal)
            .build();

        let events = service.get_all_events(range(), false).await.unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "early", "late"]);
        assert_eq!(events[0].title, "Assembly");
        assert!(events[0].original_data.get("access_token").is_none());
        assert!(events.windows(2).all(|w| w[0].start <= w[1].start));
    }

    #[tokio::test]
    async fn homework_visibility_depends_on_role() {
        let homework = vec![
            event("hw_mine", 2, EventCategory::Homework).with_audience(Audience {
                class_ids: vec!["7B".into()],
                ..Audience::default()
            }),
            event("hw_other", 3, EventCategory::Homework).with_audience(Audience {
                class_ids: vec!["9A".into()],
                ..Audience::default()
            }),
        ];

        let student_view = CalendarService::builder(student(), school())
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_source(CountingSource::new("academic", SourceKind::SchoolCalendar, homework.clone()))
            .build();
        let ids: Vec<_> = student_view
            .get_all_events(range(), false)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["hw_mine"]);

        let teacher_view = CalendarService::builder(UserProfile::new("t1", Role::Teacher), school())
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_source(CountingSource::new("academic", SourceKind::SchoolCalendar, homework))
            .build();
        let events = teacher_view.get_all_events(range(), false).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn duplicates_keep_first() {
        let mut dup = event("a1", 5, EventCategory::Academic);
        dup.title = "second copy".into();
        let relayed = event("google_x", 4, EventCategory::SchoolEvent);
        let mut direct = CalendarEvent::new(
            "gcal_y",
            "google_x",
            at(4),
            at(5),
            EventCategory::SchoolEvent,
            "google_readonly",
        );
        direct.description = "direct".into();

        let merged = dedup_events(vec![
            event("a1", 5, EventCategory::Academic),
            relayed,
            dup,
            direct,
        ]);
        let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
        // The relayed copy came from the school backend, not a Google source.
        assert_eq!(ids, vec!["a1", "google_x", "gcal_y"]);
        assert_eq!(merged[0].title, "a1");

        let a = CalendarEvent::new("google_1", "Staff meeting", at(1), at(2), EventCategory::GoogleWorkspace, "academic");
        let b = CalendarEvent::new("gcal_2", "staff MEETING", at(1), at(2), EventCategory::SchoolEvent, "google_readonly");
        let merged = dedup_events(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "google_1");
    }

    #[tokio::test]
    async fn session_options_select_sources() {
        let academic = CountingSource::new("academic", SourceKind::SchoolCalendar, vec![]);
        let personal = CountingSource::new("personal", SourceKind::Personal, vec![]);
        let google = CountingSource::new("google_readonly", SourceKind::Google, vec![]);
        let service = CalendarService::builder(student(), school())
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_config(ServiceConfig::new().with_session(
                SessionOptions::default().with_personal(false).with_google(false),
            ))
            .with_source(academic.clone())
            .with_source(personal.clone())
            .with_source(google.clone())
            .build();

        service.get_all_events(range(), false).await.unwrap();
        assert_eq!(academic.calls(), 1);
        assert_eq!(personal.calls(), 0);
        assert_eq!(google.calls(), 0);
    }

    #[tokio::test]
    async fn rate_limit_rejects_extra_fetches() {
        let clock = Arc::new(ManualClock::new(now()));
        let limits = RateLimitConfig::default().with_rule(
            RateLimitAction::FetchEvents,
            RateLimitRule::new(2, Duration::from_secs(60)),
        );
        let service = CalendarService::builder(student(), school())
            .with_clock(clock.clone())
            .with_config(ServiceConfig::new().with_rate_limits(limits))
            .with_source(CountingSource::new("academic", SourceKind::SchoolCalendar, vec![]))
            .build();

        service.get_all_events(range(), false).await.unwrap();
        service.get_all_events(range(), false).await.unwrap();
        assert_eq!(service.remaining_calls(RateLimitAction::FetchEvents), 0);
        let err = service.get_all_events(range(), false).await.unwrap_err();
        assert!(matches!(
            err,
            CalendarError::RateLimitExceeded {
                action: RateLimitAction::FetchEvents,
                ..
            }
        ));

        clock.advance(chrono::Duration::seconds(60));
        service.get_all_events(range(), false).await.unwrap();
    }

    #[tokio::test]
    async fn total_failure_serves_stale_cache() {
        let clock = Arc::new(ManualClock::new(now()));
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let warm = CalendarService::builder(student(), school())
            .with_clock(clock.clone())
            .with_store(store.clone())
            .with_source(CountingSource::new(
                "academic",
                SourceKind::SchoolCalendar,
                vec![event("a1", 2, EventCategory::Academic)],
            ))
            .build();
        warm.get_all_events(range(), false).await.unwrap();

        // A new session on the same storage, with every source down.
        clock.advance(chrono::Duration::hours(3));
        let cold = CalendarService::builder(student(), school())
            .with_clock(clock.clone())
            .with_store(store)
            .with_source(failing("academic", SourceKind::SchoolCalendar))
            .with_source(failing("personal", SourceKind::Personal))
            .build();
        let events = cold.get_all_events(range(), false).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "a1");
    }

    #[tokio::test]
    async fn total_failure_without_cache_is_an_error() {
        let service = CalendarService::builder(student(), school())
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_source(failing("academic", SourceKind::SchoolCalendar))
            .with_source(failing("personal", SourceKind::Personal))
            .build();

        let err = service.get_all_events(range(), false).await.unwrap_err();
        assert!(matches!(err, CalendarError::TotalFetchFailure { failed: 2 }));
    }

    #[tokio::test]
    async fn demo_mode_fills_in_samples() {
        let demo = ServiceConfig::new().with_session(SessionOptions::default().with_demo_mode(true));
        let service = CalendarService::builder(student(), school())
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_config(demo)
            .with_source(failing("academic", SourceKind::SchoolCalendar))
            .build();

        let events = service.get_all_events(range(), false).await.unwrap();
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.title.starts_with("[Sample] ")));

        // Never for regular sessions.
        let regular = CalendarService::builder(student(), school())
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_source(CountingSource::new("academic", SourceKind::SchoolCalendar, vec![]))
            .build();
        assert!(regular.get_all_events(range(), false).await.unwrap().is_empty());
    }

    struct PolicySource;

    impl EventSource for PolicySource {
        fn name(&self) -> &str {
            "google"
        }

        fn kind(&self) -> SourceKind {
            SourceKind::Google
        }

        fn fetch(&self, _request: FetchRequest) -> BoxFuture<'_, ProviderResult<Vec<CalendarEvent>>> {
            Box::pin(async {
                Err(ProviderError::domain_violation(
                    "someone@gmail.com does not belong to school.edu",
                ))
            })
        }
    }

    #[tokio::test]
    async fn domain_violation_surfaces() {
        let service = CalendarService::builder(UserProfile::new("t1", Role::Teacher), school())
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_source(CountingSource::new("academic", SourceKind::SchoolCalendar, vec![]))
            .with_source(Arc::new(PolicySource))
            .build();

        let err = service.get_all_events(range(), false).await.unwrap_err();
        assert!(matches!(err, CalendarError::DomainViolation(ref m) if m.contains("gmail.com")));
    }

    #[tokio::test]
    async fn derived_ranges() {
        let academic = CountingSource::new("academic", SourceKind::SchoolCalendar, vec![]);
        let service = CalendarService::builder(student(), school())
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_source(academic.clone())
            .build();

        service.get_upcoming_events(7).await.unwrap();
        service.get_monthly_events(2025, 12).await.unwrap();
        service.get_academic_year_events().await.unwrap();
        assert_eq!(academic.calls(), 3);

        let err = service.get_monthly_events(2025, 13).await.unwrap_err();
        assert!(matches!(err, CalendarError::InvalidRange(_)));
    }

    #[tokio::test]
    async fn clear_cache_forces_refetch() {
        let academic = CountingSource::new("academic", SourceKind::SchoolCalendar, vec![]);
        let service = CalendarService::builder(student(), school())
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_source(academic.clone())
            .build();

        service.get_all_events(range(), false).await.unwrap();
        assert!(service.clear_cache().await.unwrap() >= 1);
        service.get_all_events(range(), false).await.unwrap();
        assert_eq!(academic.calls(), 2);
    }

    #[cfg(feature = "google")]
    #[tokio::test]
    async fn google_sign_in_requires_configuration() {
        let service = CalendarService::builder(UserProfile::new("t1", Role::Teacher), school())
            .with_clock(Arc::new(ManualClock::new(now())))
            .build();

        let err = service.sign_in_google().await.unwrap_err();
        assert!(matches!(err, CalendarError::Config { .. }));
    }

    #[tokio::test]
    async fn repeated_upcoming_queries_hit_the_cache() {
        let academic = CountingSource::new(
            "academic",
            SourceKind::SchoolCalendar,
            vec![event("a1", 2, EventCategory::Academic)],
        );
        let service = CalendarService::builder(student(), school())
            .with_source(academic.clone())
            .build();

        service.get_upcoming_events(7).await.unwrap();
        service.get_upcoming_events(7).await.unwrap();
        assert_eq!(academic.calls(), 1);
    }

    #[tokio::test]
    async fn upcoming_queries_within_a_minute_share_one_entry() {
        let clock = Arc::new(ManualClock::new(now() + chrono::Duration::milliseconds(1_500)));
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let demo = ServiceConfig::new().with_session(SessionOptions::default().with_demo_mode(true));
        let service = CalendarService::builder(student(), school())
            .with_clock(clock.clone())
            .with_config(demo)
            .with_store(store.clone())
            .build();

        for _ in 0..5 {
            service.get_upcoming_events(7).await.unwrap();
            clock.advance(chrono::Duration::milliseconds(7_321));
        }

        let cached = store
            .keys()
            .unwrap()
            .into_iter()
            .filter(|k| k.starts_with(crate::cache::STORAGE_PREFIX))
            .count();
        assert_eq!(cached, 1);
    }

    #[tokio::test]
    async fn oversized_upcoming_window_is_an_error() {
        let service = CalendarService::builder(student(), school())
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_source(CountingSource::new("academic", SourceKind::SchoolCalendar, vec![]))
            .build();

        let err = service.get_upcoming_events(u32::MAX).await.unwrap_err();
        assert!(matches!(err, CalendarError::InvalidRange(_)));
    }

    #[tokio::test]
    async fn equal_starts_keep_source_order() {
        let academic = CountingSource::new(
            "academic",
            SourceKind::SchoolCalendar,
            vec![event("z_academic", 3, EventCategory::Academic), event("early", 1, EventCategory::Academic)],
        );
        let personal = CountingSource::new(
            "personal",
            SourceKind::Personal,
            vec![event("a_personal", 3, EventCategory::Academic)],
        );
        let service = CalendarService::builder(student(), school())
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_source(academic)
            .with_source(personal)
            .build();

        let ids: Vec<_> = service
            .get_all_events(range(), false)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["early", "z_academic", "a_personal"]);

        let processed = process_events(
            vec![event("b", 3, EventCategory::Academic), event("a", 3, EventCategory::Academic)],
            &student(),
            &school(),
        );
        let ids: Vec<_> = processed.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[cfg(feature = "google")]
    mod google {
        use super::*;
        use edusis_providers::google::{GoogleAccount, GoogleConfig, GoogleSignIn};

        /// A sign-in flow that always fails, counting attempts.
        #[derive(Default)]
        struct RefusingSignIn {
            attempts: AtomicUsize,
        }

        impl GoogleSignIn for RefusingSignIn {
            fn sign_in(&self) -> BoxFuture<'_, ProviderResult<GoogleAccount>> {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Err(ProviderError::authentication("consent screen closed")) })
            }

            fn sign_out(&self) -> BoxFuture<'_, ProviderResult<()>> {
                Box::pin(async { Ok(()) })
            }
        }

        #[tokio::test]
        async fn fetching_never_signs_in() {
            let flow = Arc::new(RefusingSignIn::default());
            let google = Arc::new(GoogleCalendarSource::new(GoogleConfig::new(), flow.clone()).unwrap());
            let limits = RateLimitConfig::default().with_rule(
                RateLimitAction::GoogleSignIn,
                RateLimitRule::new(1, Duration::from_secs(300)),
            );
            let service = CalendarService::builder(
                UserProfile::new("t1", Role::Teacher),
                school().with_google_calendar(false),
            )
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_config(ServiceConfig::new().with_rate_limits(limits))
            .with_source(CountingSource::new("academic", SourceKind::SchoolCalendar, vec![]))
            .with_google(google)
            .build();

            for _ in 0..4 {
                service.get_all_events(range(), true).await.unwrap();
            }
            assert_eq!(flow.attempts.load(Ordering::SeqCst), 0);
            assert_eq!(service.remaining_calls(RateLimitAction::GoogleSignIn), 1);

            assert!(service.sign_in_google().await.is_err());
            assert_eq!(flow.attempts.load(Ordering::SeqCst), 1);
            let err = service.sign_in_google().await.unwrap_err();
            assert!(matches!(
                err,
                CalendarError::RateLimitExceeded {
                    action: RateLimitAction::GoogleSignIn,
                    ..
                }
            ));
            assert_eq!(flow.attempts.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn status_from_outcome() {
        let ok = SourceOutcome::fetched("academic", vec![event("a", 1, EventCategory::Academic)]);
        let bad = SourceOutcome::failed(
            "personal",
            ProviderError::new(ProviderErrorCode::ServerError, "boom"),
        );
        assert_eq!(
            SourceStatus::from(&ok),
            SourceStatus {
                name: "academic".into(),
                healthy: true,
                event_count: 1,
                error: None,
            }
        );
        assert!(!SourceStatus::from(&bad).healthy);
    }
}
