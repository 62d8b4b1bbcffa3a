//! Google Calendar API client.
//!
//! Lists events through `/calendars/{id}/events`, following `nextPageToken`,
//! and converts them into [`CalendarEvent`]s.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use edusis_core::{CalendarEvent, DateRange, EventCategory, start_of_day};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::config::GoogleConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_http_client, map_send_error, read_json};

/// How a request authenticates.
#[derive(Clone)]
pub(crate) enum Auth {
    /// OAuth access token of a signed-in user.
    Bearer(String),
    /// Static API key, for public school calendars.
    ApiKey(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

/// Google Calendar API client.
#[derive(Debug, Clone)]
pub(crate) struct GoogleCalendarClient {
    http_client: reqwest::Client,
    api_base: String,
    max_results: usize,
}

impl GoogleCalendarClient {
    pub fn new(config: &GoogleConfig) -> ProviderResult<Self> {
        config.validate().map_err(ProviderError::configuration)?;
        Ok(Self {
            http_client: build_http_client(config.timeout, &config.user_agent)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            max_results: config.max_results,
        })
    }

    /// Lists the raw events of a calendar overlapping `range`, all pages.
    pub async fn list_events(
        &self,
        auth: &Auth,
        calendar_id: &str,
        range: &DateRange,
    ) -> ProviderResult<Vec<Value>> {
        let mut all_events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_events_page(auth, calendar_id, range, page_token.as_deref())
                .await?;
            all_events.extend(page.items);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(calendar = calendar_id, count = all_events.len(), "Listed Google events");
        Ok(all_events)
    }

    async fn list_events_page(
        &self,
        auth: &Auth,
        calendar_id: &str,
        range: &DateRange,
        page_token: Option<&str>,
    ) -> ProviderResult<EventListResponse> {
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );

        let mut request = self.http_client.get(&url).query(&[
            ("timeMin", range.start.to_rfc3339()),
            ("timeMax", range.end.to_rfc3339()),
            ("maxResults", self.max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ]);

        request = match auth {
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::ApiKey(key) => request.query(&[("key", key.as_str())]),
        };

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.map_err(map_send_error)?;
        read_json(response).await
    }
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<Value>,
    next_page_token: Option<String>,
}

/// A single event from the Google Calendar API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    #[serde(default)]
    start: ApiEventTime,
    #[serde(default)]
    end: ApiEventTime,
    status: Option<String>,
}

/// Event time from the API: `dateTime` for timed events, `date` for all-day.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date: Option<String>,
    date_time: Option<String>,
}

enum ParsedTime {
    At(DateTime<Utc>),
    Day(NaiveDate),
}

impl ApiEventTime {
    fn parse(&self) -> Option<ParsedTime> {
        if let Some(ref dt) = self.date_time {
            return DateTime::parse_from_rfc3339(dt)
                .map(|parsed| ParsedTime::At(parsed.with_timezone(&Utc)))
                .map_err(|e| warn!(value = %dt, error = %e, "Failed to parse Google dateTime"))
                .ok();
        }
        let date = self.date.as_deref()?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(ParsedTime::Day)
            .map_err(|e| warn!(value = %date, error = %e, "Failed to parse Google date"))
            .ok()
    }
}

/// How converted events are labelled.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EventMapping<'a> {
    pub id_prefix: &'a str,
    pub category: EventCategory,
    pub source_id: &'a str,
}

/// Converts a raw Google event into a [`CalendarEvent`].
///
/// Cancelled events and events without an id or start are skipped. Google's
/// all-day end dates are already exclusive.
pub(crate) fn convert_event(raw: Value, mapping: &EventMapping<'_>) -> Option<CalendarEvent> {
    let event: ApiEvent = serde_json::from_value(raw.clone())
        .map_err(|e| warn!(error = %e, "Skipping undecodable Google event"))
        .ok()?;

    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let id = event.id?;
    let Some(start) = event.start.parse() else {
        warn!(id = %id, "Google event has no usable start time");
        return None;
    };

    let (start_at, all_day) = match start {
        ParsedTime::At(at) => (at, false),
        ParsedTime::Day(day) => (start_of_day(day), true),
    };
    let end_at = match event.end.parse() {
        Some(ParsedTime::At(at)) => at,
        Some(ParsedTime::Day(day)) => start_of_day(day),
        None if all_day => start_at + Duration::days(1),
        None => start_at,
    };

    Some(
        CalendarEvent::new(
            format!("{}_{}", mapping.id_prefix, id),
            event.summary.unwrap_or_else(|| "(no title)".to_string()),
            start_at,
            end_at,
            mapping.category,
            mapping.source_id,
        )
        .with_description(event.description.unwrap_or_default())
        .with_location(event.location.unwrap_or_default())
        .with_all_day(all_day)
        .with_original_data(raw),
    )
}
