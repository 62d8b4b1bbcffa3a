//! Public school calendars read with a static API key.

use edusis_core::{CalendarEvent, EventCategory, SchoolConfig, UserProfile};
use tracing::{debug, warn};

use super::client::{Auth, EventMapping, GoogleCalendarClient, convert_event};
use super::config::GoogleConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::source::{BoxFuture, EventSource, FetchRequest, SourceKind};

const SOURCE_NAME: &str = "google_readonly";

/// A branch calendar to read and the category its events get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSelection {
    pub calendar_id: String,
    pub category: EventCategory,
}

/// Picks the calendars a user should see.
///
/// Everyone sees their branch's academic and school-events calendars;
/// teachers, staff and admins also see the staff calendar. Nothing is
/// selected unless the school enables Google Calendar.
pub fn select_calendars(profile: &UserProfile, school: &SchoolConfig) -> Vec<CalendarSelection> {
    if !school.features.google_calendar_enabled {
        return Vec::new();
    }
    let Some(branch) = profile
        .branch_id
        .as_deref()
        .and_then(|branch_id| school.branch(branch_id))
    else {
        return Vec::new();
    };

    let mut selected = Vec::new();
    let mut push = |calendar_id: &Option<String>, category| {
        if let Some(id) = calendar_id.as_ref().filter(|id| !id.is_empty()) {
            selected.push(CalendarSelection {
                calendar_id: id.clone(),
                category,
            });
        }
    };

    push(&branch.academic_calendar_id, EventCategory::Academic);
    push(&branch.events_calendar_id, EventCategory::SchoolEvent);
    if profile.role.is_staff() {
        push(&branch.staff_calendar_id, EventCategory::SchoolEvent);
    }
    selected
}

/// Branch calendars published through the Calendar API.
#[derive(Debug)]
pub struct ReadOnlyGoogleSource {
    client: GoogleCalendarClient,
    auth: Auth,
}

impl ReadOnlyGoogleSource {
    /// Creates the source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is empty or `config` is
    /// invalid.
    pub fn new(config: GoogleConfig, api_key: impl Into<String>) -> ProviderResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::configuration("Google API key is empty"));
        }
        Ok(Self {
            client: GoogleCalendarClient::new(&config)?,
            auth: Auth::ApiKey(api_key),
        })
    }

    async fn fetch_inner(&self, request: FetchRequest) -> ProviderResult<Vec<CalendarEvent>> {
        let calendars = select_calendars(&request.profile, &request.school);
        if calendars.is_empty() {
            debug!(role = %request.profile.role, "No read-only Google calendars for this user");
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        let mut last_error = None;
        let mut succeeded = 0usize;

        for selection in &calendars {
            let mapping = EventMapping {
                id_prefix: "gcal",
                category: selection.category,
                source_id: SOURCE_NAME,
            };
            match self
                .client
                .list_events(&self.auth, &selection.calendar_id, &request.range)
                .await
            {
                Ok(items) => {
                    succeeded += 1;
                    events.extend(items.into_iter().filter_map(|raw| convert_event(raw, &mapping)));
                }
                Err(e) => {
                    warn!(calendar = %selection.calendar_id, error = %e, "Failed to read Google calendar");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if succeeded == 0 => Err(e),
            _ => Ok(events),
        }
    }
}

impl EventSource for ReadOnlyGoogleSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Google
    }

    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, ProviderResult<Vec<CalendarEvent>>> {
        Box::pin(self.fetch_inner(request))
    }
}
