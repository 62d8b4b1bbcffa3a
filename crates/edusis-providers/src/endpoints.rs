//! School backend endpoint registry.

use std::fmt;

use url::Url;

use crate::error::{ProviderError, ProviderResult};

/// A calendar endpoint of the school backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Branch calendars: academic, school-wide and relayed Google events.
    CalendarData,
    /// The signed-in user's personal events.
    PersonalEvents,
    UpcomingEvents,
    MonthlyEvents,
}

impl Endpoint {
    pub const ALL: [Endpoint; 4] = [
        Endpoint::CalendarData,
        Endpoint::PersonalEvents,
        Endpoint::UpcomingEvents,
        Endpoint::MonthlyEvents,
    ];

    /// Path relative to the API base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Self::CalendarData => "/calendar/data",
            Self::PersonalEvents => "/calendar/personal",
            Self::UpcomingEvents => "/calendar/upcoming",
            Self::MonthlyEvents => "/calendar/monthly",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CalendarData => "calendar_data",
            Self::PersonalEvents => "personal_events",
            Self::UpcomingEvents => "upcoming_events",
            Self::MonthlyEvents => "monthly_events",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|endpoint| endpoint.name() == name)
    }

    fn segments(&self) -> impl Iterator<Item = &'static str> {
        self.path().trim_start_matches('/').split('/')
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Resolves endpoints against a configured base URL.
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    base: Url,
}

impl EndpointRegistry {
    /// Creates a registry rooted at `base_url` (e.g. `https://api.school.edu/api/v1`).
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the URL does not parse or is not an
    /// http(s) URL with a path.
    pub fn new(base_url: &str) -> ProviderResult<Self> {
        let base = Url::parse(base_url).map_err(|e| {
            ProviderError::configuration(format!("invalid API base URL '{}'", base_url))
                .with_source(e)
        })?;

        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(ProviderError::configuration(format!(
                "API base URL must be http(s): {}",
                base_url
            )));
        }

        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Full URL of an endpoint.
    pub fn url(&self, endpoint: Endpoint) -> Url {
        let mut url = self.base.clone();
        url.set_query(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(endpoint.segments());
        }
        url
    }

    /// Full URL of an endpoint with query parameters appended.
    pub fn url_with_query(&self, endpoint: Endpoint, query: &[(&str, String)]) -> Url {
        let mut url = self.url(endpoint);
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        url
    }
}
