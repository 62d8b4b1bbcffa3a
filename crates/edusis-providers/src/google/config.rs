//! Google Calendar source configuration.

use std::time::Duration;

use crate::http::DEFAULT_TIMEOUT;

/// Base URL for Google Calendar API v3.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// OAuth 2.0 credentials for Google API access.
///
/// The school registers one OAuth client; its id and secret are provided
/// through the client configuration.
#[derive(Clone)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID from Google Cloud Console.
    pub client_id: String,
    /// The OAuth 2.0 client secret from Google Cloud Console.
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Validates that the credentials appear to be correctly formatted.
    ///
    /// This checks that:
    /// - Client ID ends with `.apps.googleusercontent.com`
    /// - Client secret is non-empty
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Configuration for talking to the Calendar API.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// Calendar API base URL. Overridden in tests.
    pub api_base: String,

    /// Calendars read by the interactive source.
    ///
    /// Defaults to the signed-in user's primary calendar. The read-only
    /// source picks its calendars from the school configuration instead.
    pub calendar_ids: Vec<String>,

    /// Page size for event listing.
    pub max_results: usize,

    /// Request timeout.
    pub timeout: Duration,

    /// User agent string for API requests.
    pub user_agent: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_base: CALENDAR_API_BASE.to_string(),
            calendar_ids: vec!["primary".to_string()],
            max_results: Self::DEFAULT_MAX_RESULTS,
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("edusis-calendar/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl GoogleConfig {
    /// Default page size; the API maximum is 2500.
    pub const DEFAULT_MAX_RESULTS: usize = 250;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_calendar_ids(mut self, ids: Vec<String>) -> Self {
        self.calendar_ids = ids;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_results == 0 || self.max_results > 2500 {
            return Err(format!(
                "max_results must be between 1 and 2500, got {}",
                self.max_results
            ));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(format!("invalid Calendar API base URL: {}", self.api_base));
        }
        Ok(())
    }
}

/// Configuration for the interactive OAuth sign-in.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub credentials: OAuthCredentials,

    /// OAuth scopes to request. The `email` scope is needed for the
    /// school-domain check.
    pub scopes: Vec<String>,

    /// Port range for the loopback redirect server.
    pub loopback_port_range: (u16, u16),

    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub revoke_url: String,

    pub timeout: Duration,
}

impl OAuthConfig {
    pub const CALENDAR_SCOPE: &'static str = "https://www.googleapis.com/auth/calendar.readonly";

    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                Self::CALENDAR_SCOPE.to_string(),
            ],
            loopback_port_range: (8080, 8090),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            revoke_url: "https://oauth2.googleapis.com/revoke".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Points the token, userinfo and revoke requests at another server.
    pub fn with_endpoint_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.token_url = format!("{}/token", base);
        self.userinfo_url = format!("{}/userinfo", base);
        self.revoke_url = format!("{}/revoke", base);
        self
    }

    pub fn with_loopback_port_range(mut self, start: u16, end: u16) -> Self {
        self.loopback_port_range = (start, end);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.credentials
            .validate()
            .map_err(|e| format!("invalid credentials: {}", e))?;

        if !self.scopes.iter().any(|scope| scope == "email") {
            return Err("the email scope is required to check the account domain".to_string());
        }

        if self.loopback_port_range.0 > self.loopback_port_range.1 {
            return Err("invalid loopback port range".to_string());
        }

        Ok(())
    }
}
