//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/edusis/config.toml` by default.
//!
//! Secret values (`api.auth_token`, `google.api_key`, `google.client_id`,
//! `google.client_secret`) support secret references, see [`crate::secret`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use edusis_calendar::{DEFAULT_CACHE_TTL, ServiceConfig, SessionOptions};
use edusis_core::{SchoolConfig, UserProfile};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::secret;

/// Configuration for the edusis client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// School backend settings.
    pub api: ApiSettings,

    /// The signed-in user.
    pub profile: Option<UserProfile>,

    /// Tenant configuration, including `[school.branches.<id>]`.
    pub school: SchoolConfig,

    /// Google Calendar settings.
    #[cfg(feature = "google")]
    pub google: Option<GoogleSettings>,

    /// Which sources to aggregate.
    pub session: SessionSettings,

    pub cache: CacheSettings,

    pub storage: StorageSettings,
}

/// School backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL of the school API.
    pub base_url: String,

    /// Bearer token for the school API (supports `pass::` and `env::`).
    pub auth_token: Option<String>,

    /// Request timeout in seconds.
    pub timeout: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_token: None,
            timeout: 15,
        }
    }
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub include_personal: bool,
    pub include_google: bool,
    pub demo_mode: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let defaults = SessionOptions::default();
        Self {
            include_personal: defaults.include_personal,
            include_google: defaults.include_google,
            demo_mode: defaults.demo_mode,
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Seconds a cached event list is served without refetching.
    pub ttl: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL.as_secs(),
        }
    }
}

/// Durable storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path of the storage file. Defaults to the data directory.
    pub path: Option<PathBuf>,

    /// Keep rate limits and cache in memory only.
    pub in_memory: bool,
}

impl ClientConfig {
    /// Loads configuration from the default path.
    ///
    /// A missing file yields the default configuration.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| ClientError::config(format!("failed to parse config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("edusis")
            .join("config.toml")
    }

    /// Returns the default storage file path.
    pub fn default_storage_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("edusis")
            .join("store.json")
    }

    /// Returns the storage path, or `None` for in-memory storage.
    pub fn storage_path(&self) -> Option<PathBuf> {
        if self.storage.in_memory {
            return None;
        }
        Some(self.storage.path.clone().unwrap_or_else(Self::default_storage_path))
    }

    /// Returns the profile with its backend token resolved.
    pub fn resolve_profile(&self) -> ClientResult<UserProfile> {
        let profile = self.profile.clone().ok_or_else(|| {
            ClientError::config(format!(
                "no [profile] section in {}; add at least:\n  \
                 [profile]\n  \
                 id = \"your-user-id\"\n  \
                 role = \"student\"",
                Self::default_path().display()
            ))
        })?;

        match secret::resolve_opt(self.api.auth_token.as_deref())? {
            Some(token) => Ok(profile.with_auth_token(token)),
            None => Ok(profile),
        }
    }

    /// Builds the calendar service configuration.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig::new()
            .with_cache_ttl(Duration::from_secs(self.cache.ttl))
            .with_session(
                SessionOptions::default()
                    .with_personal(self.session.include_personal)
                    .with_google(self.session.include_google)
                    .with_demo_mode(self.session.demo_mode),
            )
    }

    /// Checks settings that can be checked without network access.
    pub fn validate(&self) -> ClientResult<()> {
        if self.api.base_url.trim().is_empty() && !self.session.demo_mode {
            return Err(ClientError::config("[api] base_url is required"));
        }
        if self.api.timeout == 0 {
            return Err(ClientError::config("[api] timeout must be at least 1 second"));
        }
        self.resolve_profile()?;
        self.school.academic_year_end.in_year(2000).map_err(|e| {
            ClientError::config(format!("invalid [school] academic_year_end: {}", e))
        })?;

        #[cfg(feature = "google")]
        if self.school.features.google_calendar_enabled {
            let google = self.google.clone().unwrap_or_default();
            if self.school.features.google_calendar_read_only {
                google.resolve_api_key()?;
            } else {
                google.resolve_credentials()?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GoogleSettings
// ---------------------------------------------------------------------------

/// Google Calendar settings.
///
/// Which fields are needed depends on `school.features.google_calendar_read_only`:
/// the read-only source needs `api_key`, interactive sign-in needs
/// `client_id` and `client_secret`.
#[cfg(feature = "google")]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// OAuth client ID (supports `pass::` and `env::` prefixes).
    pub client_id: Option<String>,

    /// OAuth client secret (supports `pass::` and `env::` prefixes).
    pub client_secret: Option<String>,

    /// API key for published school calendars (supports `pass::` and `env::`).
    pub api_key: Option<String>,

    /// Calendars read after interactive sign-in. Defaults to `primary`.
    pub calendar_ids: Vec<String>,

    /// Page size for event listing.
    pub max_results: Option<usize>,
}

#[cfg(feature = "google")]
impl GoogleSettings {
    /// Converts to the Calendar API configuration.
    pub fn to_provider_config(&self, timeout: Duration) -> ClientResult<edusis_providers::google::GoogleConfig> {
        let mut config = edusis_providers::google::GoogleConfig::new().with_timeout(timeout);
        if !self.calendar_ids.is_empty() {
            config = config.with_calendar_ids(self.calendar_ids.clone());
        }
        if let Some(max_results) = self.max_results {
            config = config.with_max_results(max_results);
        }
        config.validate().map_err(ClientError::Config)?;
        Ok(config)
    }

    /// Resolves the OAuth credentials for interactive sign-in.
    pub fn resolve_credentials(&self) -> ClientResult<edusis_providers::google::OAuthCredentials> {
        let raw_id = self.client_id.as_deref().ok_or_else(|| {
            ClientError::config(format!(
                "Google sign-in needs OAuth credentials. Add to {}:\n  \
                 [google]\n  \
                 client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
                 client_secret = \"YOUR_SECRET\"",
                ClientConfig::default_path().display()
            ))
        })?;
        let raw_secret = self
            .client_secret
            .as_deref()
            .ok_or_else(|| ClientError::config("client_secret is missing from [google]"))?;

        let credentials =
            edusis_providers::google::OAuthCredentials::new(secret::resolve(raw_id)?, secret::resolve(raw_secret)?);
        credentials.validate().map_err(ClientError::config)?;
        Ok(credentials)
    }

    /// Resolves the API key for the read-only source.
    pub fn resolve_api_key(&self) -> ClientResult<String> {
        let key = secret::resolve_opt(self.api_key.as_deref())?.unwrap_or_default();
        if key.trim().is_empty() {
            return Err(ClientError::config(
                "read-only Google Calendar needs api_key in [google]",
            ));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edusis_core::Role;

    const FULL: &str = r#"
[api]
base_url = "https://api.paragon.edu/api/v1"
auth_token = "env::_EDUSIS_CFG_TEST_TOKEN"
timeout = 10

[profile]
id = "s-1024"
role = "student"
name = "Mina"
branch_id = "main"
grade = "7"
class_id = "7B"

[school]
school_id = "paragon"
domain = "paragon.edu"
academic_year_end = { month = 6, day = 15 }

[school.features]
google_calendar_enabled = true
google_calendar_read_only = true

[school.branches.main]
academic_calendar_id = "academic@group.calendar.google.com"
events_calendar_id = "events@group.calendar.google.com"

[google]
api_key = "plain-key"

[session]
include_personal = false

[cache]
ttl = 60

[storage]
in_memory = true
"#;

    #[test]
    fn parses_every_section() {
        let config: ClientConfig = toml::from_str(FULL).unwrap();

        assert_eq!(config.api.timeout, 10);
        let profile = config.profile.as_ref().unwrap();
        assert_eq!(profile.role, Role::Student);
        assert_eq!(profile.class_id.as_deref(), Some("7B"));
        assert_eq!(config.school.domain, "paragon.edu");
        assert!(config.school.features.google_calendar_enabled);
        assert_eq!(
            config.school.branch("main").unwrap().events_calendar_id.as_deref(),
            Some("events@group.calendar.google.com")
        );
        assert_eq!(config.school.academic_year_end.day, 15);
        assert!(!config.session.include_personal);
        assert!(config.session.include_google);
        assert_eq!(config.storage_path(), None);

        let service = config.service_config();
        assert_eq!(service.cache_ttl, Duration::from_secs(60));
        assert!(!service.session.include_personal);
    }

    #[test]
    fn empty_file_is_default() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert!(config.profile.is_none());
        assert_eq!(config.api.timeout, 15);
        assert_eq!(config.cache.ttl, 300);
        assert!(config.storage_path().unwrap().ends_with("edusis/store.json"));
    }

    #[test]
    fn profile_token_resolved_from_env() {
        unsafe {
            std::env::set_var("_EDUSIS_CFG_TEST_TOKEN", "tok-123");
        }
        let config: ClientConfig = toml::from_str(FULL).unwrap();
        let profile = config.resolve_profile().unwrap();
        assert_eq!(profile.auth_token, "tok-123");
        config.validate().unwrap();
        unsafe {
            std::env::remove_var("_EDUSIS_CFG_TEST_TOKEN");
        }
    }

    #[test]
    fn missing_profile_is_reported() {
        let config = ClientConfig::default();
        let err = config.resolve_profile().unwrap_err();
        assert!(err.to_string().contains("[profile]"));
    }

    #[test]
    fn validate_rejects_missing_base_url() {
        let config: ClientConfig = toml::from_str("[profile]\nid = \"u\"\nrole = \"teacher\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache]\nttl = 5\n").unwrap();
        assert_eq!(ClientConfig::load_from(&path).unwrap().cache.ttl, 5);

        std::fs::write(&path, "[cache\n").unwrap();
        assert!(ClientConfig::load_from(&path).is_err());
    }

    #[cfg(feature = "google")]
    #[test]
    fn google_credentials_and_key() {
        let settings = GoogleSettings {
            client_id: Some("id.apps.googleusercontent.com".into()),
            client_secret: Some("secret".into()),
            api_key: Some("key".into()),
            ..Default::default()
        };
        let creds = settings.resolve_credentials().unwrap();
        assert_eq!(creds.client_id, "id.apps.googleusercontent.com");
        assert_eq!(settings.resolve_api_key().unwrap(), "key");

        let empty = GoogleSettings::default();
        assert!(empty.resolve_credentials().unwrap_err().to_string().contains("client_id"));
        assert!(empty.resolve_api_key().is_err());

        let config = settings.to_provider_config(Duration::from_secs(5)).unwrap();
        assert_eq!(config.calendar_ids, vec!["primary".to_string()]);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
