//! Wires configuration into a [`CalendarService`].

use std::sync::Arc;
use std::time::Duration;

use edusis_calendar::{CalendarService, FileStore, KeyValueStore, MemoryStore};
use edusis_providers::{AcademicSource, ApiClient, ApiConfig, PersonalSource};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Opens durable storage per the `[storage]` section.
pub fn open_store(config: &ClientConfig) -> ClientResult<Arc<dyn KeyValueStore>> {
    match config.storage_path() {
        Some(path) => {
            let store = FileStore::open(&path)
                .map_err(|e| ClientError::config(format!("cannot open storage: {}", e)))?;
            debug!(path = %path.display(), "Using file storage");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Builds the calendar service for the configured user.
pub fn build_service(config: &ClientConfig) -> ClientResult<CalendarService> {
    let profile = config.resolve_profile()?;
    let timeout = Duration::from_secs(config.api.timeout);

    let mut builder = CalendarService::builder(profile, config.school.clone())
        .with_config(config.service_config())
        .with_store(open_store(config)?);

    if config.api.base_url.trim().is_empty() {
        if !config.session.demo_mode {
            return Err(ClientError::config("[api] base_url is required"));
        }
        info!("No school API configured, demo samples only");
    } else {
        let api = Arc::new(ApiClient::new(
            &ApiConfig::new(config.api.base_url.clone()).with_timeout(timeout),
        )?);
        builder = builder
            .with_source(Arc::new(AcademicSource::new(api.clone())))
            .with_source(Arc::new(PersonalSource::new(api)));
    }

    #[cfg(feature = "google")]
    {
        builder = google::add_sources(builder, config, timeout)?;
    }

    Ok(builder.build())
}

#[cfg(feature = "google")]
mod google {
    use std::sync::Arc;
    use std::time::Duration;

    use edusis_calendar::CalendarServiceBuilder;
    use edusis_providers::google::{GoogleCalendarSource, OAuthConfig, PkceSignIn, ReadOnlyGoogleSource};
    use edusis_providers::{FailingSource, ProviderError, SourceKind};
    use tracing::{info, warn};

    use crate::config::ClientConfig;
    use crate::error::ClientResult;

    pub(super) fn add_sources(
        builder: CalendarServiceBuilder,
        config: &ClientConfig,
        timeout: Duration,
    ) -> ClientResult<CalendarServiceBuilder> {
        let features = &config.school.features;
        if !features.google_calendar_enabled {
            return Ok(builder);
        }

        let settings = config.google.clone().unwrap_or_default();
        let google_config = settings.to_provider_config(timeout)?;

        if features.google_calendar_read_only {
            // A missing key is reported on every fetch instead of hiding the source.
            let source: Arc<dyn edusis_providers::EventSource> = match settings.resolve_api_key() {
                Ok(key) => Arc::new(ReadOnlyGoogleSource::new(google_config, key)?),
                Err(e) => {
                    warn!(error = %e, "Read-only Google Calendar is not usable");
                    Arc::new(FailingSource::new(
                        "google_readonly",
                        SourceKind::Google,
                        ProviderError::configuration(e.to_string()),
                    ))
                }
            };
            info!("Google Calendar enabled (read-only)");
            return Ok(builder.with_source(source));
        }

        let credentials = settings.resolve_credentials()?;
        let flow = PkceSignIn::new(OAuthConfig::new(credentials).with_timeout(timeout))?;
        let source = GoogleCalendarSource::new(google_config, Arc::new(flow))?;
        info!("Google Calendar enabled (interactive sign-in)");
        Ok(builder.with_google(Arc::new(source)))
    }
}
