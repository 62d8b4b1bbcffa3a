//! Google Calendar read on behalf of a signed-in user.
//!
//! Sign-in is delegated to a [`GoogleSignIn`] implementation (the PKCE
//! loopback flow in production) and only happens through
//! [`GoogleCalendarSource::sign_in`]. The account email must belong to the
//! school's domain; any other account is signed out again and the attempt
//! fails with a domain violation. Fetching without a session contributes no
//! events.

use std::sync::Arc;

use edusis_core::{CalendarEvent, EventCategory, SchoolConfig, UserProfile};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::client::{Auth, EventMapping, GoogleCalendarClient, convert_event};
use super::config::GoogleConfig;
use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::source::{BoxFuture, EventSource, FetchRequest, SourceKind};

const SOURCE_NAME: &str = "google";

/// A signed-in Google account.
#[derive(Clone, PartialEq, Eq)]
pub struct GoogleAccount {
    pub email: String,
    pub access_token: String,
}

impl std::fmt::Debug for GoogleAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleAccount")
            .field("email", &self.email)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// An interactive Google sign-in mechanism.
pub trait GoogleSignIn: Send + Sync {
    /// Runs the sign-in flow and returns the account that signed in.
    fn sign_in(&self) -> BoxFuture<'_, ProviderResult<GoogleAccount>>;

    /// Signs the current account out, revoking its access.
    fn sign_out(&self) -> BoxFuture<'_, ProviderResult<()>>;
}

/// Events from the signed-in user's Google calendars.
pub struct GoogleCalendarSource {
    config: GoogleConfig,
    client: GoogleCalendarClient,
    flow: Arc<dyn GoogleSignIn>,
    session: RwLock<Option<GoogleAccount>>,
}

impl std::fmt::Debug for GoogleCalendarSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleCalendarSource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GoogleCalendarSource {
    /// Creates the source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn new(config: GoogleConfig, flow: Arc<dyn GoogleSignIn>) -> ProviderResult<Self> {
        Ok(Self {
            client: GoogleCalendarClient::new(&config)?,
            config,
            flow,
            session: RwLock::new(None),
        })
    }

    /// Signs in and returns the account email.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied` if the school does not allow Google Calendar for
    ///   the user's role
    /// - `DomainViolation` if the account is outside the school's domain; the
    ///   account is signed out again
    /// - any error of the sign-in flow itself
    pub async fn sign_in(&self, profile: &UserProfile, school: &SchoolConfig) -> ProviderResult<String> {
        self.establish(profile, school).await.map(|account| account.email)
    }

    /// Signs out the current account, if any.
    pub async fn sign_out(&self) -> ProviderResult<()> {
        let previous = self.session.write().await.take();
        if previous.is_some() {
            self.flow.sign_out().await?;
        }
        Ok(())
    }

    /// The email of the signed-in account.
    pub async fn signed_in_email(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|account| account.email.clone())
    }

    async fn establish(&self, profile: &UserProfile, school: &SchoolConfig) -> ProviderResult<GoogleAccount> {
        if !school.can_access_google_calendar(profile) {
            return Err(ProviderError::permission_denied(format!(
                "Google Calendar is not available to {} accounts at {}",
                profile.role, school.school_id
            )));
        }

        let account = self.flow.sign_in().await?;

        if !school.is_allowed_email(&account.email) {
            warn!(
                email = %account.email,
                domain = %school.domain,
                "Google account outside the school domain, signing out"
            );
            *self.session.write().await = None;
            if let Err(e) = self.flow.sign_out().await {
                warn!(error = %e, "Failed to sign out rejected Google account");
            }
            return Err(ProviderError::domain_violation(format!(
                "{} is not a {} account",
                account.email, school.domain
            )));
        }

        info!(email = %account.email, "Signed in to Google Calendar");
        *self.session.write().await = Some(account.clone());
        Ok(account)
    }

    async fn fetch_inner(&self, request: FetchRequest) -> ProviderResult<Vec<CalendarEvent>> {
        if !request.school.can_access_google_calendar(&request.profile) {
            debug!(role = %request.profile.role, "Google Calendar not enabled for this user");
            return Ok(Vec::new());
        }

        // Fetching never starts the interactive flow; that is `sign_in`'s job
        let access_token = match *self.session.read().await {
            Some(ref account) => account.access_token.clone(),
            None => {
                debug!("Not signed in to Google Calendar, skipping");
                return Ok(Vec::new());
            }
        };
        let auth = Auth::Bearer(access_token);
        let mapping = EventMapping {
            id_prefix: "google",
            category: EventCategory::GoogleWorkspace,
            source_id: SOURCE_NAME,
        };

        let mut events = Vec::new();
        for calendar_id in &self.config.calendar_ids {
            let items = match self.client.list_events(&auth, calendar_id, &request.range).await {
                Ok(items) => items,
                Err(e) => {
                    if e.code() == ProviderErrorCode::AuthenticationFailed {
                        // Expired or revoked; the user has to sign in again
                        *self.session.write().await = None;
                    }
                    return Err(e);
                }
            };
            events.extend(items.into_iter().filter_map(|raw| convert_event(raw, &mapping)));
        }

        Ok(events)
    }
}

impl EventSource for GoogleCalendarSource {
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use edusis_core::{DateRange, Role};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{header, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FakeSignIn {
        email: String,
        sign_ins: AtomicUsize,
        sign_outs: AtomicUsize,
    }

    impl FakeSignIn {
        fn new(email: &str) -> Arc<Self> {
            Arc::new(Self {
                email: email.to_string(),
                sign_ins: AtomicUsize::new(0),
                sign_outs: AtomicUsize::new(0),
            })
        }
    }

    impl GoogleSignIn for FakeSignIn {
        fn sign_in(&self) -> BoxFuture<'_, ProviderResult<GoogleAccount>> {
            self.sign_ins.fetch_add(1, Ordering::SeqCst);
            let account = GoogleAccount {
                email: self.email.clone(),
                access_token: "access-1".to_string(),
            };
            Box::pin(async move { Ok(account) })
        }

        fn sign_out(&self) -> BoxFuture<'_, ProviderResult<()>> {
            self.sign_outs.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    fn school() -> SchoolConfig {
        SchoolConfig::new("paragon", "school.edu").with_google_calendar(false)
    }

    fn request(role: Role) -> FetchRequest {
        FetchRequest::new(
            Arc::new(UserProfile::new("t-1", role)),
            Arc::new(school()),
            DateRange::new(
                Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 9, 8, 0, 0, 0).unwrap(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn foreign_domain_is_rejected_without_fetching() {
        let server = MockServer::start().await;
        Mock::given(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
            .expect(0)
            .mount(&server)
            .await;

        let flow = FakeSignIn::new("x@other.com");
        let source = GoogleCalendarSource::new(
            GoogleConfig::new().with_api_base(server.uri()),
            flow.clone(),
        )
        .unwrap();

        let profile = UserProfile::new("t-1", Role::Teacher);
        let err = source.sign_in(&profile, &school()).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::DomainViolation);
        assert_eq!(flow.sign_outs.load(Ordering::SeqCst), 1);
        assert!(source.signed_in_email().await.is_none());

        let outcome = source.fetch_events(request(Role::Teacher)).await.unwrap();
        assert!(outcome.events.is_empty());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn fetch_without_session_never_starts_sign_in() {
        let server = MockServer::start().await;
        Mock::given(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
            .expect(0)
            .mount(&server)
            .await;

        let flow = FakeSignIn::new("t@school.edu");
        let source = GoogleCalendarSource::new(
            GoogleConfig::new().with_api_base(server.uri()),
            flow.clone(),
        )
        .unwrap();

        for _ in 0..3 {
            let events = source.fetch(request(Role::Teacher)).await.unwrap();
            assert!(events.is_empty());
        }
        assert_eq!(flow.sign_ins.load(Ordering::SeqCst), 0);
        assert!(source.signed_in_email().await.is_none());
    }

    #[tokio::test]
    async fn school_account_fetches_events_once_signed_in() {
        let server = MockServer::start().await;
        Mock::given(path("/calendars/primary/events"))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    { "id": "e1", "summary": "Planning",
                      "start": { "dateTime": "2025-09-02T09:00:00Z" },
                      "end": { "dateTime": "2025-09-02T10:00:00Z" } }
                ]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let flow = FakeSignIn::new("Teacher@School.EDU");
        let source = GoogleCalendarSource::new(
            GoogleConfig::new().with_api_base(server.uri()),
            flow.clone(),
        )
        .unwrap();

        let profile = UserProfile::new("t-1", Role::Teacher);
        source.sign_in(&profile, &school()).await.unwrap();

        let events = source.fetch(request(Role::Teacher)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "google_e1");
        assert_eq!(events[0].category, EventCategory::GoogleWorkspace);

        source.fetch(request(Role::Teacher)).await.unwrap();
        assert_eq!(flow.sign_ins.load(Ordering::SeqCst), 1);
        assert_eq!(
            source.signed_in_email().await.as_deref(),
            Some("Teacher@School.EDU")
        );
    }

    #[tokio::test]
    async fn sign_in_refused_for_roles_without_access() {
        let flow = FakeSignIn::new("student@school.edu");
        let source = GoogleCalendarSource::new(GoogleConfig::new(), flow.clone()).unwrap();

        let profile = UserProfile::new("s-1", Role::Student);
        let err = source.sign_in(&profile, &school()).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::PermissionDenied);
        assert_eq!(flow.sign_ins.load(Ordering::SeqCst), 0);

        // Fetching for such a user contributes nothing rather than failing
        let events = source.fetch(request(Role::Student)).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn expired_token_clears_session() {
        let server = MockServer::start().await;
        Mock::given(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let flow = FakeSignIn::new("t@school.edu");
        let source = GoogleCalendarSource::new(
            GoogleConfig::new().with_api_base(server.uri()),
            flow.clone(),
        )
        .unwrap();

        let profile = UserProfile::new("t-1", Role::Teacher);
        source.sign_in(&profile, &school()).await.unwrap();

        let outcome = source.fetch_events(request(Role::Teacher)).await.unwrap();
        assert_eq!(
            outcome.error.map(|e| e.code()),
            Some(ProviderErrorCode::AuthenticationFailed)
        );
        assert!(source.signed_in_email().await.is_none());
    }

    #[tokio::test]
    async fn sign_out_revokes_only_when_signed_in() {
        let flow = FakeSignIn::new("t@school.edu");
        let source = GoogleCalendarSource::new(GoogleConfig::new(), flow.clone()).unwrap();

        source.sign_out().await.unwrap();
        assert_eq!(flow.sign_outs.load(Ordering::SeqCst), 0);

        let profile = UserProfile::new("t-1", Role::Teacher);
        assert_eq!(source.sign_in(&profile, &school()).await.unwrap(), "t@school.edu");
        source.sign_out().await.unwrap();
        assert_eq!(flow.sign_outs.load(Ordering::SeqCst), 1);
        assert!(source.signed_in_email().await.is_none());
    }
}
