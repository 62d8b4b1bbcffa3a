//! Google Calendar sources.
//!
//! Two ways in, chosen by the school's `google_calendar_read_only` flag:
//!
//! - [`GoogleCalendarSource`]: the user signs in interactively (OAuth 2.0
//!   PKCE with a loopback redirect, see [`PkceSignIn`]) and their own
//!   calendars are read. The account must belong to the school's domain.
//! - [`ReadOnlyGoogleSource`]: branch calendars published by the school are
//!   read with a static API key, picked per role by [`select_calendars`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use edusis_providers::google::{GoogleCalendarSource, GoogleConfig, OAuthConfig, OAuthCredentials, PkceSignIn};
//!
//! let flow = PkceSignIn::new(OAuthConfig::new(OAuthCredentials::new(
//!     "your-client-id.apps.googleusercontent.com",
//!     "your-client-secret",
//! )))?;
//! let source = GoogleCalendarSource::new(GoogleConfig::new(), Arc::new(flow))?;
//! source.sign_in(&profile, &school).await?;
//! ```

mod client;
mod config;
mod interactive;
mod oauth;
mod readonly;

pub use config::{CALENDAR_API_BASE, GoogleConfig, OAuthConfig, OAuthCredentials};
pub use interactive::{GoogleAccount, GoogleCalendarSource, GoogleSignIn};
pub use oauth::{PkceFlow, PkceSignIn};
pub use readonly::{CalendarSelection, ReadOnlyGoogleSource, select_calendars};
