//! Google Calendar commands.

use edusis_calendar::CalendarError;

use crate::commands::events::{Query, print_events};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::session::build_service;

/// Signs in with a school Google account and lists upcoming events.
///
/// The OAuth session lives only as long as this process, so the events are
/// fetched right after sign-in.
pub async fn sign_in(config: &ClientConfig, days: u32, json: bool) -> ClientResult<()> {
    let features = &config.school.features;
    if !features.google_calendar_enabled {
        return Err(ClientError::config(
            "Google Calendar is not enabled for this school ([school.features] google_calendar_enabled)",
        ));
    }
    if features.google_calendar_read_only {
        return Err(ClientError::config(
            "this school publishes read-only Google calendars; no sign-in needed",
        ));
    }

    let service = build_service(config)?;
    let email = match service.sign_in_google().await {
        Ok(email) => email,
        Err(CalendarError::DomainViolation(message)) => {
            return Err(ClientError::config(format!(
                "{}; sign in with your {} account",
                message, config.school.domain
            )));
        }
        Err(e) => return Err(e.into()),
    };
    eprintln!("Signed in as {}", email);

    let result = print_events(&service, Query::Upcoming { days }, json, true).await;
    if let Err(e) = service.sign_out_google().await {
        tracing::warn!(error = %e, "Google sign-out failed");
    }
    result
}
