//! Event listing commands.

use chrono::{Datelike, Local, NaiveDate, Utc};
use edusis_calendar::{CalendarService, RateLimitAction};
use edusis_core::{CalendarEvent, DateRange};

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::output;
use crate::session::build_service;

/// Which events to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Upcoming { days: u32 },
    Month { year: i32, month: u32 },
    Range { from: NaiveDate, to: NaiveDate },
    AcademicYear,
}

impl Query {
    /// A month query, defaulting missing parts to the current month.
    pub fn month(year: Option<i32>, month: Option<u32>) -> Self {
        let today = Local::now().date_naive();
        Self::Month {
            year: year.unwrap_or(today.year()),
            month: month.unwrap_or(today.month()),
        }
    }

    fn range(&self, service: &CalendarService) -> ClientResult<DateRange> {
        let now = Utc::now();
        let range = match *self {
            Self::Upcoming { days } => DateRange::upcoming_days(now, days)?,
            Self::Month { year, month } => DateRange::month(year, month)?,
            Self::Range { from, to } => DateRange::for_dates(from, to)?,
            Self::AcademicYear => DateRange::until_cutoff(now, service.school().academic_year_end)?,
        };
        Ok(range)
    }
}

async fn fetch(service: &CalendarService, query: Query, refresh: bool) -> ClientResult<Vec<CalendarEvent>> {
    if refresh {
        let range = query.range(service)?;
        return Ok(service.get_all_events(range, true).await?);
    }

    let events = match query {
        Query::Upcoming { days } => service.get_upcoming_events(days).await?,
        Query::Month { year, month } => service.get_monthly_events(year, month).await?,
        Query::Range { .. } => service.get_all_events(query.range(service)?, false).await?,
        Query::AcademicYear => service.get_academic_year_events().await?,
    };
    Ok(events)
}

/// Prints events to stdout, warning about sources that failed.
pub async fn print_events(service: &CalendarService, query: Query, json: bool, refresh: bool) -> ClientResult<()> {
    let events = fetch(service, query, refresh).await?;

    for status in service.source_statuses().await {
        if let Some(error) = status.error {
            eprintln!("warning: {} unavailable, showing partial results: {}", status.name, error);
        }
    }

    if json {
        println!("{}", output::render_json(&events)?);
    } else {
        println!("{}", output::render_events(&events, &Local));
    }
    Ok(())
}

/// Lists events matching `query`.
pub async fn show(config: &ClientConfig, query: Query, json: bool, refresh: bool) -> ClientResult<()> {
    let service = build_service(config)?;
    print_events(&service, query, json, refresh).await
}

/// Fetches a week of events and reports per-source health.
pub async fn status(config: &ClientConfig) -> ClientResult<()> {
    let service = build_service(config)?;
    let result = service
        .get_all_events(DateRange::upcoming_days(Utc::now(), 7)?, true)
        .await;

    let statuses = service.source_statuses().await;
    if statuses.is_empty() {
        println!("No sources configured.");
    } else {
        println!("{}", output::render_statuses(&statuses));
    }
    let events = result?;
    println!();
    println!("user:      {} ({})", service.profile().id, service.profile().role);
    println!("events:    {} visible in the next 7 days", events.len());
    println!(
        "requests:  {} of {} left in this window",
        service.remaining_calls(RateLimitAction::FetchEvents),
        service.config().rate_limits.fetch_events.max_calls
    );
    Ok(())
}
