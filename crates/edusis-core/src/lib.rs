//! Core types: calendar events, date ranges, profiles, school config, sanitizing

pub mod clock;
pub mod event;
pub mod profile;
pub mod sanitize;
pub mod school;
pub mod time;
pub mod tracing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{Audience, CalendarEvent, EventCategory, Priority};
pub use profile::{Role, StudentRef, UserProfile, email_domain};
pub use sanitize::{html_escape, sanitize_event, sanitize_text, strip_sensitive};
pub use school::{BranchCalendars, FeatureFlags, SchoolConfig};
pub use time::{DateRange, EventTime, MonthDay, RangeError, start_of_day};
pub use crate::tracing::{LogFormat, TracingConfig, TracingError, init_tracing};
