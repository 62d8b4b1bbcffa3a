//! Calendar sources and the school API client.
//!
//! This crate provides the source layer of the calendar service:
//!
//! - [`EventSource`] - The trait every upstream of events implements
//! - [`ApiClient`] / [`EndpointRegistry`] - Requests to the school backend
//! - [`school`] - Academic calendar and personal events from the school backend
//! - [`google`] - Google Calendar, interactive or read-only
//! - [`ProviderError`] - Error types for source operations
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  ┌────────────────┐  ┌────────────────┐
//! │ School backend │  │ School backend │  │ Google Cal v3  │
//! │ /calendar/data │  │ /calendar/     │  │                │
//! │                │  │   personal     │  │                │
//! └───────┬────────┘  └───────┬────────┘  └───────┬────────┘
//!         ▼                   ▼                   ▼
//! ┌────────────────┐  ┌────────────────┐  ┌────────────────┐
//! │ AcademicSource │  │ PersonalSource │  │ Google*Source  │
//! └───────┬────────┘  └───────┬────────┘  └───────┬────────┘
//!         │          EventSource                  │
//!         └───────────────────┬───────────────────┘
//!                             ▼
//!                     ┌───────────────┐
//!                     │ SourceOutcome │
//!                     └───────────────┘
//! ```

pub mod endpoints;
pub mod error;
#[cfg(feature = "google")]
pub mod google;
pub mod http;
pub mod school;
pub mod source;

// Re-export main types at crate root
pub use endpoints::{Endpoint, EndpointRegistry};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use http::{ApiClient, ApiConfig};
pub use school::{AcademicSource, PersonalSource};
pub use source::{BoxFuture, EventSource, FailingSource, FetchRequest, SourceKind, SourceOutcome};
