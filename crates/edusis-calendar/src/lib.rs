//! Calendar aggregation for the school information system.
//!
//! This crate sits between the sources in `edusis-providers` and the
//! client. For one signed-in user it:
//!
//! 1. rate-limits the request ([`RateLimiter`])
//! 2. serves a fresh cached list if there is one ([`EventCache`])
//! 3. fans out to every applicable source concurrently
//! 4. drops duplicates, applies role-based visibility ([`permissions`]),
//!    sanitizes and sorts by start
//! 5. caches the result, in memory and in durable storage ([`storage`])
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use edusis_calendar::CalendarService;
//! use edusis_providers::{AcademicSource, ApiClient, ApiConfig};
//!
//! let api = Arc::new(ApiClient::new(&ApiConfig::new("https://api.school.edu"))?);
//! let service = CalendarService::builder(profile, school)
//!     .with_source(Arc::new(AcademicSource::new(api)))
//!     .build();
//! let events = service.get_upcoming_events(7).await?;
//! ```

pub mod cache;
pub mod config;
pub mod demo;
pub mod error;
pub mod permissions;
pub mod rate_limit;
pub mod service;
pub mod storage;

pub use cache::{CacheEntry, CachePolicy, DEFAULT_STALE_RETENTION, EventCache, cache_key, user_prefix};
pub use config::{DEFAULT_CACHE_TTL, RateLimitConfig, RateLimitRule, ServiceConfig, SessionOptions};
pub use error::{CalendarError, CalendarResult};
pub use permissions::{CategoryRule, can_delete, can_edit, filter_events_for_user, is_visible, rule_for};
pub use rate_limit::{RateLimitAction, RateLimiter};
pub use service::{CalendarService, CalendarServiceBuilder, SourceStatus, dedup_events, process_events};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError, StorageResult};
