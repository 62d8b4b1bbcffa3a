//! Calendar service error types.

use std::time::Duration;

use edusis_core::RangeError;
use edusis_providers::{ProviderError, ProviderErrorCode};
use thiserror::Error;

use crate::rate_limit::RateLimitAction;
use crate::storage::StorageError;

/// Result type for calendar service operations.
pub type CalendarResult<T> = Result<T, CalendarError>;

/// Errors that can occur in the calendar service.
#[derive(Debug, Error)]
pub enum CalendarError {
    /// A single source failed. Isolated during aggregation; returned only by
    /// operations that talk to one source directly, such as Google sign-in.
    #[error("{source_name} failed: {error}")]
    AdapterFetch {
        source_name: String,
        #[source]
        error: ProviderError,
    },

    /// The per-user rate limit for an action was hit.
    #[error("Too many {action} requests, try again in {}s", retry_after.as_secs().max(1))]
    RateLimitExceeded {
        action: RateLimitAction,
        retry_after: Duration,
    },

    /// The school configuration forbids the action for this user.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// An external account outside the school domain was used.
    #[error("Domain violation: {0}")]
    DomainViolation(String),

    /// Every source failed and there is no cached list to fall back to.
    #[error("Could not load events: all {failed} calendar sources failed")]
    TotalFetchFailure { failed: usize },

    #[error("Invalid date range: {0}")]
    InvalidRange(#[from] RangeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CalendarError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wraps an error from one source.
    ///
    /// Policy violations keep their own kinds so callers can tell them apart.
    pub fn from_source(source_name: impl Into<String>, error: ProviderError) -> Self {
        match error.code() {
            ProviderErrorCode::PermissionDenied => Self::PermissionDenied(error.message().to_string()),
            ProviderErrorCode::DomainViolation => Self::DomainViolation(error.message().to_string()),
            _ => Self::AdapterFetch {
                source_name: source_name.into(),
                error,
            },
        }
    }

    /// Returns true if retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimitExceeded { .. } | Self::TotalFetchFailure { .. } => true,
            Self::AdapterFetch { error, .. } => error.is_retryable(),
            _ => false,
        }
    }
}
