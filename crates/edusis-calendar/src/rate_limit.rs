//! Per-user fixed-window rate limiting.
//!
//! Counters live in durable storage under `rate_limit:{user}:{action}` so a
//! restart does not reset them. Storage failures never block the user: the
//! limiter logs and lets the call through.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use edusis_core::Clock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{RateLimitConfig, RateLimitRule};
use crate::error::{CalendarError, CalendarResult};
use crate::storage::KeyValueStore;

/// A rate-limited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    FetchEvents,
    GoogleSignIn,
    ClearCache,
}

impl RateLimitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchEvents => "fetch_events",
            Self::GoogleSignIn => "google_sign_in",
            Self::ClearCache => "clear_cache",
        }
    }
}

impl fmt::Display for RateLimitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct WindowState {
    count: u32,
    window_start_ms: i64,
}

impl WindowState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start_ms: now.timestamp_millis(),
        }
    }

    fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let ms = now.timestamp_millis().saturating_sub(self.window_start_ms);
        Duration::from_millis(u64::try_from(ms).unwrap_or(0))
    }

    fn is_expired(&self, now: DateTime<Utc>, rule: RateLimitRule) -> bool {
        self.elapsed(now) >= rule.window
    }
}

/// Fixed-window counter per (user, action).
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: RateLimitConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    fn key(user_id: &str, action: RateLimitAction) -> String {
        format!("rate_limit:{user_id}:{action}")
    }

    fn load(&self, key: &str) -> Option<WindowState> {
        match self.store.get(key) {
            Ok(Some(raw)) => serde_json::from_str(&raw)
                .inspect_err(|e| warn!(key = %key, error = %e, "Discarding unreadable rate-limit state"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Rate-limit storage read failed");
                None
            }
        }
    }

    /// Records one call of `action` by `user_id`.
    ///
    /// Returns [`CalendarError::RateLimitExceeded`] when the window is full.
    /// A rejected call is not counted.
    pub fn check(&self, user_id: &str, action: RateLimitAction) -> CalendarResult<()> {
        let rule = self.config.rule(action);
        let now = self.clock.now();
        let key = Self::key(user_id, action);

        let mut state = match self.load(&key) {
            Some(state) if !state.is_expired(now, rule) => state,
            _ => WindowState::fresh(now),
        };

        if state.count >= rule.max_calls {
            let retry_after = rule.window.saturating_sub(state.elapsed(now));
            debug!(user = %user_id, action = %action, retry_after_secs = retry_after.as_secs(), "Rate limit exceeded");
            return Err(CalendarError::RateLimitExceeded {
                action,
                retry_after,
            });
        }

        state.count += 1;
        match serde_json::to_string(&state) {
            Ok(raw) => {
                if let Err(e) = self.store.set(&key, raw) {
                    warn!(key = %key, error = %e, "Rate-limit storage write failed, allowing call");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "Failed to encode rate-limit state"),
        }
        Ok(())
    }

    /// Calls left in the current window.
    pub fn remaining(&self, user_id: &str, action: RateLimitAction) -> u32 {
        let rule = self.config.rule(action);
        let now = self.clock.now();
        match self.load(&Self::key(user_id, action)) {
            Some(state) if !state.is_expired(now, rule) => rule.max_calls.saturating_sub(state.count),
            _ => rule.max_calls,
        }
    }

    /// Forgets the counter for (user, action).
    pub fn reset(&self, user_id: &str, action: RateLimitAction) {
        let key = Self::key(user_id, action);
        if let Err(e) = self.store.remove(&key) {
            warn!(key = %key, error = %e, "Rate-limit storage remove failed");
        }
    }
}
