//! Calendar service configuration.

use std::time::Duration;

use crate::rate_limit::RateLimitAction;

/// Default cache TTL.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Which sources a session aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Include the user's personal events.
    pub include_personal: bool,
    /// Include Google Calendar events.
    pub include_google: bool,
    /// Synthesize labelled sample events when nothing else is available.
    pub demo_mode: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            include_personal: true,
            include_google: true,
            demo_mode: false,
        }
    }
}

impl SessionOptions {
    /// Builder: include or exclude personal events.
    pub fn with_personal(mut self, include: bool) -> Self {
        self.include_personal = include;
        self
    }

    /// Builder: include or exclude Google events.
    pub fn with_google(mut self, include: bool) -> Self {
        self.include_google = include;
        self
    }

    /// Builder: turn demo mode on or off.
    pub fn with_demo_mode(mut self, demo: bool) -> Self {
        self.demo_mode = demo;
        self
    }
}

/// A fixed-window limit: at most `max_calls` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_calls: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub const fn new(max_calls: u32, window: Duration) -> Self {
        Self { max_calls, window }
    }
}

/// Limits per rate-limited action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub fetch_events: RateLimitRule,
    pub google_sign_in: RateLimitRule,
    pub clear_cache: RateLimitRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            fetch_events: RateLimitRule::new(30, Duration::from_secs(60)),
            google_sign_in: RateLimitRule::new(5, Duration::from_secs(300)),
            clear_cache: RateLimitRule::new(10, Duration::from_secs(60)),
        }
    }
}

impl RateLimitConfig {
    /// Returns the rule for an action.
    pub fn rule(&self, action: RateLimitAction) -> RateLimitRule {
        match action {
            RateLimitAction::FetchEvents => self.fetch_events,
            RateLimitAction::GoogleSignIn => self.google_sign_in,
            RateLimitAction::ClearCache => self.clear_cache,
        }
    }

    /// Builder: override the rule for an action.
    pub fn with_rule(mut self, action: RateLimitAction, rule: RateLimitRule) -> Self {
        match action {
            RateLimitAction::FetchEvents => self.fetch_events = rule,
            RateLimitAction::GoogleSignIn => self.google_sign_in = rule,
            RateLimitAction::ClearCache => self.clear_cache = rule,
        }
        self
    }
}

/// Calendar service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// How long a cached event list is served without refetching.
    pub cache_ttl: Duration,

    /// Per-action rate limits.
    pub rate_limits: RateLimitConfig,

    /// Sources included in this session.
    pub session: SessionOptions,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            rate_limits: RateLimitConfig::default(),
            session: SessionOptions::default(),
        }
    }
}

impl ServiceConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Builder: set rate limits.
    pub fn with_rate_limits(mut self, limits: RateLimitConfig) -> Self {
        self.rate_limits = limits;
        self
    }

    /// Builder: set session options.
    pub fn with_session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }
}
