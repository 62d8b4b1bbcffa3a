//! Event cache with TTL support.
//!
//! Aggregated event lists are cached per (user, range, session options).
//! Entries are kept in memory and written through to a [`KeyValueStore`] so
//! a stale list can still be served after a restart when every source is
//! down. Freshness is decided by a [`CachePolicy`] against the injected clock;
//! persisted copies are kept for the policy's stale retention, then pruned.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use edusis_core::{CalendarEvent, DateRange};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

use crate::config::{DEFAULT_CACHE_TTL, SessionOptions};
use crate::storage::KeyValueStore;

/// Storage key prefix for written-through entries.
pub const STORAGE_PREFIX: &str = "calendar_cache:";

/// How long persisted entries are kept for the stale fallback.
pub const DEFAULT_STALE_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

fn push_hex(out: &mut String, bytes: &[u8]) {
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
}

/// The fixed-width key prefix shared by all of a user's entries.
///
/// Hashing the id keeps the prefix of one user from being a prefix of
/// another user's keys, whatever characters the ids contain.
pub fn user_prefix(user_id: &str) -> String {
    let digest = Sha256::digest(user_id.as_bytes());
    let mut prefix = String::with_capacity(17);
    push_hex(&mut prefix, &digest[..8]);
    prefix.push(':');
    prefix
}

/// Builds the cache key for a user's aggregated view of a range.
///
/// The key starts with [`user_prefix`] so one user's entries can be cleared
/// without touching anyone else's.
pub fn cache_key(user_id: &str, range: &DateRange, session: &SessionOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b"|");
    hasher.update(range.start.to_rfc3339().as_bytes());
    hasher.update(b"|");
    hasher.update(range.end.to_rfc3339().as_bytes());
    hasher.update([
        b'|',
        u8::from(session.include_personal),
        u8::from(session.include_google),
        u8::from(session.demo_mode),
    ]);

    let digest = hasher.finalize();
    let mut key = user_prefix(user_id);
    push_hex(&mut key, &digest[..16]);
    key
}

/// Cache entry containing events and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cached events, already filtered and sorted.
    pub events: Vec<CalendarEvent>,
    /// When the entry was written.
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(events: Vec<CalendarEvent>, updated_at: DateTime<Utc>) -> Self {
        Self { events, updated_at }
    }

    /// Returns how old the entry is at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.updated_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Decides when a cached entry may be served without refetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    ttl: Duration,
    stale_retention: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl CachePolicy {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            stale_retention: DEFAULT_STALE_RETENTION.max(ttl),
        }
    }

    /// Builder: set how long persisted entries are kept past their TTL.
    pub fn with_stale_retention(mut self, retention: Duration) -> Self {
        self.stale_retention = retention.max(self.ttl);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stale_retention(&self) -> Duration {
        self.stale_retention
    }

    /// Returns true if the entry is younger than the TTL at `now`.
    pub fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        entry.age(now) < self.ttl
    }
}

/// Aggregated event cache.
pub struct EventCache {
    /// Cache entries keyed by [`cache_key`].
    entries: HashMap<String, CacheEntry>,
    /// Write-through backend, if any.
    store: Option<Arc<dyn KeyValueStore>>,
}

impl Default for EventCache {
    fn default() -> Self {
        Self::new(None)
    }
}

impl EventCache {
    /// Creates a cache, optionally backed by durable storage.
    pub fn new(store: Option<Arc<dyn KeyValueStore>>) -> Self {
        Self {
            entries: HashMap::new(),
            store,
        }
    }

    fn load_persisted(&self, key: &str) -> Option<CacheEntry> {
        let store = self.store.as_ref()?;
        let storage_key = format!("{STORAGE_PREFIX}{key}");
        match store.get(&storage_key) {
            Ok(Some(raw)) => serde_json::from_str(&raw)
                .inspect_err(|e| warn!(key = %key, error = %e, "Discarding unreadable cache entry"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache storage read failed");
                None
            }
        }
    }

    /// Gets an entry regardless of age.
    ///
    /// Falls back to durable storage when the entry is not in memory.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.entries.get(key) {
            return Some(entry.clone());
        }
        let entry = self.load_persisted(key);
        if entry.is_some() {
            debug!(key = %key, "Loaded cache entry from storage");
        }
        entry
    }

    /// Gets an entry only if the policy considers it fresh at `now`.
    pub fn get_fresh(&self, key: &str, policy: &CachePolicy, now: DateTime<Utc>) -> Option<CacheEntry> {
        self.get(key).filter(|entry| policy.is_fresh(entry, now))
    }

    /// Inserts or replaces an entry and writes it through to storage.
    pub fn insert(&mut self, key: impl Into<String>, events: Vec<CalendarEvent>, now: DateTime<Utc>) {
        let key = key.into();
        let entry = CacheEntry::new(events, now);

        if let Some(store) = &self.store {
            match serde_json::to_string(&entry) {
                Ok(raw) => {
                    if let Err(e) = store.set(&format!("{STORAGE_PREFIX}{key}"), raw) {
                        warn!(key = %key, error = %e, "Cache write-through failed");
                    }
                }
                Err(e) => warn!(key = %key, error = %e, "Failed to encode cache entry"),
            }
        }

        debug!(key = %key, event_count = entry.events.len(), "Cached events");
        self.entries.insert(key, entry);
    }

    /// Removes every entry belonging to a user, in memory and in storage.
    pub fn clear_user(&mut self, user_id: &str) -> usize {
        let prefix = user_prefix(user_id);
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(&prefix));
        let mut removed = before - self.entries.len();

        if let Some(store) = &self.store {
            let storage_prefix = format!("{STORAGE_PREFIX}{prefix}");
            match store.keys() {
                Ok(keys) => {
                    for key in keys.iter().filter(|k| k.starts_with(&storage_prefix)) {
                        match store.remove(key) {
                            Ok(()) => removed += 1,
                            Err(e) => warn!(key = %key, error = %e, "Cache storage remove failed"),
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Cache storage listing failed"),
            }
        }

        debug!(user = %user_id, removed, "Cleared cache entries");
        removed
    }

    /// Drops in-memory entries that are no longer fresh and persisted
    /// entries older than the stale retention.
    pub fn evict_expired(&mut self, policy: &CachePolicy, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            let keep = policy.is_fresh(entry, now);
            if !keep {
                trace!(key = %key, "Evicting expired cache entry");
            }
            keep
        });
        let evicted = before - self.entries.len() + self.prune_persisted(policy, now);
        if evicted > 0 {
            debug!(evicted, "Evicted expired cache entries");
        }
        evicted
    }

    fn prune_persisted(&self, policy: &CachePolicy, now: DateTime<Utc>) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        let keys = match store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Cache storage listing failed");
                return 0;
            }
        };

        let mut pruned = 0;
        for storage_key in keys.iter().filter(|k| k.starts_with(STORAGE_PREFIX)) {
            let expired = match store.get(storage_key) {
                Ok(Some(raw)) => serde_json::from_str::<CacheEntry>(&raw)
                    .map(|entry| entry.age(now) >= policy.stale_retention())
                    .unwrap_or(true),
                Ok(None) => false,
                Err(e) => {
                    warn!(key = %storage_key, error = %e, "Cache storage read failed");
                    false
                }
            };
            if !expired {
                continue;
            }
            match store.remove(storage_key) {
                Ok(()) => {
                    trace!(key = %storage_key, "Pruned persisted cache entry");
                    pruned += 1;
                }
                Err(e) => warn!(key = %storage_key, error = %e, "Cache storage remove failed"),
            }
        }
        pruned
    }

    /// Returns the number of in-memory entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no in-memory entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
