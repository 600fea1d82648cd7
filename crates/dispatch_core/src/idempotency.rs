//! Replay protection for ride and payment creation.
//!
//! A (scope, key) pair maps to the id of the result produced by the first
//! successful request. The scope disambiguates requesters (passenger id for
//! rides, ride id for payments) so two callers cannot collide on the same
//! client-chosen key. Entries are kept for a bounded retention window; a key
//! replayed after expiry is treated as a new request. That is an accepted
//! at-least-once-within-window guarantee, not exactly-once forever.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use uuid::Uuid;

/// Retention window after which a processed key is forgotten.
pub const RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Capacity bound on tracked keys; the oldest entries are evicted first.
const MAX_TRACKED_KEYS: usize = 50_000;

/// A blank or whitespace-only key means no idempotency guard was requested.
pub fn usable_key(key: Option<&str>) -> Option<&str> {
    key.map(str::trim).filter(|k| !k.is_empty())
}

#[derive(Debug, Clone, Copy)]
struct GuardEntry {
    result: Uuid,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct IdempotencyGuard {
    retention: Duration,
    entries: Mutex<LruCache<(String, String), GuardEntry>>,
}

impl IdempotencyGuard {
    pub fn new() -> Self {
        Self::with_retention(RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        let capacity = NonZeroUsize::new(MAX_TRACKED_KEYS).expect("capacity must be non-zero");
        Self {
            retention,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn live_entry(&self, scope: &str, key: &str) -> Option<Uuid> {
        let Some(key) = usable_key(Some(key)) else {
            return None;
        };
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            // The guard is best-effort within its window; treat a poisoned
            // cache as empty rather than failing the request.
            Err(_) => return None,
        };
        let cache_key = (scope.to_owned(), key.to_owned());
        match entries.get(&cache_key) {
            Some(entry) if entry.stored_at.elapsed() <= self.retention => Some(entry.result),
            Some(_) => {
                entries.pop(&cache_key);
                None
            }
            None => None,
        }
    }

    pub fn is_processed(&self, scope: &str, key: &str) -> bool {
        self.live_entry(scope, key).is_some()
    }

    pub fn mark_processed(&self, scope: &str, key: &str, result: Uuid) {
        let Some(key) = usable_key(Some(key)) else {
            return;
        };
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        entries.put(
            (scope.to_owned(), key.to_owned()),
            GuardEntry {
                result,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn get_result(&self, scope: &str, key: &str) -> Option<Uuid> {
        self.live_entry(scope, key)
    }
}

impl Default for IdempotencyGuard {
    fn default() -> Self {
        Self::new()
    }
}
