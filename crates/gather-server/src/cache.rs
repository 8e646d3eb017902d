//! TTL-keyed read cache with pattern invalidation.
//!
//! Keys follow `<resourceType>:<queryFingerprint>` so a mutation can drop
//! every stale list/detail read for a resource type with one substring
//! invalidation. Expired entries are evicted lazily on lookup and
//! periodically by [`CacheStore::spawn_sweeper`], whichever comes first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default entry TTL (matches the reference 300 time-unit design).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default sweep interval.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(320);

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// Process-local TTL cache for serialized read responses.
///
/// No cross-process coherence is assumed; consistency comes from TTL expiry
/// plus the explicit invalidation issued by the mutation pipeline.
pub struct CacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl CacheStore {
    /// Create a cache with the given default TTL.
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Fetch a value if present and not expired. Expired entries are
    /// evicted on the spot; a miss has no other side effect.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        let expired = entries.get(key)?.is_expired(Instant::now());
        if expired {
            let _ = entries.remove(key);
            trace!(key, "cache entry expired on lookup");
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Store a value, overwriting any existing entry and resetting its
    /// expiry. `ttl` of `None` uses the default.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
            ttl: ttl.unwrap_or(self.default_ttl),
        };
        let _ = self.entries.lock().insert(key.into(), entry);
    }

    /// Remove every entry whose key contains `pattern` as a substring.
    /// Returns the number of removed entries.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        let removed = before - entries.len();
        debug!(pattern, removed, "cache invalidated");
        removed
    }

    /// Remove all expired entries. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of live entries (expired-but-unswept entries count).
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Spawn the periodic sweep task. Stops when `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            // Skip the immediate first tick
            let _ = tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            debug!(removed, "cache sweep evicted expired entries");
                        }
                    }
                    () = cancel.cancelled() => break,
                }
            }
        })
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
