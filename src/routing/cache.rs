//! TTL cache of filtered peer sets.
//!
//! Entries are keyed by the ordered candidate list plus the filter
//! thresholds, since filtered peers come back in candidate order. An expired entry is evicted on lookup, never refreshed in
//! place.

use crate::protocol::sha3_hex;
use crate::routing::directory::{FilterParams, FilteredPeer, SupernodeRecord};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Distinct candidate sets remembered at once.
const CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(15);

struct CachedSet {
    peers: Arc<Vec<FilteredPeer>>,
    stored_at: Instant,
}

/// Filtered peer sets with a time-to-live.
pub struct FilterCache {
    ttl: Duration,
    entries: Mutex<LruCache<String, CachedSet>>,
}

impl FilterCache {
    /// Create a cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(CACHE_CAPACITY)),
        }
    }

    /// Cache key for filtering `candidates` with `params`.
    ///
    /// Sensitive to candidate order.
    #[must_use]
    pub fn key(candidates: &[SupernodeRecord], params: &FilterParams) -> String {
        let members: Vec<String> = candidates
            .iter()
            .map(|r| format!("{}@{}", r.pastelid, r.ip_port))
            .collect();
        let identity = format!(
            "{}|{}|{}|{}",
            members.join(","),
            params.max_latency.as_millis(),
            params.min_performance_ratio,
            params.max_count
        );
        sha3_hex(identity.as_bytes())
    }

    /// Live entry for `key`, evicting it if expired.
    pub fn get(&self, key: &str) -> Option<Arc<Vec<FilteredPeer>>> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                trace!("filter cache hit for {key}");
                return Some(Arc::clone(&entry.peers));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    /// Store a freshly filtered set.
    pub fn insert(&self, key: String, peers: Arc<Vec<FilteredPeer>>) {
        self.entries.lock().put(
            key,
            CachedSet {
                peers,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for FilterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish()
    }
}
