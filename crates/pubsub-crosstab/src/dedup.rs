//! Deduplication cache keyed `messageId:clientId`, LRU-bounded with
//! per-entry age expiry.

use std::num::NonZeroUsize;

use lru::LruCache;

/// Default dedup window, matching spec §6's `dedupeWindowMs` default.
pub const DEFAULT_DEDUPE_WINDOW_MS: u64 = 60_000;
/// Default dedup cache bound, matching spec §6's `dedupeCacheSize` default.
pub const DEFAULT_DEDUPE_CACHE_SIZE: usize = 1000;

/// Tracks recently-seen dedup keys to drop redeliveries within a time
/// window.
///
/// Backed by `lru::LruCache` rather than the `FifoCacheMap` in
/// `pubsub_core::cache`: spec §3 requires LRU eviction ("most-recently-
/// touched at tail"), while the FIFO cache only tracks insertion order —
/// a touched-but-old entry must not be evicted ahead of an untouched
/// fresher one, which only an access-order cache gives for free.
pub struct DedupCache {
    entries: LruCache<String, u64>,
    max_age_ms: u64,
}

impl DedupCache {
    /// Creates a cache bounded at `capacity` entries, each considered a
    /// duplicate for `max_age_ms` after its first sighting.
    #[must_use]
    pub fn new(capacity: usize, max_age_ms: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            max_age_ms,
        }
    }

    /// Checks `key` against the cache and marks it seen at `now_ms`.
    ///
    /// Returns `true` if `key` was already present and still within its
    /// age window (a duplicate); `false` otherwise, whether because the
    /// key is new or because a stale entry was treated as absent and
    /// overwritten with the current timestamp.
    pub fn check_and_mark(&mut self, key: &str, now_ms: u64) -> bool {
        if let Some(first_seen) = self.entries.get(key) {
            if now_ms.saturating_sub(*first_seen) <= self.max_age_ms {
                return true;
            }
        }
        self.entries.put(key.to_string(), now_ms);
        false
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
