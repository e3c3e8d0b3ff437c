//! Hybrid garbage collector: a periodic full sweep plus an on-write
//! threshold check, both driving the same TTL-then-overflow pass.

use std::{cell::Cell, rc::Rc, time::Instant};

use crate::{config::ON_WRITE_GC_THRESHOLD, store::HistoryStore};

/// Result of one [`GarbageCollector::run_full_gc`] cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    pub expired_removed: usize,
    pub overflow_removed: usize,
    pub total_removed: usize,
    pub duration_ms: u64,
}

/// Owns the TTL/overflow policy for one namespace of a shared
/// [`HistoryStore`]. A `running` guard serializes `run_full_gc`:
/// a cycle invoked while one is already in progress returns immediately
/// with a zeroed report rather than interleaving with it (spec §4.8).
pub struct GarbageCollector {
    store: Rc<HistoryStore>,
    namespace: String,
    max_messages: usize,
    ttl_seconds: u64,
    running: Cell<bool>,
}

impl GarbageCollector {
    #[must_use]
    pub fn new(store: Rc<HistoryStore>, namespace: String, max_messages: usize, ttl_seconds: u64) -> Self {
        Self {
            store,
            namespace,
            max_messages,
            ttl_seconds,
            running: Cell::new(false),
        }
    }

    /// Removes, in order: (1) every record older than `ttl_seconds` (when
    /// nonzero) as of `now_ms`; (2) if the post-TTL count still exceeds
    /// `max_messages`, the oldest `count - max_messages` records.
    pub fn run_full_gc(&self, now_ms: u64) -> GcReport {
        if self.running.get() {
            return GcReport::default();
        }
        self.running.set(true);
        let started = Instant::now();

        let mut expired_removed = 0;
        if self.ttl_seconds > 0 {
            let cutoff = now_ms.saturating_sub(self.ttl_seconds * 1_000);
            let expired = self.store.get_expired(&self.namespace, cutoff);
            expired_removed = expired.len();
            let ids: Vec<String> = expired.into_iter().map(|r| r.id).collect();
            self.store.delete_many(&ids);
        }

        let mut overflow_removed = 0;
        let remaining = self.store.count(&self.namespace);
        if remaining > self.max_messages {
            let overflow = remaining - self.max_messages;
            let oldest = self.store.get_oldest(&self.namespace, overflow);
            overflow_removed = oldest.len();
            let ids: Vec<String> = oldest.into_iter().map(|r| r.id).collect();
            self.store.delete_many(&ids);
        }

        let report = GcReport {
            expired_removed,
            overflow_removed,
            total_removed: expired_removed + overflow_removed,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        #[cfg(feature = "tracing-bridge")]
        tracing::debug!(
            namespace = %self.namespace,
            expired_removed = report.expired_removed,
            overflow_removed = report.overflow_removed,
            total_removed = report.total_removed,
            duration_ms = report.duration_ms,
            "history gc cycle completed"
        );

        self.running.set(false);
        report
    }

    /// Runs a full GC cycle if `count(namespace) >= 0.9 * max_messages`,
    /// the on-write trigger spec §4.8 names. A no-op (returns `None`)
    /// below the threshold.
    pub fn check_on_write(&self, now_ms: u64) -> Option<GcReport> {
        let threshold = (self.max_messages as f64 * ON_WRITE_GC_THRESHOLD) as usize;
        if self.store.count(&self.namespace) >= threshold {
            Some(self.run_full_gc(now_ms))
        } else {
            None
        }
    }
}
