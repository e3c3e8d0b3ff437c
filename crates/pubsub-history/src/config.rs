//! History adapter configuration.

use crate::error::{ErrorSink, NoopErrorSink};

/// Default per-namespace retention cap, spec §6's `maxMessages` default.
pub const DEFAULT_MAX_MESSAGES: usize = 1000;
/// Default time-to-live, spec §6's `ttlSeconds` default. `0` disables
/// TTL-based expiry (overflow trimming still applies).
pub const DEFAULT_TTL_SECONDS: u64 = 0;
/// Default periodic GC interval, spec §6's `gcIntervalMs` default.
pub const DEFAULT_GC_INTERVAL_MS: u64 = 60_000;
/// The on-write GC trigger fires once a namespace's count reaches this
/// fraction of `max_messages` (spec §4.8).
pub const ON_WRITE_GC_THRESHOLD: f64 = 0.9;

/// Configuration for [`crate::adapter::HistoryAdapter::attach`], covering
/// every field spec §6 names for the history adapter.
pub struct HistoryConfig {
    /// Identifies the shared store instance this adapter opens; adapters
    /// attached with the same `db_name` share records (isolated from each
    /// other only by `namespace`).
    pub db_name: String,
    pub namespace: String,
    pub max_messages: usize,
    pub ttl_seconds: u64,
    pub gc_interval_ms: u64,
    pub debug: bool,
    pub on_error: Box<dyn ErrorSink>,
}

impl std::fmt::Debug for HistoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryConfig")
            .field("db_name", &self.db_name)
            .field("namespace", &self.namespace)
            .field("max_messages", &self.max_messages)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("gc_interval_ms", &self.gc_interval_ms)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            db_name: "pubsub-history".to_string(),
            namespace: "default".to_string(),
            max_messages: DEFAULT_MAX_MESSAGES,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            gc_interval_ms: DEFAULT_GC_INTERVAL_MS,
            debug: false,
            on_error: Box::new(NoopErrorSink),
        }
    }
}
