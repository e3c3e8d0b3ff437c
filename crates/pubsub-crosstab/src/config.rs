//! Cross-tab adapter configuration.

use crate::{
    dedup::{DEFAULT_DEDUPE_CACHE_SIZE, DEFAULT_DEDUPE_WINDOW_MS},
    error::{ErrorSink, NoopErrorSink},
};

/// Default size cap on an ingress/egress envelope, spec §4.7.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 262_144;

/// Bus-local rate limit applied to inbound cross-tab traffic (distinct
/// from the token bucket a [`pubsub_core::bus::PubSubBus`] applies to its
/// own `publish` calls).
#[derive(Debug, Clone, Copy)]
pub struct CrossTabRateLimit {
    pub max_per_second: f64,
    pub max_burst: f64,
}

/// Configuration for [`crate::adapter::CrossTabAdapter::attach`], covering
/// every field spec §6 names for the cross-tab adapter.
pub struct CrossTabConfig {
    pub channel_name: String,
    /// Falls back to a generated UUID if unset.
    pub client_id: Option<String>,
    pub enable_leadership: bool,
    pub emit_system_events: bool,
    pub max_message_size: usize,
    pub rate_limit: Option<CrossTabRateLimit>,
    /// There being no DOM `location.origin` in this environment, the
    /// caller supplies the value every ingress envelope's `origin` must
    /// equal; the default is a placeholder obviously wrong for any real
    /// deployment, forcing callers to set it deliberately.
    pub expected_origin: String,
    pub dedupe_window_ms: u64,
    pub dedupe_cache_size: usize,
    /// `0` disables time-triggered batching.
    pub batch_interval_ms: u64,
    pub max_batch_size: usize,
    pub on_error: Box<dyn ErrorSink>,
    pub debug: bool,
}

impl std::fmt::Debug for CrossTabConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossTabConfig")
            .field("channel_name", &self.channel_name)
            .field("client_id", &self.client_id)
            .field("enable_leadership", &self.enable_leadership)
            .field("emit_system_events", &self.emit_system_events)
            .field("max_message_size", &self.max_message_size)
            .field("expected_origin", &self.expected_origin)
            .field("dedupe_window_ms", &self.dedupe_window_ms)
            .field("dedupe_cache_size", &self.dedupe_cache_size)
            .field("batch_interval_ms", &self.batch_interval_ms)
            .field("max_batch_size", &self.max_batch_size)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl Default for CrossTabConfig {
    fn default() -> Self {
        Self {
            channel_name: "pubsub".to_string(),
            client_id: None,
            enable_leadership: false,
            emit_system_events: false,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            rate_limit: None,
            expected_origin: "app://local".to_string(),
            dedupe_window_ms: DEFAULT_DEDUPE_WINDOW_MS,
            dedupe_cache_size: DEFAULT_DEDUPE_CACHE_SIZE,
            batch_interval_ms: 50,
            max_batch_size: 20,
            on_error: Box::new(NoopErrorSink),
            debug: false,
        }
    }
}
