//! Bus configuration.

use crate::diagnostics::{DiagnosticSink, NoopSink};

/// Schema validation strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Skip validation entirely.
    #[default]
    Off,
    /// Emit a `validation-error` diagnostic and continue.
    Warn,
    /// Reject the publish.
    Strict,
}

/// What happens when a pattern's handler count reaches
/// [`BusConfig::max_handlers_per_topic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxHandlersExceededAction {
    /// `subscribe` returns an error.
    #[default]
    Throw,
    /// `subscribe` succeeds but returns a no-op unsubscribe; a
    /// `limit-exceeded` diagnostic still fires.
    Warn,
}

/// Retention ring-buffer configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    pub max_messages: usize,
    pub ttl_ms: Option<u64>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_messages: 0,
            ttl_ms: None,
        }
    }
}

/// Bus-local token-bucket rate limiter configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_per_second: f64,
    pub max_burst: f64,
    /// Throw instead of silently dropping the message on exhaustion.
    pub throw_on_exceeded: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_second: f64::INFINITY,
            max_burst: f64::INFINITY,
            throw_on_exceeded: false,
        }
    }
}

/// Top-level bus configuration, covering every field spec §6 names.
pub struct BusConfig {
    /// Namespacing hint for diagnostics.
    pub app: String,
    pub validation_mode: ValidationMode,
    pub on_diagnostic: Box<dyn DiagnosticSink>,
    pub max_handlers_per_topic: usize,
    pub on_max_handlers_exceeded: MaxHandlersExceededAction,
    pub debug: bool,
    pub retention: Option<RetentionConfig>,
    pub rate_limit: Option<RateLimitConfig>,
}

impl std::fmt::Debug for BusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusConfig")
            .field("app", &self.app)
            .field("validation_mode", &self.validation_mode)
            .field("max_handlers_per_topic", &self.max_handlers_per_topic)
            .field("on_max_handlers_exceeded", &self.on_max_handlers_exceeded)
            .field("debug", &self.debug)
            .field("retention", &self.retention)
            .field("rate_limit", &self.rate_limit)
            .finish_non_exhaustive()
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            app: "default".to_string(),
            validation_mode: ValidationMode::default(),
            on_diagnostic: Box::new(NoopSink),
            max_handlers_per_topic: 50,
            on_max_handlers_exceeded: MaxHandlersExceededAction::default(),
            debug: false,
            retention: None,
            rate_limit: None,
        }
    }
}
