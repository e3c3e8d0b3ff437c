//! The consumer-facing diagnostics channel.
//!
//! Every [`DiagnosticEvent`] the bus emits is also mirrored as a
//! `tracing` event at an appropriate level (`debug` for routine flow,
//! `warn` for policy violations, `error` for handler faults) so the same
//! call site feeds both an operator-facing log stream and an
//! application-facing callback.

use std::time::Duration;

#[cfg(feature = "tracing-bridge")]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "tracing-bridge")]
static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs a stdout `tracing` subscriber filtered by `RUST_LOG`
/// (defaulting to `warn`), so the events [`DiagnosticEvent::emit_trace`]
/// produces are visible without the embedding application wiring its
/// own subscriber. Idempotent: a second call is a no-op.
#[cfg(feature = "tracing-bridge")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, prelude::*};

    if TRACING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Diagnostic events emitted by the bus, covering spec §6's taxonomy
/// exactly: `publish | subscribe | unsubscribe | handler-error |
/// validation-error | warning | limit-exceeded | rate-limited`.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DiagnosticEvent {
    Publish {
        topic: String,
        matched_handlers: usize,
        duration: Duration,
    },
    Subscribe {
        pattern: String,
        handler_count: usize,
    },
    Unsubscribe {
        pattern: String,
        handler_count: usize,
    },
    HandlerError {
        topic: String,
        pattern: String,
        error: String,
    },
    ValidationError {
        topic: String,
        schema_version: Option<String>,
        errors: Vec<String>,
    },
    Warning {
        message: String,
    },
    LimitExceeded {
        pattern: String,
        limit: usize,
    },
    RateLimited {
        topic: String,
    },
}

impl DiagnosticEvent {
    /// Mirrors this event to `tracing` at the level appropriate to its
    /// severity. Called from every bus call site that also invokes
    /// `on_diagnostic`, so the two channels never drift apart.
    #[cfg(feature = "tracing-bridge")]
    pub fn emit_trace(&self) {
        match self {
            Self::Publish {
                topic,
                matched_handlers,
                duration,
            } => {
                tracing::debug!(topic, matched_handlers, ?duration, "publish");
            }
            Self::Subscribe {
                pattern,
                handler_count,
            } => {
                tracing::debug!(pattern, handler_count, "subscribe");
            }
            Self::Unsubscribe {
                pattern,
                handler_count,
            } => {
                tracing::debug!(pattern, handler_count, "unsubscribe");
            }
            Self::HandlerError {
                topic,
                pattern,
                error,
            } => {
                tracing::error!(topic, pattern, error, "handler fault");
            }
            Self::ValidationError {
                topic,
                schema_version,
                errors,
            } => {
                tracing::warn!(topic, ?schema_version, ?errors, "schema validation failed");
            }
            Self::Warning { message } => {
                tracing::warn!(message, "warning");
            }
            Self::LimitExceeded { pattern, limit } => {
                tracing::warn!(pattern, limit, "handler limit exceeded");
            }
            Self::RateLimited { topic } => {
                tracing::warn!(topic, "rate limited");
            }
        }
    }

    #[cfg(not(feature = "tracing-bridge"))]
    pub fn emit_trace(&self) {}
}

/// A sink for diagnostic events. The default no-op sink discards every
/// event; `BusConfig::on_diagnostic` takes anything implementing this.
pub trait DiagnosticSink {
    fn on_diagnostic(&self, event: DiagnosticEvent);
}

impl<F: Fn(DiagnosticEvent)> DiagnosticSink for F {
    fn on_diagnostic(&self, event: DiagnosticEvent) {
        self(event);
    }
}

/// The default `onDiagnostic` sink: discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn on_diagnostic(&self, _event: DiagnosticEvent) {}
}
