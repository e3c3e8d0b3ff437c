//! Error classification for the history store and adapter.

use thiserror::Error;

/// A sink for [`HistoryError`], the adapter's `onError` hook. Storage and
/// GC failures are reported here rather than propagated to the
/// publisher's control flow (spec §7).
pub trait ErrorSink {
    fn on_error(&self, error: HistoryError);
}

impl<F: Fn(HistoryError)> ErrorSink for F {
    fn on_error(&self, error: HistoryError) {
        self(error);
    }
}

/// The default `onError` sink: discards every error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopErrorSink;

impl ErrorSink for NoopErrorSink {
    fn on_error(&self, _error: HistoryError) {}
}

/// Storage/GC failures reported through `onError`, never propagated to
/// the publisher's control flow.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryError {
    #[error("history store is closed")]
    Closed,

    #[error("invalid query pattern: {0}")]
    InvalidPattern(#[from] pubsub_core::matcher::MatchError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl HistoryError {
    /// Mirrors this error to `tracing` at `warn` (when the
    /// `tracing-bridge` feature is on), alongside the `onError` sink.
    #[cfg(feature = "tracing-bridge")]
    pub fn emit_trace(&self) {
        tracing::warn!(error = %self, "history adapter error");
    }

    #[cfg(not(feature = "tracing-bridge"))]
    pub fn emit_trace(&self) {}
}
