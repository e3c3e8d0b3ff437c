//! Error classification for the cross-tab adapter.

use thiserror::Error;

/// A sink for [`CrossTabError`], the adapter's `onError` hook. Resource
/// and transport failures are reported here rather than propagated to
/// the publisher's control flow (spec §7).
pub trait ErrorSink {
    fn on_error(&self, error: CrossTabError);
}

impl<F: Fn(CrossTabError)> ErrorSink for F {
    fn on_error(&self, error: CrossTabError) {
        self(error);
    }
}

/// The default `onError` sink: discards every error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopErrorSink;

impl ErrorSink for NoopErrorSink {
    fn on_error(&self, _error: CrossTabError) {}
}

/// Resource/transport failures reported through `onError`, never
/// propagated to the publisher's control flow.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CrossTabError {
    #[error("transport is closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no transport is available")]
    NoTransportAvailable,

    #[error("already attached to a bus")]
    AlreadyAttached,

    #[error("not attached to a bus")]
    NotAttached,

    #[error("failed to encode envelope: {0}")]
    Encode(String),
}

impl CrossTabError {
    /// Mirrors this error to `tracing` at `warn` (when the
    /// `tracing-bridge` feature is on), alongside the `onError` sink.
    #[cfg(feature = "tracing-bridge")]
    pub fn emit_trace(&self) {
        tracing::warn!(error = %self, "cross-tab adapter error");
    }

    #[cfg(not(feature = "tracing-bridge"))]
    pub fn emit_trace(&self) {}
}
