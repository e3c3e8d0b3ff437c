//! Error classification.
//!
//! Two error channels, matching spec §7's distinction between invariant
//! violations (thrown at the write call site) and resource/adapter
//! failures (reported, never propagated to the publisher's control flow):
//!
//! - [`anyhow::Error`] (re-exported as `anyhow::Result` at call sites) for
//!   invariant violations: invalid topic, dangerous schema key, disposed
//!   bus mutation, handler-limit exceeded in throw mode.
//! - [`BusFault`] for resource/adapter errors surfaced through `onError`
//!   hooks, giving adapters a stable match surface instead of parsing
//!   `anyhow` chains.

use thiserror::Error;

/// Resource or adapter failure reported through an `onError` hook rather
/// than propagated to the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BusFault {
    #[error("bus has been disposed")]
    Disposed,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("GC cycle failed: {0}")]
    Gc(String),

    #[error("batch flush failed: {0}")]
    BatchFlush(String),
}
