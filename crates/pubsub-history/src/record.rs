//! The persisted history record and query options.

use pubsub_core::envelope::Envelope;
use serde::{Deserialize, Serialize};

/// A single persisted message, keyed by `id` in the owning
/// [`crate::store::HistoryStore`].
///
/// Mirrors the wire layout `{id, topic, timestamp, namespace, createdAt,
/// message}`: `topic`/`timestamp` are pulled out of `message` at write
/// time so the compound indexes can range-scan without deserializing the
/// envelope for every candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub topic: String,
    pub timestamp: u64,
    pub namespace: String,
    pub created_at: u64,
    pub message: Envelope,
}

impl HistoryRecord {
    #[must_use]
    pub fn from_envelope(envelope: Envelope, namespace: String, created_at: u64) -> Self {
        Self {
            id: envelope.id.clone(),
            topic: envelope.topic.to_string(),
            timestamp: envelope.ts,
            namespace,
            created_at,
            message: envelope,
        }
    }
}

/// Options for [`crate::store::HistoryStore::query`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub from_time: Option<u64>,
    pub limit: Option<usize>,
}
