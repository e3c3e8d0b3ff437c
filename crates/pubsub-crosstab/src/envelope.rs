//! The cross-tab wire envelope (version 1).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current wire format version. Bumping this would require both ends of
/// a channel to upgrade in lockstep; nothing in this crate negotiates
/// versions, so mismatches are rejected at the structural validation
/// stage instead.
pub const WIRE_VERSION: u32 = 1;

/// A cross-tab envelope as it crosses a [`crate::transport::Transport`].
///
/// Extends the core bus envelope with the fields spec §3 names for
/// cross-tab traffic: `clientId`, `origin`, `version`, and an optional
/// broker-assigned `sequence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossTabEnvelope {
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub topic: String,
    pub payload: Value,
    pub timestamp: u64,
    pub version: u32,
    pub origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "schemaVersion", skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl CrossTabEnvelope {
    /// The dedup key: `messageId:clientId`.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.message_id, self.client_id)
    }

    /// Structural validation (ingress stage 1): every field spec §3
    /// requires non-empty/well-typed, checked without reference to any
    /// particular transport's wire encoding. Topic well-formedness reuses
    /// the bus's own publish-topic grammar (no wildcards, valid segment
    /// characters) — a cross-tab envelope becomes a local `dispatch_external`
    /// topic, so it must satisfy the same rule a local publish would.
    #[must_use]
    pub fn is_structurally_valid(&self) -> bool {
        !self.message_id.is_empty()
            && !self.client_id.is_empty()
            && !self.topic.is_empty()
            && self.version == WIRE_VERSION
            && pubsub_core::matcher::MStr::<pubsub_core::matcher::Topic>::topic(&self.topic).is_ok()
    }

    /// Approximate encoded size in bytes, used by the size-validation
    /// ingress stage. JSON-encodes the envelope; on encode failure
    /// returns `usize::MAX` so the size check always rejects it.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        serde_json::to_vec(self).map_or(usize::MAX, |bytes| bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CrossTabEnvelope {
        CrossTabEnvelope {
            message_id: "m1".to_string(),
            client_id: "c1".to_string(),
            topic: "x.y".to_string(),
            payload: Value::Null,
            timestamp: 1,
            version: WIRE_VERSION,
            origin: "https://app.example".to_string(),
            sequence: None,
            source: None,
            schema_version: None,
            meta: None,
        }
    }

    #[test]
    fn test_dedup_key_format() {
        assert_eq!(sample().dedup_key(), "m1:c1");
    }

    #[test]
    fn test_structurally_valid() {
        assert!(sample().is_structurally_valid());
    }

    #[test]
    fn test_structurally_invalid_missing_fields() {
        let mut env = sample();
        env.message_id.clear();
        assert!(!env.is_structurally_valid());
    }

    #[test]
    fn test_structurally_invalid_wildcard_topic() {
        let mut env = sample();
        env.topic = "x.+".to_string();
        assert!(!env.is_structurally_valid());
    }

    #[test]
    fn test_structurally_invalid_wrong_version() {
        let mut env = sample();
        env.version = 2;
        assert!(!env.is_structurally_valid());
    }

    #[test]
    fn test_encode_decode_roundtrip_identity() {
        let env = sample();
        let encoded = serde_json::to_string(&env).unwrap();
        let decoded: CrossTabEnvelope = serde_json::from_str(&encoded).unwrap();
        assert_eq!(env, decoded);
    }
}
