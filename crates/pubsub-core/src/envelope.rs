//! The immutable message envelope and its metadata map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::matcher::{MStr, Topic};

/// Arbitrary string-keyed metadata carried alongside a payload.
///
/// A `BTreeMap` rather than a `HashMap` so serialized envelopes are
/// byte-stable for tests and for any transport that hashes or diffs them.
pub type Meta = BTreeMap<String, Value>;

/// An immutable published message.
///
/// Constructed once by [`crate::bus::PubSubBus::publish`] and never
/// mutated afterward; adapters and retained copies share the same
/// envelope by clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub topic: MStr<Topic>,
    /// Wall-clock milliseconds at publish time.
    pub ts: u64,
    pub schema_version: Option<String>,
    pub payload: Value,
    pub meta: Meta,
}

impl Envelope {
    pub(crate) fn new(topic: MStr<Topic>, ts: u64, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic,
            ts,
            schema_version: None,
            payload,
            meta: Meta::new(),
        }
    }

    /// Marks this envelope as rate-limited ("dropped, here's a stub").
    pub(crate) fn mark_rate_limited(mut self) -> Self {
        self.meta.insert("_rateLimited".to_string(), Value::Bool(true));
        self
    }

    /// Builds an envelope from already-validated parts.
    ///
    /// Used by adapters (cross-tab, history) that construct an envelope
    /// outside of `publish` — e.g. a cross-tab envelope accepted through
    /// the ingress pipeline and handed to
    /// [`crate::bus::PubSubBus::dispatch_external`]. Unlike `publish`,
    /// this performs no topic/rate/schema checks: the caller is
    /// responsible for having already validated `topic` and `id`.
    #[must_use]
    pub fn from_external(id: String, topic: MStr<Topic>, ts: u64, payload: Value, meta: Meta) -> Self {
        Self {
            id,
            topic,
            ts,
            schema_version: None,
            payload,
            meta,
        }
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.meta.get("_rateLimited"), Some(Value::Bool(true)))
    }

    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.meta.get("source").and_then(Value::as_str)
    }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.meta.get("correlationId").and_then(Value::as_str)
    }
}

impl Serialize for MStr<Topic> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MStr<Topic> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        MStr::<Topic>::topic(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_envelope_has_unique_id() {
        let topic = MStr::<Topic>::topic("a.b").unwrap();
        let a = Envelope::new(topic, 1, Value::Null);
        let b = Envelope::new(topic, 1, Value::Null);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_mark_rate_limited() {
        let topic = MStr::<Topic>::topic("a.b").unwrap();
        let env = Envelope::new(topic, 1, Value::Null).mark_rate_limited();
        assert!(env.is_rate_limited());
    }

    #[test]
    fn test_serde_roundtrip() {
        let topic = MStr::<Topic>::topic("cart.item.add").unwrap();
        let mut env = Envelope::new(topic, 42, serde_json::json!({"sku": "A"}));
        env.meta.insert("source".into(), Value::String("widget".into()));

        let encoded = serde_json::to_string(&env).unwrap();
        let decoded: Envelope = serde_json::from_str(&encoded).unwrap();
        assert_eq!(env, decoded);
    }
}
