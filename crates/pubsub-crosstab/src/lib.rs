//! Cross-tab adapter for [`pubsub_core`]: mirrors locally published
//! messages out over a [`Transport`] and injects validated inbound
//! messages back into the local bus.
//!
//! # Architecture
//!
//! [`CrossTabAdapter::attach`] hooks two listeners: one on the bus's own
//! `on_publish` (egress — local publishes get serialized, batched, and
//! sent), one on the transport's `on_message` (ingress — inbound wire
//! envelopes run through a seven-stage validation chain before being
//! handed to the bus's `dispatch_external`, which bypasses retention
//! and publish-listener fanout to prevent a resend loop).
//!
//! Ingress validates, in order: structural well-formedness, origin,
//! encoded size, echo suppression (same `client_id`), de-duplication
//! (an LRU of recently seen `(client_id, message_id)` pairs), then a
//! token-bucket rate limit. Only a message that survives all seven
//! stages reaches the local bus.
//!
//! [`transport`] ships two concrete [`Transport`] implementations —
//! [`transport::BroadcastTransport`] (fan-out to every tap) and
//! [`transport::LoopbackTransport`] (a direct pair) — plus
//! [`transport::TransportSelector`] for picking the first available
//! candidate from a priority-ordered list. Neither drives delivery from
//! a background task: callers pump them (directly, or implicitly via
//! [`CrossTabAdapter::poll`]) from their own event loop tick, matching
//! the bus's cooperative scheduling model.
//!
//! # Example
//!
//! ```
//! use pubsub_core::{BusConfig, PubSubBus};
//! use pubsub_crosstab::{CrossTabAdapter, CrossTabConfig};
//! use pubsub_crosstab::transport::LoopbackTransport;
//!
//! let (transport_a, transport_b) = LoopbackTransport::pair();
//! let bus_a = PubSubBus::new(BusConfig::default());
//! let bus_b = PubSubBus::new(BusConfig::default());
//!
//! let config = |id: &str| CrossTabConfig {
//!     client_id: Some(id.to_string()),
//!     expected_origin: "app://local".to_string(),
//!     batch_interval_ms: 0,
//!     ..CrossTabConfig::default()
//! };
//!
//! let _adapter_a = CrossTabAdapter::attach(bus_a.clone(), Box::new(transport_a), config("a")).unwrap();
//! let adapter_b = CrossTabAdapter::attach(bus_b.clone(), Box::new(transport_b), config("b")).unwrap();
//!
//! let received = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
//! let sink = received.clone();
//! bus_b.subscribe("cart.#", move |e| sink.borrow_mut().push(e.topic.to_string()), Default::default()).unwrap();
//!
//! bus_a.publish("cart.item.add", serde_json::json!({"sku": "A"}), Default::default()).unwrap();
//! bus_a.run_scheduled();
//! adapter_b.poll(1);
//! bus_b.run_scheduled();
//!
//! assert_eq!(received.borrow().as_slice(), ["cart.item.add"]);
//! ```

pub mod adapter;
pub mod batcher;
pub mod config;
pub mod dedup;
pub mod envelope;
pub mod error;
pub mod leadership;
pub mod stats;
pub mod transport;

pub use adapter::{CrossTabAdapter, META_CROSS_TAB, META_SOURCE_CLIENT_ID};
pub use batcher::MessageBatcher;
pub use config::{CrossTabConfig, CrossTabRateLimit};
pub use dedup::DedupCache;
pub use envelope::CrossTabEnvelope;
pub use error::{CrossTabError, ErrorSink, NoopErrorSink};
pub use leadership::{LeadershipDetector, Visibility};
pub use stats::CrossTabStats;
pub use transport::Transport;
