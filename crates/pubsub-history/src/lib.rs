//! History adapter for [`pubsub_core`]: persists every locally published
//! envelope into an indexed, namespaced store and serves range queries
//! back out of it.
//!
//! # Architecture
//!
//! [`HistoryAdapter::attach`] hooks the bus's `on_publish` listener and
//! writes every envelope it sees into a [`store::HistoryStore`] opened
//! (or shared, if already open) under the config's `db_name`. Records
//! are keyed by envelope id, so a redelivered publish with the same id
//! is a silent no-op rather than a duplicate entry.
//!
//! [`gc::GarbageCollector`] runs a hybrid sweep: a periodic full pass
//! driven by [`HistoryAdapter::poll`], plus an on-write check fired
//! from inside the `on_publish` hook once a namespace's count crosses
//! 90% of its configured cap. Both funnel into the same TTL-then-
//! overflow removal order.
//!
//! [`HistoryAdapter::detach`] only unhooks the publish listener — the
//! shared store stays open, so [`HistoryAdapter::get_history`] keeps
//! working after detach, and a later adapter attached under the same
//! `db_name` sees everything an earlier, now-detached one persisted.
//!
//! # Example
//!
//! ```
//! use pubsub_core::{BusConfig, PubSubBus};
//! use pubsub_history::{HistoryAdapter, HistoryConfig, QueryOptions};
//!
//! let bus = PubSubBus::new(BusConfig::default());
//! let config = HistoryConfig {
//!     db_name: "doctest-db".to_string(),
//!     namespace: "cart".to_string(),
//!     ..HistoryConfig::default()
//! };
//! let adapter = HistoryAdapter::attach(bus.clone(), config).unwrap();
//!
//! bus.publish("cart.item.add", serde_json::json!({"sku": "A"}), Default::default()).unwrap();
//! bus.publish("cart.item.remove", serde_json::json!({"sku": "A"}), Default::default()).unwrap();
//! bus.run_scheduled();
//!
//! let history = adapter.get_history("cart.#", QueryOptions::default()).unwrap();
//! assert_eq!(history.len(), 2);
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod gc;
pub mod record;
pub mod store;

pub use adapter::HistoryAdapter;
pub use config::HistoryConfig;
pub use error::{ErrorSink, HistoryError, NoopErrorSink};
pub use gc::{GarbageCollector, GcReport};
pub use record::{HistoryRecord, QueryOptions};
pub use store::{open_named_store, HistoryStore};
