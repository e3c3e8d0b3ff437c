//! In-process publish/subscribe bus for composite browser applications.
//!
//! # Architecture
//!
//! The bus accepts messages on hierarchical, dot-separated topics and
//! matches them against subscriber patterns using MQTT-style wildcards
//! (`+` for one segment, `#` for the remaining segments). Dispatch is
//! single-threaded cooperative: handlers for a given publish all run on
//! one scheduled task, in matched order, each isolated from the others'
//! panics.
//!
//! Three pieces carry the bulk of the design:
//!
//! - [`matcher`] compiles patterns once and caches the compiled form.
//! - [`retention`] keeps a bounded ring of recent messages for replay.
//! - [`bus`] owns subscriptions, drives dispatch, and exposes the hook
//!   surface (`on_publish`, `dispatch_external`) that adapters build on.
//!
//! [`schema`] and [`ratelimit`] are optional policy layers the bus
//! consults during `publish`; neither affects topic matching semantics.
//!
//! # Example
//!
//! ```
//! use pubsub_core::{BusConfig, PubSubBus};
//!
//! let bus = PubSubBus::new(BusConfig::default());
//! let received = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
//! let sink = received.clone();
//! bus.subscribe("cart.#", move |envelope| {
//!     sink.borrow_mut().push(envelope.topic.to_string());
//! }, Default::default())
//! .unwrap();
//!
//! bus.publish("cart.item.add", serde_json::json!({"sku": "A"}), Default::default())
//!     .unwrap();
//! bus.run_scheduled();
//!
//! assert_eq!(received.borrow().as_slice(), ["cart.item.add"]);
//! ```

pub mod bus;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod matcher;
pub mod ratelimit;
pub mod retention;
pub mod schema;

#[cfg(any(test, feature = "test-support"))]
pub mod stubs;

pub use bus::{PubSubBus, Subscription, SubscriptionHandle};
pub use config::{
    BusConfig, MaxHandlersExceededAction, RateLimitConfig, RetentionConfig, ValidationMode,
};
pub use diagnostics::DiagnosticEvent;
#[cfg(feature = "tracing-bridge")]
pub use diagnostics::init_tracing;
pub use envelope::{Envelope, Meta};
pub use error::BusFault;
pub use handler::{CallbackHandler, Handler, ShareableHandler};
pub use matcher::{CompiledMatcher, MStr, Pattern, Topic};
pub use schema::{Schema, SchemaRegistry, ValidationError};
