//! The cross-tab adapter: bridges a [`pubsub_core::bus::PubSubBus`] to a
//! [`Transport`], mirroring locally published messages out and injecting
//! validated inbound messages back in.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use pubsub_core::{
    bus::{PublishListenerHandle, PublishOptions, PubSubBus},
    envelope::{Envelope, Meta},
    matcher::{MStr, Topic},
    ratelimit::RateLimiter,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    batcher::MessageBatcher,
    config::CrossTabConfig,
    dedup::DedupCache,
    envelope::CrossTabEnvelope,
    error::CrossTabError,
    leadership::{LeadershipDetector, Visibility},
    stats::CrossTabStats,
    transport::{ListenerHandle, Transport},
};

/// `meta` key marking a dispatched envelope as sourced from another tab.
pub const META_CROSS_TAB: &str = "_crossTab";
/// `meta` key carrying the originating tab's client id.
pub const META_SOURCE_CLIENT_ID: &str = "_sourceClientId";

struct AdapterState {
    transport: Box<dyn Transport>,
    client_id: String,
    expected_origin: String,
    max_message_size: usize,
    dedup: DedupCache,
    rate_limiter: Option<RateLimiter>,
    batcher: MessageBatcher,
    stats: CrossTabStats,
    on_error: Box<dyn crate::error::ErrorSink>,
    publish_listener: Option<PublishListenerHandle>,
    transport_listener: Option<ListenerHandle>,
    leadership: Option<LeadershipDetector>,
    emit_system_events: bool,
    attached: bool,
}

/// Bridges one bus to one transport. Cheaply cloneable (`Rc<RefCell<_>>`
/// internally), matching [`PubSubBus`]'s own single-threaded cooperative
/// sharing model.
#[derive(Clone)]
pub struct CrossTabAdapter {
    bus: PubSubBus,
    state: Rc<RefCell<AdapterState>>,
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl CrossTabAdapter {
    /// Attaches `transport` to `bus`, wiring the egress publish-listener
    /// and the ingress transport listener. Returns an error if `bus` is
    /// already bound to a cross-tab adapter instance sharing this one's
    /// attachment flag — enforced by the caller only ever holding one
    /// live `CrossTabAdapter` per bus, since the bus itself has no
    /// concept of "a cross-tab adapter is attached."
    ///
    /// # Errors
    ///
    /// Returns [`CrossTabError::AlreadyAttached`] if called twice on the
    /// same `CrossTabAdapter` value without an intervening `detach`.
    pub fn attach(
        bus: PubSubBus,
        transport: Box<dyn Transport>,
        config: CrossTabConfig,
    ) -> Result<Self, CrossTabError> {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let rate_limiter = config
            .rate_limit
            .map(|r| RateLimiter::new(r.max_per_second, r.max_burst));

        let state = Rc::new(RefCell::new(AdapterState {
            transport,
            client_id: client_id.clone(),
            expected_origin: config.expected_origin.clone(),
            max_message_size: config.max_message_size,
            dedup: DedupCache::new(config.dedupe_cache_size, config.dedupe_window_ms),
            rate_limiter,
            batcher: MessageBatcher::new(config.batch_interval_ms, config.max_batch_size),
            stats: CrossTabStats::default(),
            on_error: config.on_error,
            publish_listener: None,
            transport_listener: None,
            leadership: None,
            emit_system_events: config.emit_system_events,
            attached: true,
        }));

        let adapter = Self { bus, state };

        let weak_for_publish: Weak<RefCell<AdapterState>> = Rc::downgrade(&adapter.state);
        let bus_for_publish = adapter.bus.clone();
        let publish_listener = adapter.bus.on_publish(move |envelope: &Envelope| {
            if let Some(state) = weak_for_publish.upgrade() {
                CrossTabAdapter::handle_local_publish(&state, envelope);
            }
            let _ = &bus_for_publish;
        });

        let weak_for_transport: Weak<RefCell<AdapterState>> = Rc::downgrade(&adapter.state);
        let bus_for_transport = adapter.bus.clone();
        let transport_listener = {
            let state_ref = adapter.state.borrow();
            state_ref.transport.on_message(Rc::new(move |envelope: CrossTabEnvelope| {
                if let Some(state) = weak_for_transport.upgrade() {
                    CrossTabAdapter::handle_incoming(&state, &bus_for_transport, envelope, now_ms());
                }
            }))
        };

        {
            let mut state = adapter.state.borrow_mut();
            state.publish_listener = Some(publish_listener);
            state.transport_listener = Some(transport_listener);
        }

        if config.enable_leadership {
            let weak_for_leadership: Weak<RefCell<AdapterState>> = Rc::downgrade(&adapter.state);
            let bus_for_leadership = adapter.bus.clone();
            let emit_events = config.emit_system_events;
            let cid = client_id.clone();
            let detector = LeadershipDetector::new(Visibility::Visible, move |is_leader| {
                if !emit_events {
                    return;
                }
                if weak_for_leadership.upgrade().is_none() {
                    return;
                }
                let _ = bus_for_leadership.publish(
                    "system.tab.leader",
                    json!({"clientId": cid, "isLeader": is_leader}),
                    PublishOptions::default(),
                );
            });
            adapter.state.borrow_mut().leadership = Some(detector);
        }

        if config.emit_system_events {
            let is_leader = adapter
                .state
                .borrow()
                .leadership
                .as_ref()
                .is_none_or(LeadershipDetector::is_leader);
            let _ = adapter.bus.publish(
                "system.tab.initialized",
                json!({"clientId": client_id, "isLeader": is_leader}),
                PublishOptions::default(),
            );
        }

        Ok(adapter)
    }

    #[must_use]
    pub fn client_id(&self) -> String {
        self.state.borrow().client_id.clone()
    }

    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.state
            .borrow()
            .leadership
            .as_ref()
            .is_none_or(LeadershipDetector::is_leader)
    }

    /// Reports a visibility transition to the leadership detector, if
    /// enabled. A no-op otherwise.
    pub fn set_visibility(&self, visibility: Visibility) {
        if let Some(detector) = &self.state.borrow().leadership {
            detector.set_visibility(visibility);
        }
    }

    #[must_use]
    pub fn stats(&self) -> CrossTabStats {
        self.state.borrow().stats
    }

    /// Drives time-triggered batch flushing and drains the transport.
    /// Callers invoke this from their own event loop tick; there is no
    /// internal timer thread or background delivery task.
    pub fn poll(&self, now_ms: u64) {
        self.state.borrow().transport.pump();
        let batch = self.state.borrow_mut().batcher.tick(now_ms);
        if let Some(batch) = batch {
            Self::send_batch(&self.state, &batch);
        }
    }

    /// Detaches: flushes the batcher once synchronously, unhooks both
    /// listeners, stops leadership detection, and closes the transport.
    pub fn detach(&self) {
        let mut state = self.state.borrow_mut();
        if !state.attached {
            return;
        }
        state.attached = false;

        if let Some(handle) = state.publish_listener.take() {
            handle.unsubscribe();
        }
        if let Some(handle) = state.transport_listener.take() {
            handle.unsubscribe();
        }
        if let Some(leadership) = &state.leadership {
            leadership.stop();
        }

        let remaining = state.batcher.flush();
        if !remaining.is_empty() {
            if let Err(e) = state.transport.send_batch(&remaining) {
                state.stats.messages_rejected += remaining.len() as u64;
                e.emit_trace();
                state.on_error.on_error(e);
            } else {
                state.stats.messages_sent += remaining.len() as u64;
            }
        }

        state.transport.close();
    }

    fn handle_local_publish(state: &Rc<RefCell<AdapterState>>, envelope: &Envelope) {
        let (client_id, origin, max_size) = {
            let s = state.borrow();
            (s.client_id.clone(), s.expected_origin.clone(), s.max_message_size)
        };

        let crosstab_envelope = CrossTabEnvelope {
            message_id: envelope.id.clone(),
            client_id,
            topic: envelope.topic.to_string(),
            payload: envelope.payload.clone(),
            timestamp: envelope.ts,
            version: crate::envelope::WIRE_VERSION,
            origin,
            sequence: None,
            source: envelope.source().map(str::to_string),
            schema_version: envelope.schema_version.clone(),
            meta: meta_to_map(&envelope.meta),
        };

        if crosstab_envelope.encoded_size() > max_size {
            state.borrow_mut().stats.messages_oversized += 1;
            return;
        }

        let batch = state.borrow_mut().batcher.push(crosstab_envelope, envelope.ts);
        if let Some(batch) = batch {
            Self::send_batch(state, &batch);
        }
    }

    fn send_batch(state: &Rc<RefCell<AdapterState>>, batch: &[CrossTabEnvelope]) {
        let mut s = state.borrow_mut();
        match s.transport.send_batch(batch) {
            Ok(()) => s.stats.messages_sent += batch.len() as u64,
            Err(e) => {
                s.stats.messages_rejected += batch.len() as u64;
                e.emit_trace();
                s.on_error.on_error(e);
            }
        }
    }

    /// The seven-stage ingress validation chain (spec §4.7), short-
    /// circuiting on the first failure.
    fn handle_incoming(
        state: &Rc<RefCell<AdapterState>>,
        bus: &PubSubBus,
        envelope: CrossTabEnvelope,
        now: u64,
    ) {
        let mut s = state.borrow_mut();

        // 1. Structural.
        if !envelope.is_structurally_valid() {
            s.stats.messages_rejected += 1;
            return;
        }

        // 2. Origin.
        if envelope.origin != s.expected_origin {
            s.stats.origin_blocked += 1;
            return;
        }

        // 3. Size.
        if envelope.encoded_size() > s.max_message_size {
            s.stats.messages_oversized += 1;
            return;
        }

        // 4. Echo suppression.
        if envelope.client_id == s.client_id {
            return;
        }

        // 5. Dedup.
        if s.dedup.check_and_mark(&envelope.dedup_key(), now) {
            s.stats.messages_deduplicated += 1;
            return;
        }

        // 6. Rate.
        if let Some(limiter) = s.rate_limiter.as_mut() {
            if !limiter.try_consume() {
                s.stats.messages_rate_limited += 1;
                return;
            }
        }

        // 7. Accept.
        s.stats.messages_received += 1;
        drop(s);

        let Ok(topic) = MStr::<Topic>::topic(&envelope.topic) else {
            state.borrow_mut().stats.messages_rejected += 1;
            return;
        };

        let mut meta: Meta = map_to_meta(envelope.meta);
        meta.insert(META_CROSS_TAB.to_string(), Value::Bool(true));
        meta.insert(META_SOURCE_CLIENT_ID.to_string(), Value::String(envelope.client_id.clone()));
        if let Some(source) = envelope.source {
            meta.insert("source".to_string(), Value::String(source));
        }

        let message = Envelope::from_external(envelope.message_id, topic, envelope.timestamp, envelope.payload, meta);
        bus.dispatch_external(message);
    }
}

fn meta_to_map(meta: &Meta) -> Option<serde_json::Map<String, Value>> {
    if meta.is_empty() {
        None
    } else {
        Some(meta.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

fn map_to_meta(map: Option<serde_json::Map<String, Value>>) -> Meta {
    map.map(|m| m.into_iter().collect()).unwrap_or_default()
}
