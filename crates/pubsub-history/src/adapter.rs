//! The history adapter: bridges a [`PubSubBus`] to a [`HistoryStore`],
//! persisting every local publish and driving the hybrid GC.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use pubsub_core::{
    bus::{PublishListenerHandle, PubSubBus},
    envelope::Envelope,
};

use crate::{
    config::HistoryConfig,
    error::{ErrorSink, HistoryError},
    gc::{GarbageCollector, GcReport},
    record::{HistoryRecord, QueryOptions},
    store::{self, HistoryStore},
};

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

struct AdapterState {
    namespace: String,
    gc: GarbageCollector,
    gc_interval_ms: u64,
    last_gc_at: u64,
    duplicates_skipped: u64,
    on_error: Box<dyn ErrorSink>,
    publish_listener: Option<PublishListenerHandle>,
    attached: bool,
}

/// Bridges one bus to one namespace of a (possibly shared) history
/// store. Cheaply cloneable, matching [`PubSubBus`]'s own single-
/// threaded cooperative sharing model.
#[derive(Clone)]
pub struct HistoryAdapter {
    bus: PubSubBus,
    store: Rc<HistoryStore>,
    state: Rc<RefCell<AdapterState>>,
}

impl HistoryAdapter {
    /// Opens the named store (creating it on first use, sharing it with
    /// any other adapter already attached under the same `db_name`),
    /// registers an `onPublish` listener, and arms GC.
    ///
    /// # Errors
    ///
    /// Reserved for a future storage backend that can fail to open; this
    /// in-process backend never fails.
    pub fn attach(bus: PubSubBus, config: HistoryConfig) -> Result<Self, HistoryError> {
        let store = store::open_named_store(&config.db_name);
        store.open();

        let gc = GarbageCollector::new(
            store.clone(),
            config.namespace.clone(),
            config.max_messages,
            config.ttl_seconds,
        );

        let state = Rc::new(RefCell::new(AdapterState {
            namespace: config.namespace,
            gc,
            gc_interval_ms: config.gc_interval_ms,
            last_gc_at: now_ms(),
            duplicates_skipped: 0,
            on_error: config.on_error,
            publish_listener: None,
            attached: true,
        }));

        let adapter = Self { bus, store, state };

        let weak_state: Weak<RefCell<AdapterState>> = Rc::downgrade(&adapter.state);
        let store_for_publish = adapter.store.clone();
        let publish_listener = adapter.bus.on_publish(move |envelope: &Envelope| {
            if let Some(state) = weak_state.upgrade() {
                Self::handle_publish(&state, &store_for_publish, envelope);
            }
        });
        adapter.state.borrow_mut().publish_listener = Some(publish_listener);

        Ok(adapter)
    }

    fn handle_publish(state: &Rc<RefCell<AdapterState>>, store: &Rc<HistoryStore>, envelope: &Envelope) {
        let now = now_ms();
        let namespace = state.borrow().namespace.clone();
        let record = HistoryRecord::from_envelope(envelope.clone(), namespace, now);

        match store.put(record) {
            Ok(true) => {}
            Ok(false) => state.borrow_mut().duplicates_skipped += 1,
            Err(e) => {
                e.emit_trace();
                state.borrow().on_error.on_error(e);
            }
        }

        state.borrow().gc.check_on_write(now);
    }

    #[must_use]
    pub fn duplicates_skipped(&self) -> u64 {
        self.state.borrow().duplicates_skipped
    }

    /// Drives the periodic GC timer: runs a full cycle if
    /// `gc_interval_ms` has elapsed since the last one. Callers invoke
    /// this from their own event loop tick; there is no internal timer
    /// thread.
    pub fn poll(&self, now_ms: u64) -> Option<GcReport> {
        let mut s = self.state.borrow_mut();
        if now_ms.saturating_sub(s.last_gc_at) < s.gc_interval_ms {
            return None;
        }
        s.last_gc_at = now_ms;
        let gc_ref = &s.gc;
        let report = gc_ref.run_full_gc(now_ms);
        Some(report)
    }

    /// Forces an immediate full GC cycle regardless of the periodic timer.
    pub fn force_gc(&self, now_ms: u64) -> GcReport {
        self.state.borrow().gc.run_full_gc(now_ms)
    }

    /// Queries this adapter's namespace. Works even after [`Self::detach`]
    /// — the underlying store reopens on demand for read access (spec
    /// §4.8); only the live `onPublish` hook is torn down by `detach`.
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` fails to compile.
    pub fn get_history(&self, pattern: &str, opts: QueryOptions) -> Result<Vec<Envelope>, HistoryError> {
        let namespace = self.state.borrow().namespace.clone();
        let records = self.store.query(&namespace, pattern, opts)?;
        Ok(records.into_iter().map(|r| r.message).collect())
    }

    /// Unhooks the publish listener. The shared store itself is left
    /// open — other adapters (or a later re-`attach` under the same
    /// `db_name`) may still be using it.
    pub fn detach(&self) {
        let mut s = self.state.borrow_mut();
        if !s.attached {
            return;
        }
        s.attached = false;
        if let Some(handle) = s.publish_listener.take() {
            handle.unsubscribe();
        }
    }
}
