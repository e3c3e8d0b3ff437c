//! The indexed, in-process history store.
//!
//! A keyed collection of [`HistoryRecord`]s with two compound indexes —
//! `(namespace, timestamp)` for range scans and counts, `(namespace,
//! topic)` for narrowing wildcard-free queries — backed by
//! `Rc<RefCell<_>>` rather than a lock: every access happens
//! synchronously from within the single-threaded cooperative scheduler
//! the rest of this workspace assumes, so there is no concurrent writer
//! to guard against.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeSet,
    rc::Rc,
};

use ahash::AHashMap;
use pubsub_core::matcher::CompiledMatcher;

use crate::{
    error::HistoryError,
    record::{HistoryRecord, QueryOptions},
};

/// Store lifecycle, spec §4.8: `new → opening → open ↔ closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreState {
    New,
    Opening,
    Open,
    Closed,
}

/// Shared, namespaced history store.
///
/// One `HistoryStore` instance models one `dbName`; namespaces within it
/// are isolated entirely by index keying, never by separate storage.
pub struct HistoryStore {
    state: Cell<StoreState>,
    records: RefCell<AHashMap<String, HistoryRecord>>,
    /// namespace → (timestamp, id) → () : ordered for range scans.
    by_namespace_timestamp: RefCell<AHashMap<String, BTreeSet<(u64, String)>>>,
    /// namespace → topic → (timestamp, id) : narrows exact-topic queries
    /// without a full namespace scan.
    by_namespace_topic: RefCell<AHashMap<String, AHashMap<String, BTreeSet<(u64, String)>>>>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Cell::new(StoreState::New),
            records: RefCell::new(AHashMap::new()),
            by_namespace_timestamp: RefCell::new(AHashMap::new()),
            by_namespace_topic: RefCell::new(AHashMap::new()),
        }
    }

    /// Idempotent open: a no-op if already [`StoreState::Open`].
    pub fn open(&self) {
        if self.state.get() != StoreState::Open {
            self.state.set(StoreState::Opening);
            self.state.set(StoreState::Open);
        }
    }

    /// Releases the store. Any later operation re-enters `opening` and
    /// reopens rather than erroring, matching spec §4.8's "the adapter
    /// reopens the store on demand for read access" after `detach`.
    pub fn close(&self) {
        self.state.set(StoreState::Closed);
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.get() == StoreState::Open
    }

    fn ensure_open(&self) {
        if self.state.get() != StoreState::Open {
            self.open();
        }
    }

    /// Inserts `record`. Idempotent by `id`: returns `Ok(true)` on
    /// insert, `Ok(false)` on duplicate (no overwrite), matching spec
    /// §4.8's "duplicate writes are silent no-ops."
    pub fn put(&self, record: HistoryRecord) -> Result<bool, HistoryError> {
        self.ensure_open();
        let mut records = self.records.borrow_mut();
        if records.contains_key(&record.id) {
            return Ok(false);
        }

        self.by_namespace_timestamp
            .borrow_mut()
            .entry(record.namespace.clone())
            .or_default()
            .insert((record.timestamp, record.id.clone()));

        self.by_namespace_topic
            .borrow_mut()
            .entry(record.namespace.clone())
            .or_default()
            .entry(record.topic.clone())
            .or_default()
            .insert((record.timestamp, record.id.clone()));

        records.insert(record.id.clone(), record);
        Ok(true)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<HistoryRecord> {
        self.ensure_open();
        self.records.borrow().get(id).cloned()
    }

    /// Index count for `namespace` — no full scan.
    #[must_use]
    pub fn count(&self, namespace: &str) -> usize {
        self.by_namespace_timestamp
            .borrow()
            .get(namespace)
            .map_or(0, BTreeSet::len)
    }

    /// Opens a cursor on `(namespace, timestamp)` with lower bound
    /// `(namespace, opts.from_time ?? 0)`, applies the compiled matcher
    /// to each candidate's topic, then — if `limit` is set — returns the
    /// last `limit` matches in ascending timestamp order.
    ///
    /// A wildcard-free pattern narrows via the `(namespace, topic)`
    /// index instead of scanning every record in the namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` fails to compile.
    pub fn query(
        &self,
        namespace: &str,
        pattern: &str,
        opts: QueryOptions,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        self.ensure_open();
        let matcher = CompiledMatcher::compile(pattern)?;
        let from = opts.from_time.unwrap_or(0);

        let mut matched: Vec<HistoryRecord> = if matcher.has_wildcards {
            let records = self.records.borrow();
            self.by_namespace_timestamp
                .borrow()
                .get(namespace)
                .into_iter()
                .flat_map(|ids| ids.range((from, String::new())..))
                .filter_map(|(_, id)| records.get(id))
                .filter(|r| matcher.matches(&r.topic))
                .cloned()
                .collect()
        } else {
            let records = self.records.borrow();
            self.by_namespace_topic
                .borrow()
                .get(namespace)
                .and_then(|by_topic| by_topic.get(pattern))
                .into_iter()
                .flat_map(|ids| ids.range((from, String::new())..))
                .filter_map(|(_, id)| records.get(id))
                .cloned()
                .collect()
        };

        matched.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        if let Some(limit) = opts.limit {
            if matched.len() > limit {
                let drop = matched.len() - limit;
                matched.drain(..drop);
            }
        }

        Ok(matched)
    }

    /// Records with `timestamp < before` in `namespace`, ascending.
    #[must_use]
    pub fn get_expired(&self, namespace: &str, before: u64) -> Vec<HistoryRecord> {
        let records = self.records.borrow();
        self.by_namespace_timestamp
            .borrow()
            .get(namespace)
            .into_iter()
            .flat_map(|ids| ids.range(..(before, String::new())))
            .filter_map(|(_, id)| records.get(id))
            .cloned()
            .collect()
    }

    /// The first `n` records in `namespace` by ascending timestamp.
    /// `n = usize::MAX` returns every record, the building block for
    /// [`Self::clear_namespace`].
    #[must_use]
    pub fn get_oldest(&self, namespace: &str, n: usize) -> Vec<HistoryRecord> {
        let records = self.records.borrow();
        self.by_namespace_timestamp
            .borrow()
            .get(namespace)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .take(n)
            .filter_map(|(_, id)| records.get(id))
            .cloned()
            .collect()
    }

    /// Deletes every id in `ids` from the primary map and both indexes.
    pub fn delete_many(&self, ids: &[String]) {
        let mut records = self.records.borrow_mut();
        let mut by_ts = self.by_namespace_timestamp.borrow_mut();
        let mut by_topic = self.by_namespace_topic.borrow_mut();

        for id in ids {
            let Some(record) = records.remove(id) else {
                continue;
            };
            if let Some(set) = by_ts.get_mut(&record.namespace) {
                set.remove(&(record.timestamp, record.id.clone()));
            }
            if let Some(by_topic_ns) = by_topic.get_mut(&record.namespace) {
                if let Some(set) = by_topic_ns.get_mut(&record.topic) {
                    set.remove(&(record.timestamp, record.id.clone()));
                }
            }
        }
    }

    /// `getOldest(namespace, ∞)` followed by `deleteMany`.
    pub fn clear_namespace(&self, namespace: &str) {
        let ids: Vec<String> = self
            .get_oldest(namespace, usize::MAX)
            .into_iter()
            .map(|r| r.id)
            .collect();
        self.delete_many(&ids);
    }
}

thread_local! {
    static STORE_REGISTRY: RefCell<AHashMap<String, Rc<HistoryStore>>> = RefCell::new(AHashMap::new());
}

/// Looks up (creating if absent) the shared store for `db_name`.
///
/// Mirrors [`pubsub_core::schema::global_registry`]'s process-wide
/// `OnceLock<Mutex<_>>` pattern, adapted to `thread_local!`: a `Mutex`
/// guarding `Rc<HistoryStore>` could never be `Sync` (`Rc` isn't `Send`),
/// and this workspace has no real concurrent access to guard against
/// anyway — every store mutation already happens from the single
/// cooperative scheduler thread. Two [`crate::adapter::HistoryAdapter`]
/// instances attached with the same `db_name` share one store, which is
/// how a later adapter reads records an earlier, now-detached adapter
/// persisted under the same namespace.
#[must_use]
pub fn open_named_store(db_name: &str) -> Rc<HistoryStore> {
    STORE_REGISTRY.with(|registry| {
        registry
            .borrow_mut()
            .entry(db_name.to_string())
            .or_insert_with(|| Rc::new(HistoryStore::new()))
            .clone()
    })
}
