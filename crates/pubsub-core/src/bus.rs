//! The bus: subscription registry, dispatch loop, and adapter hook surface.

use std::{
    cell::{Cell, RefCell},
    collections::{HashSet, VecDeque},
    panic::AssertUnwindSafe,
    rc::{Rc, Weak},
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use indexmap::IndexMap;
use serde_json::Value;
use ustr::Ustr;

use crate::{
    config::{BusConfig, MaxHandlersExceededAction, ValidationMode},
    diagnostics::DiagnosticEvent,
    envelope::{Envelope, Meta},
    handler::ShareableHandler,
    matcher::{CompiledMatcher, MStr, MatcherCache, Pattern, Topic},
    ratelimit::RateLimiter,
    retention::RetentionBuffer,
    schema::SchemaError,
};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// An external cancellation signal. Triggering it detaches the
/// subscription it was registered with; an already-scheduled dispatch
/// still delivers the in-flight message.
#[derive(Clone, Default)]
pub struct CancellationSignal(Rc<Cell<bool>>);

impl CancellationSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

/// Include/exclude filter over an envelope's `meta.source`. Exclude
/// takes precedence over include when both match.
#[derive(Clone, Debug, Default)]
pub struct SourceFilter {
    pub include: Option<HashSet<String>>,
    pub exclude: Option<HashSet<String>>,
}

impl SourceFilter {
    fn matches(&self, source: Option<&str>) -> bool {
        if let Some(exclude) = &self.exclude {
            if let Some(s) = source {
                if exclude.contains(s) {
                    return false;
                }
            }
        }
        if let Some(include) = &self.include {
            return source.is_some_and(|s| include.contains(s));
        }
        true
    }
}

/// Options accepted by [`PubSubBus::subscribe`].
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// Request up to N matching retained messages be replayed
    /// synchronously to this handler alone, before `subscribe` returns.
    pub replay: usize,
    /// Higher priority runs first within a pattern bucket; ties keep
    /// insertion order.
    pub priority: u8,
    pub source_filter: SourceFilter,
    pub signal: Option<CancellationSignal>,
}

/// Options accepted by [`PubSubBus::publish`].
#[derive(Clone, Default)]
pub struct PublishOptions {
    pub schema_version: Option<String>,
    pub meta: Meta,
    pub source: Option<String>,
    pub correlation_id: Option<String>,
}

/// One registered `(pattern, handler)` pair.
#[derive(Clone)]
pub struct Subscription {
    pattern: MStr<Pattern>,
    compiled: CompiledMatcher,
    handler: ShareableHandler,
    priority: u8,
    source_filter: SourceFilter,
    signal: Option<CancellationSignal>,
}

impl Subscription {
    fn is_cancelled(&self) -> bool {
        self.signal.as_ref().is_some_and(CancellationSignal::is_cancelled)
    }
}

/// A handle returned by `subscribe`; dropping it does *not* unsubscribe
/// (unlike an RAII guard) — call [`SubscriptionHandle::unsubscribe`]
/// explicitly, mirroring the reference `unsubscribe()` callable.
pub struct SubscriptionHandle {
    bus: Weak<RefCell<BusInner>>,
    pattern: MStr<Pattern>,
    handler_id: Ustr,
}

impl SubscriptionHandle {
    /// A handle that does nothing on unsubscribe — returned in `warn`
    /// mode when the handler limit was reached and no subscription was
    /// actually registered.
    fn noop() -> Self {
        Self {
            bus: Weak::new(),
            pattern: MStr::<Pattern>::pattern(""),
            handler_id: Ustr::from(""),
        }
    }

    pub fn unsubscribe(self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        inner.borrow_mut().unsubscribe(self.pattern, self.handler_id);
    }
}

struct PublishListener {
    id: u64,
    callback: Rc<dyn Fn(&Envelope)>,
}

/// Unsubscribe handle for [`PubSubBus::on_publish`].
pub struct PublishListenerHandle {
    bus: Weak<RefCell<BusInner>>,
    id: u64,
}

impl PublishListenerHandle {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.borrow_mut().publish_listeners.retain(|l| l.id != self.id);
        }
    }
}

struct BusInner {
    config: BusConfig,
    topics: IndexMap<MStr<Pattern>, Vec<Subscription>>,
    matcher_cache: MatcherCache,
    retention: Option<RetentionBuffer>,
    schema_registry: crate::schema::SchemaRegistry,
    rate_limiter: Option<RateLimiter>,
    publish_listeners: Vec<PublishListener>,
    next_listener_id: u64,
    pending_dispatch: VecDeque<(Vec<Subscription>, Envelope)>,
    disposed: bool,
}

impl BusInner {
    /// Mirrors `event` to `tracing` (when the `tracing-bridge` feature is
    /// on) and forwards it to the configured `on_diagnostic` sink, so the
    /// two channels never drift apart.
    fn report_diagnostic(&self, event: DiagnosticEvent) {
        event.emit_trace();
        self.config.on_diagnostic.on_diagnostic(event);
    }

    fn unsubscribe(&mut self, pattern: MStr<Pattern>, handler_id: Ustr) {
        let Some(bucket) = self.topics.get_mut(&pattern) else {
            return;
        };
        let before = bucket.len();
        bucket.retain(|s| s.handler.id() != handler_id);
        let changed = bucket.len() != before;
        let now_empty = bucket.is_empty();

        if now_empty {
            self.topics.shift_remove(&pattern);
        }

        if changed || now_empty {
            let handler_count = self.topics.get(&pattern).map_or(0, Vec::len);
            self.report_diagnostic(DiagnosticEvent::Unsubscribe {
                pattern: pattern.to_string(),
                handler_count,
            });
        }
    }

    /// Returns every live (non-cancelled) subscription whose pattern
    /// matches `topic`, in pattern-registration order, each bucket
    /// ordered by descending priority with insertion order as tiebreak.
    fn matching_subscriptions(&mut self, topic: &str, source: Option<&str>) -> Vec<Subscription> {
        let mut matched = Vec::new();
        for bucket in self.topics.values_mut() {
            bucket.retain(|s| !s.is_cancelled());
            for sub in bucket.iter() {
                if sub.compiled.matches(topic) && sub.source_filter.matches(source) {
                    matched.push(sub.clone());
                }
            }
        }
        matched
    }
}

/// The publish/subscribe bus.
///
/// Cheaply cloneable: internally an `Rc<RefCell<_>>`, matching the
/// bus's single-threaded cooperative scheduling model (spec §5) — no
/// locking is required because preemption cannot occur mid-statement.
#[derive(Clone)]
pub struct PubSubBus {
    inner: Rc<RefCell<BusInner>>,
}

impl PubSubBus {
    /// Constructs a bus. A `retention.max_messages` of `0` is treated as
    /// "retention disabled" rather than a panic, since this constructor
    /// is infallible; pass `None` explicitly to make that intent clear.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        let retention = config
            .retention
            .filter(|r| r.max_messages > 0)
            .map(|r| {
                RetentionBuffer::new(r.max_messages, r.ttl_ms)
                    .expect("max_messages already checked non-zero")
            });
        let rate_limiter = config
            .rate_limit
            .map(|r| RateLimiter::new(r.max_per_second, r.max_burst));

        Self {
            inner: Rc::new(RefCell::new(BusInner {
                config,
                topics: IndexMap::new(),
                matcher_cache: MatcherCache::new(),
                retention,
                schema_registry: crate::schema::SchemaRegistry::new(),
                rate_limiter,
                publish_listeners: Vec::new(),
                next_listener_id: 0,
                pending_dispatch: VecDeque::new(),
                disposed: false,
            })),
        }
    }

    /// Subscribes `handler` to messages matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern fails to compile, the bus is
    /// disposed, or the pattern's handler count is at
    /// `max_handlers_per_topic` and the bus is configured to throw.
    pub fn subscribe<F>(
        &self,
        pattern: &str,
        handler: F,
        opts: SubscribeOptions,
    ) -> anyhow::Result<SubscriptionHandle>
    where
        F: Fn(&Envelope) + 'static,
    {
        self.subscribe_handler(pattern, ShareableHandler::from_fn(handler), opts)
    }

    fn subscribe_handler(
        &self,
        pattern: &str,
        handler: ShareableHandler,
        opts: SubscribeOptions,
    ) -> anyhow::Result<SubscriptionHandle> {
        let mut inner = self.inner.borrow_mut();
        anyhow::ensure!(!inner.disposed, "cannot subscribe: bus is disposed");

        let pattern_m: MStr<Pattern> = pattern.into();
        let compiled: CompiledMatcher = inner.matcher_cache.get_or_compile(pattern_m)?;

        let existing = inner.topics.get(&pattern_m).map_or(0, Vec::len);
        if existing >= inner.config.max_handlers_per_topic {
            let limit = inner.config.max_handlers_per_topic;
            inner.report_diagnostic(DiagnosticEvent::LimitExceeded {
                pattern: pattern.to_string(),
                limit,
            });
            return match inner.config.on_max_handlers_exceeded {
                MaxHandlersExceededAction::Throw => {
                    anyhow::bail!("handler limit of {limit} exceeded for pattern '{pattern}'")
                }
                MaxHandlersExceededAction::Warn => Ok(SubscriptionHandle::noop()),
            };
        }

        let handler_id = handler.id();
        let sub = Subscription {
            pattern: pattern_m,
            compiled,
            handler,
            priority: opts.priority,
            source_filter: opts.source_filter,
            signal: opts.signal,
        };
        let bucket = inner.topics.entry(pattern_m).or_default();
        bucket.push(sub.clone());
        bucket.sort_by_key(|s| std::cmp::Reverse(s.priority));

        let handler_count = bucket.len();
        inner.report_diagnostic(DiagnosticEvent::Subscribe {
            pattern: pattern.to_string(),
            handler_count,
        });

        if opts.replay > 0 {
            if let Some(retention) = &inner.retention {
                let replay_msgs =
                    retention.last_matching(opts.replay, |m| sub.compiled.matches(m.topic.as_str()));
                drop(inner);
                for msg in replay_msgs {
                    sub.handler.handle(&msg);
                }
                return Ok(SubscriptionHandle {
                    bus: Rc::downgrade(&self.inner),
                    pattern: pattern_m,
                    handler_id,
                });
            }
        }

        Ok(SubscriptionHandle {
            bus: Rc::downgrade(&self.inner),
            pattern: pattern_m,
            handler_id,
        })
    }

    /// Publishes `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid (wildcard-containing or
    /// malformed) topic, a rate-limit exhaustion configured to throw, or
    /// a strict-mode schema validation failure.
    pub fn publish(
        &self,
        topic: &str,
        payload: Value,
        opts: PublishOptions,
    ) -> anyhow::Result<Envelope> {
        let start = Instant::now();
        let mut inner = self.inner.borrow_mut();
        anyhow::ensure!(!inner.disposed, "cannot publish: bus is disposed");

        let topic_m = match MStr::<Topic>::topic(topic) {
            Ok(t) => t,
            Err(e) => {
                inner.report_diagnostic(DiagnosticEvent::Warning {
                    message: format!("invalid publish topic '{topic}': {e}"),
                });
                anyhow::bail!(e);
            }
        };

        if let Some(limiter) = inner.rate_limiter.as_mut() {
            if !limiter.try_consume() {
                inner.report_diagnostic(DiagnosticEvent::RateLimited {
                    topic: topic.to_string(),
                });
                if inner.config.rate_limit.is_some_and(|r| r.throw_on_exceeded) {
                    anyhow::bail!("rate limit exceeded for topic '{topic}'");
                }
                let stub = Envelope::new(topic_m, now_ms(), payload).mark_rate_limited();
                return Ok(stub);
            }
        }

        if let Some(version) = &opts.schema_version {
            let result = inner.schema_registry.validate(version, &payload);
            match (&inner.config.validation_mode, result) {
                (ValidationMode::Off, _) => {}
                (ValidationMode::Warn, Ok(errors)) if !errors.is_empty() => {
                    inner.report_diagnostic(DiagnosticEvent::ValidationError {
                        topic: topic.to_string(),
                        schema_version: Some(version.clone()),
                        errors: errors.into_iter().map(|e| e.message).collect(),
                    });
                }
                (ValidationMode::Warn, Err(SchemaError::NotFound(_))) => {
                    inner.report_diagnostic(DiagnosticEvent::Warning {
                        message: format!("no schema registered for '{version}'"),
                    });
                }
                (ValidationMode::Strict, Ok(errors)) if !errors.is_empty() => {
                    let joined = errors
                        .iter()
                        .map(|e| format!("{}: {}", e.path, e.message))
                        .collect::<Vec<_>>()
                        .join("; ");
                    anyhow::bail!("schema validation failed for '{version}': {joined}");
                }
                (ValidationMode::Strict, Err(e)) => anyhow::bail!(e),
                _ => {}
            }
        }

        let mut envelope = Envelope::new(topic_m, now_ms(), payload);
        envelope.schema_version = opts.schema_version;
        envelope.meta = opts.meta;
        if let Some(source) = &opts.source {
            envelope.meta.insert("source".to_string(), Value::String(source.clone()));
        }
        if let Some(cid) = &opts.correlation_id {
            envelope.meta.insert("correlationId".to_string(), Value::String(cid.clone()));
        }

        if let Some(retention) = inner.retention.as_mut() {
            retention.push(envelope.clone());
        }

        let matched = inner.matching_subscriptions(topic_m.as_str(), opts.source.as_deref());

        let listeners: Vec<Rc<dyn Fn(&Envelope)>> =
            inner.publish_listeners.iter().map(|l| l.callback.clone()).collect();
        drop(inner);
        for listener in &listeners {
            listener(&envelope);
        }

        let mut inner = self.inner.borrow_mut();
        let matched_count = matched.len();
        inner.pending_dispatch.push_back((matched, envelope.clone()));

        inner.report_diagnostic(DiagnosticEvent::Publish {
            topic: topic.to_string(),
            matched_handlers: matched_count,
            duration: start.elapsed(),
        });

        Ok(envelope)
    }

    /// Injects an externally-sourced envelope directly into dispatch,
    /// bypassing retention and the publish-listener fanout — the
    /// adapter-facing entry point that prevents cross-tab echo loops.
    pub fn dispatch_external(&self, envelope: Envelope) {
        let mut inner = self.inner.borrow_mut();
        if inner.disposed {
            return;
        }
        let source = envelope.source().map(str::to_string);
        let matched = inner.matching_subscriptions(envelope.topic.as_str(), source.as_deref());
        inner.pending_dispatch.push_back((matched, envelope));
    }

    /// Drains and runs every pending dispatch task scheduled since the
    /// last call — the stand-in for the microtask boundary a cooperative
    /// single-threaded scheduler would use.
    pub fn run_scheduled(&self) {
        loop {
            let task = self.inner.borrow_mut().pending_dispatch.pop_front();
            let Some((matched, envelope)) = task else {
                break;
            };
            for sub in &matched {
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    sub.handler.handle(&envelope);
                }));
                if let Err(payload) = result {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "handler panicked".to_string());
                    self.inner.borrow().report_diagnostic(DiagnosticEvent::HandlerError {
                        topic: envelope.topic.to_string(),
                        pattern: sub.pattern.to_string(),
                        error: message,
                    });
                }
            }
        }
    }

    /// Registers a listener notified of every locally published message,
    /// after retention but before scheduled dispatch.
    pub fn on_publish<F>(&self, listener: F) -> PublishListenerHandle
    where
        F: Fn(&Envelope) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.publish_listeners.push(PublishListener {
            id,
            callback: Rc::new(listener),
        });
        PublishListenerHandle {
            bus: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Registers `schema` under `id` in this bus's per-instance registry.
    ///
    /// # Errors
    ///
    /// Propagates [`SchemaError`] from registration-time safety checks.
    pub fn register_schema(&self, id: &str, schema: crate::schema::Schema) -> Result<(), SchemaError> {
        self.inner.borrow_mut().schema_registry.register(id, schema)
    }

    /// Returns retained messages matching `pattern`. Empty if retention
    /// is not configured.
    #[must_use]
    pub fn get_history(&self, pattern: &str, from_time: Option<u64>, limit: Option<usize>) -> Vec<Envelope> {
        let mut inner = self.inner.borrow_mut();
        let Some(retention) = inner.retention.as_ref() else {
            return Vec::new();
        };
        let pattern_m: MStr<Pattern> = pattern.into();
        let Ok(compiled) = inner.matcher_cache.get_or_compile(pattern_m) else {
            return Vec::new();
        };
        let messages = retention.get_messages(now_ms(), from_time);
        let mut matched: Vec<Envelope> = messages
            .into_iter()
            .filter(|m| compiled.matches(m.topic.as_str()))
            .collect();
        if let Some(limit) = limit {
            let start = matched.len().saturating_sub(limit);
            matched = matched.split_off(start);
        }
        matched
    }

    /// Returns the number of registered handlers, either for one
    /// `pattern` or, if `None`, across every pattern.
    #[must_use]
    pub fn handler_count(&self, pattern: Option<&str>) -> usize {
        let inner = self.inner.borrow();
        match pattern {
            Some(p) => {
                let pattern_m: MStr<Pattern> = p.into();
                inner.topics.get(&pattern_m).map_or(0, Vec::len)
            }
            None => inner.topics.values().map(Vec::len).sum(),
        }
    }

    /// Removes every subscription without disposing the bus.
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.topics.clear();
        inner.pending_dispatch.clear();
    }

    /// Disposes the bus: clears subscriptions, retention, listeners, and
    /// rejects further mutating calls.
    pub fn dispose(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.disposed = true;
        inner.topics.clear();
        inner.publish_listeners.clear();
        inner.pending_dispatch.clear();
        if let Some(retention) = inner.retention.as_mut() {
            retention.clear();
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    #[must_use]
    pub fn matcher_cache_len(&self) -> usize {
        self.inner.borrow().matcher_cache.len()
    }
}
