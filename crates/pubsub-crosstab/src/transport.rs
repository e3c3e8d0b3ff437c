//! Pluggable transport abstraction and the two in-process implementations
//! this crate ships.
//!
//! DOM-bound transports (broadcast-channel, storage-event, SharedWorker,
//! MessageChannel) are named in spec §4.7 as externally replaceable and
//! the DOM itself is out of scope; this crate instead ships the two
//! transports that make sense as native Rust processes sharing no DOM.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use tokio::sync::{broadcast, mpsc};

use crate::{envelope::CrossTabEnvelope, error::CrossTabError};

pub type Listener = Rc<dyn Fn(CrossTabEnvelope)>;

/// Unsubscribes a listener registered via [`Transport::on_message`].
pub struct ListenerHandle {
    listeners: Rc<RefCell<Vec<(u64, Listener)>>>,
    id: u64,
}

impl ListenerHandle {
    pub fn unsubscribe(self) {
        self.listeners.borrow_mut().retain(|(id, _)| *id != self.id);
    }
}

/// Minimal transport contract: `send`, `on_message`, `close`,
/// `is_available`.
pub trait Transport {
    /// # Errors
    ///
    /// Returns an error if the transport is closed or the underlying
    /// channel has failed.
    fn send(&self, envelope: &CrossTabEnvelope) -> Result<(), CrossTabError>;

    fn on_message(&self, handler: Listener) -> ListenerHandle;

    fn close(&self);

    fn is_available(&self) -> bool;

    /// Sends a batch in one call where the transport supports it natively
    /// (e.g. a broker that accepts arrays). The default iterates, sending
    /// each envelope individually — correct for any transport, just not
    /// necessarily as cheap as a native batch send.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; envelopes already sent before
    /// the failing one are not retried or rolled back.
    fn send_batch(&self, envelopes: &[CrossTabEnvelope]) -> Result<(), CrossTabError> {
        for envelope in envelopes {
            self.send(envelope)?;
        }
        Ok(())
    }

    /// Drains any messages buffered for delivery and notifies listeners.
    /// A no-op by default; transports backed by an explicitly-pumped
    /// channel (this crate's [`BroadcastTransport`], [`LoopbackTransport`])
    /// override it. Adapters call this from their own poll tick — there
    /// is no background delivery thread, matching the bus's cooperative
    /// scheduling model.
    fn pump(&self) {}
}

struct ListenerRegistry {
    listeners: Rc<RefCell<Vec<(u64, Listener)>>>,
    next_id: Cell<u64>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self {
            listeners: Rc::new(RefCell::new(Vec::new())),
            next_id: Cell::new(0),
        }
    }
}

impl ListenerRegistry {
    fn register(&self, handler: Listener) -> ListenerHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push((id, handler));
        ListenerHandle {
            listeners: self.listeners.clone(),
            id,
        }
    }

    fn notify(&self, envelope: &CrossTabEnvelope) {
        for (_, listener) in self.listeners.borrow().iter() {
            listener(envelope.clone());
        }
    }
}

/// An in-process, single-channel broadcast transport: every tap sees
/// every send, modeling a DOM `BroadcastChannel`'s fan-out semantics.
///
/// Delivery is pulled explicitly via [`BroadcastTransport::pump`] rather
/// than driven by a background task, keeping tests deterministic without
/// needing a multi-threaded runtime or `spawn_local`.
pub struct BroadcastTransport {
    sender: broadcast::Sender<CrossTabEnvelope>,
    receiver: RefCell<broadcast::Receiver<CrossTabEnvelope>>,
    registry: ListenerRegistry,
    closed: Cell<bool>,
}

impl BroadcastTransport {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            receiver: RefCell::new(receiver),
            registry: ListenerRegistry::default(),
            closed: Cell::new(false),
        }
    }

    /// A second tap on the same broadcast channel — models a second tab
    /// attaching to the same `BroadcastChannel` name.
    #[must_use]
    pub fn subscribe(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: RefCell::new(self.sender.subscribe()),
            registry: ListenerRegistry::default(),
            closed: Cell::new(false),
        }
    }

    /// Drains every message currently buffered for this tap, invoking
    /// registered listeners for each. A lagged receiver (overflowed
    /// ring buffer) skips forward rather than erroring.
    pub fn pump(&self) {
        loop {
            match self.receiver.borrow_mut().try_recv() {
                Ok(envelope) => self.registry.notify(&envelope),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }
}

impl Transport for BroadcastTransport {
    fn send(&self, envelope: &CrossTabEnvelope) -> Result<(), CrossTabError> {
        if self.closed.get() {
            return Err(CrossTabError::Closed);
        }
        // No active receivers is not an error: exactly as a real
        // BroadcastChannel send with no other tab listening.
        let _ = self.sender.send(envelope.clone());
        Ok(())
    }

    fn on_message(&self, handler: Listener) -> ListenerHandle {
        self.registry.register(handler)
    }

    fn close(&self) {
        self.closed.set(true);
    }

    fn is_available(&self) -> bool {
        !self.closed.get()
    }

    fn pump(&self) {
        self.pump();
    }
}

/// A direct, always-available in-process pair, used as the universal
/// fallback transport and as the adapter's own test harness.
pub struct LoopbackTransport {
    sender: mpsc::UnboundedSender<CrossTabEnvelope>,
    receiver: RefCell<mpsc::UnboundedReceiver<CrossTabEnvelope>>,
    registry: ListenerRegistry,
    closed: Cell<bool>,
}

impl LoopbackTransport {
    /// Creates a connected pair: messages sent on one side arrive on the
    /// other, and vice versa.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        let a = Self {
            sender: tx_b,
            receiver: RefCell::new(rx_a),
            registry: ListenerRegistry::default(),
            closed: Cell::new(false),
        };
        let b = Self {
            sender: tx_a,
            receiver: RefCell::new(rx_b),
            registry: ListenerRegistry::default(),
            closed: Cell::new(false),
        };
        (a, b)
    }

    /// Drains every message waiting on this side, invoking listeners.
    pub fn pump(&self) {
        while let Ok(envelope) = self.receiver.borrow_mut().try_recv() {
            self.registry.notify(&envelope);
        }
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, envelope: &CrossTabEnvelope) -> Result<(), CrossTabError> {
        if self.closed.get() {
            return Err(CrossTabError::Closed);
        }
        self.sender
            .send(envelope.clone())
            .map_err(|_| CrossTabError::Transport("peer dropped".to_string()))
    }

    fn on_message(&self, handler: Listener) -> ListenerHandle {
        self.registry.register(handler)
    }

    fn close(&self) {
        self.closed.set(true);
    }

    fn is_available(&self) -> bool {
        !self.closed.get()
    }

    fn pump(&self) {
        self.pump();
    }
}

/// Probes a priority-ordered list of candidate transports and returns
/// the first available one, invoking `on_fallback` for each skipped
/// preferred candidate.
pub struct TransportSelector {
    candidates: Vec<(String, Box<dyn Transport>)>,
}

impl TransportSelector {
    #[must_use]
    pub fn new(candidates: Vec<(String, Box<dyn Transport>)>) -> Self {
        Self { candidates }
    }

    /// # Errors
    ///
    /// Returns [`CrossTabError::NoTransportAvailable`] if every
    /// candidate reports unavailable.
    pub fn select(
        self,
        mut on_fallback: impl FnMut(&str, &str, &str),
    ) -> Result<(String, Box<dyn Transport>), CrossTabError> {
        let mut skipped: Option<String> = None;
        for (name, transport) in self.candidates {
            if transport.is_available() {
                if let Some(from) = &skipped {
                    on_fallback(from, &name, "preferred transport unavailable");
                }
                return Ok((name, transport));
            }
            skipped = Some(name);
        }
        Err(CrossTabError::NoTransportAvailable)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell as StdRefCell;

    use rstest::rstest;
    use serde_json::Value;

    use super::*;

    fn sample(id: &str) -> CrossTabEnvelope {
        CrossTabEnvelope {
            message_id: id.to_string(),
            client_id: "c1".to_string(),
            topic: "x.y".to_string(),
            payload: Value::Null,
            timestamp: 1,
            version: 1,
            origin: "https://app.example".to_string(),
            sequence: None,
            source: None,
            schema_version: None,
            meta: None,
        }
    }

    #[rstest]
    fn test_loopback_delivers_to_peer() {
        let (a, b) = LoopbackTransport::pair();
        let received = Rc::new(StdRefCell::new(Vec::new()));
        let sink = received.clone();
        b.on_message(Rc::new(move |e| sink.borrow_mut().push(e)));

        a.send(&sample("m1")).unwrap();
        b.pump();

        assert_eq!(received.borrow().len(), 1);
    }

    #[rstest]
    fn test_loopback_close_rejects_send() {
        let (a, _b) = LoopbackTransport::pair();
        a.close();
        assert!(a.send(&sample("m1")).is_err());
        assert!(!a.is_available());
    }

    #[rstest]
    fn test_broadcast_fans_out_to_every_tap() {
        let a = BroadcastTransport::new(16);
        let tap1 = a.subscribe();
        let tap2 = a.subscribe();

        let count1 = Rc::new(StdRefCell::new(0));
        let count2 = Rc::new(StdRefCell::new(0));
        let sink1 = count1.clone();
        let sink2 = count2.clone();
        tap1.on_message(Rc::new(move |_| *sink1.borrow_mut() += 1));
        tap2.on_message(Rc::new(move |_| *sink2.borrow_mut() += 1));

        a.send(&sample("m1")).unwrap();
        tap1.pump();
        tap2.pump();

        assert_eq!(*count1.borrow(), 1);
        assert_eq!(*count2.borrow(), 1);
    }

    #[rstest]
    fn test_selector_falls_back_when_preferred_unavailable() {
        let (loop_a, _loop_b) = LoopbackTransport::pair();
        loop_a.close();
        let fallback = LoopbackTransport::pair().0;

        let selector = TransportSelector::new(vec![
            ("preferred".to_string(), Box::new(loop_a) as Box<dyn Transport>),
            ("fallback".to_string(), Box::new(fallback) as Box<dyn Transport>),
        ]);

        let mut fallback_calls = Vec::new();
        let (chosen, _) = selector
            .select(|from, to, _reason| fallback_calls.push((from.to_string(), to.to_string())))
            .unwrap();

        assert_eq!(chosen, "fallback");
        assert_eq!(fallback_calls, [("preferred".to_string(), "fallback".to_string())]);
    }

    #[rstest]
    fn test_selector_errors_when_nothing_available() {
        let (loop_a, _loop_b) = LoopbackTransport::pair();
        loop_a.close();
        let selector =
            TransportSelector::new(vec![("only".to_string(), Box::new(loop_a) as Box<dyn Transport>)]);
        assert!(selector.select(|_, _, _| {}).is_err());
    }
}
