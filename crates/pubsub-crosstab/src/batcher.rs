//! Time- and size-triggered outbound batching.

use crate::envelope::CrossTabEnvelope;

/// Buffers outgoing envelopes, flushing when either `interval_ms` has
/// elapsed since the first buffered message or `max_size` is reached.
/// `interval_ms == 0` disables time-based batching: every `push` flushes
/// immediately.
pub struct MessageBatcher {
    interval_ms: u64,
    max_size: usize,
    buffer: Vec<CrossTabEnvelope>,
    first_buffered_at: Option<u64>,
}

impl MessageBatcher {
    #[must_use]
    pub fn new(interval_ms: u64, max_size: usize) -> Self {
        Self {
            interval_ms,
            max_size: max_size.max(1),
            buffer: Vec::new(),
            first_buffered_at: None,
        }
    }

    /// Buffers `envelope`. Returns `Some(batch)` if the push itself
    /// triggered a flush (batching disabled, or `max_size` reached).
    pub fn push(&mut self, envelope: CrossTabEnvelope, now_ms: u64) -> Option<Vec<CrossTabEnvelope>> {
        if self.interval_ms == 0 {
            return Some(vec![envelope]);
        }
        if self.buffer.is_empty() {
            self.first_buffered_at = Some(now_ms);
        }
        self.buffer.push(envelope);
        if self.buffer.len() >= self.max_size {
            return Some(self.flush());
        }
        None
    }

    /// Checks whether `interval_ms` has elapsed since the first buffered
    /// message and, if so, flushes. Callers drive this from their own
    /// event loop tick — there is no internal timer thread, matching the
    /// bus's cooperative, explicitly-pumped scheduling model.
    pub fn tick(&mut self, now_ms: u64) -> Option<Vec<CrossTabEnvelope>> {
        let started = self.first_buffered_at?;
        if now_ms.saturating_sub(started) >= self.interval_ms {
            return Some(self.flush());
        }
        None
    }

    /// Flushes whatever is buffered, regardless of triggers — used for
    /// the synchronous flush-once on adapter detach.
    pub fn flush(&mut self) -> Vec<CrossTabEnvelope> {
        self.first_buffered_at = None;
        std::mem::take(&mut self.buffer)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
