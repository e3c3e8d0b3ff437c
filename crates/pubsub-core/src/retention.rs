//! Fixed-capacity retention ring buffer for recent-message replay.

use std::collections::VecDeque;

use crate::envelope::Envelope;

/// A circular buffer of the most recent `capacity` published envelopes.
///
/// Backed by a `VecDeque` rather than a raw array-with-head/tail-pointers
/// like the spec's reference description: the same invariants (O(1)
/// amortized push, insertion-order iteration, oldest-first eviction on
/// overflow) fall out of `VecDeque::push_back` + `pop_front` directly,
/// without hand-rolled pointer arithmetic.
#[derive(Debug)]
pub struct RetentionBuffer {
    capacity: usize,
    ttl_ms: Option<u64>,
    messages: VecDeque<Envelope>,
}

impl RetentionBuffer {
    /// Creates a buffer bounded at `capacity` messages.
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity` is zero.
    pub fn new(capacity: usize, ttl_ms: Option<u64>) -> anyhow::Result<Self> {
        anyhow::ensure!(capacity > 0, "retention capacity must be greater than 0");
        Ok(Self {
            capacity,
            ttl_ms,
            messages: VecDeque::with_capacity(capacity),
        })
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Pushes a new envelope, evicting the oldest if at capacity.
    pub fn push(&mut self, envelope: Envelope) {
        if self.messages.len() == self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(envelope);
    }

    /// Pops contiguous expired entries from the head only. Stops at the
    /// first live message — a single out-of-order live message preserves
    /// everything behind it, exactly as spec §4.2 requires.
    pub fn evict_expired(&mut self, now: u64) {
        let Some(ttl) = self.ttl_ms else {
            return;
        };
        while let Some(front) = self.messages.front() {
            if now.saturating_sub(front.ts) > ttl {
                self.messages.pop_front();
            } else {
                break;
            }
        }
    }

    /// Returns messages in insertion order, filtered by `since` (if
    /// given) and by TTL (if configured).
    #[must_use]
    pub fn get_messages(&self, now: u64, since: Option<u64>) -> Vec<Envelope> {
        self.messages
            .iter()
            .filter(|m| since.is_none_or(|s| m.ts >= s))
            .filter(|m| self.ttl_ms.is_none_or(|ttl| now.saturating_sub(m.ts) <= ttl))
            .cloned()
            .collect()
    }

    /// Returns the last `n` messages matching `predicate`, in ascending
    /// insertion order — used for replay-on-subscribe.
    #[must_use]
    pub fn last_matching(&self, n: usize, predicate: impl Fn(&Envelope) -> bool) -> Vec<Envelope> {
        let matched: Vec<&Envelope> = self.messages.iter().filter(|m| predicate(m)).collect();
        let start = matched.len().saturating_sub(n);
        matched[start..].iter().map(|&m| m.clone()).collect()
    }

    /// Resets the buffer to empty.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
