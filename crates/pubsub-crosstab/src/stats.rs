//! Observability counters for the cross-tab adapter.

/// Per-adapter counters, one field per spec §4.7 ingress stage plus
/// basic throughput counts. Cloned out of the adapter on demand (no live
/// handle), matching the reference `getStats()` snapshot contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrossTabStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_rejected: u64,
    pub origin_blocked: u64,
    pub messages_oversized: u64,
    pub messages_deduplicated: u64,
    pub messages_rate_limited: u64,
}
