//! Bounded, insertion-ordered caches used internally by the bus.

pub mod fifo;

pub use fifo::{FifoCache, FifoCacheMap};
