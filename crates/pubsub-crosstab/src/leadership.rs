//! Leadership detection: the visible tab is the leader.
//!
//! The DOM's `document.visibilitychange` event is the source signal in
//! the reference browser environment; this crate has no DOM; instead the
//! host reports visibility transitions explicitly via
//! [`LeadershipDetector::set_visibility`] (a CLI/server host might wire
//! this to window focus, an iframe activation message, or simply always
//! report `Visible` for a single-tab process).

use std::{cell::Cell, rc::Rc};

/// Tab visibility, mirroring the DOM `VisibilityState` the reference
/// detector watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Tracks whether this adapter's tab is the current leader (the visible
/// tab) and notifies a callback on change.
pub struct LeadershipDetector {
    is_leader: Cell<bool>,
    stopped: Cell<bool>,
    on_change: Rc<dyn Fn(bool)>,
}

impl LeadershipDetector {
    /// Creates a detector starting in the given visibility state;
    /// `on_change` fires once immediately with the initial state, then
    /// again on every subsequent transition until [`Self::stop`].
    pub fn new(initial: Visibility, on_change: impl Fn(bool) + 'static) -> Self {
        let is_leader = initial == Visibility::Visible;
        let on_change: Rc<dyn Fn(bool)> = Rc::new(on_change);
        on_change(is_leader);
        Self {
            is_leader: Cell::new(is_leader),
            stopped: Cell::new(false),
            on_change,
        }
    }

    /// Reports a visibility transition. A no-op once [`Self::stop`] has
    /// been called, and a no-op if the visibility state is unchanged.
    pub fn set_visibility(&self, visibility: Visibility) {
        if self.stopped.get() {
            return;
        }
        let leader = visibility == Visibility::Visible;
        if leader == self.is_leader.get() {
            return;
        }
        self.is_leader.set(leader);
        (self.on_change)(leader);
    }

    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.is_leader.get()
    }

    /// Stops the detector: further [`Self::set_visibility`] calls are
    /// ignored. Called on adapter detach.
    pub fn stop(&self) {
        self.stopped.set(true);
    }
}
