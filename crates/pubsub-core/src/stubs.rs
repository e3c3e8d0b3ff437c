//! Test-support handlers, available under `#[cfg(test)]` and the
//! `test-support` feature for use from dependent crates' own test suites
//! (the cross-tab and history adapters build their fixtures on these).

use std::{
    cell::RefCell,
    rc::Rc,
    sync::atomic::{AtomicBool, Ordering},
};

use ustr::Ustr;

use crate::{envelope::Envelope, handler::Handler};

/// A handler that records every envelope it receives, for assertions in
/// adapter/bus tests.
#[derive(Clone, Default)]
pub struct CollectorHandler {
    id: Ustr,
    received: Rc<RefCell<Vec<Envelope>>>,
}

impl CollectorHandler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Ustr::from(uuid::Uuid::new_v4().to_string().as_str()),
            received: Rc::new(RefCell::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn received(&self) -> Vec<Envelope> {
        self.received.borrow().clone()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.received.borrow().len()
    }
}

impl Handler for CollectorHandler {
    fn id(&self) -> Ustr {
        self.id
    }

    fn handle(&self, envelope: &Envelope) {
        self.received.borrow_mut().push(envelope.clone());
    }
}

/// A handler that only tracks whether it was ever called.
#[derive(Clone, Default)]
pub struct CallCheckHandler {
    id: Ustr,
    called: Rc<AtomicBool>,
}

impl CallCheckHandler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Ustr::from(uuid::Uuid::new_v4().to_string().as_str()),
            called: Rc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn was_called(&self) -> bool {
        self.called.load(Ordering::SeqCst)
    }
}

impl Handler for CallCheckHandler {
    fn id(&self) -> Ustr {
        self.id
    }

    fn handle(&self, _envelope: &Envelope) {
        self.called.store(true, Ordering::SeqCst);
    }
}

/// A handler that always panics, for exercising bulkhead isolation.
pub struct PanickingHandler {
    id: Ustr,
    message: &'static str,
}

impl PanickingHandler {
    #[must_use]
    pub fn new(message: &'static str) -> Self {
        Self {
            id: Ustr::from(uuid::Uuid::new_v4().to_string().as_str()),
            message,
        }
    }
}

impl Handler for PanickingHandler {
    fn id(&self) -> Ustr {
        self.id
    }

    fn handle(&self, _envelope: &Envelope) {
        panic!("{}", self.message);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::matcher::{MStr, Topic};

    #[test]
    fn test_collector_handler_records_envelopes() {
        let handler = CollectorHandler::new();
        let env = Envelope::new(MStr::<Topic>::topic("a").unwrap(), 1, Value::Null);
        handler.handle(&env);
        assert_eq!(handler.count(), 1);
        assert_eq!(handler.received()[0].id, env.id);
    }

    #[test]
    fn test_call_check_handler() {
        let handler = CallCheckHandler::new();
        assert!(!handler.was_called());
        let env = Envelope::new(MStr::<Topic>::topic("a").unwrap(), 1, Value::Null);
        handler.handle(&env);
        assert!(handler.was_called());
    }
}
