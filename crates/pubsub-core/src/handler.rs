//! Subscriber handler infrastructure.
//!
//! The bus only ever carries one message type ([`crate::envelope::Envelope`]),
//! so unlike a multi-domain router there is no need for `dyn Any`-based
//! dispatch — every handler here is concretely `Handler<Envelope>`.

use std::{fmt::Debug, rc::Rc};

use ustr::Ustr;

use crate::envelope::Envelope;

/// A subscriber callback.
///
/// Handlers are uniquely identified by [`Handler::id`] within a pattern
/// bucket, mirroring spec §3's "handlers are uniquely identified by their
/// object identity within a pattern bucket" — here that identity is a
/// generated or caller-supplied id rather than a pointer, since closures
/// have no stable address to key on.
pub trait Handler: 'static {
    fn id(&self) -> Ustr;

    fn handle(&self, envelope: &Envelope);
}

impl<H: Handler + ?Sized> Handler for Rc<H> {
    fn id(&self) -> Ustr {
        (**self).id()
    }

    fn handle(&self, envelope: &Envelope) {
        (**self).handle(envelope);
    }
}

/// A reference-counted, cloneable handler.
///
/// `Rc`, not `Arc`: the bus is single-threaded cooperative (spec §5), so
/// there is no cross-thread sharing to pay atomic refcounting for.
#[derive(Clone)]
pub struct ShareableHandler(pub Rc<dyn Handler>);

impl ShareableHandler {
    #[must_use]
    pub fn new<H: Handler>(handler: H) -> Self {
        Self(Rc::new(handler))
    }

    #[must_use]
    pub fn id(&self) -> Ustr {
        self.0.id()
    }

    pub fn handle(&self, envelope: &Envelope) {
        self.0.handle(envelope);
    }
}

impl Debug for ShareableHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareableHandler")
            .field("id", &self.0.id())
            .finish()
    }
}

impl PartialEq for ShareableHandler {
    fn eq(&self, other: &Self) -> bool {
        self.0.id() == other.0.id()
    }
}

impl Eq for ShareableHandler {}

impl std::hash::Hash for ShareableHandler {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id().hash(state);
    }
}

/// Wraps a plain closure as a [`Handler`], generating a fresh id unless
/// one is supplied.
pub struct CallbackHandler<F> {
    id: Ustr,
    callback: F,
}

impl<F: Fn(&Envelope) + 'static> CallbackHandler<F> {
    pub fn new<S: AsRef<str>>(id: Option<S>, callback: F) -> Self {
        let id = id.map_or_else(
            || Ustr::from(uuid::Uuid::new_v4().to_string().as_str()),
            |s| Ustr::from(s.as_ref()),
        );
        Self { id, callback }
    }
}

impl<F: Fn(&Envelope) + 'static> Handler for CallbackHandler<F> {
    fn id(&self) -> Ustr {
        self.id
    }

    fn handle(&self, envelope: &Envelope) {
        (self.callback)(envelope);
    }
}

impl ShareableHandler {
    /// Wraps a plain closure, generating a fresh id.
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn(&Envelope) + 'static,
    {
        Self::new(CallbackHandler::new(None::<&str>, callback))
    }

    /// Wraps a plain closure with a caller-supplied stable id.
    pub fn from_fn_with_id<S: AsRef<str>, F>(id: S, callback: F) -> Self
    where
        F: Fn(&Envelope) + 'static,
    {
        Self::new(CallbackHandler::new(Some(id), callback))
    }
}
