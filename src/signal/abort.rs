//! Abort controller, abort signal, and abort reasons.
//!
//! This is the cancellation base the task signals build on: a signal
//! observes a single one-way transition into the aborted state, carrying a
//! reason that propagates verbatim into rejected task handles.
//!
//! Listener registration is once-fired: an abort listener runs at most one
//! time, when the controller aborts. Registering on an already-aborted
//! signal returns a dead listener id and never fires (callers are expected
//! to check [`AbortSignal::aborted`] first, as the dispatcher does).

use crate::tracing_compat::trace;
use smallvec::SmallVec;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// The value a signal was aborted with.
///
/// Reasons are cheap to clone and compare by payload identity: two reasons
/// are equal iff they originate from the same abort value. This is what
/// makes "the handle rejected with exactly the signal's reason" observable.
#[derive(Clone)]
pub struct AbortReason {
    payload: Rc<dyn Any>,
    description: Rc<str>,
}

impl AbortReason {
    /// Wraps an arbitrary displayable value as an abort reason.
    #[must_use]
    pub fn new<T: Any + fmt::Display>(value: T) -> Self {
        let description = Rc::from(value.to_string());
        Self {
            payload: Rc::new(value),
            description,
        }
    }

    /// Creates a reason from a plain message.
    #[must_use]
    pub fn message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let description = Rc::from(msg.as_str());
        Self {
            payload: Rc::new(msg),
            description,
        }
    }

    /// The default reason used when a controller aborts without one.
    #[must_use]
    pub fn abort_error() -> Self {
        Self::message("operation was aborted")
    }

    /// Returns the human-readable description of the reason.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Attempts to view the underlying payload as a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }
}

impl PartialEq for AbortReason {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.payload, &other.payload)
    }
}

impl Eq for AbortReason {}

impl fmt::Debug for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AbortReason").field(&self.description).finish()
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Identifies a registered abort listener for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbortListenerId(u64);

type AbortListener = Box<dyn FnOnce(&AbortReason)>;

struct AbortInner {
    reason: RefCell<Option<AbortReason>>,
    listeners: RefCell<SmallVec<[(AbortListenerId, AbortListener); 2]>>,
    next_listener_id: Cell<u64>,
}

impl AbortInner {
    fn new() -> Self {
        Self {
            reason: RefCell::new(None),
            listeners: RefCell::new(SmallVec::new()),
            next_listener_id: Cell::new(0),
        }
    }

    fn fresh_listener_id(&self) -> AbortListenerId {
        let id = self.next_listener_id.get();
        self.next_listener_id.set(id + 1);
        AbortListenerId(id)
    }

    fn abort(&self, reason: AbortReason) {
        {
            let mut slot = self.reason.borrow_mut();
            if slot.is_some() {
                trace!("duplicate abort ignored");
                return;
            }
            *slot = Some(reason.clone());
        }
        // Listeners are drained before dispatch so a listener may register,
        // remove, or abort again without observing a held borrow.
        let listeners = self.listeners.replace(SmallVec::new());
        trace!(listeners = listeners.len(), "signal aborted");
        for (_, listener) in listeners {
            listener(&reason);
        }
    }
}

/// Owns the abort state; hands out [`AbortSignal`]s and fires the abort.
pub struct AbortController {
    inner: Rc<AbortInner>,
}

impl AbortController {
    /// Creates a controller with a fresh, un-aborted signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(AbortInner::new()),
        }
    }

    /// Returns the controller's signal.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Aborts the signal with the default reason. Idempotent.
    pub fn abort(&self) {
        self.inner.abort(AbortReason::abort_error());
    }

    /// Aborts the signal with the given reason. Idempotent; a second abort
    /// keeps the first reason.
    pub fn abort_with(&self, reason: AbortReason) {
        self.inner.abort(reason);
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AbortController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortController")
            .field("aborted", &self.signal().aborted())
            .finish()
    }
}

/// The observable side of an [`AbortController`].
#[derive(Clone)]
pub struct AbortSignal {
    inner: Rc<AbortInner>,
}

impl AbortSignal {
    /// Returns true once the controller has aborted.
    #[must_use]
    pub fn aborted(&self) -> bool {
        self.inner.reason.borrow().is_some()
    }

    /// Returns the abort reason, once aborted.
    #[must_use]
    pub fn reason(&self) -> Option<AbortReason> {
        self.inner.reason.borrow().clone()
    }

    /// Registers a listener that fires once, on abort.
    ///
    /// If the signal is already aborted the listener is dropped without
    /// firing and a dead id is returned.
    pub fn on_abort(&self, listener: impl FnOnce(&AbortReason) + 'static) -> AbortListenerId {
        let id = self.inner.fresh_listener_id();
        if self.aborted() {
            return id;
        }
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Box::new(listener)));
        id
    }

    /// Removes a previously registered listener. Returns false if it already
    /// fired or was removed.
    pub fn remove_abort_listener(&self, id: AbortListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Returns true if both handles observe the same underlying signal.
    #[must_use]
    pub fn same_signal(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.aborted())
            .finish()
    }
}
