//! Priority-aware task controller and signal.
//!
//! A [`TaskSignal`] is an abort-capable signal augmented with a mutable
//! priority and a `prioritychange` event topic. Signals are only obtained
//! through a [`TaskController`]; the controller is the single writer of the
//! priority and owns the re-entrancy guard that rejects recursive
//! [`set_priority`](TaskController::set_priority) calls from inside a
//! `prioritychange` listener.

use crate::error::{Error, Result};
use crate::signal::abort::{AbortController, AbortListenerId, AbortReason, AbortSignal};
use crate::signal::event::PriorityChangeEvent;
use crate::tracing_compat::trace;
use crate::types::TaskPriority;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Identifies a registered `prioritychange` listener for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriorityListenerId(u64);

type PriorityListener = Rc<dyn Fn(&PriorityChangeEvent)>;

pub(crate) struct TaskSignalCore {
    priority: Cell<TaskPriority>,
    listeners: RefCell<SmallVec<[(PriorityListenerId, PriorityListener); 2]>>,
    on_priority_change: RefCell<Option<Box<dyn FnMut(&PriorityChangeEvent)>>>,
    next_listener_id: Cell<u64>,
}

impl TaskSignalCore {
    fn new(priority: TaskPriority) -> Self {
        Self {
            priority: Cell::new(priority),
            listeners: RefCell::new(SmallVec::new()),
            on_priority_change: RefCell::new(None),
            next_listener_id: Cell::new(0),
        }
    }

    pub(crate) fn priority(&self) -> TaskPriority {
        self.priority.get()
    }

    fn dispatch(&self, event: &PriorityChangeEvent) {
        // The slot handler is taken out for the call so it may replace
        // itself; a replacement installed during dispatch wins.
        let slot = self.on_priority_change.borrow_mut().take();
        if let Some(mut handler) = slot {
            handler(event);
            let mut current = self.on_priority_change.borrow_mut();
            if current.is_none() {
                *current = Some(handler);
            }
        }
        // Snapshot so listeners may register or remove during dispatch.
        let listeners: SmallVec<[PriorityListener; 2]> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

/// Creates task signals and mutates their priority; aborts like an
/// [`AbortController`].
pub struct TaskController {
    abort: AbortController,
    core: Rc<TaskSignalCore>,
    /// Re-entrancy guard: set while a `prioritychange` dispatch is running.
    priority_changing: Cell<bool>,
}

impl TaskController {
    /// Creates a controller whose signal starts at the default priority.
    #[must_use]
    pub fn new() -> Self {
        Self::with_priority(TaskPriority::default())
    }

    /// Creates a controller whose signal starts at `priority`.
    #[must_use]
    pub fn with_priority(priority: TaskPriority) -> Self {
        Self {
            abort: AbortController::new(),
            core: Rc::new(TaskSignalCore::new(priority)),
            priority_changing: Cell::new(false),
        }
    }

    /// Returns the controller's signal.
    #[must_use]
    pub fn signal(&self) -> TaskSignal {
        TaskSignal {
            abort: self.abort.signal(),
            core: Rc::clone(&self.core),
        }
    }

    /// Aborts the signal with the default reason. Idempotent.
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Aborts the signal with the given reason. Idempotent.
    pub fn abort_with(&self, reason: AbortReason) {
        self.abort.abort_with(reason);
    }

    /// Changes the signal's priority, notifying `prioritychange` listeners.
    ///
    /// A call with the current priority is a no-op and emits no event.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::PriorityChangeInProgress`] when called
    /// re-entrantly from inside a `prioritychange` listener.
    ///
    /// [`ErrorKind::PriorityChangeInProgress`]: crate::error::ErrorKind::PriorityChangeInProgress
    pub fn set_priority(&self, priority: TaskPriority) -> Result<()> {
        if self.priority_changing.get() {
            return Err(Error::priority_change_in_progress());
        }
        if self.core.priority() == priority {
            return Ok(());
        }

        let _guard = ChangingGuard::engage(&self.priority_changing);
        let previous = self.core.priority.replace(priority);
        trace!(previous = %previous, new = %priority, "signal priority changed");
        let event = PriorityChangeEvent::new(previous);
        self.core.dispatch(&event);
        Ok(())
    }
}

impl Default for TaskController {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskController")
            .field("priority", &self.core.priority())
            .finish()
    }
}

/// Resets the re-entrancy flag even if a listener panics.
struct ChangingGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> ChangingGuard<'a> {
    fn engage(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for ChangingGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// An abort-capable signal that also carries a read-only, dynamically
/// changing priority.
///
/// Obtained only through [`TaskController::signal`].
#[derive(Clone)]
pub struct TaskSignal {
    abort: AbortSignal,
    core: Rc<TaskSignalCore>,
}

impl TaskSignal {
    /// Returns the signal's current priority.
    #[must_use]
    pub fn priority(&self) -> TaskPriority {
        self.core.priority()
    }

    /// Returns true once the controller has aborted.
    #[must_use]
    pub fn aborted(&self) -> bool {
        self.abort.aborted()
    }

    /// Returns the abort reason, once aborted.
    #[must_use]
    pub fn reason(&self) -> Option<AbortReason> {
        self.abort.reason()
    }

    /// Registers a once-fired abort listener. See [`AbortSignal::on_abort`].
    pub fn on_abort(&self, listener: impl FnOnce(&AbortReason) + 'static) -> AbortListenerId {
        self.abort.on_abort(listener)
    }

    /// Removes a previously registered abort listener.
    pub fn remove_abort_listener(&self, id: AbortListenerId) -> bool {
        self.abort.remove_abort_listener(id)
    }

    /// Returns the underlying abort signal.
    #[must_use]
    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    /// Registers a `prioritychange` listener.
    pub fn on_priority_change(
        &self,
        listener: impl Fn(&PriorityChangeEvent) + 'static,
    ) -> PriorityListenerId {
        let id = PriorityListenerId(self.core.next_listener_id.get());
        self.core.next_listener_id.set(id.0 + 1);
        self.core
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        id
    }

    /// Removes a previously registered `prioritychange` listener.
    pub fn remove_priority_listener(&self, id: PriorityListenerId) -> bool {
        let mut listeners = self.core.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Installs (or clears) the `on_priority_change` handler slot.
    ///
    /// The slot behaves like a single implicit listener dispatched before
    /// the registered listeners.
    pub fn set_on_priority_change(
        &self,
        handler: Option<Box<dyn FnMut(&PriorityChangeEvent)>>,
    ) {
        *self.core.on_priority_change.borrow_mut() = handler;
    }

    /// Returns true if both handles observe the same underlying signal.
    #[must_use]
    pub fn same_signal(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    /// Identity token for the dispatcher's weak signal table.
    pub(crate) fn core_weak(&self) -> Weak<TaskSignalCore> {
        Rc::downgrade(&self.core)
    }
}

impl fmt::Debug for TaskSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSignal")
            .field("priority", &self.priority())
            .field("aborted", &self.aborted())
            .finish()
    }
}
