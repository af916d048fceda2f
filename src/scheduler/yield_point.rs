//! Cooperative yield continuations.
//!
//! `yield_now` lets a long-running callback hand the loop back and resume
//! after other work has run. The continuation is an ordinary posted task
//! with a **boosted** effective priority, so resumed work is not starved
//! by ordinary user-visible tasks:
//!
//! | requested          | continuation runs at |
//! |--------------------|----------------------|
//! | (none), inherit, user-visible | user-blocking |
//! | user-blocking      | user-blocking        |
//! | background         | background           |
//!
//! `inherit` is accepted without error and degrades to the default: the
//! scheduler cannot observe the asynchronous execution context it would
//! inherit from.
//!
//! When the caller supplies a signal, an inner [`TaskController`] carries
//! the continuation: the outer signal's abort propagates into it, and an
//! outer `prioritychange` (when the priority is not pinned) re-maps the
//! continuation through the same table. Both listeners detach when the
//! continuation settles.

use crate::error::Error;
use crate::scheduler::{PostTaskOptions, Scheduler, TaskHandle};
use crate::signal::abort::AbortListenerId;
use crate::signal::task_signal::PriorityListenerId;
use crate::signal::{AbortReason, AbortSignal, AnySignal, TaskController, TaskSignal};
use crate::types::TaskPriority;
use std::cell::Cell;
use std::rc::Rc;

/// Priority request for a yield continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldPriority {
    /// Use the priority of the surrounding context. Accepted but not
    /// observable; degrades to the default mapping.
    Inherit,
    /// An explicit priority, mapped through the boost table.
    Priority(TaskPriority),
}

impl From<TaskPriority> for YieldPriority {
    fn from(priority: TaskPriority) -> Self {
        Self::Priority(priority)
    }
}

/// Signal request for a yield continuation.
#[derive(Debug, Clone)]
pub enum YieldSignal {
    /// Use the signal of the surrounding context. Accepted but not
    /// observable; degrades to no signal.
    Inherit,
    /// An explicit signal.
    Signal(AnySignal),
}

impl From<AnySignal> for YieldSignal {
    fn from(signal: AnySignal) -> Self {
        Self::Signal(signal)
    }
}

impl From<AbortSignal> for YieldSignal {
    fn from(signal: AbortSignal) -> Self {
        Self::Signal(signal.into())
    }
}

impl From<TaskSignal> for YieldSignal {
    fn from(signal: TaskSignal) -> Self {
        Self::Signal(signal.into())
    }
}

/// Options for [`Scheduler::yield_now`].
#[derive(Debug, Default)]
pub struct YieldOptions {
    priority: Option<YieldPriority>,
    signal: Option<YieldSignal>,
}

impl YieldOptions {
    /// Default options: boosted continuation, no signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a continuation priority.
    #[must_use]
    pub fn priority(mut self, priority: impl Into<YieldPriority>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    /// Attaches (or inherits) an abort/priority source.
    #[must_use]
    pub fn signal(mut self, signal: impl Into<YieldSignal>) -> Self {
        self.signal = Some(signal.into());
        self
    }

    /// The explicit priority request, for the install shim's degraded path.
    pub(crate) fn requested_priority(&self) -> Option<YieldPriority> {
        self.priority
    }
}

/// The continuation boost table.
pub(crate) fn continuation_priority(requested: Option<TaskPriority>) -> TaskPriority {
    match requested {
        None | Some(TaskPriority::UserVisible) => TaskPriority::UserBlocking,
        Some(other) => other,
    }
}

/// Listener bookkeeping for one yield continuation; detach is idempotent.
struct YieldTicket {
    outer: AnySignal,
    abort_listener: Cell<Option<AbortListenerId>>,
    priority_listener: Cell<Option<PriorityListenerId>>,
}

impl YieldTicket {
    fn detach_priority_listener(&self) {
        if let Some(id) = self.priority_listener.take() {
            if let Some(signal) = self.outer.as_task_signal() {
                signal.remove_priority_listener(id);
            }
        }
    }

    fn detach_all(&self) {
        if let Some(id) = self.abort_listener.take() {
            self.outer.remove_abort_listener(id);
        }
        self.detach_priority_listener();
    }
}

impl Scheduler {
    /// Returns a handle that settles once the event loop has processed
    /// other work; see the module docs for the priority mapping and signal
    /// propagation rules.
    pub fn yield_now(&self, options: YieldOptions) -> TaskHandle<()> {
        let requested = match options.priority {
            Some(YieldPriority::Priority(priority)) => Some(priority),
            Some(YieldPriority::Inherit) | None => None,
        };
        let outer = match options.signal {
            Some(YieldSignal::Signal(signal)) => Some(signal),
            Some(YieldSignal::Inherit) | None => None,
        };

        let Some(outer) = outer else {
            return self.post_task(
                || (),
                PostTaskOptions::new().priority(continuation_priority(requested)),
            );
        };

        if outer.aborted() {
            let reason = outer.reason().unwrap_or_else(AbortReason::abort_error);
            return TaskHandle::rejected(Error::aborted(reason));
        }

        // The continuation rides an inner controller so the outer signal's
        // abort and priority changes can steer it after posting.
        let initial = continuation_priority(
            requested.or_else(|| outer.as_task_signal().map(TaskSignal::priority)),
        );
        let inner = Rc::new(TaskController::with_priority(initial));
        let inner_signal = inner.signal();

        let ticket = Rc::new(YieldTicket {
            outer: outer.clone(),
            abort_listener: Cell::new(None),
            priority_listener: Cell::new(None),
        });

        let abort_ticket = Rc::clone(&ticket);
        let abort_inner = Rc::clone(&inner);
        let abort_id = outer.on_abort(move |reason| {
            abort_ticket.abort_listener.set(None);
            abort_ticket.detach_priority_listener();
            abort_inner.abort_with(reason.clone());
        });
        ticket.abort_listener.set(Some(abort_id));

        if requested.is_none() {
            if let Some(outer_task) = outer.as_task_signal() {
                let token = outer_task.core_weak();
                let remap_inner = Rc::clone(&inner);
                let id = outer_task.on_priority_change(move |_event| {
                    if let Some(core) = token.upgrade() {
                        let _ = remap_inner
                            .set_priority(continuation_priority(Some(core.priority())));
                    }
                });
                ticket.priority_listener.set(Some(id));
            }
        }

        self.post_task(
            move || ticket.detach_all(),
            PostTaskOptions::new().signal(inner_signal),
        )
    }
}
