//! Cancellation and priority signals.
//!
//! - [`abort`]: the abort base — controller, signal, and identity-compared
//!   abort reasons
//! - [`task_signal`]: the priority-aware controller/signal pair and the
//!   `prioritychange` topic
//! - [`event`]: the `prioritychange` event value
//!
//! The scheduler accepts either a plain [`AbortSignal`] or a priority-aware
//! [`TaskSignal`] through [`AnySignal`]. The distinction is a capability
//! check at the boundary ([`AnySignal::as_task_signal`]), not inheritance:
//! code that only needs cancellation never sees the priority surface.

pub mod abort;
pub mod event;
pub mod task_signal;

pub use abort::{AbortController, AbortListenerId, AbortReason, AbortSignal};
pub use event::PriorityChangeEvent;
pub use task_signal::{PriorityListenerId, TaskController, TaskSignal};

use core::fmt;

/// A signal accepted by the scheduler: plain abort or priority-aware.
#[derive(Clone)]
pub enum AnySignal {
    /// A plain cancellation signal.
    Abort(AbortSignal),
    /// A priority-aware task signal.
    Task(TaskSignal),
}

impl AnySignal {
    /// The capability check: returns the task signal when this value
    /// exposes a priority and a `prioritychange` topic.
    #[must_use]
    pub fn as_task_signal(&self) -> Option<&TaskSignal> {
        match self {
            Self::Abort(_) => None,
            Self::Task(signal) => Some(signal),
        }
    }

    /// Returns true once the signal has aborted.
    #[must_use]
    pub fn aborted(&self) -> bool {
        match self {
            Self::Abort(signal) => signal.aborted(),
            Self::Task(signal) => signal.aborted(),
        }
    }

    /// Returns the abort reason, once aborted.
    #[must_use]
    pub fn reason(&self) -> Option<AbortReason> {
        match self {
            Self::Abort(signal) => signal.reason(),
            Self::Task(signal) => signal.reason(),
        }
    }

    /// Registers a once-fired abort listener.
    pub fn on_abort(&self, listener: impl FnOnce(&AbortReason) + 'static) -> AbortListenerId {
        match self {
            Self::Abort(signal) => signal.on_abort(listener),
            Self::Task(signal) => signal.on_abort(listener),
        }
    }

    /// Removes a previously registered abort listener.
    pub fn remove_abort_listener(&self, id: AbortListenerId) -> bool {
        match self {
            Self::Abort(signal) => signal.remove_abort_listener(id),
            Self::Task(signal) => signal.remove_abort_listener(id),
        }
    }
}

impl From<AbortSignal> for AnySignal {
    fn from(signal: AbortSignal) -> Self {
        Self::Abort(signal)
    }
}

impl From<TaskSignal> for AnySignal {
    fn from(signal: TaskSignal) -> Self {
        Self::Task(signal)
    }
}

impl fmt::Debug for AnySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort(signal) => signal.fmt(f),
            Self::Task(signal) => signal.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_check_distinguishes_signal_kinds() {
        let plain: AnySignal = AbortController::new().signal().into();
        assert!(plain.as_task_signal().is_none());

        let task: AnySignal = TaskController::new().signal().into();
        assert!(task.as_task_signal().is_some());
    }

    #[test]
    fn abort_surface_delegates() {
        let controller = TaskController::new();
        let signal: AnySignal = controller.signal().into();
        assert!(!signal.aborted());

        let reason = AbortReason::message("done");
        controller.abort_with(reason.clone());
        assert!(signal.aborted());
        assert_eq!(signal.reason(), Some(reason));
    }
}
