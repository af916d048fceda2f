//! Task records and result handles.
//!
//! A [`Task`] is the scheduler-owned record for one submitted callback: the
//! type-erased run closure, the completion channel for the abort path, the
//! intrusive queue links, and the signal bookkeeping. Outside code never
//! sees the record; callers hold a [`TaskHandle`], the future settled with
//! the callback's value or an [`Error`].

use crate::error::Error;
use crate::host::HostCallback;
use crate::signal::task_signal::TaskSignalCore;
use crate::signal::{AbortListenerId, AnySignal};
use crate::types::TaskPriority;
use crate::util::ArenaIndex;
use core::fmt;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

/// Where a task's effective priority came from.
///
/// Only a signal-sourced priority follows the signal on a `prioritychange`;
/// a pinned priority holds for the lifetime of the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrioritySource {
    /// `options.priority` was set.
    Pinned,
    /// Taken from the task signal's current priority.
    Signal,
    /// Neither option nor signal: the default priority.
    Default,
}

/// The scheduler-owned record for one submitted callback.
pub(crate) struct Task {
    /// Runs the user callback and settles the handle. Consumed on run.
    pub(crate) invoke: Option<Box<dyn FnOnce()>>,
    /// Type-erased reject channel for the abort path.
    pub(crate) completion: Rc<dyn Completion>,
    /// Effective priority at submission.
    pub(crate) priority: TaskPriority,
    pub(crate) source: PrioritySource,
    pub(crate) signal: Option<AnySignal>,
    pub(crate) abort_listener: Option<AbortListenerId>,
    /// Set only for signal-sourced priorities; the merge selector key.
    pub(crate) watched_signal: Option<Weak<TaskSignalCore>>,
    /// Global posting order. Assigned once, at queue insertion.
    pub(crate) sequence: u64,
    pub(crate) prev: Option<ArenaIndex>,
    pub(crate) next: Option<ArenaIndex>,
    /// Pending delay timer. Non-nil iff the task is delayed and unqueued.
    pub(crate) delay_callback: Option<HostCallback>,
    /// The handle was already rejected; skip at dispatch.
    pub(crate) aborted: bool,
}

impl Task {
    pub(crate) fn new(
        invoke: Box<dyn FnOnce()>,
        completion: Rc<dyn Completion>,
        priority: TaskPriority,
        source: PrioritySource,
        signal: Option<AnySignal>,
        watched_signal: Option<Weak<TaskSignalCore>>,
    ) -> Self {
        Self {
            invoke: Some(invoke),
            completion,
            priority,
            source,
            signal,
            abort_listener: None,
            watched_signal,
            sequence: 0,
            prev: None,
            next: None,
            delay_callback: None,
            aborted: false,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}

/// The type-erased side of a handle's shared state, for the abort path.
pub(crate) trait Completion {
    /// Rejects the handle. Returns false if it had already settled.
    fn reject(&self, err: Error) -> bool;
}

enum HandleState<T> {
    Pending(Option<Waker>),
    /// The inner Option empties when the result is taken.
    Settled(Option<Result<T, Error>>),
}

pub(crate) struct Shared<T> {
    state: RefCell<HandleState<T>>,
}

impl<T> Shared<T> {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(HandleState::Pending(None)),
        })
    }

    /// Settles the handle exactly once; later settlements are dropped.
    pub(crate) fn settle(&self, result: Result<T, Error>) -> bool {
        let mut state = self.state.borrow_mut();
        match &mut *state {
            HandleState::Pending(waker) => {
                let waker = waker.take();
                *state = HandleState::Settled(Some(result));
                drop(state);
                if let Some(waker) = waker {
                    waker.wake();
                }
                true
            }
            HandleState::Settled(_) => false,
        }
    }
}

impl<T> Completion for Shared<T> {
    fn reject(&self, err: Error) -> bool {
        self.settle(Err(err))
    }
}

/// The future returned by `post_task` and `yield_now`.
///
/// Resolves with the callback's return value; rejects with the callback's
/// panic, the signal's abort reason, or a synchronous validation error.
/// [`try_result`](Self::try_result) gives non-blocking access for callers
/// that drive the host loop themselves.
pub struct TaskHandle<T> {
    shared: Rc<Shared<T>>,
}

impl<T> TaskHandle<T> {
    /// Creates an unsettled handle and its shared state.
    pub(crate) fn pending() -> (Self, Rc<Shared<T>>) {
        let shared = Shared::new();
        (
            Self {
                shared: Rc::clone(&shared),
            },
            shared,
        )
    }

    /// Creates an already-rejected handle.
    pub(crate) fn rejected(err: Error) -> Self {
        let (handle, shared) = Self::pending();
        shared.settle(Err(err));
        handle
    }

    /// Creates a handle/completer pair for schedulers implementing the
    /// global continuation surface.
    #[must_use]
    pub fn channel() -> (Self, TaskCompleter<T>) {
        let (handle, shared) = Self::pending();
        (handle, TaskCompleter { shared })
    }

    /// Returns true once the handle has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(&*self.shared.state.borrow(), HandleState::Settled(_))
    }

    /// Takes the result if the handle has settled.
    ///
    /// The result can be taken once, by either this method or the future;
    /// later calls return `None`.
    pub fn try_result(&self) -> Option<Result<T, Error>> {
        match &mut *self.shared.state.borrow_mut() {
            HandleState::Pending(_) => None,
            HandleState::Settled(slot) => slot.take(),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, Error>;

    /// # Panics
    ///
    /// Panics if polled again after the result was yielded or taken.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.state.borrow_mut();
        match &mut *state {
            HandleState::Pending(waker) => {
                *waker = Some(cx.waker().clone());
                Poll::Pending
            }
            HandleState::Settled(slot) => Poll::Ready(
                slot.take()
                    .expect("task handle polled after its result was taken"),
            ),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Settles a [`TaskHandle`] created with [`TaskHandle::channel`].
pub struct TaskCompleter<T> {
    shared: Rc<Shared<T>>,
}

impl<T> TaskCompleter<T> {
    /// Resolves the handle. Returns false if it had already settled.
    pub fn resolve(self, value: T) -> bool {
        self.shared.settle(Ok(value))
    }

    /// Rejects the handle. Returns false if it had already settled.
    pub fn reject(self, err: Error) -> bool {
        self.shared.settle(Err(err))
    }
}

impl<T> fmt::Debug for TaskCompleter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCompleter").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use futures_lite::future;

    #[test]
    fn settles_once() {
        let (handle, shared) = TaskHandle::<u32>::pending();
        assert!(!handle.is_settled());
        assert!(shared.settle(Ok(1)));
        assert!(!shared.settle(Ok(2)));
        assert!(matches!(handle.try_result(), Some(Ok(1))));
        assert!(handle.try_result().is_none());
        assert!(handle.is_settled());
    }

    #[test]
    fn reject_through_completion_trait() {
        let (handle, shared) = TaskHandle::<u32>::pending();
        let completion: Rc<dyn Completion> = shared;
        assert!(completion.reject(Error::new(ErrorKind::Aborted)));
        let err = handle.try_result().expect("settled").expect_err("rejected");
        assert_eq!(err.kind(), ErrorKind::Aborted);
    }

    #[test]
    fn future_yields_settled_value() {
        let (handle, shared) = TaskHandle::<&str>::pending();
        shared.settle(Ok("done"));
        assert_eq!(future::block_on(handle).expect("resolved"), "done");
    }

    #[test]
    fn future_wakes_on_late_settlement() {
        let (handle, shared) = TaskHandle::<u32>::pending();
        // Poll once to register the waker, settle, then poll to completion.
        let mut handle = handle;
        let result = future::block_on(future::poll_once(&mut handle));
        assert!(result.is_none());
        shared.settle(Ok(9));
        assert_eq!(future::block_on(handle).expect("resolved"), 9);
    }

    #[test]
    fn completer_channel() {
        let (handle, completer) = TaskHandle::<u32>::channel();
        assert!(completer.resolve(3));
        assert!(matches!(handle.try_result(), Some(Ok(3))));
    }
}
