//! The prioritized cooperative scheduler.
//!
//! - [`queue`]: intrusive per-priority FIFOs with sequence-preserving merge
//! - [`task`]: task records and the [`TaskHandle`] future
//! - [`dispatcher`]: queue selection, host wake management, signal watching
//! - [`yield_point`]: cooperative yield continuations
//!
//! [`Scheduler::post_task`] submits a callback with a priority, an optional
//! signal, and an optional delay; [`Scheduler::yield_now`] posts a boosted
//! continuation so long-running work can hand the loop back.

pub(crate) mod dispatcher;
pub(crate) mod queue;
pub(crate) mod task;
pub mod yield_point;

pub use task::{TaskCompleter, TaskHandle};
pub use yield_point::{YieldOptions, YieldPriority, YieldSignal};

use crate::error::Error;
use crate::host::Host;
use crate::scheduler::dispatcher::{SchedulerCore, SubmitSpec};
use crate::scheduler::task::PrioritySource;
use crate::signal::AnySignal;
use crate::types::{TaskPriority, Time};
use core::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// Options for [`Scheduler::post_task`].
#[derive(Default)]
pub struct PostTaskOptions {
    priority: Option<TaskPriority>,
    signal: Option<AnySignal>,
    delay: Time,
}

impl PostTaskOptions {
    /// Default options: user-visible priority, no signal, no delay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the effective priority for the lifetime of the task. A pinned
    /// task never migrates on a signal priority change.
    #[must_use]
    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Attaches an abort source; a [`TaskSignal`](crate::signal::TaskSignal)
    /// also supplies the priority while none is pinned.
    #[must_use]
    pub fn signal(mut self, signal: impl Into<AnySignal>) -> Self {
        self.signal = Some(signal.into());
        self
    }

    /// Minimum delay before the task becomes runnable.
    #[must_use]
    pub fn delay(mut self, delay: Time) -> Self {
        self.delay = delay;
        self
    }
}

impl fmt::Debug for PostTaskOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostTaskOptions")
            .field("priority", &self.priority)
            .field("delay", &self.delay)
            .field("has_signal", &self.signal.is_some())
            .finish()
    }
}

/// A prioritized cooperative task scheduler over a [`Host`].
///
/// Clone handles share the same dispatcher.
#[derive(Clone)]
pub struct Scheduler {
    core: Rc<SchedulerCore>,
}

impl Scheduler {
    /// Creates a scheduler over the given host with default configuration.
    #[must_use]
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self {
            core: SchedulerCore::new(host, crate::config::SchedulerConfig::default().task_capacity),
        }
    }

    /// Creates a scheduler with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid configuration.
    pub fn with_config(
        host: Rc<dyn Host>,
        config: &crate::config::SchedulerConfig,
    ) -> crate::error::Result<Self> {
        config.validate()?;
        Ok(Self {
            core: SchedulerCore::new(host, config.task_capacity),
        })
    }

    /// Submits `callback` and returns the handle settled with its result.
    ///
    /// The effective priority is the pinned option if set, else a task
    /// signal's current priority, else user-visible. An already-aborted
    /// signal rejects the handle immediately with its reason; a panic in
    /// the callback rejects the handle with the captured payload and the
    /// scheduler moves on to the next task.
    pub fn post_task<T, F>(&self, callback: F, options: PostTaskOptions) -> TaskHandle<T>
    where
        F: FnOnce() -> T + 'static,
        T: 'static,
    {
        let (handle, shared) = TaskHandle::pending();

        let task_signal = options.signal.as_ref().and_then(AnySignal::as_task_signal);
        let (priority, source) = match (options.priority, task_signal) {
            (Some(pinned), _) => (pinned, PrioritySource::Pinned),
            (None, Some(signal)) => {
                if !signal.aborted() {
                    self.core.watch_signal(signal);
                }
                (signal.priority(), PrioritySource::Signal)
            }
            (None, None) => (TaskPriority::default(), PrioritySource::Default),
        };

        let completion = Rc::clone(&shared);
        let invoke = Box::new(move || {
            match catch_unwind(AssertUnwindSafe(callback)) {
                Ok(value) => shared.settle(Ok(value)),
                Err(payload) => shared.settle(Err(Error::callback_panicked(payload))),
            };
        });

        self.core.submit(SubmitSpec {
            invoke,
            completion,
            priority,
            source,
            signal: options.signal,
            delay: options.delay,
        });
        handle
    }

    pub(crate) fn core(&self) -> &Rc<SchedulerCore> {
        &self.core
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}
