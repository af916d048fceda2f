//! Prioritized cooperative task scheduling on a single-threaded event loop.
//!
//! Callbacks are submitted with a [`TaskPriority`] (`user-blocking` >
//! `user-visible` > `background`), an optional cancellation/priority
//! signal, and an optional minimum delay; the scheduler returns a
//! [`TaskHandle`] settled with the callback's result. Long-running work
//! can [`yield_now`](Scheduler::yield_now) to hand the loop back and
//! resume ahead of ordinary tasks.
//!
//! Ordering guarantees: strict priority dominance across queues, FIFO by
//! posting order within a queue, and posting order preserved under signal
//! re-prioritization. One task runs per host wake; nothing preempts a
//! running callback.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use tasklane::{EventLoop, Host, PostTaskOptions, Scheduler, TaskPriority};
//!
//! let host = Rc::new(EventLoop::new());
//! let scheduler = Scheduler::new(Rc::clone(&host) as Rc<dyn Host>);
//!
//! let urgent = scheduler.post_task(
//!     || "first",
//!     PostTaskOptions::new().priority(TaskPriority::UserBlocking),
//! );
//! let casual = scheduler.post_task(|| "second", PostTaskOptions::new());
//!
//! host.run();
//! assert_eq!(urgent.try_result().unwrap().unwrap(), "first");
//! assert_eq!(casual.try_result().unwrap().unwrap(), "second");
//! ```

pub mod config;
pub mod error;
pub mod global;
pub mod host;
pub mod lab;
pub mod scheduler;
pub mod signal;
pub mod test_logging;
pub mod tracing_compat;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{HostCapabilities, SchedulerConfig};
pub use error::{Error, ErrorCategory, ErrorKind, Result};
pub use host::{CallbackMode, EventLoop, Host, HostCallback, HostHandle};
pub use scheduler::{
    PostTaskOptions, Scheduler, TaskCompleter, TaskHandle, YieldOptions, YieldPriority,
    YieldSignal,
};
pub use signal::{
    AbortController, AbortReason, AbortSignal, AnySignal, PriorityChangeEvent, TaskController,
    TaskSignal,
};
pub use types::{TaskPriority, Time};
