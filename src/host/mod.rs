//! Host event-loop primitives behind a uniform cancel/run contract.
//!
//! The dispatcher never talks to the event loop directly. It schedules
//! wakes through a [`HostCallback`], which picks one of three concrete
//! primitives exposed by a [`Host`]:
//!
//! 1. **Idle** — background-priority wakes, when the host supports an
//!    idle-time callback
//! 2. **Immediate** — zero-delay wakes through the tick broker; lower
//!    latency than the timer path while remaining a macrotask
//! 3. **Timer** — the always-available fallback, and the only mode used
//!    for a positive delay
//!
//! [`host::event_loop::EventLoop`](event_loop::EventLoop) is the real
//! host; `lab::VirtualHost` is the deterministic one for tests.

pub mod broker;
pub mod event_loop;

pub use event_loop::EventLoop;

use crate::tracing_compat::trace;
use crate::types::{TaskPriority, Time};
use core::fmt;
use std::cell::Cell;
use std::rc::Rc;

/// Which primitive a host callback is scheduled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackMode {
    /// Zero-delay macrotask through the tick broker.
    Immediate,
    /// Idle-time callback; runs when the loop has nothing better to do.
    Idle,
    /// Delayed timer.
    Timer,
}

impl CallbackMode {
    /// Returns the mode name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Idle => "idle",
            Self::Timer => "timer",
        }
    }
}

impl fmt::Display for CallbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Token for one pending host scheduling, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostHandle {
    mode: CallbackMode,
    id: u64,
}

impl HostHandle {
    /// Creates a handle. Host implementations call this; the id must be
    /// unique within the host for the life of the scheduling.
    #[must_use]
    pub const fn new(mode: CallbackMode, id: u64) -> Self {
        Self { mode, id }
    }

    /// Returns the mode this handle was scheduled on.
    #[must_use]
    pub const fn mode(self) -> CallbackMode {
        self.mode
    }

    /// Returns the host-assigned id.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.id
    }
}

/// The capability interface over the three event-loop primitives.
///
/// `schedule_*` always succeed; `supports_idle`/`supports_immediate` only
/// advertise what the host can do natively so the [`HostCallback`] wrapper
/// can choose its fallback chain. Cancelling a handle that already fired
/// is a no-op.
pub trait Host {
    /// Schedules `f` as the next available macrotask.
    fn schedule_immediate(&self, f: Box<dyn FnOnce()>) -> HostHandle;

    /// Schedules `f` to run when the loop is idle.
    fn schedule_idle(&self, f: Box<dyn FnOnce()>) -> HostHandle;

    /// Schedules `f` to run no earlier than `delay` from now.
    fn schedule_timer(&self, delay: Time, f: Box<dyn FnOnce()>) -> HostHandle;

    /// Cancels a pending scheduling. Must be a no-op after the fire.
    fn cancel(&self, handle: HostHandle);

    /// True if the host has a native idle-time primitive.
    fn supports_idle(&self) -> bool {
        true
    }

    /// True if the host has a native immediate-tick primitive.
    fn supports_immediate(&self) -> bool {
        true
    }
}

/// One pending scheduling of a function on the event loop.
///
/// Wraps the mode decision and the host handle behind an idempotent
/// [`cancel`](Self::cancel) and the introspection the dispatcher needs for
/// its idle-upgrade path.
pub struct HostCallback {
    host: Rc<dyn Host>,
    mode: CallbackMode,
    handle: Cell<Option<HostHandle>>,
}

impl HostCallback {
    /// Schedules `f` on the host, choosing the primitive from the priority
    /// and delay: a positive delay is always a timer; `background` prefers
    /// the idle primitive; everything else prefers the immediate tick; the
    /// timer is the universal fallback.
    pub fn new(
        host: &Rc<dyn Host>,
        f: Box<dyn FnOnce()>,
        priority: Option<TaskPriority>,
        delay: Time,
    ) -> Self {
        let (mode, handle) = if !delay.is_zero() {
            (CallbackMode::Timer, host.schedule_timer(delay, f))
        } else if priority == Some(TaskPriority::Background) && host.supports_idle() {
            (CallbackMode::Idle, host.schedule_idle(f))
        } else if host.supports_immediate() {
            (CallbackMode::Immediate, host.schedule_immediate(f))
        } else {
            (CallbackMode::Timer, host.schedule_timer(Time::ZERO, f))
        };
        trace!(mode = %mode, delay = %delay, "host callback scheduled");
        debug_assert!(
            delay.is_zero() || mode == CallbackMode::Timer,
            "delayed callbacks must use the timer primitive"
        );
        Self {
            host: Rc::clone(host),
            mode,
            handle: Cell::new(Some(handle)),
        }
    }

    /// Cancels the pending scheduling. Idempotent; a no-op once fired.
    pub fn cancel(&self) {
        if let Some(handle) = self.handle.take() {
            trace!(mode = %self.mode, "host callback cancelled");
            self.host.cancel(handle);
        }
    }

    /// Returns the chosen mode.
    #[must_use]
    pub fn mode(&self) -> CallbackMode {
        self.mode
    }

    /// True if this wake was scheduled on the idle primitive.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.mode == CallbackMode::Idle
    }

    /// True if this wake was scheduled on the immediate tick.
    #[must_use]
    pub fn is_immediate(&self) -> bool {
        self.mode == CallbackMode::Immediate
    }
}

impl fmt::Debug for HostCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCallback")
            .field("mode", &self.mode)
            .field("pending", &self.handle.get().is_some())
            .finish()
    }
}
