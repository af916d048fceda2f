//! The real single-threaded event loop host.
//!
//! Macrotask sources, drained in this order each turn: immediate ticks
//! (through the broker), due timers, then idle callbacks. Idle work runs
//! whenever neither of the other sources has anything due, including while
//! the loop is waiting out a future timer deadline.
//!
//! Timers are a reverse-ordered binary heap keyed on [`Instant`]; entries
//! with equal deadlines fire in scheduling order because ids are monotonic.
//! Cancellation removes the callback from the live map and the heap entry
//! is skipped when it surfaces.

use crate::config::HostCapabilities;
use crate::host::{broker, CallbackMode, Host, HostHandle};
use crate::tracing_compat::trace;
use crate::types::Time;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::rc::Rc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerEntry {
    deadline: Instant,
    id: u64,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior; ids are monotonic, so
        // same-deadline timers fire in scheduling order.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

type HostFn = Box<dyn FnOnce()>;

struct LoopState {
    immediate: VecDeque<u64>,
    timers: BinaryHeap<TimerEntry>,
    timer_fns: HashMap<u64, HostFn>,
    idle: VecDeque<u64>,
    idle_fns: HashMap<u64, HostFn>,
    next_id: u64,
    capabilities: HostCapabilities,
}

impl LoopState {
    fn fresh_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

enum Turn {
    Run(HostFn),
    /// A cancelled entry surfaced; try the next one.
    Retry,
    Stalled,
}

/// A single-threaded event loop implementing [`Host`].
///
/// Clone handles share the same loop.
#[derive(Clone)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
}

impl EventLoop {
    /// Creates an event loop with full host capabilities.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(HostCapabilities::default())
    }

    /// Creates an event loop advertising the given capabilities.
    ///
    /// Capabilities only affect what [`Host::supports_idle`] and
    /// [`Host::supports_immediate`] report; the primitives themselves stay
    /// functional so a caller that ignores the advertisement still works.
    #[must_use]
    pub fn with_capabilities(capabilities: HostCapabilities) -> Self {
        Self {
            state: Rc::new(RefCell::new(LoopState {
                immediate: VecDeque::new(),
                timers: BinaryHeap::new(),
                timer_fns: HashMap::new(),
                idle: VecDeque::new(),
                idle_fns: HashMap::new(),
                next_id: 0,
                capabilities,
            })),
        }
    }

    /// Runs one macrotask if any is due. Returns false when nothing ran.
    pub fn turn(&self) -> bool {
        loop {
            let work = self.claim_next(Instant::now());
            match work {
                Turn::Run(f) => {
                    f();
                    return true;
                }
                Turn::Retry => {}
                Turn::Stalled => return false,
            }
        }
    }

    fn claim_next(&self, now: Instant) -> Turn {
        let mut state = self.state.borrow_mut();
        if let Some(handle) = state.immediate.pop_front() {
            return match broker::take(handle) {
                Some(f) => Turn::Run(f),
                None => Turn::Retry,
            };
        }
        if let Some(entry) = state.timers.peek().copied() {
            if entry.deadline <= now {
                state.timers.pop();
                return match state.timer_fns.remove(&entry.id) {
                    Some(f) => Turn::Run(f),
                    None => Turn::Retry,
                };
            }
        }
        if let Some(id) = state.idle.pop_front() {
            return match state.idle_fns.remove(&id) {
                Some(f) => Turn::Run(f),
                None => Turn::Retry,
            };
        }
        Turn::Stalled
    }

    /// Drains all currently due work without waiting for future timers.
    /// Returns the number of macrotasks run.
    pub fn run_until_stalled(&self) -> usize {
        let mut ran = 0;
        while self.turn() {
            ran += 1;
        }
        ran
    }

    /// Runs until no work remains at all, sleeping out timer deadlines.
    pub fn run(&self) {
        loop {
            self.run_until_stalled();
            let Some(deadline) = self.next_deadline() else {
                return;
            };
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }
    }

    /// Earliest live timer deadline, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let mut state = self.state.borrow_mut();
        // Drop cancelled entries so the caller never sleeps toward one.
        while let Some(entry) = state.timers.peek().copied() {
            if state.timer_fns.contains_key(&entry.id) {
                return Some(entry.deadline);
            }
            state.timers.pop();
        }
        None
    }

    /// True while any immediate, timer, or idle work is outstanding.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        let state = self.state.borrow();
        !state.immediate.is_empty() || !state.timer_fns.is_empty() || !state.idle_fns.is_empty()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for EventLoop {
    fn schedule_immediate(&self, f: Box<dyn FnOnce()>) -> HostHandle {
        let handle = broker::post(f);
        self.state.borrow_mut().immediate.push_back(handle);
        HostHandle::new(CallbackMode::Immediate, handle)
    }

    fn schedule_idle(&self, f: Box<dyn FnOnce()>) -> HostHandle {
        let mut state = self.state.borrow_mut();
        let id = state.fresh_id();
        state.idle.push_back(id);
        state.idle_fns.insert(id, f);
        HostHandle::new(CallbackMode::Idle, id)
    }

    fn schedule_timer(&self, delay: Time, f: Box<dyn FnOnce()>) -> HostHandle {
        let mut state = self.state.borrow_mut();
        let id = state.fresh_id();
        let deadline = Instant::now() + delay.as_duration();
        state.timers.push(TimerEntry { deadline, id });
        state.timer_fns.insert(id, f);
        HostHandle::new(CallbackMode::Timer, id)
    }

    fn cancel(&self, handle: HostHandle) {
        let cancelled = match handle.mode() {
            CallbackMode::Immediate => broker::cancel(handle.id()),
            CallbackMode::Timer => self
                .state
                .borrow_mut()
                .timer_fns
                .remove(&handle.id())
                .is_some(),
            CallbackMode::Idle => self
                .state
                .borrow_mut()
                .idle_fns
                .remove(&handle.id())
                .is_some(),
        };
        if cancelled {
            trace!(mode = %handle.mode(), id = handle.id(), "host scheduling cancelled");
        }
    }

    fn supports_idle(&self) -> bool {
        self.state.borrow().capabilities.idle
    }

    fn supports_immediate(&self) -> bool {
        self.state.borrow().capabilities.immediate
    }
}
