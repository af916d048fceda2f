//! Deterministic host for tests.
//!
//! [`VirtualHost`] implements the same [`Host`] contract as the real event
//! loop, but against a virtual millisecond clock that only moves when a
//! test says so:
//!
//! - [`advance`](VirtualHost::advance) moves the clock and drains the work
//!   that became due
//! - [`spin`](VirtualHost::spin) moves the clock without draining, for
//!   simulating a busy callback from inside that callback
//! - [`run`](VirtualHost::run) auto-advances to each next timer deadline
//!   until no work remains
//!
//! Dispatch order per turn matches the real loop: immediate ticks, due
//! timers (deadline order, scheduling order within a deadline), then idle
//! callbacks.

use crate::config::HostCapabilities;
use crate::host::{broker, CallbackMode, Host, HostHandle};
use crate::tracing_compat::trace;
use crate::types::Time;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VirtualTimer {
    deadline: Time,
    id: u64,
}

impl Ord for VirtualTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for VirtualTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

type HostFn = Box<dyn FnOnce()>;

struct VirtualState {
    now: Time,
    immediate: VecDeque<u64>,
    timers: BinaryHeap<VirtualTimer>,
    timer_fns: HashMap<u64, HostFn>,
    idle: VecDeque<u64>,
    idle_fns: HashMap<u64, HostFn>,
    next_id: u64,
    capabilities: HostCapabilities,
}

enum Turn {
    Run(HostFn),
    Retry,
    Stalled,
}

/// A [`Host`] with a virtual clock, for deterministic tests.
#[derive(Clone)]
pub struct VirtualHost {
    state: Rc<RefCell<VirtualState>>,
}

impl VirtualHost {
    /// Creates a virtual host with full capabilities, clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(HostCapabilities::default())
    }

    /// Creates a virtual host advertising the given capabilities.
    #[must_use]
    pub fn with_capabilities(capabilities: HostCapabilities) -> Self {
        Self {
            state: Rc::new(RefCell::new(VirtualState {
                now: Time::ZERO,
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

    /// Returns the current virtual time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.state.borrow().now
    }

    /// Moves the clock forward without running anything.
    ///
    /// Safe to call from inside a running callback; used to simulate work
    /// that takes virtual time.
    pub fn spin(&self, elapsed: Time) {
        let mut state = self.state.borrow_mut();
        state.now = state.now.saturating_add(elapsed);
    }

    /// Runs one macrotask if any is due at the current time.
    pub fn turn(&self) -> bool {
        loop {
            match self.claim_next() {
                Turn::Run(f) => {
                    f();
                    return true;
                }
                Turn::Retry => {}
                Turn::Stalled => return false,
            }
        }
    }

    fn claim_next(&self) -> Turn {
        let mut state = self.state.borrow_mut();
        if let Some(handle) = state.immediate.pop_front() {
            return match broker::take(handle) {
                Some(f) => Turn::Run(f),
                None => Turn::Retry,
            };
        }
        if let Some(entry) = state.timers.peek().copied() {
            if entry.deadline <= state.now {
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

    /// Drains all work due at the current time. Returns macrotasks run.
    pub fn run_until_stalled(&self) -> usize {
        let mut ran = 0;
        while self.turn() {
            ran += 1;
        }
        ran
    }

    /// Moves the clock forward and drains everything that became due.
    pub fn advance(&self, elapsed: Time) -> usize {
        self.spin(elapsed);
        self.run_until_stalled()
    }

    /// Runs to quiescence, jumping the clock to each next timer deadline.
    /// Returns total macrotasks run.
    pub fn run(&self) -> usize {
        let mut total = 0;
        loop {
            total += self.run_until_stalled();
            let Some(deadline) = self.next_deadline() else {
                return total;
            };
            let mut state = self.state.borrow_mut();
            if deadline > state.now {
                trace!(from = %state.now, to = %deadline, "virtual clock auto-advance");
                state.now = deadline;
            }
        }
    }

    /// Earliest live timer deadline, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Time> {
        let mut state = self.state.borrow_mut();
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

impl Default for VirtualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for VirtualHost {
    fn schedule_immediate(&self, f: Box<dyn FnOnce()>) -> HostHandle {
        let handle = broker::post(f);
        self.state.borrow_mut().immediate.push_back(handle);
        HostHandle::new(CallbackMode::Immediate, handle)
    }

    fn schedule_idle(&self, f: Box<dyn FnOnce()>) -> HostHandle {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.idle.push_back(id);
        state.idle_fns.insert(id, f);
        HostHandle::new(CallbackMode::Idle, id)
    }

    fn schedule_timer(&self, delay: Time, f: Box<dyn FnOnce()>) -> HostHandle {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        let deadline = state.now.saturating_add(delay);
        state.timers.push(VirtualTimer { deadline, id });
        state.timer_fns.insert(id, f);
        HostHandle::new(CallbackMode::Timer, id)
    }

    fn cancel(&self, handle: HostHandle) {
        match handle.mode() {
            CallbackMode::Immediate => {
                broker::cancel(handle.id());
            }
            CallbackMode::Timer => {
                self.state.borrow_mut().timer_fns.remove(&handle.id());
            }
            CallbackMode::Idle => {
                self.state.borrow_mut().idle_fns.remove(&handle.id());
            }
        }
    }

    fn supports_idle(&self) -> bool {
        self.state.borrow().capabilities.idle
    }

    fn supports_immediate(&self) -> bool {
        self.state.borrow().capabilities.immediate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    fn record(
        log: &Rc<RefCell<Vec<&'static str>>>,
        tag: &'static str,
    ) -> Box<dyn FnOnce()> {
        let log = Rc::clone(log);
        Box::new(move || log.borrow_mut().push(tag))
    }

    #[test]
    fn clock_only_moves_on_request() {
        init_test("clock_only_moves_on_request");
        let vh = VirtualHost::new();
        assert_eq!(vh.now(), Time::ZERO);
        vh.run_until_stalled();
        assert_eq!(vh.now(), Time::ZERO);
        vh.spin(Time::from_millis(7));
        assert_eq!(vh.now(), Time::from_millis(7));
        crate::test_complete!("clock_only_moves_on_request");
    }

    #[test]
    fn timer_fires_only_after_deadline() {
        init_test("timer_fires_only_after_deadline");
        let vh = VirtualHost::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        vh.schedule_timer(Time::from_millis(10), record(&log, "t"));
        vh.advance(Time::from_millis(9));
        assert!(log.borrow().is_empty());
        vh.advance(Time::from_millis(1));
        crate::assert_with_log!(
            *log.borrow() == vec!["t"],
            "timer fires at its deadline",
            vec!["t"],
            log.borrow().clone()
        );
        crate::test_complete!("timer_fires_only_after_deadline");
    }

    #[test]
    fn run_auto_advances_through_deadlines() {
        init_test("run_auto_advances_through_deadlines");
        let vh = VirtualHost::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        vh.schedule_timer(Time::from_millis(50), record(&log, "late"));
        vh.schedule_timer(Time::from_millis(10), record(&log, "early"));
        let ran = vh.run();

        assert_eq!(ran, 2);
        crate::assert_with_log!(
            *log.borrow() == vec!["early", "late"],
            "auto-advance respects deadline order",
            vec!["early", "late"],
            log.borrow().clone()
        );
        assert_eq!(vh.now(), Time::from_millis(50));
        crate::test_complete!("run_auto_advances_through_deadlines");
    }

    #[test]
    fn dispatch_order_immediate_timer_idle() {
        init_test("dispatch_order_immediate_timer_idle");
        let vh = VirtualHost::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        vh.schedule_idle(record(&log, "idle"));
        vh.schedule_timer(Time::ZERO, record(&log, "timer"));
        vh.schedule_immediate(record(&log, "immediate"));
        vh.run_until_stalled();

        crate::assert_with_log!(
            *log.borrow() == vec!["immediate", "timer", "idle"],
            "per-turn source order",
            vec!["immediate", "timer", "idle"],
            log.borrow().clone()
        );
        crate::test_complete!("dispatch_order_immediate_timer_idle");
    }

    #[test]
    fn cancelled_work_is_skipped() {
        init_test("cancelled_work_is_skipped");
        let vh = VirtualHost::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let t = vh.schedule_timer(Time::ZERO, record(&log, "timer"));
        let i = vh.schedule_immediate(record(&log, "immediate"));
        let d = vh.schedule_idle(record(&log, "idle"));
        vh.cancel(t);
        vh.cancel(i);
        vh.cancel(d);
        vh.run();

        assert!(log.borrow().is_empty());
        assert!(!vh.has_pending_work());
        crate::test_complete!("cancelled_work_is_skipped");
    }
}
