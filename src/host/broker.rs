//! Immediate-tick broker.
//!
//! The immediate scheduling primitive delivers opaque handles through the
//! host's macrotask stream and has no per-message cancel. The broker closes
//! that gap: it maps a monotonically increasing handle to its pending
//! function, and cancellation deletes the map entry before dispatch. A
//! handle whose entry is gone is skipped when it surfaces.
//!
//! There is one broker per host thread (the scheduler is single-threaded by
//! contract), shared by every host on that thread; handles are unique
//! across all of them.

use std::cell::RefCell;
use std::collections::HashMap;

type PendingTick = Box<dyn FnOnce()>;

struct BrokerState {
    next_handle: u64,
    pending: HashMap<u64, PendingTick>,
}

thread_local! {
    static BROKER: RefCell<BrokerState> = RefCell::new(BrokerState {
        next_handle: 0,
        pending: HashMap::new(),
    });
}

/// Registers a pending tick and returns its handle.
pub fn post(tick: PendingTick) -> u64 {
    BROKER.with(|broker| {
        let mut broker = broker.borrow_mut();
        let handle = broker.next_handle;
        broker.next_handle += 1;
        broker.pending.insert(handle, tick);
        handle
    })
}

/// Cancels a pending tick. Returns false if it already dispatched or was
/// cancelled.
pub fn cancel(handle: u64) -> bool {
    BROKER.with(|broker| broker.borrow_mut().pending.remove(&handle).is_some())
}

/// Claims the tick for `handle` at dispatch time.
///
/// Returns `None` for cancelled handles; the caller skips those. The entry
/// is removed before the function is handed out, so the returned closure
/// can safely post new ticks.
#[must_use]
pub fn take(handle: u64) -> Option<PendingTick> {
    BROKER.with(|broker| broker.borrow_mut().pending.remove(&handle))
}

/// Number of not-yet-dispatched ticks on this thread.
#[must_use]
pub fn pending_count() -> usize {
    BROKER.with(|broker| broker.borrow().pending.len())
}
