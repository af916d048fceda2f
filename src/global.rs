//! Global scheduler installation.
//!
//! One scheduler can be installed per host thread. [`install`] populates
//! the slot with a fresh [`Scheduler`] when it is empty and is a no-op
//! otherwise. An embedder with its own scheduler can claim the slot first
//! through [`install_foreign`]; yields then go through the object-safe
//! [`GlobalScheduler`] surface, where signal and priority inheritance are
//! unsupported (the foreign scheduler's internals are not observable) and
//! degrade to the default continuation.

use crate::host::Host;
use crate::scheduler::yield_point::{continuation_priority, YieldOptions, YieldPriority};
use crate::scheduler::{Scheduler, TaskHandle};
use crate::tracing_compat::debug;
use crate::types::TaskPriority;
use std::cell::RefCell;
use std::rc::Rc;

/// The object-safe surface a foreign scheduler exposes to the shim.
pub trait GlobalScheduler {
    /// Posts an empty-bodied continuation at the given priority and
    /// returns the handle settled when it runs.
    fn post_continuation(&self, priority: TaskPriority, continuation: Box<dyn FnOnce()>)
        -> TaskHandle<()>;
}

impl GlobalScheduler for Scheduler {
    fn post_continuation(
        &self,
        priority: TaskPriority,
        continuation: Box<dyn FnOnce()>,
    ) -> TaskHandle<()> {
        self.post_task(
            continuation,
            crate::scheduler::PostTaskOptions::new().priority(priority),
        )
    }
}

enum Resident {
    Native(Scheduler),
    Foreign(Rc<dyn GlobalScheduler>),
}

thread_local! {
    static RESIDENT: RefCell<Option<Resident>> = const { RefCell::new(None) };
}

/// Installs a fresh scheduler over `host` if the slot is empty.
///
/// Returns true when this call installed; false when a scheduler (native
/// or foreign) was already resident, which leaves the resident untouched.
pub fn install(host: Rc<dyn Host>) -> bool {
    RESIDENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return false;
        }
        debug!("installing global scheduler");
        *slot = Some(Resident::Native(Scheduler::new(host)));
        true
    })
}

/// Claims the slot for an embedder-provided scheduler, if it is empty.
pub fn install_foreign(scheduler: Rc<dyn GlobalScheduler>) -> bool {
    RESIDENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return false;
        }
        debug!("installing foreign global scheduler");
        *slot = Some(Resident::Foreign(scheduler));
        true
    })
}

/// Returns the installed native scheduler, if any. Foreign residents are
/// reachable only through [`yield_now`].
#[must_use]
pub fn scheduler() -> Option<Scheduler> {
    RESIDENT.with(|slot| match &*slot.borrow() {
        Some(Resident::Native(s)) => Some(s.clone()),
        _ => None,
    })
}

/// True while any scheduler is resident on this thread.
#[must_use]
pub fn is_installed() -> bool {
    RESIDENT.with(|slot| slot.borrow().is_some())
}

/// Yields through the resident scheduler.
///
/// A native resident gets full yield semantics; a foreign resident gets
/// the degraded path: explicit priorities map through the boost table,
/// signals are ignored. With no resident the handle rejects immediately.
pub fn yield_now(options: YieldOptions) -> TaskHandle<()> {
    enum Route {
        Native(Scheduler),
        Foreign(Rc<dyn GlobalScheduler>),
        None,
    }
    let route = RESIDENT.with(|slot| match &*slot.borrow() {
        Some(Resident::Native(s)) => Route::Native(s.clone()),
        Some(Resident::Foreign(s)) => Route::Foreign(Rc::clone(s)),
        None => Route::None,
    });
    match route {
        Route::Native(s) => s.yield_now(options),
        Route::Foreign(s) => {
            let requested = match options.requested_priority() {
                Some(YieldPriority::Priority(priority)) => Some(priority),
                _ => None,
            };
            s.post_continuation(continuation_priority(requested), Box::new(|| ()))
        }
        Route::None => TaskHandle::rejected(crate::error::Error::no_scheduler()),
    }
}

/// Clears the slot. Intended for tests and embedders tearing down a host.
pub fn reset() {
    RESIDENT.with(|slot| {
        *slot.borrow_mut() = None;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::VirtualHost;
    use crate::test_utils::init_test_logging;

    fn init_test(name: &str) {
        init_test_logging();
        reset();
        crate::test_phase!(name);
    }

    #[test]
    fn install_is_idempotent() {
        init_test("install_is_idempotent");
        let host = Rc::new(VirtualHost::new());
        assert!(!is_installed());
        assert!(install(Rc::clone(&host) as Rc<dyn Host>));
        assert!(!install(host as Rc<dyn Host>));
        assert!(scheduler().is_some());
        reset();
        crate::test_complete!("install_is_idempotent");
    }

    #[test]
    fn yield_without_scheduler_rejects() {
        init_test("yield_without_scheduler_rejects");
        let handle = yield_now(YieldOptions::new());
        let err = handle
            .try_result()
            .expect("settled")
            .expect_err("rejected");
        assert_eq!(err.kind(), crate::error::ErrorKind::NoScheduler);
        crate::test_complete!("yield_without_scheduler_rejects");
    }

    #[test]
    fn foreign_resident_blocks_native_install() {
        init_test("foreign_resident_blocks_native_install");
        struct Inline;
        impl GlobalScheduler for Inline {
            fn post_continuation(
                &self,
                _priority: TaskPriority,
                continuation: Box<dyn FnOnce()>,
            ) -> TaskHandle<()> {
                let (handle, completer) = TaskHandle::channel();
                continuation();
                completer.resolve(());
                handle
            }
        }
        assert!(install_foreign(Rc::new(Inline)));
        let host = Rc::new(VirtualHost::new());
        assert!(!install(host as Rc<dyn Host>));
        assert!(scheduler().is_none(), "foreign resident is not a native scheduler");
        let handle = yield_now(YieldOptions::new());
        assert!(matches!(handle.try_result(), Some(Ok(()))));
        reset();
        crate::test_complete!("foreign_resident_blocks_native_install");
    }
}
