//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use tasklane::lab::VirtualHost;
use tasklane::{Host, Scheduler};

/// Initializes tracing for tests; only the first call installs.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

/// A scheduler over a fresh virtual host.
pub fn fixture() -> (Rc<VirtualHost>, Scheduler) {
    let host = Rc::new(VirtualHost::new());
    let scheduler = Scheduler::new(Rc::clone(&host) as Rc<dyn Host>);
    (host, scheduler)
}

/// Execution-order trace shared between callbacks and assertions.
pub type Trace = Rc<RefCell<String>>;

pub fn trace_buf() -> Trace {
    Rc::new(RefCell::new(String::new()))
}

/// A callback appending `tag` to the trace when it runs.
pub fn append(buf: &Trace, tag: &'static str) -> impl FnOnce() + 'static {
    let buf = Rc::clone(buf);
    move || buf.borrow_mut().push_str(tag)
}
