//! E2E: cancellation — lazy skipping of aborted queued tasks, immediate
//! rejection for already-aborted signals, delay-timer cancellation, abort
//! during execution, and callback panic isolation.

mod common;

use common::{append, fixture, trace_buf};
use tasklane::{assert_with_log, test_complete, test_phase, test_section};
use tasklane::{
    AbortController, AbortReason, ErrorKind, PostTaskOptions, TaskController, TaskPriority, Time,
};

#[test]
fn aborted_tasks_are_skipped() {
    common::init_test_logging();
    test_phase!("aborted_tasks_are_skipped");
    let (host, scheduler) = fixture();
    let buf = trace_buf();

    let controller = AbortController::new();
    let signal = controller.signal();

    test_section!("post");
    let _h1 = scheduler.post_task(append(&buf, "1"), PostTaskOptions::new());
    let h2 = scheduler.post_task(
        append(&buf, "2"),
        PostTaskOptions::new().signal(signal.clone()),
    );
    let _h3 = scheduler.post_task(append(&buf, "3"), PostTaskOptions::new());
    let h4 = scheduler.post_task(append(&buf, "4"), PostTaskOptions::new().signal(signal));
    let _h5 = scheduler.post_task(append(&buf, "5"), PostTaskOptions::new());

    test_section!("abort after submission");
    let reason = AbortReason::message("dropped");
    controller.abort_with(reason.clone());

    // Handles reject at abort time, before any dispatch.
    let err2 = h2.try_result().expect("settled").expect_err("rejected");
    assert_eq!(err2.kind(), ErrorKind::Aborted);
    assert_eq!(err2.abort_reason(), Some(&reason));
    let err4 = h4.try_result().expect("settled").expect_err("rejected");
    assert_eq!(err4.abort_reason(), Some(&reason));

    test_section!("run");
    host.run();
    assert_with_log!(
        *buf.borrow() == "135",
        "aborted tasks skipped at dispatch",
        "135",
        buf.borrow()
    );
    test_complete!("aborted_tasks_are_skipped");
}

#[test]
fn already_aborted_signal_rejects_immediately() {
    common::init_test_logging();
    test_phase!("already_aborted_signal_rejects_immediately");
    let (host, scheduler) = fixture();

    let controller = AbortController::new();
    let reason = AbortReason::new(410_u32);
    controller.abort_with(reason.clone());

    let handle = scheduler.post_task::<(), _>(
        || unreachable!("must not run"),
        PostTaskOptions::new().signal(controller.signal()),
    );

    // Rejected synchronously, with exactly the signal's reason.
    let err = handle.try_result().expect("settled").expect_err("rejected");
    assert_eq!(err.kind(), ErrorKind::Aborted);
    assert_eq!(err.abort_reason(), Some(&reason));
    assert_eq!(
        err.abort_reason().and_then(|r| r.downcast_ref::<u32>()),
        Some(&410)
    );

    host.run();
    assert!(!host.has_pending_work());
    test_complete!("already_aborted_signal_rejects_immediately");
}

#[test]
fn abort_during_delay_cancels_timer() {
    common::init_test_logging();
    test_phase!("abort_during_delay_cancels_timer");
    let (host, scheduler) = fixture();
    let buf = trace_buf();

    let controller = TaskController::new();
    let handle = scheduler.post_task(
        append(&buf, "x"),
        PostTaskOptions::new()
            .signal(controller.signal())
            .delay(Time::from_millis(5)),
    );
    assert!(host.has_pending_work(), "delay timer armed");

    let reason = AbortReason::message("too late");
    controller.abort_with(reason.clone());

    let err = handle.try_result().expect("settled").expect_err("rejected");
    assert_eq!(err.abort_reason(), Some(&reason));
    assert_with_log!(
        !host.has_pending_work(),
        "timer cancelled by abort",
        false,
        host.has_pending_work()
    );

    host.run();
    assert_with_log!(buf.borrow().is_empty(), "callback never ran", "", buf.borrow());
    test_complete!("abort_during_delay_cancels_timer");
}

#[test]
fn abort_after_start_is_a_noop_on_the_task() {
    common::init_test_logging();
    test_phase!("abort_after_start_is_a_noop_on_the_task");
    let (host, scheduler) = fixture();

    let controller = std::rc::Rc::new(TaskController::new());
    let inner = std::rc::Rc::clone(&controller);
    let handle = scheduler.post_task(
        move || {
            // Aborting the own signal mid-run must not affect the outcome.
            inner.abort_with(AbortReason::message("mid-run"));
            "finished"
        },
        PostTaskOptions::new().signal(controller.signal()),
    );

    host.run();
    let result = handle.try_result().expect("settled").expect("resolved");
    assert_with_log!(result == "finished", "callback outcome wins", "finished", result);
    test_complete!("abort_after_start_is_a_noop_on_the_task");
}

#[test]
fn callback_panic_rejects_only_that_task() {
    common::init_test_logging();
    test_phase!("callback_panic_rejects_only_that_task");
    let (host, scheduler) = fixture();
    let buf = trace_buf();

    let boom = scheduler.post_task::<(), _>(|| panic!("task exploded"), PostTaskOptions::new());
    let after = scheduler.post_task(append(&buf, "after"), PostTaskOptions::new());

    host.run();
    let err = boom.try_result().expect("settled").expect_err("rejected");
    assert_eq!(err.kind(), ErrorKind::CallbackPanicked);
    assert_eq!(err.message(), Some("task exploded"));
    assert!(after.try_result().expect("settled").is_ok());
    assert_with_log!(
        *buf.borrow() == "after",
        "scheduler survives a panicking callback",
        "after",
        buf.borrow()
    );
    test_complete!("callback_panic_rejects_only_that_task");
}

#[test]
fn abort_from_within_a_running_callback_skips_later_tasks() {
    common::init_test_logging();
    test_phase!("abort_from_within_a_running_callback_skips_later_tasks");
    let (host, scheduler) = fixture();
    let buf = trace_buf();

    let controller = std::rc::Rc::new(AbortController::new());
    let signal = controller.signal();

    let killer = std::rc::Rc::clone(&controller);
    let _first = scheduler.post_task(
        move || killer.abort_with(AbortReason::message("cascade")),
        PostTaskOptions::new(),
    );
    let doomed = scheduler.post_task(
        append(&buf, "doomed"),
        PostTaskOptions::new().signal(signal).priority(TaskPriority::Background),
    );

    host.run();
    assert!(buf.borrow().is_empty(), "aborted follower never ran");
    let err = doomed.try_result().expect("settled").expect_err("rejected");
    assert_eq!(err.kind(), ErrorKind::Aborted);
    test_complete!("abort_from_within_a_running_callback_skips_later_tasks");
}
