//! E2E: delay handling — expired tasks queue behind work that arrived
//! during the delay, the pending wake is replaced on expiry, and the
//! preserved edge case where a background task runs inside a wake armed
//! for higher-priority work.

mod common;

use common::{append, fixture, trace_buf};
use std::rc::Rc;
use tasklane::lab::VirtualHost;
use tasklane::{assert_with_log, test_complete, test_phase, test_section};
use tasklane::{
    AbortController, EventLoop, Host, PostTaskOptions, Scheduler, TaskPriority, Time,
};

#[test]
fn late_delayed_background_runs_behind_newer_tasks() {
    common::init_test_logging();
    test_phase!("late_delayed_background_runs_behind_newer_tasks");
    let (host, scheduler) = fixture();
    let buf = trace_buf();

    test_section!("post delayed background");
    let _bg = scheduler.post_task(
        append(&buf, "bg"),
        PostTaskOptions::new()
            .priority(TaskPriority::Background)
            .delay(Time::from_millis(2)),
    );

    test_section!("post busy default task");
    let busy_host = Rc::clone(&host);
    let busy_scheduler = scheduler.clone();
    let busy_buf = Rc::clone(&buf);
    let _busy = scheduler.post_task(
        move || {
            busy_buf.borrow_mut().push_str("busy,");
            // Spin past the background task's deadline, then queue two
            // more default tasks from inside the callback.
            busy_host.spin(Time::from_millis(5));
            let _ = busy_scheduler.post_task(append(&busy_buf, "a,"), PostTaskOptions::new());
            let _ = busy_scheduler.post_task(append(&busy_buf, "b,"), PostTaskOptions::new());
        },
        PostTaskOptions::new(),
    );

    test_section!("run");
    host.run();
    assert_with_log!(
        *buf.borrow() == "busy,a,b,bg",
        "delayed background lands last",
        "busy,a,b,bg",
        buf.borrow()
    );
    test_complete!("late_delayed_background_runs_behind_newer_tasks");
}

#[test]
fn expired_task_queues_behind_same_priority_arrivals() {
    common::init_test_logging();
    test_phase!("expired_task_queues_behind_same_priority_arrivals");
    let host = Rc::new(VirtualHost::new());
    let scheduler = Scheduler::new(Rc::clone(&host) as Rc<dyn Host>);
    let buf = trace_buf();

    let _delayed = scheduler.post_task(
        append(&buf, "d"),
        PostTaskOptions::new().delay(Time::from_millis(1)),
    );

    // Arrives during the delay at the same priority; it was queued first,
    // so it runs first.
    let _fresh = scheduler.post_task(append(&buf, "f"), PostTaskOptions::new());

    host.run();
    assert_with_log!(
        *buf.borrow() == "fd",
        "delay expiry does not cut the queue",
        "fd",
        buf.borrow()
    );
    test_complete!("expired_task_queues_behind_same_priority_arrivals");
}

// The edge case carried from the source: dispatch picks the highest
// non-empty queue no matter which host mode delivered the wake, so a
// background task may run inside an immediate wake when the task the wake
// was armed for got aborted.
#[test]
fn background_task_may_run_in_immediate_wake() {
    common::init_test_logging();
    test_phase!("background_task_may_run_in_immediate_wake");
    let (host, scheduler) = fixture();
    let buf = trace_buf();

    let _bg = scheduler.post_task(
        append(&buf, "bg"),
        PostTaskOptions::new().priority(TaskPriority::Background),
    );

    let controller = AbortController::new();
    let _ub = scheduler.post_task(
        append(&buf, "ub"),
        PostTaskOptions::new()
            .signal(controller.signal())
            .priority(TaskPriority::UserBlocking),
    );
    // The pending wake was upgraded to immediate for the user-blocking
    // task; aborting it leaves that wake to deliver the background task.
    controller.abort();

    test_section!("single wake");
    assert!(host.turn(), "the immediate wake fires");
    assert_with_log!(
        *buf.borrow() == "bg",
        "background ran inside the non-background wake",
        "bg",
        buf.borrow()
    );
    host.run();
    test_complete!("background_task_may_run_in_immediate_wake");
}

#[test]
fn delayed_task_runs_on_real_event_loop() {
    common::init_test_logging();
    test_phase!("delayed_task_runs_on_real_event_loop");
    let host = Rc::new(EventLoop::new());
    let scheduler = Scheduler::new(Rc::clone(&host) as Rc<dyn Host>);
    let buf = trace_buf();

    let delayed = scheduler.post_task(
        append(&buf, "bg"),
        PostTaskOptions::new()
            .priority(TaskPriority::Background)
            .delay(Time::from_millis(2)),
    );
    let eager_buf = Rc::clone(&buf);
    let eager_scheduler = scheduler.clone();
    let _busy = scheduler.post_task(
        move || {
            eager_buf.borrow_mut().push_str("busy,");
            let started = std::time::Instant::now();
            while started.elapsed() < std::time::Duration::from_millis(5) {
                std::hint::spin_loop();
            }
            let _ = eager_scheduler.post_task(append(&eager_buf, "a,"), PostTaskOptions::new());
            let _ = eager_scheduler.post_task(append(&eager_buf, "b,"), PostTaskOptions::new());
        },
        PostTaskOptions::new(),
    );

    host.run();
    assert_with_log!(
        *buf.borrow() == "busy,a,b,bg",
        "real host keeps the delayed background last",
        "busy,a,b,bg",
        buf.borrow()
    );
    assert!(delayed.try_result().expect("settled").is_ok());
    test_complete!("delayed_task_runs_on_real_event_loop");
}
