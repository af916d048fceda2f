//! E2E: execution order — priority dominance, intra-priority FIFO, and the
//! stable-sort law for signal-free, delay-free task sets.

mod common;

use common::{append, fixture, trace_buf};
use proptest::prelude::*;
use tasklane::test_logging::{TestEvent, TestLogLevel, TestLogger};
use tasklane::{assert_log, assert_with_log, test_complete, test_log, test_phase, test_section};
use tasklane::{PostTaskOptions, TaskController, TaskPriority};

#[test]
fn priority_fan_in() {
    common::init_test_logging();
    test_phase!("priority_fan_in");
    let (host, scheduler) = fixture();
    let buf = trace_buf();
    let logger = TestLogger::new(TestLogLevel::Trace);

    for (task, tag, priority) in [
        (3_u64, "3", TaskPriority::Background),
        (2, "2", TaskPriority::UserVisible),
        (1, "1", TaskPriority::UserBlocking),
    ] {
        logger.log(TestEvent::TaskPosted {
            task,
            priority: priority.name(),
            delay_ms: 0,
        });
        let _ = scheduler.post_task(append(&buf, tag), PostTaskOptions::new().priority(priority));
    }

    test_log!(logger, "run", "draining {} posted tasks", 3);
    host.run();
    assert_log!(
        logger,
        *buf.borrow() == "123",
        "dominance order violated: {}",
        buf.borrow()
    );
    test_complete!("priority_fan_in");
}

#[test]
fn intra_priority_fifo() {
    common::init_test_logging();
    test_phase!("intra_priority_fifo");
    let (host, scheduler) = fixture();
    let buf = trace_buf();

    // Posted lowest priority first; each priority keeps posting order.
    let posts: [(&'static str, TaskPriority); 9] = [
        ("7", TaskPriority::Background),
        ("8", TaskPriority::Background),
        ("9", TaskPriority::Background),
        ("4", TaskPriority::UserVisible),
        ("5", TaskPriority::UserVisible),
        ("6", TaskPriority::UserVisible),
        ("1", TaskPriority::UserBlocking),
        ("2", TaskPriority::UserBlocking),
        ("3", TaskPriority::UserBlocking),
    ];
    for (tag, priority) in posts {
        let _ = scheduler.post_task(append(&buf, tag), PostTaskOptions::new().priority(priority));
    }

    host.run();
    assert_with_log!(
        *buf.borrow() == "123456789",
        "stable order across nine tasks",
        "123456789",
        buf.borrow()
    );
    test_complete!("intra_priority_fifo");
}

#[test]
fn priority_pin_beats_signal() {
    common::init_test_logging();
    test_phase!("priority_pin_beats_signal");
    let (host, scheduler) = fixture();
    let buf = trace_buf();

    let controller = TaskController::with_priority(TaskPriority::UserBlocking);
    let signal = controller.signal();

    test_section!("post");
    for tag in ["1", "2"] {
        let _ = scheduler.post_task(
            append(&buf, tag),
            PostTaskOptions::new().signal(signal.clone()),
        );
    }
    // Task 3 pins background; the user-blocking signal must not lift it.
    let _ = scheduler.post_task(
        append(&buf, "3"),
        PostTaskOptions::new()
            .signal(signal.clone())
            .priority(TaskPriority::Background),
    );
    for tag in ["4", "5"] {
        let _ = scheduler.post_task(
            append(&buf, tag),
            PostTaskOptions::new().signal(signal.clone()),
        );
    }

    test_section!("run");
    host.run();
    assert_with_log!(
        *buf.borrow() == "12453",
        "pinned priority holds",
        "12453",
        buf.borrow()
    );
    test_complete!("priority_pin_beats_signal");
}

#[test]
fn handles_resolve_with_callback_values() {
    common::init_test_logging();
    test_phase!("handles_resolve_with_callback_values");
    let (host, scheduler) = fixture();

    let a = scheduler.post_task(|| 40 + 2, PostTaskOptions::new());
    let b = scheduler.post_task(
        || String::from("background result"),
        PostTaskOptions::new().priority(TaskPriority::Background),
    );

    host.run();
    assert_eq!(a.try_result().expect("settled").expect("resolved"), 42);
    assert_eq!(
        b.try_result().expect("settled").expect("resolved"),
        "background result"
    );
    test_complete!("handles_resolve_with_callback_values");
}

proptest! {
    // For any signal-free, delay-free task set, execution order is the
    // stable sort by (priority rank, posting order).
    #[test]
    fn execution_is_stable_sort(ranks in proptest::collection::vec(0_usize..3, 0..24)) {
        let (host, scheduler) = fixture();
        let ran: std::rc::Rc<std::cell::RefCell<Vec<usize>>> = std::rc::Rc::default();

        for (index, rank) in ranks.iter().enumerate() {
            let ran = std::rc::Rc::clone(&ran);
            let _ = scheduler.post_task(
                move || ran.borrow_mut().push(index),
                PostTaskOptions::new().priority(TaskPriority::from_rank(*rank)),
            );
        }
        host.run();

        let mut expected: Vec<usize> = (0..ranks.len()).collect();
        expected.sort_by_key(|index| ranks[*index]); // stable sort keeps posting order
        prop_assert_eq!(&*ran.borrow(), &expected);
    }
}
