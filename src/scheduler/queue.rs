//! Intrusive per-priority run queues.
//!
//! Each priority has one FIFO. The links live inside the task records (in
//! the dispatcher's arena), so push, pop, and mid-queue unlink are O(1)
//! with no per-node allocation, and a merge can move records between
//! queues without invalidating anything.
//!
//! Ordering is carried by the `sequence` field: a process-wide monotonic
//! counter assigned at queue insertion. Within any queue, sequences are
//! strictly increasing from head to tail; a merge preserves the original
//! sequence of every moved task, so cross-priority posting order survives
//! re-prioritization.

use crate::scheduler::task::Task;
use crate::tracing_compat::trace;
use crate::util::{Arena, ArenaIndex};
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Hands out the next global posting-order sequence number.
pub(crate) fn next_sequence() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// An intrusive doubly-linked FIFO of task records.
#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    head: Option<ArenaIndex>,
    tail: Option<ArenaIndex>,
    len: usize,
}

impl TaskQueue {
    pub(crate) const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Appends a task, assigning its sequence number. O(1).
    pub(crate) fn push(&mut self, tasks: &mut Arena<Task>, key: ArenaIndex) {
        let sequence = next_sequence();
        {
            let task = tasks.get_mut(key).expect("pushed task must be live");
            debug_assert!(
                task.prev.is_none() && task.next.is_none(),
                "a task may be on at most one queue"
            );
            task.sequence = sequence;
        }
        self.link_back(tasks, key);
    }

    /// Unlinks and returns the head, if any.
    pub(crate) fn take_next_task(&mut self, tasks: &mut Arena<Task>) -> Option<ArenaIndex> {
        let head = self.head?;
        self.unlink(tasks, head);
        Some(head)
    }

    /// Unlinks `key` from anywhere in the queue. O(1).
    pub(crate) fn unlink(&mut self, tasks: &mut Arena<Task>, key: ArenaIndex) {
        let (prev, next) = {
            let task = tasks.get_mut(key).expect("unlinked task must be live");
            (task.prev.take(), task.next.take())
        };
        match prev {
            Some(p) => tasks.get_mut(p).expect("prev link is live").next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => tasks.get_mut(n).expect("next link is live").prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
    }

    /// Links an already-sequenced task at the tail.
    fn link_back(&mut self, tasks: &mut Arena<Task>, key: ArenaIndex) {
        {
            let task = tasks.get_mut(key).expect("linked task must be live");
            task.prev = self.tail;
            task.next = None;
        }
        match self.tail {
            Some(t) => tasks.get_mut(t).expect("tail is live").next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        self.len += 1;
    }

    /// Links an already-sequenced task immediately before `before`.
    fn link_before(&mut self, tasks: &mut Arena<Task>, key: ArenaIndex, before: ArenaIndex) {
        let prev = tasks.get(before).expect("insertion point is live").prev;
        {
            let task = tasks.get_mut(key).expect("linked task must be live");
            task.prev = prev;
            task.next = Some(before);
        }
        tasks.get_mut(before).expect("insertion point is live").prev = Some(key);
        match prev {
            Some(p) => tasks.get_mut(p).expect("prev link is live").next = Some(key),
            None => self.head = Some(key),
        }
        self.len += 1;
    }

    /// Moves every task in `source` matching `selector` into `self`,
    /// keeping both queues in strictly increasing sequence order.
    ///
    /// Single forward pass: source tasks surface in increasing sequence, so
    /// the insertion cursor into the receiver only ever advances. Moved
    /// tasks keep their original sequence; non-matching tasks keep their
    /// relative order in `source`. O(|source| + |receiver|).
    pub(crate) fn merge<F>(
        &mut self,
        tasks: &mut Arena<Task>,
        source: &mut TaskQueue,
        selector: F,
    ) -> usize
    where
        F: Fn(&Task) -> bool,
    {
        let mut moved = 0;
        let mut cursor = self.head;
        let mut current = source.head;
        while let Some(key) = current {
            let next_in_source = tasks.get(key).expect("queued task must be live").next;
            if selector(tasks.get(key).expect("queued task must be live")) {
                source.unlink(tasks, key);
                let sequence = tasks.get(key).expect("moved task is live").sequence;
                while let Some(c) = cursor {
                    if tasks.get(c).expect("receiver task is live").sequence > sequence {
                        break;
                    }
                    cursor = tasks.get(c).expect("receiver task is live").next;
                }
                match cursor {
                    Some(before) => self.link_before(tasks, key, before),
                    // Past the receiver's tail: append fast-path.
                    None => self.link_back(tasks, key),
                }
                moved += 1;
            }
            current = next_in_source;
        }
        if moved > 0 {
            trace!(moved, "queue merge moved tasks");
        }
        moved
    }

    /// Head-to-tail keys, for tests and diagnostics.
    #[cfg(test)]
    pub(crate) fn keys(&self, tasks: &Arena<Task>) -> Vec<ArenaIndex> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(key) = cursor {
            out.push(key);
            cursor = tasks.get(key).expect("queued task must be live").next;
        }
        out
    }

    /// Checks every structural invariant; panics on violation.
    #[cfg(test)]
    pub(crate) fn assert_well_formed(&self, tasks: &Arena<Task>) {
        let keys = self.keys(tasks);
        assert_eq!(keys.len(), self.len, "len matches walk");
        assert_eq!(self.head, keys.first().copied(), "head matches walk");
        assert_eq!(self.tail, keys.last().copied(), "tail matches walk");
        let mut last_sequence = None;
        let mut prev_key = None;
        for key in &keys {
            let task = tasks.get(*key).expect("queued task must be live");
            assert_eq!(task.prev, prev_key, "prev link consistent");
            if let Some(last) = last_sequence {
                assert!(task.sequence > last, "sequence strictly increasing");
            }
            last_sequence = Some(task.sequence);
            prev_key = Some(*key);
        }
    }
}
