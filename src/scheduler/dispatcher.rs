//! The priority dispatcher.
//!
//! Owns the task arena, the three run queues, the single pending host
//! wake, and the weak table of watched task signals. One dispatch entry
//! runs exactly one non-aborted task, then re-arms the host wake if work
//! remains.
//!
//! Invariants kept here:
//!
//! - at most one host wake is outstanding; an idle-mode wake is cancelled
//!   and replaced when non-background work arrives (the upgrade path)
//! - aborted queued tasks are skipped at pop time, not unlinked eagerly
//! - a delayed task joins its queue only when its timer fires, so it can
//!   never cut ahead of work that arrived during the delay
//! - dispatch always picks the highest non-empty queue, regardless of
//!   which host mode delivered the wake

use crate::host::{Host, HostCallback};
use crate::scheduler::queue::TaskQueue;
use crate::scheduler::task::{Completion, PrioritySource, Task};
use crate::signal::task_signal::TaskSignalCore;
use crate::signal::{AbortReason, AnySignal, TaskSignal};
use crate::tracing_compat::{debug, trace};
use crate::types::{TaskPriority, Time};
use crate::util::{Arena, ArenaIndex};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// A watched task signal and the priority it last held.
struct WatchedSignal {
    signal: Weak<TaskSignalCore>,
    priority: TaskPriority,
}

struct DispatchState {
    tasks: Arena<Task>,
    queues: [TaskQueue; TaskPriority::COUNT],
    /// At most one outstanding host wake.
    pending_host: Option<HostCallback>,
    signals: Vec<WatchedSignal>,
}

impl DispatchState {
    /// Highest priority with a non-empty queue. Aborted tasks still count;
    /// they are discarded at pop time.
    fn highest_runnable(&self) -> Option<TaskPriority> {
        self.queues
            .iter()
            .position(|q| !q.is_empty())
            .map(TaskPriority::from_rank)
    }

    /// Mutable access to two distinct queues by rank.
    fn queue_pair(&mut self, dst: usize, src: usize) -> (&mut Arena<Task>, &mut TaskQueue, &mut TaskQueue) {
        debug_assert_ne!(dst, src);
        let tasks = &mut self.tasks;
        let queues = &mut self.queues;
        if dst < src {
            let (lo, hi) = queues.split_at_mut(src);
            (tasks, &mut lo[dst], &mut hi[0])
        } else {
            let (lo, hi) = queues.split_at_mut(dst);
            (tasks, &mut hi[0], &mut lo[src])
        }
    }
}

/// Everything a task submission needs besides its handle.
pub(crate) struct SubmitSpec {
    pub(crate) invoke: Box<dyn FnOnce()>,
    pub(crate) completion: Rc<dyn Completion>,
    pub(crate) priority: TaskPriority,
    pub(crate) source: PrioritySource,
    pub(crate) signal: Option<AnySignal>,
    pub(crate) delay: Time,
}

pub(crate) struct SchedulerCore {
    host: Rc<dyn Host>,
    state: RefCell<DispatchState>,
}

impl SchedulerCore {
    pub(crate) fn new(host: Rc<dyn Host>, task_capacity: usize) -> Rc<Self> {
        Rc::new(Self {
            host,
            state: RefCell::new(DispatchState {
                tasks: Arena::with_capacity(task_capacity),
                queues: [TaskQueue::new(), TaskQueue::new(), TaskQueue::new()],
                pending_host: None,
                signals: Vec::new(),
            }),
        })
    }

    /// Submits a task: handles the already-aborted short-circuit, creates
    /// the record, wires the abort listener, and either starts the delay
    /// timer or enqueues and arms a host wake.
    pub(crate) fn submit(self: &Rc<Self>, spec: SubmitSpec) {
        if let Some(signal) = &spec.signal {
            if signal.aborted() {
                let reason = signal.reason().unwrap_or_else(AbortReason::abort_error);
                spec.completion
                    .reject(crate::error::Error::aborted(reason));
                return;
            }
        }

        let watched = match (spec.source, &spec.signal) {
            (PrioritySource::Signal, Some(signal)) => {
                signal.as_task_signal().map(TaskSignal::core_weak)
            }
            _ => None,
        };

        let signal = spec.signal.clone();
        let key = self.state.borrow_mut().tasks.insert(Task::new(
            spec.invoke,
            spec.completion,
            spec.priority,
            spec.source,
            spec.signal,
            watched,
        ));

        if let Some(signal) = signal {
            let weak = Rc::downgrade(self);
            let listener = signal.on_abort(move |reason| {
                if let Some(core) = weak.upgrade() {
                    core.on_task_aborted(key, reason.clone());
                }
            });
            if let Some(task) = self.state.borrow_mut().tasks.get_mut(key) {
                task.abort_listener = Some(listener);
            }
        }

        if spec.delay.is_zero() {
            trace!(priority = %spec.priority, "task queued");
            {
                let mut state = self.state.borrow_mut();
                let state = &mut *state;
                state.queues[spec.priority.rank()].push(&mut state.tasks, key);
            }
            self.schedule_host_if_needed();
        } else {
            trace!(priority = %spec.priority, delay = %spec.delay, "task delayed");
            let weak = Rc::downgrade(self);
            let timer = HostCallback::new(
                &self.host,
                Box::new(move || {
                    if let Some(core) = weak.upgrade() {
                        core.on_delay_expired(key);
                    }
                }),
                None,
                spec.delay,
            );
            if let Some(task) = self.state.borrow_mut().tasks.get_mut(key) {
                task.delay_callback = Some(timer);
            }
        }
    }

    /// A delayed task's timer fired: enqueue it and re-enter the dispatch
    /// loop, replacing any pending wake so the wake mode matches the new
    /// queue picture.
    fn on_delay_expired(self: &Rc<Self>, key: ArenaIndex) {
        {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let Some(task) = state.tasks.get_mut(key) else {
                // Aborted during the delay; the record is already gone.
                return;
            };
            task.delay_callback = None;
            // A signal-sourced priority resolves against the signal's
            // current value; the signal may have changed during the delay.
            if let Some(core) = task.watched_signal.as_ref().and_then(Weak::upgrade) {
                task.priority = core.priority();
            }
            let rank = task.priority.rank();
            state.queues[rank].push(&mut state.tasks, key);
            if let Some(pending) = state.pending_host.take() {
                pending.cancel();
            }
        }
        self.schedule_host_if_needed();
    }

    /// A task's signal aborted: settle the handle with the reason now.
    /// A delayed task also drops its timer and record; a queued task stays
    /// linked and is discarded when popped.
    fn on_task_aborted(self: &Rc<Self>, key: ArenaIndex, reason: AbortReason) {
        let completion = {
            let mut state = self.state.borrow_mut();
            let Some(task) = state.tasks.get_mut(key) else {
                trace!("abort for settled task ignored");
                return;
            };
            if task.aborted {
                return;
            }
            task.aborted = true;
            task.abort_listener = None;
            if let Some(timer) = task.delay_callback.take() {
                timer.cancel();
                // Delayed tasks are on no queue; drop the record now.
                let task = state
                    .tasks
                    .remove(key)
                    .expect("delayed task record is live");
                task.completion
            } else {
                Rc::clone(&task.completion)
            }
        };
        debug!("task aborted");
        completion.reject(crate::error::Error::aborted(reason));
    }

    /// Arms a host wake when runnable work exists and none is pending.
    /// An idle-mode wake is upgraded (cancel + replace) when the highest
    /// runnable priority is no longer background.
    pub(crate) fn schedule_host_if_needed(self: &Rc<Self>) {
        let mut state = self.state.borrow_mut();
        let Some(priority) = state.highest_runnable() else {
            return;
        };
        let upgrade = state
            .pending_host
            .as_ref()
            .is_some_and(|cb| cb.is_idle() && priority != TaskPriority::Background);
        if upgrade {
            if let Some(pending) = state.pending_host.take() {
                trace!(priority = %priority, "upgrading idle host wake");
                pending.cancel();
            }
        }
        if state.pending_host.is_some() {
            return;
        }
        let weak = Rc::downgrade(self);
        let entry = Box::new(move || {
            if let Some(core) = weak.upgrade() {
                core.scheduler_entry();
            }
        });
        state.pending_host = Some(HostCallback::new(&self.host, entry, Some(priority), Time::ZERO));
    }

    /// One dispatch tick: clear the pending wake, run one non-aborted
    /// task, re-arm if work remains.
    fn scheduler_entry(self: &Rc<Self>) {
        self.state.borrow_mut().pending_host = None;
        self.run_next_task();
        self.schedule_host_if_needed();
    }

    /// Pops from the highest non-empty queue until a non-aborted task is
    /// found, then runs it. Aborted records are discarded along the way;
    /// their handles were already rejected.
    fn run_next_task(self: &Rc<Self>) {
        loop {
            let popped = {
                let mut state = self.state.borrow_mut();
                let state = &mut *state;
                let mut popped = None;
                for queue in &mut state.queues {
                    if let Some(key) = queue.take_next_task(&mut state.tasks) {
                        popped = Some(key);
                        break;
                    }
                }
                popped.map(|key| {
                    state
                        .tasks
                        .remove(key)
                        .expect("popped task record is live")
                })
            };
            let Some(mut task) = popped else {
                return;
            };
            if task.aborted {
                trace!(sequence = task.sequence, "skipping aborted task");
                continue;
            }
            trace!(priority = %task.priority, sequence = task.sequence, "running task");
            let invoke = task.invoke.take().expect("unran task has its callback");
            // The state borrow is released: the callback may post tasks,
            // abort signals, or change priorities re-entrantly.
            invoke();
            if let (Some(signal), Some(listener)) = (task.signal.as_ref(), task.abort_listener.take())
            {
                signal.remove_abort_listener(listener);
            }
            return;
        }
    }

    /// Starts watching a task signal the first time it decides a task's
    /// priority. The table holds only a weak reference; the subscription
    /// lives as long as the signal does.
    pub(crate) fn watch_signal(self: &Rc<Self>, signal: &TaskSignal) {
        let token = signal.core_weak();
        {
            let mut state = self.state.borrow_mut();
            state.signals.retain(|w| w.signal.strong_count() > 0);
            if state
                .signals
                .iter()
                .any(|w| Weak::ptr_eq(&w.signal, &token))
            {
                return;
            }
            state.signals.push(WatchedSignal {
                signal: token.clone(),
                priority: signal.priority(),
            });
        }
        let weak = Rc::downgrade(self);
        signal.on_priority_change(move |_event| {
            let Some(core) = weak.upgrade() else { return };
            let Some(signal_core) = token.upgrade() else {
                return;
            };
            core.on_signal_priority_change(&token, signal_core.priority());
        });
    }

    /// A watched signal changed priority: migrate its signal-sourced
    /// queued tasks between queues, preserving posting order by sequence.
    fn on_signal_priority_change(
        self: &Rc<Self>,
        token: &Weak<TaskSignalCore>,
        new_priority: TaskPriority,
    ) {
        let mut state = self.state.borrow_mut();
        let Some(position) = state
            .signals
            .iter()
            .position(|w| Weak::ptr_eq(&w.signal, token))
        else {
            return;
        };
        let previous = state.signals[position].priority;
        if previous == new_priority {
            // Idempotent event; nothing moved.
            return;
        }
        state.signals[position].priority = new_priority;

        let (tasks, dst, src) = state.queue_pair(new_priority.rank(), previous.rank());
        let moved = dst.merge(tasks, src, |task| {
            task.source == PrioritySource::Signal
                && task
                    .watched_signal
                    .as_ref()
                    .is_some_and(|w| Weak::ptr_eq(w, token))
        });
        debug!(previous = %previous, new = %new_priority, moved, "signal priority changed");
    }

    /// Test/diagnostic view: number of live task records.
    #[cfg(test)]
    pub(crate) fn live_tasks(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    /// Test/diagnostic view: number of watched signals.
    #[cfg(test)]
    pub(crate) fn watched_signals(&self) -> usize {
        self.state.borrow().signals.len()
    }
}
