//! The cooperative task scheduler.
//!
//! A scheduler owns a FIFO queue of task/argument pairs plus a single
//! "current task" slot. [`Scheduler::run_once`] is the single-frame
//! execution primitive: it drains tasks while they signal
//! [`Signal::Continue`], suspends on [`Signal::Repeat`], and reports
//! [`Signal::Terminate`] once the queue is exhausted. The frame loop calls
//! it once per display frame; no task may block.

use std::collections::VecDeque;

use crate::task::{Signal, Task, TaskArgs};

#[derive(Debug)]
struct Entry {
    task: Task,
    args: TaskArgs,
}

/// A cooperative run-loop executing queued tasks one frame at a time.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: VecDeque<Entry>,
    current: Option<Entry>,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            current: None,
        }
    }

    /// Number of queued tasks not yet dequeued (excludes an in-flight task).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Append a task and its argument bundle to the tail of the queue.
    ///
    /// Duplicates are allowed; tasks run strictly in enqueue order.
    pub fn enqueue(&mut self, task: Task, args: TaskArgs) {
        self.queue.push_back(Entry { task, args });
    }

    /// Append a conditional entry.
    ///
    /// The predicate is evaluated when the scheduler *reaches* the entry,
    /// not when it is enqueued, so state computed by earlier tasks can steer
    /// the branch. The chosen branch is enqueued at the tail (not run
    /// inline) and is subject to normal FIFO order from there.
    pub fn enqueue_conditional(
        &mut self,
        condition: impl FnMut() -> bool + Send + 'static,
        when_true: Task,
        when_false: Task,
    ) {
        self.queue.push_back(Entry {
            task: Task::Branch {
                condition: Box::new(condition),
                when_true: Box::new(when_true),
                when_false: Box::new(when_false),
            },
            args: TaskArgs::none(),
        });
    }

    /// Execute tasks until one suspends or the queue drains.
    ///
    /// Called once per display frame. While the signal is
    /// [`Signal::Continue`]: dequeue the head into the current slot (empty
    /// queue reports [`Signal::Terminate`] with all state cleared), invoke
    /// it, and clear the slot unless the task asked to repeat. A nested
    /// scheduler reporting its own exhaustion is coerced to
    /// [`Signal::Continue`]; its termination is not the parent's.
    pub fn run_once(&mut self) -> Signal {
        loop {
            let mut entry = match self.current.take() {
                Some(entry) => entry,
                None => match self.queue.pop_front() {
                    Some(entry) => entry,
                    None => return Signal::Terminate,
                },
            };

            // Conditional entries consume themselves: pick the branch now and
            // queue it at the tail.
            if matches!(entry.task, Task::Branch { .. }) {
                self.resolve_branch(entry);
                continue;
            }

            let signal = match &mut entry.task {
                Task::Step(step) => step(&entry.args),
                Task::Sub(sub) => match sub.run_once() {
                    Signal::Terminate => Signal::Continue,
                    other => other,
                },
                // Handled above.
                Task::Branch { .. } => Signal::Continue,
            };

            match signal {
                Signal::Continue => {}
                Signal::Repeat => {
                    // Same task, same args, next frame.
                    self.current = Some(entry);
                    return Signal::Repeat;
                }
                other => return other,
            }
        }
    }

    fn resolve_branch(&mut self, entry: Entry) {
        if let Task::Branch {
            mut condition,
            when_true,
            when_false,
        } = entry.task
        {
            let chosen = if condition() { when_true } else { when_false };
            self.queue.push_back(Entry {
                task: *chosen,
                args: TaskArgs::none(),
            });
        }
    }
}
