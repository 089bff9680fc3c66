//! Task units and control signals.
//!
//! A task is either a step function, a nested scheduler, or a conditional
//! entry whose branch is chosen when the scheduler reaches it. The closed
//! variant set keeps dispatch exhaustive; there is no run-time type
//! inspection.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::scheduler::Scheduler;

/// The result of running one task step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Advance to the next queued task within the same frame.
    Continue,
    /// Re-invoke the same task, with the same arguments, on the next frame.
    Repeat,
    /// Reserved for cooperative cancellation; produced by no current task.
    Suspended,
    /// The scheduler has drained; the frame loop should stop invoking it.
    Terminate,
}

/// Opaque argument bundle bound to a task at enqueue time.
///
/// A task returning [`Signal::Repeat`] sees the same bundle again on the
/// next frame. Tasks needing mutable state across repeats keep it behind
/// interior mutability inside the bundle, or capture it in their closure.
#[derive(Clone, Default)]
pub struct TaskArgs(Option<Arc<dyn Any + Send + Sync>>);

impl TaskArgs {
    /// An empty bundle.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    /// Bundle a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    /// Borrow the bundled value, if present and of the requested type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|value| value.downcast_ref())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for TaskArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("TaskArgs(..)"),
            None => f.write_str("TaskArgs(none)"),
        }
    }
}

/// A step function: invoked once per scheduler iteration with its bound
/// argument bundle.
pub type StepFn = Box<dyn FnMut(&TaskArgs) -> Signal + Send>;

/// A branch predicate, evaluated at scheduler-run time.
pub type Predicate = Box<dyn FnMut() -> bool + Send>;

/// A schedulable unit of deferred work.
pub enum Task {
    /// A step function.
    Step(StepFn),
    /// A nested scheduler, run as a black box once per parent iteration.
    /// Its own exhaustion does not terminate the parent. Boxed: a scheduler
    /// holds tasks of its own, so the variant must not embed it inline.
    Sub(Box<Scheduler>),
    /// A conditional entry created by
    /// [`Scheduler::enqueue_conditional`](crate::scheduler::Scheduler::enqueue_conditional):
    /// evaluates the predicate when reached and enqueues the chosen branch.
    Branch {
        condition: Predicate,
        when_true: Box<Task>,
        when_false: Box<Task>,
    },
}

impl Task {
    /// A step-function task.
    pub fn step(step: impl FnMut(&TaskArgs) -> Signal + Send + 'static) -> Self {
        Self::Step(Box::new(step))
    }

    /// A nested-scheduler task.
    #[must_use]
    pub fn sub(scheduler: Scheduler) -> Self {
        Self::Sub(Box::new(scheduler))
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(_) => f.write_str("Task::Step"),
            Self::Sub(scheduler) => write!(f, "Task::Sub(pending: {})", scheduler.pending()),
            Self::Branch { .. } => f.write_str("Task::Branch"),
        }
    }
}
