//! Queue module: task abstraction, state machines and the bounded queue.

mod bounded;
mod completion;
mod counters;
mod record;
mod state;

pub use bounded::TaskQueue;
pub use completion::Completion;
pub use state::{Lifecycle, TaskStatus};

use std::rc::Rc;

use crate::domain::TaskOutcome;
use crate::error::FatalError;

/// A unit of work already bound to its arguments.
///
/// The queue injects a [`Completion`] on admission. The task reports its
/// outcome through it, either before returning (synchronous) or later
/// (asynchronous). Returning `Err` from `run` is a synchronous failure: it
/// becomes the task's outcome unless the task already reported one.
///
/// Closures of shape `FnOnce(Completion<T, E>) -> Result<(), E>` implement
/// this trait.
pub trait Task<T, E> {
    fn run(self: Box<Self>, done: Completion<T, E>) -> Result<(), E>;
}

impl<T, E, F> Task<T, E> for F
where
    F: FnOnce(Completion<T, E>) -> Result<(), E>,
{
    fn run(self: Box<Self>, done: Completion<T, E>) -> Result<(), E> {
        (*self)(done)
    }
}

pub(crate) type BoxedTask<T, E> = Box<dyn Task<T, E>>;

/// Receives every outcome, in submission order, once all tasks completed.
pub(crate) type FinalHandler<T, E> = Box<dyn FnOnce(Vec<TaskOutcome<T, E>>)>;

/// Receives failures that have no caller to return to.
pub(crate) type FatalHook = Rc<dyn Fn(&FatalError)>;
