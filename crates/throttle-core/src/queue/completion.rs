//! Per-task completion handler.

use std::fmt;
use std::rc::Rc;

use super::bounded::{self, SharedState};
use crate::domain::TaskOutcome;
use crate::error::{FatalError, QueueError};

/// Reports one task's outcome back to its queue.
///
/// Handles are cheap to clone. Only the first report for a task is
/// recorded; every later one (success or error, before or after the final
/// handler ran) is discarded without effect.
///
/// Reporting may start more tasks or fire the final handler before it
/// returns. The returned error is [`QueueError::Unhandled`] when a task
/// started by this report failed after the queue had already finished.
pub struct Completion<T, E> {
    shared: SharedState<T, E>,
    index: usize,
}

impl<T: 'static, E: 'static> Completion<T, E> {
    pub(crate) fn new(shared: SharedState<T, E>, index: usize) -> Self {
        Self { shared, index }
    }

    /// Submission index of the task this handle reports for.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn complete(&self, result: Result<T, E>) -> Result<(), QueueError<E>> {
        bounded::report(&self.shared, self.index, TaskOutcome::from(result))
    }

    pub fn succeed(&self, value: T) -> Result<(), QueueError<E>> {
        self.complete(Ok(value))
    }

    pub fn fail(&self, error: E) -> Result<(), QueueError<E>> {
        self.complete(Err(error))
    }

    /// Passes a failure with no caller to the queue's fatal hook.
    pub(crate) fn raise_fatal(&self, fatal: FatalError) {
        bounded::raise_fatal(&self.shared, fatal);
    }

    /// Callback-style report.
    ///
    /// Any `Some` error is a failure, whatever it holds: `Some(0)`,
    /// `Some(false)` and `Some(String::new())` all count. `value` is
    /// ignored on failure.
    pub fn report(&self, error: Option<E>, value: T) -> Result<(), QueueError<E>> {
        match error {
            Some(error) => self.fail(error),
            None => self.succeed(value),
        }
    }
}

impl<T, E> Clone for Completion<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
            index: self.index,
        }
    }
}

impl<T, E> fmt::Debug for Completion<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").field("index", &self.index).finish()
    }
}
