//! Task record: status + the not-yet-run task body.

use super::{BoxedTask, TaskStatus};

/// Registry entry for one submitted task.
///
/// The body is taken out on admission, so a record only ever holds it
/// while `Waiting`.
pub(crate) struct TaskRecord<T, E> {
    pub(crate) status: TaskStatus,
    task: Option<BoxedTask<T, E>>,
}

impl<T, E> TaskRecord<T, E> {
    pub(crate) fn new(task: BoxedTask<T, E>) -> Self {
        Self {
            status: TaskStatus::Waiting,
            task: Some(task),
        }
    }

    /// Waiting -> Active. Hands back the body to invoke.
    pub(crate) fn start(&mut self) -> Option<BoxedTask<T, E>> {
        debug_assert_eq!(self.status, TaskStatus::Waiting);
        self.status = TaskStatus::Active;
        self.task.take()
    }

    /// Active -> Completed. Returns false if the task had already completed.
    pub(crate) fn finish(&mut self) -> bool {
        match self.status {
            TaskStatus::Active => {
                self.status = TaskStatus::Completed;
                true
            }
            status => {
                debug_assert!(status.is_terminal(), "outcome for a task that never started");
                false
            }
        }
    }
}
