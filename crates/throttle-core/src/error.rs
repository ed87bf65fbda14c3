use thiserror::Error;

/// Rejected queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid concurrency: {0} (expected a positive number)")]
    InvalidConcurrency(String),
}

/// Errors surfaced by [`TaskQueue`](crate::TaskQueue) operations.
///
/// `E` is the task error type. It only appears in [`QueueError::Unhandled`].
#[derive(Debug, Error)]
pub enum QueueError<E> {
    /// A final handler is registered; the queue takes no more tasks.
    #[error("queue is locked: a completion handler has already been registered")]
    QueueLocked,

    #[error("a completion handler is already registered")]
    AlreadyRegistered,

    /// A task body failed after its slot completed and after the final
    /// handler already ran. Nothing can record it, so it escapes to
    /// whichever call was driving the queue.
    #[error("task {index} failed after the queue had already finished")]
    Unhandled { index: usize, error: E },

    /// The queue was dropped before every task reported.
    #[error("queue dropped before all tasks completed")]
    Abandoned,
}

/// A failure with no caller left to return it to.
///
/// Raised from future-driven tasks (see
/// [`TaskQueue::submit_future`](crate::TaskQueue::submit_future)) and passed
/// to the queue's fatal hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    /// A report tripped [`QueueError::Unhandled`].
    #[error("task {index} failed after the queue had already finished: {detail}")]
    Unhandled { index: usize, detail: String },

    /// The final handler, or a task started by the report, panicked.
    #[error("panic while reporting task {index}: {detail}")]
    Panicked { index: usize, detail: String },
}

impl FatalError {
    pub fn as_label(&self) -> &'static str {
        match self {
            FatalError::Unhandled { .. } => "unhandled_task_failure",
            FatalError::Panicked { .. } => "report_panicked",
        }
    }
}

impl<E> QueueError<E> {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::QueueLocked => "queue_locked",
            QueueError::AlreadyRegistered => "already_registered",
            QueueError::Unhandled { .. } => "unhandled_task_failure",
            QueueError::Abandoned => "abandoned",
        }
    }
}
