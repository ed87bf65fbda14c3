//! Outcome model: the per-task result record handed to the final handler.

use serde::{Deserialize, Serialize};

/// One task's final outcome, stored at its submission index.
///
/// Serialized as `{"kind": "Success" | "Failure", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum TaskOutcome<T, E> {
    Success(T),
    Failure(E),
}

impl<T, E> TaskOutcome<T, E> {
    pub fn is_error(&self) -> bool {
        matches!(self, TaskOutcome::Failure(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            TaskOutcome::Success(v) => Some(v),
            TaskOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            TaskOutcome::Success(_) => None,
            TaskOutcome::Failure(e) => Some(e),
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        self.into()
    }
}

impl<T, E> From<Result<T, E>> for TaskOutcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => TaskOutcome::Success(v),
            Err(e) => TaskOutcome::Failure(e),
        }
    }
}

impl<T, E> From<TaskOutcome<T, E>> for Result<T, E> {
    fn from(outcome: TaskOutcome<T, E>) -> Self {
        match outcome {
            TaskOutcome::Success(v) => Ok(v),
            TaskOutcome::Failure(e) => Err(e),
        }
    }
}
