//! Task and queue state machines.

use serde::{Deserialize, Serialize};

/// Per-task status.
///
/// State transitions:
/// - Waiting -> Active -> Completed
///
/// Never reversed, never skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Submitted, not yet admitted.
    Waiting,

    /// Admitted and invoked; no outcome reported yet.
    Active,

    /// Outcome recorded. Later reports for this task are discarded.
    Completed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

/// Queue lifecycle.
///
/// - Open -> Locked: a final handler is registered (exactly once).
/// - Locked -> Done: the final handler has been invoked (exactly once).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Accepting submissions.
    Open,

    /// Final handler registered; submissions are rejected.
    Locked,

    /// Final handler fired; result storage released.
    Done,
}

impl Lifecycle {
    pub fn accepts_tasks(self) -> bool {
        matches!(self, Lifecycle::Open)
    }
}
