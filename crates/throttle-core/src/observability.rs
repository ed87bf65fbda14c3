use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of the queue's task counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.waiting + self.active + self.completed
    }

    /// Nothing waiting and nothing in flight.
    pub fn is_settled(&self) -> bool {
        self.waiting == 0 && self.active == 0
    }
}
