//! Aggregate task counters.

use crate::observability::QueueCounts;

/// Waiting / active / completed counts.
///
/// Only mutated through `enqueue`, `admit` and `complete`, so
/// `waiting + active + completed == total` holds after every call.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    waiting: usize,
    active: usize,
    completed: usize,
    total: usize,
}

impl Counters {
    pub(crate) fn enqueue(&mut self) {
        self.waiting += 1;
        self.total += 1;
        self.check();
    }

    /// Waiting -> Active.
    pub(crate) fn admit(&mut self) {
        debug_assert!(self.waiting > 0, "admit with nothing waiting");
        self.waiting -= 1;
        self.active += 1;
        self.check();
    }

    /// Active -> Completed.
    pub(crate) fn complete(&mut self) {
        debug_assert!(self.active > 0, "complete with nothing active");
        self.active -= 1;
        self.completed += 1;
        self.check();
    }

    pub(crate) fn waiting(&self) -> usize {
        self.waiting
    }

    pub(crate) fn active(&self) -> usize {
        self.active
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.snapshot().is_settled()
    }

    pub(crate) fn snapshot(&self) -> QueueCounts {
        QueueCounts {
            waiting: self.waiting,
            active: self.active,
            completed: self.completed,
        }
    }

    fn check(&self) {
        debug_assert_eq!(self.waiting + self.active + self.completed, self.total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_preserve_total() {
        let mut c = Counters::default();
        c.enqueue();
        c.enqueue();
        c.admit();
        assert_eq!(c.snapshot(), QueueCounts { waiting: 1, active: 1, completed: 0 });
        c.complete();
        c.admit();
        c.complete();
        let snap = c.snapshot();
        assert_eq!(snap, QueueCounts { waiting: 0, active: 0, completed: 2 });
        assert_eq!(snap.total(), c.total());
        assert!(c.is_settled());
    }

    #[test]
    fn empty_counters_are_settled() {
        assert!(Counters::default().is_settled());
    }

    #[test]
    fn in_flight_task_is_not_settled() {
        let mut c = Counters::default();
        c.enqueue();
        assert!(!c.is_settled());
        c.admit();
        assert!(!c.is_settled());
        assert!(!c.snapshot().is_settled());
        c.complete();
        assert!(c.snapshot().is_settled());
    }
}
