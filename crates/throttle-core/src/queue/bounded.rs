//! Bounded task queue.
//!
//! All state lives in one `QueueState` behind `Rc<RefCell<_>>`. Every entry
//! point (submit, a completion report, final-handler registration) borrows
//! it only for bookkeeping and always releases the borrow before running
//! user code, so tasks may re-enter the queue from inside their own body.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, error, trace};

use super::counters::Counters;
use super::record::TaskRecord;
use super::{BoxedTask, Completion, FatalHook, FinalHandler, Lifecycle, Task};
use crate::config::{Concurrency, QueueConfig};
use crate::domain::TaskOutcome;
use crate::error::{ConfigError, FatalError, QueueError};
use crate::observability::QueueCounts;

pub(crate) type SharedState<T, E> = Rc<RefCell<QueueState<T, E>>>;

pub(crate) struct QueueState<T, E> {
    concurrency: Concurrency,

    /// Task registry, in submission order.
    records: Vec<TaskRecord<T, E>>,

    /// Outcomes by submission index. Released once the final handler fires.
    results: Vec<Option<TaskOutcome<T, E>>>,

    /// Index of the next task to admit. Admission is strictly in order.
    next: usize,

    counters: Counters,
    lifecycle: Lifecycle,
    final_handler: Option<FinalHandler<T, E>>,

    /// Replaces the default log-and-abort on fatal failures.
    fatal_hook: Option<FatalHook>,

    /// Set while an admission loop is on the stack.
    pumping: bool,
}

impl<T, E> QueueState<T, E> {
    fn new(concurrency: Concurrency) -> Self {
        Self {
            concurrency,
            records: Vec::new(),
            results: Vec::new(),
            next: 0,
            counters: Counters::default(),
            lifecycle: Lifecycle::Open,
            final_handler: None,
            fatal_hook: None,
            pumping: false,
        }
    }

    fn can_admit(&self) -> bool {
        self.counters.waiting() > 0 && self.concurrency.admits(self.counters.active())
    }

    /// Pops the next waiting task and marks it active.
    fn admit_next(&mut self) -> Option<(usize, BoxedTask<T, E>)> {
        let index = self.next;
        let task = self.records.get_mut(index)?.start()?;
        self.next += 1;
        self.counters.admit();
        trace!(
            index,
            active = self.counters.active(),
            waiting = self.counters.waiting(),
            "task admitted"
        );
        Some((index, task))
    }

    /// Active -> Completed with `outcome`. False if the task already had one.
    fn record_outcome(&mut self, index: usize, outcome: TaskOutcome<T, E>) -> bool {
        if self.lifecycle == Lifecycle::Done {
            return false;
        }
        let Some(record) = self.records.get_mut(index) else {
            return false;
        };
        if !record.finish() {
            return false;
        }
        self.counters.complete();
        if let Some(slot) = self.results.get_mut(index) {
            *slot = Some(outcome);
        }
        trace!(
            index,
            active = self.counters.active(),
            waiting = self.counters.waiting(),
            "task completed"
        );
        true
    }

    /// Locked -> Done, if everything has completed.
    fn take_dispatch(&mut self) -> Option<(FinalHandler<T, E>, Vec<TaskOutcome<T, E>>)> {
        if self.lifecycle != Lifecycle::Locked || !self.counters.is_settled() {
            return None;
        }
        let handler = self.final_handler.take()?;
        self.lifecycle = Lifecycle::Done;
        self.records = Vec::new();
        let outcomes: Vec<_> = std::mem::take(&mut self.results)
            .into_iter()
            .flatten()
            .collect();
        debug_assert_eq!(outcomes.len(), self.counters.total());
        Some((handler, outcomes))
    }
}

/// Bounded-concurrency scheduler for callback-style tasks.
///
/// Tasks are admitted in submission order while fewer than the configured
/// limit are active. Their outcomes are collected by submission index and
/// handed, once every task completed, to the single handler registered with
/// [`on_complete`](Self::on_complete).
///
/// The queue is single-threaded (`!Send`). Clones share the same queue.
///
/// ```
/// use throttle_core::TaskQueue;
///
/// let queue: TaskQueue<u32, String> = TaskQueue::with_concurrency(2).unwrap();
/// queue
///     .submit(|done| done.succeed(1).map_err(|e| e.to_string()))
///     .unwrap()
///     .submit(|_done| Err("boom".to_string()))
///     .unwrap()
///     .on_complete(|outcomes| {
///         assert_eq!(outcomes.len(), 2);
///         assert!(!outcomes[0].is_error());
///         assert!(outcomes[1].is_error());
///     })
///     .unwrap();
/// ```
pub struct TaskQueue<T, E> {
    shared: SharedState<T, E>,
}

impl<T: 'static, E: 'static> TaskQueue<T, E> {
    /// Queue without a concurrency limit.
    pub fn new() -> Self {
        Self::from_concurrency(Concurrency::Unlimited)
    }

    /// Fails with [`ConfigError::InvalidConcurrency`] if `limit` is zero.
    pub fn with_concurrency(limit: usize) -> Result<Self, ConfigError> {
        Ok(Self::from_concurrency(Concurrency::limited(limit)?))
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self::from_concurrency(config.concurrency())
    }

    pub fn from_concurrency(concurrency: Concurrency) -> Self {
        Self {
            shared: Rc::new(RefCell::new(QueueState::new(concurrency))),
        }
    }

    /// Appends a task and starts it right away if a slot is free.
    ///
    /// The task (and any task it unblocks) may run to completion before
    /// this returns. Fails with [`QueueError::QueueLocked`] once a final
    /// handler is registered.
    pub fn submit<F>(&self, task: F) -> Result<&Self, QueueError<E>>
    where
        F: FnOnce(Completion<T, E>) -> Result<(), E> + 'static,
    {
        self.submit_task(task)
    }

    /// Like [`submit`](Self::submit), for types implementing [`Task`].
    pub fn submit_task<K>(&self, task: K) -> Result<&Self, QueueError<E>>
    where
        K: Task<T, E> + 'static,
    {
        {
            let mut state = self.shared.borrow_mut();
            if !state.lifecycle.accepts_tasks() {
                return Err(QueueError::QueueLocked);
            }
            state.records.push(TaskRecord::new(Box::new(task)));
            state.results.push(None);
            state.counters.enqueue();
            trace!(index = state.records.len() - 1, "task submitted");
        }
        pump(&self.shared)?;
        Ok(self)
    }

    /// Registers the final handler and locks the queue.
    ///
    /// The handler fires exactly once with every outcome in submission
    /// order, as soon as no task is waiting or active. That may be right
    /// here, e.g. when nothing was submitted. A panic in the handler is not
    /// caught; it unwinds out of whichever call triggered the dispatch, or
    /// reaches the fatal hook when that call was a spawned future's report.
    pub fn on_complete<F>(&self, handler: F) -> Result<&Self, QueueError<E>>
    where
        F: FnOnce(Vec<TaskOutcome<T, E>>) + 'static,
    {
        {
            let mut state = self.shared.borrow_mut();
            if state.final_handler.is_some() || state.lifecycle != Lifecycle::Open {
                return Err(QueueError::AlreadyRegistered);
            }
            state.final_handler = Some(Box::new(handler));
            state.lifecycle = Lifecycle::Locked;
        }
        dispatch(&self.shared);
        Ok(self)
    }

    /// Installs the hook that receives [`FatalError`]s.
    ///
    /// Without one, a fatal failure is logged and the process aborts. A hook
    /// that returns lets the runtime carry on; the queue itself is already
    /// `Done` by then.
    pub fn on_fatal<F>(&self, hook: F) -> &Self
    where
        F: Fn(&FatalError) + 'static,
    {
        self.shared.borrow_mut().fatal_hook = Some(Rc::new(hook));
        self
    }

    pub fn counts(&self) -> QueueCounts {
        self.shared.borrow().counters.snapshot()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.borrow().lifecycle
    }

    pub fn concurrency(&self) -> Concurrency {
        self.shared.borrow().concurrency
    }

    /// Total number of submitted tasks.
    pub fn len(&self) -> usize {
        self.shared.borrow().counters.total()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static, E: 'static> Default for TaskQueue<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for TaskQueue<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T, E> fmt::Debug for TaskQueue<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shared.try_borrow() {
            Ok(state) => f
                .debug_struct("TaskQueue")
                .field("concurrency", &state.concurrency)
                .field("lifecycle", &state.lifecycle)
                .field("counts", &state.counters.snapshot())
                .finish(),
            Err(_) => f.debug_struct("TaskQueue").finish_non_exhaustive(),
        }
    }
}

/// Marks the admission loop as running; cleared on drop, including unwind.
struct PumpGuard<'a, T, E> {
    shared: &'a RefCell<QueueState<T, E>>,
}

impl<'a, T, E> PumpGuard<'a, T, E> {
    fn enter(shared: &'a RefCell<QueueState<T, E>>) -> Option<Self> {
        let mut state = shared.borrow_mut();
        if state.pumping {
            return None;
        }
        state.pumping = true;
        Some(Self { shared })
    }
}

impl<T, E> Drop for PumpGuard<'_, T, E> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.try_borrow_mut() {
            state.pumping = false;
        }
    }
}

/// Admission loop.
///
/// Re-checks live counters on every iteration. A report made while the
/// loop is already on the stack does not start a nested loop; the outer one
/// picks up the freed slot, so stack depth stays constant however many
/// tasks complete synchronously.
fn pump<T: 'static, E: 'static>(shared: &SharedState<T, E>) -> Result<(), QueueError<E>> {
    let Some(_guard) = PumpGuard::enter(shared) else {
        return Ok(());
    };
    loop {
        let admitted = {
            let mut state = shared.borrow_mut();
            if !state.can_admit() {
                break;
            }
            state.admit_next()
        };
        let Some((index, task)) = admitted else {
            break;
        };
        let done = Completion::new(Rc::clone(shared), index);
        if let Err(error) = task.run(done) {
            task_failed(shared, index, error)?;
        }
    }
    Ok(())
}

/// A task body returned `Err` while being invoked.
fn task_failed<T: 'static, E: 'static>(
    shared: &SharedState<T, E>,
    index: usize,
    error: E,
) -> Result<(), QueueError<E>> {
    {
        let mut state = shared.borrow_mut();
        if state.lifecycle == Lifecycle::Done {
            error!(index, "task failed after the queue had already finished");
            return Err(QueueError::Unhandled { index, error });
        }
        if !state.record_outcome(index, TaskOutcome::Failure(error)) {
            debug!(index, "ignoring failure from a task that already reported");
            return Ok(());
        }
    }
    dispatch(shared);
    Ok(())
}

/// Entry point for [`Completion`] reports.
pub(crate) fn report<T: 'static, E: 'static>(
    shared: &SharedState<T, E>,
    index: usize,
    outcome: TaskOutcome<T, E>,
) -> Result<(), QueueError<E>> {
    let more_waiting = {
        let mut state = shared.borrow_mut();
        if !state.record_outcome(index, outcome) {
            debug!(index, "discarding duplicate completion report");
            return Ok(());
        }
        state.counters.waiting() > 0
    };
    if more_waiting {
        pump(shared)
    } else {
        dispatch(shared);
        Ok(())
    }
}

/// Fires the final handler if it is registered and everything completed.
/// Hands `fatal` to the installed hook, or logs it and aborts.
pub(crate) fn raise_fatal<T, E>(shared: &SharedState<T, E>, fatal: FatalError) {
    let hook = shared.borrow().fatal_hook.clone();
    match hook {
        Some(hook) => hook(&fatal),
        None => {
            error!(error = %fatal, label = fatal.as_label(), "fatal queue failure");
            std::process::abort();
        }
    }
}

fn dispatch<T, E>(shared: &SharedState<T, E>) {
    let ready = shared.borrow_mut().take_dispatch();
    if let Some((handler, outcomes)) = ready {
        debug!(results = outcomes.len(), "dispatching final handler");
        handler(outcomes);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    type Outcomes = Rc<RefCell<Option<Vec<TaskOutcome<i32, i32>>>>>;

    fn capture(queue: &TaskQueue<i32, i32>) -> Outcomes {
        let slot: Outcomes = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&slot);
        queue
            .on_complete(move |outcomes| *sink.borrow_mut() = Some(outcomes))
            .unwrap();
        slot
    }

    #[test]
    fn empty_queue_dispatches_on_registration() {
        let queue: TaskQueue<i32, i32> = TaskQueue::new();
        let outcomes = capture(&queue);
        assert_eq!(outcomes.borrow().as_ref().map(Vec::len), Some(0));
        assert_eq!(queue.lifecycle(), Lifecycle::Done);
    }

    #[test]
    fn synchronous_error_report_is_recorded() {
        let queue: TaskQueue<i32, i32> = TaskQueue::new();
        queue
            .submit(|done| {
                done.fail(-1).unwrap();
                Ok(())
            })
            .unwrap();
        let outcomes = capture(&queue);
        assert_eq!(
            outcomes.borrow().as_deref(),
            Some(&[TaskOutcome::Failure(-1)][..])
        );
    }

    #[test]
    fn returned_error_becomes_outcome() {
        let queue: TaskQueue<i32, i32> = TaskQueue::new();
        queue.submit(|_done| Err(7)).unwrap();
        assert_eq!(queue.counts(), QueueCounts { waiting: 0, active: 0, completed: 1 });
        let outcomes = capture(&queue);
        assert_eq!(
            outcomes.borrow().as_deref(),
            Some(&[TaskOutcome::Failure(7)][..])
        );
    }

    #[test]
    fn returned_error_after_report_is_ignored_while_open() {
        let queue: TaskQueue<i32, i32> = TaskQueue::new();
        queue
            .submit(|done| {
                done.succeed(2).unwrap();
                Err(99)
            })
            .unwrap();
        let outcomes = capture(&queue);
        assert_eq!(
            outcomes.borrow().as_deref(),
            Some(&[TaskOutcome::Success(2)][..])
        );
    }

    #[test]
    fn submit_after_registration_is_locked() {
        let queue: TaskQueue<i32, i32> = TaskQueue::new();
        queue.on_complete(|_| {}).unwrap();
        let err = queue.submit(|_done| Ok(())).unwrap_err();
        assert!(matches!(err, QueueError::QueueLocked));
        assert!(queue.is_empty());
    }

    #[test]
    fn second_registration_is_rejected() {
        let queue: TaskQueue<i32, i32> = TaskQueue::new();
        queue.submit(|_done| Ok(())).unwrap();
        queue.on_complete(|_| {}).unwrap();
        let err = queue.on_complete(|_| {}).unwrap_err();
        assert!(matches!(err, QueueError::AlreadyRegistered));
        assert_eq!(queue.lifecycle(), Lifecycle::Locked);
    }

    #[test]
    fn pending_tasks_hold_back_dispatch() {
        let queue: TaskQueue<i32, i32> = TaskQueue::with_concurrency(1).unwrap();
        let parked: Rc<RefCell<Vec<Completion<i32, i32>>>> = Rc::default();
        for _ in 0..3 {
            let parked = Rc::clone(&parked);
            queue
                .submit(move |done| {
                    parked.borrow_mut().push(done);
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(queue.counts(), QueueCounts { waiting: 2, active: 1, completed: 0 });

        let outcomes = capture(&queue);
        assert!(outcomes.borrow().is_none());

        for value in 0..3 {
            let done = parked.borrow_mut().remove(0);
            done.succeed(value).unwrap();
        }
        let got = outcomes.borrow_mut().take().unwrap();
        assert_eq!(
            got,
            vec![
                TaskOutcome::Success(0),
                TaskOutcome::Success(1),
                TaskOutcome::Success(2),
            ]
        );
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn duplicate_reports_are_discarded() {
        let queue: TaskQueue<i32, i32> = TaskQueue::new();
        let late: Rc<RefCell<Option<Completion<i32, i32>>>> = Rc::default();
        let keep = Rc::clone(&late);
        queue
            .submit(move |done| {
                done.succeed(1).unwrap();
                done.fail(2).unwrap();
                done.succeed(3).unwrap();
                *keep.borrow_mut() = Some(done);
                Ok(())
            })
            .unwrap();
        let outcomes = capture(&queue);
        assert_eq!(
            outcomes.borrow().as_deref(),
            Some(&[TaskOutcome::Success(1)][..])
        );

        // after dispatch, still a no-op
        let done = late.borrow_mut().take().unwrap();
        assert!(done.fail(4).is_ok());
        assert_eq!(queue.counts().completed, 1);
    }

    #[test]
    fn final_handler_sees_completed_queue() {
        let queue: TaskQueue<i32, i32> = TaskQueue::new();
        queue.submit(|done| done.succeed(1).map_err(|_| -1)).unwrap();
        let observed = Rc::new(Cell::new(None));
        let probe = queue.clone();
        let sink = Rc::clone(&observed);
        queue
            .on_complete(move |_| {
                sink.set(Some((probe.lifecycle(), probe.counts())));
                assert!(matches!(
                    probe.submit(|_done| Ok(())),
                    Err(QueueError::QueueLocked)
                ));
            })
            .unwrap();
        let (lifecycle, counts) = observed.get().unwrap();
        assert_eq!(lifecycle, Lifecycle::Done);
        assert_eq!(counts.completed, 1);
    }

    #[test]
    #[should_panic(expected = "final handler failed")]
    fn final_handler_panic_propagates_to_registration() {
        let queue: TaskQueue<i32, i32> = TaskQueue::new();
        queue.on_complete(|_| panic!("final handler failed")).unwrap();
    }

    #[test]
    #[should_panic(expected = "final handler failed")]
    fn final_handler_panic_propagates_to_reporter() {
        let queue: TaskQueue<i32, i32> = TaskQueue::new();
        let parked: Rc<RefCell<Option<Completion<i32, i32>>>> = Rc::default();
        let keep = Rc::clone(&parked);
        queue
            .submit(move |done| {
                *keep.borrow_mut() = Some(done);
                Ok(())
            })
            .unwrap();
        queue.on_complete(|_| panic!("final handler failed")).unwrap();
        let done = parked.borrow_mut().take().unwrap();
        let _ = done.succeed(1);
    }

    #[test]
    fn task_may_submit_more_tasks() {
        let queue: TaskQueue<i32, i32> = TaskQueue::with_concurrency(1).unwrap();
        let handle = queue.clone();
        queue
            .submit(move |done| {
                handle.submit(|inner| inner.succeed(2).map_err(|_| -1)).unwrap();
                done.succeed(1).map_err(|_| -1)
            })
            .unwrap();
        let outcomes = capture(&queue);
        assert_eq!(
            outcomes.borrow().as_deref(),
            Some(&[TaskOutcome::Success(1), TaskOutcome::Success(2)][..])
        );
    }

    #[test]
    fn debug_shows_counts() {
        let queue: TaskQueue<i32, i32> = TaskQueue::with_concurrency(2).unwrap();
        let s = format!("{queue:?}");
        assert!(s.contains("TaskQueue"));
        assert!(s.contains("Open"));
    }
}
