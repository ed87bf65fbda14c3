//! Tokio bridge: futures as tasks, and awaiting the final outcomes.
//!
//! The queue is `!Send`, so everything here runs on a
//! [`tokio::task::LocalSet`].

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::warn;

use crate::domain::TaskOutcome;
use crate::error::{FatalError, QueueError};
use crate::queue::TaskQueue;

impl<T: 'static, E: fmt::Debug + 'static> TaskQueue<T, E> {
    /// Submits a future-producing task.
    ///
    /// `make` runs only once the task is admitted; the future is driven with
    /// [`tokio::task::spawn_local`] and its output becomes the outcome.
    ///
    /// The spawned future has no caller to return a report failure to. A late
    /// task failure ([`QueueError::Unhandled`]) or a panic out of the report
    /// (typically the final handler) goes to the fatal hook instead, see
    /// [`on_fatal`](Self::on_fatal).
    ///
    /// # Panics
    /// Admission panics outside a `LocalSet`.
    pub fn submit_future<F, Fut>(&self, make: F) -> Result<&Self, QueueError<E>>
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        self.submit(move |done| {
            tokio::task::spawn_local(async move {
                let result = make().await;
                let index = done.index();
                let reported = panic::catch_unwind(AssertUnwindSafe(|| done.complete(result)));
                let fatal = match reported {
                    Ok(Ok(())) => return,
                    Ok(Err(err)) => {
                        warn!(error = %err, label = err.as_label(), "report failed in spawned task");
                        match err {
                            QueueError::Unhandled { index, error } => FatalError::Unhandled {
                                index,
                                detail: format!("{error:?}"),
                            },
                            other => FatalError::Unhandled {
                                index,
                                detail: other.to_string(),
                            },
                        }
                    }
                    Err(payload) => FatalError::Panicked {
                        index,
                        detail: panic_message(payload.as_ref()),
                    },
                };
                done.raise_fatal(fatal);
            });
            Ok(())
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<T: 'static, E: 'static> TaskQueue<T, E> {
    /// Registers the final handler and returns a future of the outcomes.
    ///
    /// Resolves to [`QueueError::Abandoned`] if the queue is dropped while
    /// some task never reported.
    pub fn finished(&self) -> Result<Finished<T, E>, QueueError<E>> {
        let (tx, rx) = oneshot::channel();
        self.on_complete(move |outcomes| {
            // receiver may be gone; nothing to do then
            let _ = tx.send(outcomes);
        })?;
        Ok(Finished { rx })
    }
}

/// Future returned by [`TaskQueue::finished`].
pub struct Finished<T, E> {
    rx: oneshot::Receiver<Vec<TaskOutcome<T, E>>>,
}

impl<T, E> Future for Finished<T, E> {
    type Output = Result<Vec<TaskOutcome<T, E>>, QueueError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.map_err(|_| QueueError::Abandoned))
    }
}

impl<T, E> fmt::Debug for Finished<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finished").finish_non_exhaustive()
    }
}
