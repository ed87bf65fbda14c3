//! throttle-core
//!
//! Bounded-concurrency scheduler for callback-style tasks.
//!
//! # Modules
//! - **queue**: [`TaskQueue`], the [`Task`] abstraction and [`Completion`] handles
//! - **domain**: the per-task [`TaskOutcome`] record
//! - **config**: [`Concurrency`] limit and [`QueueConfig`]
//! - **runtime**: tokio bridge ([`TaskQueue::submit_future`], [`TaskQueue::finished`])
//! - **observability**: [`QueueCounts`] snapshots
//! - **error**: [`QueueError`], [`FatalError`] and [`ConfigError`]

pub mod config;
pub mod domain;
pub mod error;
pub mod observability;
pub mod queue;
pub mod runtime;

pub use config::{Concurrency, QueueConfig};
pub use domain::TaskOutcome;
pub use error::{ConfigError, FatalError, QueueError};
pub use observability::QueueCounts;
pub use queue::{Completion, Lifecycle, Task, TaskQueue, TaskStatus};
pub use runtime::Finished;
