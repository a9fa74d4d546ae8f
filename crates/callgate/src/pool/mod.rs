//! Executors that run dispatched handler invocations.
//!
//! The receiver only needs [`Executor::submit`]. [`WorkerPool`] is the
//! production implementation: a fixed set of Tokio worker tasks fed
//! round-robin through bounded channels, with cooperative shutdown.

mod manager;
mod worker;

pub use manager::WorkerPool;
pub use worker::WorkRequest;

use crate::Result;
use core::time::Duration;

/// A unit of work: one handler invocation bound to its call.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Accepts fire-and-forget work.
///
/// Implementations must not block the caller (submission happens on a
/// completion driver thread) and give no ordering guarantee between tasks.
pub trait Executor: Send + Sync {
    /// Queues `task` for eventual execution.
    ///
    /// # Errors
    ///
    /// Returns an error if the task was rejected. The task is dropped in that
    /// case and will never run.
    fn submit(&self, task: Task) -> Result<()>;
}

/// Sizing and shutdown behavior of a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker tasks.
    pub num_workers: usize,
    /// Capacity of each worker's queue.
    pub queue_capacity: usize,
    /// Upper bound on how long [`WorkerPool::shutdown`] waits for each
    /// worker to acknowledge.
    pub shutdown_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            queue_capacity: 1024,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}
