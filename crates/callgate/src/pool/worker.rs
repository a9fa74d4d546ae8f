use super::Task;
use core::sync::atomic::Ordering;
use portable_atomic::AtomicU64;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    task,
};

/// Message understood by a worker task.
pub enum WorkRequest {
    /// Run one dispatched handler invocation.
    Run { task: Task },
    /// Stop after everything queued before this message, then acknowledge.
    Shutdown { response: oneshot::Sender<()> },
}

impl core::fmt::Debug for WorkRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Run { .. } => f.write_str("WorkRequest::Run"),
            Self::Shutdown { .. } => f.write_str("WorkRequest::Shutdown"),
        }
    }
}

/// Worker task that executes [`WorkRequest::Run`] tasks in arrival order.
///
/// Handlers are plain blocking closures, so each one is moved onto Tokio's
/// blocking pool and awaited there. The worker itself only ever waits
/// asynchronously and never occupies a runtime thread while a handler runs.
/// One task runs at a time per worker, keeping per-worker order.
///
/// Runs until it receives [`WorkRequest::Shutdown`] or its channel closes. A
/// panicking task is logged and the worker moves on to the next one.
///
/// # Arguments
///
/// - `worker_id`: Index of this worker in the pool (used for logs).
/// - `rx`: Receiving end of this worker's bounded queue.
/// - `completed`: Pool-wide counter of finished tasks (including panicked
///   ones).
#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
pub async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<WorkRequest>,
    completed: Arc<AtomicU64>,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    while let Some(work) = rx.recv().await {
        match work {
            WorkRequest::Run { task } => {
                if let Err(_e) = task::spawn_blocking(task).await {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {worker_id} handler failed: {_e}");
                }
                completed.fetch_add(1, Ordering::Relaxed);
            }
            WorkRequest::Shutdown { response } => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}
