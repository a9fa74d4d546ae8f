//! Round-robin pool of Tokio worker tasks.
//!
//! This module defines the [`WorkerPool`] struct, which owns a set of worker
//! tasks responsible for running dispatched handler invocations. Work is
//! distributed round-robin over bounded [`mpsc`] channels and the pool
//! supports coordinated shutdown via a shared [`CancellationToken`].
//!
//! Submission is synchronous and never waits: it is called from completion
//! driver threads, which must not stall behind a busy worker.

use super::{
    Executor, PoolConfig, Task,
    worker::{WorkRequest, worker_loop},
};
use crate::{Error, Result};
use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;
use portable_atomic::AtomicU64;
use std::sync::Arc;
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// A pool of asynchronous workers that run [`Task`]s.
///
/// Each worker is a Tokio task running [`worker_loop`] on its own bounded
/// channel, handing every task to the runtime's blocking pool. Tasks on the same worker run in submission order; tasks on
/// different workers run concurrently with no ordering between them.
pub struct WorkerPool {
    workers: Vec<mpsc::Sender<WorkRequest>>,
    next_worker: AtomicUsize,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
    completed: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Spawns `config.num_workers` worker tasks on `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] if the pool would have no workers
    /// or zero-capacity queues.
    pub fn spawn(config: &PoolConfig, handle: &Handle) -> Result<Self> {
        if config.num_workers == 0 {
            return Err(Error::ContractViolation {
                missing: "at least one worker",
            });
        }
        if config.queue_capacity == 0 {
            return Err(Error::ContractViolation {
                missing: "non-zero worker queue capacity",
            });
        }

        let completed = Arc::new(AtomicU64::new(0));
        let mut workers = Vec::with_capacity(config.num_workers);
        for worker_id in 0..config.num_workers {
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            workers.push(tx);
            handle.spawn(worker_loop(worker_id, rx, Arc::clone(&completed)));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            workers = config.num_workers,
            capacity = config.queue_capacity,
            "Worker pool started"
        );

        Ok(Self {
            workers,
            next_worker: AtomicUsize::new(0),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout: config.shutdown_timeout,
            completed,
        })
    }

    /// Returns the index of the next worker to receive work (round-robin).
    ///
    /// Uses a relaxed atomic increment to minimize contention.
    pub fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Tasks that finished running, including ones that panicked.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Gracefully shuts down all workers in the pool.
    ///
    /// - Cancels the shared [`CancellationToken`] so no new work is accepted.
    /// - Sends a [`WorkRequest::Shutdown`] to each worker. Work queued before
    ///   it still runs.
    /// - Waits (up to `shutdown_timeout` per worker) for acknowledgements.
    ///
    /// Idempotent: a second call finds every channel closed and returns.
    pub async fn shutdown(&self) -> Result<()> {
        // === Phase 1: Stop accepting new work ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new work");
        self.shutdown_token.cancel();

        // === Phase 2: Notify workers behind their queued work ===
        let mut shutdown_handles = Vec::with_capacity(self.workers.len());
        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            match timeout(
                self.shutdown_timeout,
                worker.send(WorkRequest::Shutdown { response: tx }),
            )
            .await
            {
                Ok(Ok(())) => shutdown_handles.push((i, rx)),
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {i} already stopped: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {i} queue stayed full; skipping shutdown notice");
                }
            }
        }

        // === Phase 3: Wait for acknowledgements ===
        let per_worker = self.shutdown_timeout;
        let acks = shutdown_handles.into_iter().map(|(_i, rx)| async move {
            match timeout(per_worker, rx).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_i} shutdown acknowledged");
                }
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_i} returned error: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_i} shutdown timed out");
                }
            }
        });
        futures::future::join_all(acks).await;

        #[cfg(feature = "tracing")]
        tracing::info!(completed = self.completed(), "Worker pool shutdown complete");
        Ok(())
    }
}

impl Executor for WorkerPool {
    /// Queues `task` on the next worker, probing the others if that one is
    /// full.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceShutdown`] once shutdown started.
    /// - [`Error::PoolSaturated`] if every worker queue is full.
    /// - [`Error::ChannelError`] if a worker stopped unexpectedly.
    fn submit(&self, task: Task) -> Result<()> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        let first = self.next_worker_index();
        let mut request = WorkRequest::Run { task };
        for offset in 0..self.workers.len() {
            let worker_idx = (first + offset) % self.workers.len();
            match self.workers[worker_idx].try_send(request) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::TrySendError::Full(rejected)) => request = rejected,
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(Error::ChannelError {
                        context: format!("Worker {worker_idx} channel closed"),
                    });
                }
            }
        }

        Err(Error::PoolSaturated { worker: first })
    }
}
