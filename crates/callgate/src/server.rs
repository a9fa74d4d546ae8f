//! Lifecycle wiring for a running service.
//!
//! [`Server`] owns the completion-queue driver threads and shuts the pieces
//! down in dependency order: the registry first (armed receives complete with
//! `ok == false`, so every receiver stops), then the queue (drivers drain and
//! exit), then the worker pool (already-dispatched handlers finish).

use crate::{
    Result,
    pool::WorkerPool,
    queue::CompletionQueue,
    registry::Service,
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub struct Server {
    service: Arc<Service>,
    queue: Arc<CompletionQueue>,
    pool: Arc<WorkerPool>,
    drivers: Vec<JoinHandle<u64>>,
}

impl Server {
    /// Spawns `num_drivers` threads pumping `queue`.
    ///
    /// Receivers may be started before or after this; calls delivered in the
    /// meantime simply wait in the queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverSpawn`](crate::Error::DriverSpawn) if a thread
    /// cannot be created. Drivers spawned so far are stopped first.
    pub fn start(
        service: Arc<Service>,
        queue: Arc<CompletionQueue>,
        pool: Arc<WorkerPool>,
        num_drivers: usize,
    ) -> Result<Self> {
        let mut drivers = Vec::with_capacity(num_drivers);
        for i in 0..num_drivers {
            let driver_queue = Arc::clone(&queue);
            let spawned = thread::Builder::new()
                .name(format!("callgate-cq-{i}"))
                .spawn(move || driver_queue.run());
            match spawned {
                Ok(handle) => drivers.push(handle),
                Err(e) => {
                    queue.shutdown();
                    for driver in drivers {
                        let _ = driver.join();
                    }
                    return Err(e.into());
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            service = service.name(),
            drivers = num_drivers,
            workers = pool.num_workers(),
            "Server started"
        );

        Ok(Self {
            service,
            queue,
            pool,
            drivers,
        })
    }

    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    pub fn queue(&self) -> &Arc<CompletionQueue> {
        &self.queue
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Stops admission and waits for drivers and workers to finish.
    ///
    /// Must be awaited from within a Tokio runtime; driver threads are
    /// joined on the blocking pool.
    ///
    /// # Errors
    ///
    /// Propagates worker-pool shutdown failures.
    pub async fn shutdown(self) -> Result<()> {
        // === Phase 1: Fail armed receives, drop backlogged calls ===
        self.service.shutdown();

        // === Phase 2: Let drivers deliver the failures, then exit ===
        self.queue.shutdown();
        let drivers = self.drivers;
        let _delivered = tokio::task::spawn_blocking(move || {
            drivers
                .into_iter()
                .map(|driver| driver.join().unwrap_or_default())
                .sum::<u64>()
        })
        .await
        .unwrap_or_default();

        #[cfg(feature = "tracing")]
        tracing::debug!(delivered = _delivered, "Completion drivers stopped");

        // === Phase 3: Drain dispatched work ===
        self.pool.shutdown().await
    }
}
