//! Error types for call admission.
//!
//! This module defines the central `Error` enum, which captures every failure
//! the admission core can surface synchronously. None of these are retried by
//! the core: retrying is the handler's business for application failures.
//!
//! ## Error Cases
//! - `ContractViolation`: A receiver was started without one of its required
//!   collaborators. Startup must abort.
//! - `UnknownMethod`: A method index that the service never registered.
//! - `ServiceShutdown`: The registry or pool no longer accepts work.
//! - `PoolSaturated`: A worker queue was full at submission time.
//! - `BacklogFull`: Too many calls are waiting on a method with no receive
//!   armed.
//! - `ChannelError`: An internal channel was closed unexpectedly.
//! - `AlreadyResponded` / `CallerGone`: Reply-side failures on a call.
//! - `SlotAlreadyFilled`: The registry tried to populate a receive twice.
//! - `DriverSpawn`: A completion-queue driver thread could not be started.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the admission core.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A required collaborator was not supplied at construction.
    #[error("Contract violation: missing {missing}")]
    ContractViolation { missing: &'static str },

    /// The method index is not part of the service's method table.
    #[error("Unknown method index {index} (service has {registered} methods)")]
    UnknownMethod { index: usize, registered: usize },

    /// The service or worker pool is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// The selected worker's queue had no free capacity.
    #[error("Worker {worker} queue is full")]
    PoolSaturated { worker: usize },

    /// The method already holds its maximum number of unreceived calls.
    #[error("Method {index} backlog is full ({limit} calls waiting)")]
    BacklogFull { index: usize, limit: usize },

    /// Internal channel send/receive failure.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// A response was already sent for this call.
    #[error("Response already sent")]
    AlreadyResponded,

    /// The caller stopped waiting for the response.
    #[error("Caller is gone")]
    CallerGone,

    /// The receive slot was populated more than once.
    #[error("Receive slot already filled")]
    SlotAlreadyFilled,

    /// A completion-queue driver thread failed to spawn.
    #[error("Failed to spawn driver thread: {0}")]
    DriverSpawn(#[from] std::io::Error),
}
