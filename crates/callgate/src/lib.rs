//! # `callgate`: call admission for unary RPC services
//!
//! `callgate` is the server-side core that keeps a unary RPC method
//! receptive: for every registered method a [`MethodReceiver`] keeps exactly
//! one receive armed on a completion queue, hands each received call to a
//! worker pool, and re-arms before the completion driver moves on.
//!
//! ## Highlights
//!
//! - **Always armed**: a method never has a gap where no receive is armed,
//!   even while earlier calls are still being handled.
//! - **Non-blocking drivers**: completion callbacks only move the call into a
//!   task and enqueue it; handlers run later on the pool.
//! - **Owned hand-off**: the dispatched task owns its [`CallHandle`] and does
//!   not reference the receiver.
//! - **Clean shutdown**: a failed completion stops the receiver for good.
//!
//! ## Example
//!
//! ```rust,no_run
//! use callgate::{
//!     CallContext, CompletionQueue, MethodReceiver, PoolConfig, Responder, Server, Service,
//!     WorkerPool,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> callgate::Result<()> {
//! let mut builder = Service::builder("demo.Greeter");
//! let greet = builder.add_method::<String, String>("Greet");
//! let service = builder.build();
//!
//! let queue = Arc::new(CompletionQueue::new());
//! let pool = Arc::new(WorkerPool::spawn(
//!     &PoolConfig::default(),
//!     &tokio::runtime::Handle::current(),
//! )?);
//!
//! let _receiver = MethodReceiver::start(
//!     Arc::clone(&service),
//!     greet,
//!     queue.clone(),
//!     pool.clone(),
//!     |call| {
//!         let _ = call.respond(format!("hello, {}", call.request()));
//!     },
//! )?;
//! let server = Server::start(Arc::clone(&service), queue, pool, 2)?;
//!
//! let (responder, reply) = Responder::channel();
//! service.deliver(greet, CallContext::new(), "world".to_string(), responder)?;
//! assert_eq!(reply.await.ok().as_deref(), Some("hello, world"));
//!
//! server.shutdown().await
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`call`] - per-call state, handles and responders.
//! - [`queue`] - completion tokens and the [`CompletionQueue`].
//! - [`registry`] - the method table and the `arm_receive` contract.
//! - [`receiver`] - the per-method receive/dispatch loop.
//! - [`pool`] - executors, including the Tokio [`WorkerPool`].
//! - [`server`] - driver threads and ordered shutdown.

pub mod call;
mod error;
pub mod pool;
pub mod queue;
pub mod receiver;
pub mod registry;
pub mod server;

pub use call::{CallContext, CallHandle, CallState, ReceiveSlot, Responder};
pub use error::{Error, Result};
pub use pool::{Executor, PoolConfig, Task, WorkerPool};
pub use queue::{CompletionListener, CompletionQueue, EventSource, Tag};
pub use receiver::{Handler, MethodReceiver, MethodReceiverBuilder, ReceiverStatus};
pub use registry::{DEFAULT_MAX_BACKLOG, MethodId, Service, ServiceBuilder, ServiceRegistry};
pub use server::Server;
