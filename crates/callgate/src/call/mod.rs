//! Per-call state and the handle user code receives.
//!
//! - [`CallState`] - context, request and responder of one call.
//! - [`ReceiveSlot`] - where the registry deposits the next [`CallState`].
//! - [`CallHandle`] - shared, read-mostly view of a [`CallState`] handed to
//!   the user handler.
//! - [`Responder`] - one-shot reply channel back to the transport.

mod context;
mod handle;
mod responder;
mod state;

pub use context::CallContext;
pub use handle::CallHandle;
pub use responder::Responder;
pub use state::{CallState, ReceiveSlot};
