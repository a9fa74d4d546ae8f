use super::{CallContext, CallState, Responder};
use crate::Result;
use std::sync::Arc;

/// Shared handle to a received call, passed by value to the user handler.
///
/// The dispatch task owns the first reference; the handler may clone it to
/// keep the call alive past its own return (e.g. to answer from another
/// task). The underlying [`CallState`] is released with the last clone, and
/// an unanswered responder is closed at that point.
///
/// The handle is `Send` only when `Req: Sync`, since clones share the
/// request by reference.
pub struct CallHandle<Req, Resp> {
    inner: Arc<CallState<Req, Resp>>,
}

impl<Req, Resp> CallHandle<Req, Resp> {
    pub(crate) fn new(state: CallState<Req, Resp>) -> Self {
        Self {
            inner: Arc::new(state),
        }
    }

    pub fn context(&self) -> &CallContext {
        self.inner.context()
    }

    pub fn request(&self) -> &Req {
        self.inner.request()
    }

    pub fn responder(&self) -> &Responder<Resp> {
        self.inner.responder()
    }

    /// Shortcut for `self.responder().send(response)`.
    ///
    /// # Errors
    ///
    /// See [`Responder::send`].
    pub fn respond(&self, response: Resp) -> Result<()> {
        self.inner.responder().send(response)
    }

    /// Whether both handles refer to the same call.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<Req, Resp> Clone for CallHandle<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Req, Resp> core::fmt::Debug for CallHandle<Req, Resp> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallHandle")
            .field("call_id", &self.context().call_id())
            .field("method", &self.context().method_name())
            .finish_non_exhaustive()
    }
}
