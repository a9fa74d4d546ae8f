use super::{CallContext, Responder};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Everything the core knows about one received call.
#[derive(Debug)]
pub struct CallState<Req, Resp> {
    pub(crate) context: CallContext,
    pub(crate) request: Req,
    pub(crate) responder: Responder<Resp>,
}

impl<Req, Resp> CallState<Req, Resp> {
    pub fn new(context: CallContext, request: Req, responder: Responder<Resp>) -> Self {
        Self {
            context,
            request,
            responder,
        }
    }

    pub const fn context(&self) -> &CallContext {
        &self.context
    }

    pub const fn request(&self) -> &Req {
        &self.request
    }

    pub const fn responder(&self) -> &Responder<Resp> {
        &self.responder
    }
}

/// The armed home of the next [`CallState`] for a method.
///
/// A receiver creates a fresh, empty slot immediately before each
/// `arm_receive`. The registry keeps a clone while the receive is armed and
/// fills it exactly once before posting a successful completion; the receiver
/// then takes the state out. Clones share the same underlying slot.
pub struct ReceiveSlot<Req, Resp> {
    inner: Arc<Mutex<Option<CallState<Req, Resp>>>>,
}

impl<Req, Resp> ReceiveSlot<Req, Resp> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Populates the slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SlotAlreadyFilled`] (and hands nothing over) if the
    /// slot already holds a call.
    pub fn fill(&self, state: CallState<Req, Resp>) -> Result<()> {
        let mut guard = self.inner.lock();
        if guard.is_some() {
            return Err(Error::SlotAlreadyFilled);
        }
        *guard = Some(state);
        Ok(())
    }

    pub fn take(&self) -> Option<CallState<Req, Resp>> {
        self.inner.lock().take()
    }

    pub fn is_filled(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn same_slot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<Req, Resp> Clone for ReceiveSlot<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Req, Resp> Default for ReceiveSlot<Req, Resp> {
    fn default() -> Self {
        Self::new()
    }
}
