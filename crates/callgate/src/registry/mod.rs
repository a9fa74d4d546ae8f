//! The method table and the `arm_receive` contract.
//!
//! [`ServiceRegistry`] is the seam a [`MethodReceiver`](crate::MethodReceiver)
//! arms receives through. [`Service`] is the in-process implementation: it
//! matches calls handed over by a transport ([`Service::deliver`]) with armed
//! receives, in arrival order.

mod service;

pub use service::{DEFAULT_MAX_BACKLOG, Service, ServiceBuilder};

use crate::{Result, call::ReceiveSlot, queue::EventSource, queue::Tag};
use core::fmt;
use core::marker::PhantomData;
use std::sync::Arc;

/// Typed index of a registered method.
///
/// Indices follow registration order, starting at 0. The request and response
/// types ride along so arming and delivering with the wrong message types does
/// not compile.
pub struct MethodId<Req, Resp> {
    index: usize,
    _types: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> MethodId<Req, Resp> {
    pub(crate) const fn new(index: usize) -> Self {
        Self {
            index,
            _types: PhantomData,
        }
    }

    pub const fn index(self) -> usize {
        self.index
    }
}

impl<Req, Resp> Clone for MethodId<Req, Resp> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Req, Resp> Copy for MethodId<Req, Resp> {}

impl<Req, Resp> PartialEq for MethodId<Req, Resp> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<Req, Resp> Eq for MethodId<Req, Resp> {}

impl<Req, Resp> fmt::Debug for MethodId<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MethodId").field(&self.index).finish()
    }
}

/// Arms receives for registered methods.
pub trait ServiceRegistry: Send + Sync + 'static {
    /// Arms one receive for `method`.
    ///
    /// When a call arrives the registry fills `slot` and posts `(tag, true)`
    /// to `source`. If the registry is torn down first it posts
    /// `(tag, false)` instead. Exactly one of the two happens per successful
    /// call.
    ///
    /// Must be callable from a completion callback running on a driver
    /// thread, and must never invoke the tag inline.
    ///
    /// # Errors
    ///
    /// Returns an error, without arming anything, if the method is unknown or
    /// the registry already shut down.
    fn arm_receive<Req, Resp>(
        &self,
        method: MethodId<Req, Resp>,
        slot: ReceiveSlot<Req, Resp>,
        source: &Arc<dyn EventSource>,
        tag: Tag,
    ) -> Result<()>
    where
        Req: Send + 'static,
        Resp: Send + 'static;
}
