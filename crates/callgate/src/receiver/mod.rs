//! Per-method receive/dispatch loop.
//!
//! A [`MethodReceiver`] keeps exactly one receive armed for its method. When
//! the event source reports a successful completion, the receiver moves the
//! received [`CallState`] into a [`CallHandle`], submits the user handler to
//! the [`Executor`], and arms the next receive before returning to the driver
//! thread. A failed completion is terminal: nothing is dispatched and nothing
//! is re-armed.
//!
//! ```text
//!   Idle --start--> Armed --ok=true: dispatch + re-arm--> Armed
//!                     |
//!                     +--ok=false / re-arm rejected-----> Stopped
//! ```


use crate::{
    Error, Result,
    call::{CallHandle, CallState, ReceiveSlot},
    pool::{Executor, Task},
    queue::{CompletionListener, EventSource, Tag},
    registry::{MethodId, ServiceRegistry},
};
use core::sync::atomic::Ordering;
use parking_lot::Mutex;
use portable_atomic::AtomicU64;
use std::sync::Arc;

/// User code invoked once per received call, on a worker.
///
/// The handler gets a shared [`CallHandle`], so the request type must be
/// `Sync` as well as `Send` for the task to cross to a worker.
pub type Handler<Req, Resp> = Arc<dyn Fn(CallHandle<Req, Resp>) + Send + Sync + 'static>;

/// Externally observable receiver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverStatus {
    /// Constructed, first receive not armed yet.
    Idle,
    /// One receive is armed and awaiting completion.
    Armed,
    /// Terminal. The event source shut down or re-arming was rejected.
    Stopped,
}

enum State<Req, Resp> {
    Idle,
    Armed(ReceiveSlot<Req, Resp>),
    Stopped,
}

impl<Req, Resp> State<Req, Resp> {
    const fn status(&self) -> ReceiverStatus {
        match self {
            Self::Idle => ReceiverStatus::Idle,
            Self::Armed(_) => ReceiverStatus::Armed,
            Self::Stopped => ReceiverStatus::Stopped,
        }
    }
}

/// Receives calls for one method and dispatches them to a worker pool.
///
/// The receiver is its own completion token: every armed receive carries a
/// [`Tag`] pointing back at it. The event source never completes the same
/// tag twice, so completions are serialized per receiver even
/// when several driver threads pump the queue. The state mutex is therefore
/// never contended on the hot path.
pub struct MethodReceiver<S, Req, Resp> {
    service: Arc<S>,
    method: MethodId<Req, Resp>,
    source: Arc<dyn EventSource>,
    executor: Arc<dyn Executor>,
    handler: Handler<Req, Resp>,
    state: Mutex<State<Req, Resp>>,
    dispatched: AtomicU64,
    dispatch_failures: AtomicU64,
}

/// Collects a receiver's collaborators. [`start`](Self::start) refuses to arm
/// anything unless all of them are present.
pub struct MethodReceiverBuilder<S, Req, Resp> {
    service: Arc<S>,
    method: MethodId<Req, Resp>,
    source: Option<Arc<dyn EventSource>>,
    executor: Option<Arc<dyn Executor>>,
    handler: Option<Handler<Req, Resp>>,
}

impl<S, Req, Resp> MethodReceiverBuilder<S, Req, Resp>
where
    S: ServiceRegistry,
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
{
    #[must_use]
    pub fn event_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    #[must_use]
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(CallHandle<Req, Resp>) + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Shares an existing handler between several receivers.
    #[must_use]
    pub fn shared_handler(mut self, handler: Handler<Req, Resp>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Validates the collaborators and arms the first receive.
    ///
    /// # Errors
    ///
    /// - [`Error::ContractViolation`] if the event source, executor or handler
    ///   is missing. Nothing is armed.
    /// - Whatever the registry's `arm_receive` rejects the first arm with.
    pub fn start(self) -> Result<Arc<MethodReceiver<S, Req, Resp>>> {
        let source = self.source.ok_or(Error::ContractViolation {
            missing: "event source",
        })?;
        let executor = self.executor.ok_or(Error::ContractViolation {
            missing: "worker pool",
        })?;
        let handler = self.handler.ok_or(Error::ContractViolation {
            missing: "handler",
        })?;

        let receiver = Arc::new(MethodReceiver {
            service: self.service,
            method: self.method,
            source,
            executor,
            handler,
            state: Mutex::new(State::Idle),
            dispatched: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
        });
        receiver.arm()?;

        #[cfg(feature = "tracing")]
        tracing::debug!(method = receiver.method.index(), "Method receiver started");
        Ok(receiver)
    }
}

impl<S, Req, Resp> MethodReceiver<S, Req, Resp>
where
    S: ServiceRegistry,
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
{
    pub fn builder(
        service: Arc<S>,
        method: MethodId<Req, Resp>,
    ) -> MethodReceiverBuilder<S, Req, Resp> {
        MethodReceiverBuilder {
            service,
            method,
            source: None,
            executor: None,
            handler: None,
        }
    }

    /// Starts a receiver with every collaborator supplied up front.
    ///
    /// # Errors
    ///
    /// See [`MethodReceiverBuilder::start`].
    pub fn start<F>(
        service: Arc<S>,
        method: MethodId<Req, Resp>,
        source: Arc<dyn EventSource>,
        executor: Arc<dyn Executor>,
        handler: F,
    ) -> Result<Arc<Self>>
    where
        F: Fn(CallHandle<Req, Resp>) + Send + Sync + 'static,
    {
        Self::builder(service, method)
            .event_source(source)
            .executor(executor)
            .handler(handler)
            .start()
    }

    pub const fn method(&self) -> MethodId<Req, Resp> {
        self.method
    }

    pub fn status(&self) -> ReceiverStatus {
        self.state.lock().status()
    }

    /// Calls successfully handed to the executor.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Calls lost because the executor rejected them.
    pub fn dispatch_failures(&self) -> u64 {
        self.dispatch_failures.load(Ordering::Relaxed)
    }

    /// Completion callback for the currently armed receive, reached only
    /// through the receive's [`Tag`].
    ///
    /// With `ok == true` the received call is dispatched and the next receive
    /// is armed before this returns. With `ok == false` the receiver stops for
    /// good.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip(self), fields(method = self.method.index()))
    )]
    fn invoke(self: &Arc<Self>, ok: bool) {
        let slot = {
            let mut state = self.state.lock();
            match core::mem::replace(&mut *state, State::Idle) {
                State::Armed(slot) => slot,
                other => {
                    *state = other;
                    #[cfg(feature = "tracing")]
                    tracing::error!(ok, "Completion delivered with no receive armed");
                    return;
                }
            }
        };

        if !ok {
            *self.state.lock() = State::Stopped;
            #[cfg(feature = "tracing")]
            tracing::debug!("Receive failed; event source is shutting down");
            return;
        }

        match slot.take() {
            Some(call) => self.dispatch(call),
            None => {
                #[cfg(feature = "tracing")]
                tracing::error!("Receive completed without a populated call");
            }
        }

        // Re-arm no matter how dispatch went; a lost call must not stall the
        // method.
        if let Err(_e) = self.arm() {
            #[cfg(feature = "tracing")]
            tracing::error!("Failed to re-arm receive: {_e}");
        }
    }

    fn dispatch(&self, call: CallState<Req, Resp>) {
        let _call_id = call.context().call_id();
        let handle = CallHandle::new(call);
        let handler = Arc::clone(&self.handler);
        let task: Task = Box::new(move || handler(handle));

        match self.executor.submit(task) {
            Ok(()) => {
                self.dispatched.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "tracing")]
                tracing::trace!(call_id = _call_id, "Call dispatched");
            }
            Err(_e) => {
                // The rejected task, and the call inside it, are dropped here,
                // which closes the caller's responder.
                self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "tracing")]
                tracing::error!(call_id = _call_id, "Dropping call, submission failed: {_e}");
            }
        }
    }

    fn arm(self: &Arc<Self>) -> Result<()> {
        let slot = ReceiveSlot::new();
        {
            let mut state = self.state.lock();
            match *state {
                State::Idle => {}
                State::Stopped => return Err(Error::ServiceShutdown),
                State::Armed(_) => unreachable!("receive armed twice"),
            }
            // Published before arming: the completion may be delivered on
            // another driver thread before `arm_receive` returns.
            *state = State::Armed(slot.clone());
        }

        let listener: Arc<dyn CompletionListener> = self.clone();
        let tag = Tag::new(self.method.index(), listener);
        if let Err(e) = self.service.arm_receive(self.method, slot, &self.source, tag) {
            *self.state.lock() = State::Stopped;
            return Err(e);
        }
        Ok(())
    }
}

impl<S, Req, Resp> CompletionListener for MethodReceiver<S, Req, Resp>
where
    S: ServiceRegistry,
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
{
    fn on_complete(self: Arc<Self>, ok: bool) {
        self.invoke(ok);
    }
}

impl<S, Req, Resp> core::fmt::Debug for MethodReceiver<S, Req, Resp> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MethodReceiver")
            .field("method", &self.method)
            .field("status", &self.state.lock().status())
            .field("dispatched", &self.dispatched.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
