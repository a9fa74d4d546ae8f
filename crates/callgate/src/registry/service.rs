use super::{MethodId, ServiceRegistry};
use crate::{
    Error, Result,
    call::{CallContext, CallState, ReceiveSlot, Responder},
    queue::{EventSource, Tag},
};
use core::any::Any;
use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;
use portable_atomic::AtomicU64;
use std::collections::VecDeque;
use std::sync::Arc;

/// Calls a method may hold while no receive is armed for it.
pub const DEFAULT_MAX_BACKLOG: usize = 1024;

struct ArmedReceive<Req, Resp> {
    slot: ReceiveSlot<Req, Resp>,
    source: Arc<dyn EventSource>,
    tag: Tag,
}

impl<Req, Resp> ArmedReceive<Req, Resp> {
    fn complete_with(self, state: CallState<Req, Resp>) -> Result<()> {
        self.slot.fill(state)?;
        self.source.post(self.tag, true);
        Ok(())
    }
}

struct MethodQueue<Req, Resp> {
    name: String,
    state: Mutex<QueueState<Req, Resp>>,
}

struct QueueState<Req, Resp> {
    armed: VecDeque<ArmedReceive<Req, Resp>>,
    backlog: VecDeque<CallState<Req, Resp>>,
}

/// Type-erased view of a [`MethodQueue`] so methods with different message
/// types share one table.
trait ErasedQueue: Send + Sync {
    fn name(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
    fn armed_len(&self) -> usize;
    fn backlog_len(&self) -> usize;
    /// Fails every armed receive and drops every backlogged call.
    fn cancel_all(&self) -> (usize, usize);
}

impl<Req, Resp> ErasedQueue for MethodQueue<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn armed_len(&self) -> usize {
        self.state.lock().armed.len()
    }

    fn backlog_len(&self) -> usize {
        self.state.lock().backlog.len()
    }

    fn cancel_all(&self) -> (usize, usize) {
        let (armed, backlog) = {
            let mut state = self.state.lock();
            (
                core::mem::take(&mut state.armed),
                core::mem::take(&mut state.backlog),
            )
        };
        let counts = (armed.len(), backlog.len());
        for receive in armed {
            receive.source.post(receive.tag, false);
        }
        // Dropping the backlog closes every waiting caller's responder.
        drop(backlog);
        counts
    }
}

/// In-process method table.
///
/// Each registered method owns a FIFO of armed receives and a bounded FIFO of
/// calls that arrived while nothing was armed. [`deliver`](Self::deliver) and
/// [`arm_receive`](ServiceRegistry::arm_receive) meet in the middle: whichever
/// side finds the other waiting completes the pair and posts `(tag, true)`.
pub struct Service {
    name: String,
    methods: Vec<Box<dyn ErasedQueue>>,
    max_backlog: usize,
    next_call_id: AtomicU64,
    shutdown: AtomicBool,
}

/// Registers methods in order and freezes them into a [`Service`].
pub struct ServiceBuilder {
    name: String,
    methods: Vec<Box<dyn ErasedQueue>>,
    max_backlog: usize,
}

impl ServiceBuilder {
    /// Caps the calls each method holds while no receive is armed. Defaults
    /// to [`DEFAULT_MAX_BACKLOG`]. Zero rejects every call that does not find
    /// an armed receive.
    pub fn max_backlog(&mut self, limit: usize) -> &mut Self {
        self.max_backlog = limit;
        self
    }

    /// Adds a method and returns its typed index.
    pub fn add_method<Req, Resp>(&mut self, name: impl Into<String>) -> MethodId<Req, Resp>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let index = self.methods.len();
        self.methods.push(Box::new(MethodQueue::<Req, Resp> {
            name: name.into(),
            state: Mutex::new(QueueState {
                armed: VecDeque::new(),
                backlog: VecDeque::new(),
            }),
        }));
        MethodId::new(index)
    }

    pub fn build(self) -> Arc<Service> {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            service = %self.name,
            methods = self.methods.len(),
            max_backlog = self.max_backlog,
            "Service registered"
        );
        Arc::new(Service {
            name: self.name,
            methods: self.methods,
            max_backlog: self.max_backlog,
            next_call_id: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        })
    }
}

impl Service {
    pub fn builder(name: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder {
            name: name.into(),
            methods: Vec::new(),
            max_backlog: DEFAULT_MAX_BACKLOG,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn method_name(&self, index: usize) -> Option<&str> {
        self.methods.get(index).map(|m| m.name())
    }

    /// Receives currently armed for the method at `index`.
    pub fn armed(&self, index: usize) -> usize {
        self.methods.get(index).map_or(0, |m| m.armed_len())
    }

    /// Calls waiting for a receive to be armed for the method at `index`.
    pub fn backlog(&self, index: usize) -> usize {
        self.methods.get(index).map_or(0, |m| m.backlog_len())
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn queue<Req, Resp>(&self, method: MethodId<Req, Resp>) -> Result<&MethodQueue<Req, Resp>>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        self.methods
            .get(method.index())
            .and_then(|m| m.as_any().downcast_ref::<MethodQueue<Req, Resp>>())
            .ok_or(Error::UnknownMethod {
                index: method.index(),
                registered: self.methods.len(),
            })
    }

    /// Hands an incoming call to the method's oldest armed receive, or queues
    /// it until the next receive is armed. Returns the assigned call id.
    ///
    /// A method whose receiver never arms (or has stopped) only ever grows its
    /// backlog, so the backlog is capped by
    /// [`ServiceBuilder::max_backlog`]. Backlogged calls are dropped on
    /// [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    ///
    /// In every case the responder is dropped, closing the caller's channel.
    ///
    /// - [`Error::ServiceShutdown`] once [`shutdown`](Self::shutdown) ran.
    /// - [`Error::UnknownMethod`] if `method` does not belong to this service.
    /// - [`Error::BacklogFull`] if no receive is armed and the method's
    ///   backlog is at its limit.
    pub fn deliver<Req, Resp>(
        &self,
        method: MethodId<Req, Resp>,
        mut context: CallContext,
        request: Req,
        responder: Responder<Resp>,
    ) -> Result<u64>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        if self.is_shutdown() {
            return Err(Error::ServiceShutdown);
        }
        let queue = self.queue(method)?;

        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed) + 1;
        context.assign(call_id, method.index(), &queue.name);
        let call = CallState::new(context, request, responder);

        let armed = {
            let mut state = queue.state.lock();
            if self.is_shutdown() {
                return Err(Error::ServiceShutdown);
            }
            match state.armed.pop_front() {
                Some(armed) => armed,
                None if state.backlog.len() >= self.max_backlog => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        call_id,
                        method = %queue.name,
                        limit = self.max_backlog,
                        "No receive armed and backlog full; call rejected"
                    );
                    return Err(Error::BacklogFull {
                        index: method.index(),
                        limit: self.max_backlog,
                    });
                }
                None => {
                    state.backlog.push_back(call);
                    #[cfg(feature = "tracing")]
                    tracing::trace!(
                        call_id,
                        method = %queue.name,
                        backlog = state.backlog.len(),
                        "No receive armed; call backlogged"
                    );
                    return Ok(call_id);
                }
            }
        };

        armed.complete_with(call)?;
        Ok(call_id)
    }

    /// Stops accepting calls and receives.
    ///
    /// Every armed receive completes with `ok == false`; every backlogged call
    /// is dropped. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        for method in &self.methods {
            let (_armed, _backlog) = method.cancel_all();
            #[cfg(feature = "tracing")]
            tracing::debug!(
                service = %self.name,
                method = method.name(),
                armed = _armed,
                dropped = _backlog,
                "Method shut down"
            );
        }
    }
}

impl ServiceRegistry for Service {
    fn arm_receive<Req, Resp>(
        &self,
        method: MethodId<Req, Resp>,
        slot: ReceiveSlot<Req, Resp>,
        source: &Arc<dyn EventSource>,
        tag: Tag,
    ) -> Result<()>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        if self.is_shutdown() {
            return Err(Error::ServiceShutdown);
        }
        let queue = self.queue(method)?;

        let call = {
            let mut state = queue.state.lock();
            // Checked under the lock so `shutdown` cannot miss this receive.
            if self.is_shutdown() {
                return Err(Error::ServiceShutdown);
            }
            match state.backlog.pop_front() {
                Some(call) => call,
                None => {
                    state.armed.push_back(ArmedReceive {
                        slot,
                        source: Arc::clone(source),
                        tag,
                    });
                    return Ok(());
                }
            }
        };

        ArmedReceive {
            slot,
            source: Arc::clone(source),
            tag,
        }
        .complete_with(call)
    }
}

impl core::fmt::Debug for Service {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("methods", &self.methods.len())
            .field("max_backlog", &self.max_backlog)
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{CompletionListener, CompletionQueue};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        seen: StdMutex<Vec<bool>>,
    }

    impl CompletionListener for Recorder {
        fn on_complete(self: Arc<Self>, ok: bool) {
            self.seen.lock().unwrap().push(ok);
        }
    }

    fn setup() -> (Arc<Service>, MethodId<String, usize>, Arc<CompletionQueue>) {
        let mut builder = Service::builder("test.Svc");
        let _first = builder.add_method::<u8, u8>("First");
        let method = builder.add_method::<String, usize>("Len");
        (builder.build(), method, Arc::new(CompletionQueue::new()))
    }

    #[test]
    fn method_indices_follow_registration_order() {
        let (service, method, _) = setup();
        assert_eq!(method.index(), 1);
        assert_eq!(service.method_count(), 2);
        assert_eq!(service.method_name(0), Some("First"));
        assert_eq!(service.method_name(1), Some("Len"));
        assert_eq!(service.method_name(2), None);
    }

    #[test]
    fn armed_receive_is_completed_by_delivery() {
        let (service, method, queue) = setup();
        let source: Arc<dyn EventSource> = queue.clone();
        let recorder = Arc::new(Recorder::default());
        let slot = ReceiveSlot::new();

        service
            .arm_receive(method, slot.clone(), &source, Tag::new(1, recorder.clone()))
            .unwrap();
        assert_eq!(service.armed(1), 1);
        assert!(queue.is_empty());

        let (responder, _rx) = Responder::channel();
        let id = service
            .deliver(method, CallContext::new(), "hello".to_string(), responder)
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(service.armed(1), 0);

        let call = slot.take().unwrap();
        assert_eq!(call.request(), "hello");
        assert_eq!(call.context().call_id(), 1);
        assert_eq!(call.context().method_name(), "Len");

        assert_eq!(queue.poll(), 1);
        assert_eq!(*recorder.seen.lock().unwrap(), vec![true]);
    }

    #[test]
    fn backlogged_call_is_matched_when_armed() {
        let (service, method, queue) = setup();
        let source: Arc<dyn EventSource> = queue.clone();
        let recorder = Arc::new(Recorder::default());

        let (responder, _rx) = Responder::channel();
        service
            .deliver(method, CallContext::new(), "early".to_string(), responder)
            .unwrap();
        assert_eq!(service.backlog(1), 1);

        let slot = ReceiveSlot::new();
        service
            .arm_receive(method, slot.clone(), &source, Tag::new(1, recorder.clone()))
            .unwrap();
        assert_eq!(service.backlog(1), 0);
        assert_eq!(service.armed(1), 0);
        assert_eq!(slot.take().unwrap().request(), "early");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn shutdown_fails_armed_receives_and_drops_backlog() {
        let mut builder = Service::builder("test.Svc");
        let armed_method = builder.add_method::<u8, u8>("Armed");
        let backlog_method = builder.add_method::<u8, u8>("Backlog");
        let service = builder.build();
        let queue = Arc::new(CompletionQueue::new());
        let source: Arc<dyn EventSource> = queue.clone();
        let recorder = Arc::new(Recorder::default());

        service
            .arm_receive(
                armed_method,
                ReceiveSlot::new(),
                &source,
                Tag::new(0, recorder.clone()),
            )
            .unwrap();
        let (responder, mut rx) = Responder::channel();
        service
            .deliver(backlog_method, CallContext::new(), 9, responder)
            .unwrap();

        service.shutdown();
        service.shutdown();

        assert_eq!(queue.poll(), 1);
        assert_eq!(*recorder.seen.lock().unwrap(), vec![false]);
        assert!(rx.try_recv().is_err());

        let (responder, _rx) = Responder::channel();
        assert!(matches!(
            service.deliver(backlog_method, CallContext::new(), 1, responder),
            Err(Error::ServiceShutdown)
        ));
        assert!(matches!(
            service.arm_receive(
                armed_method,
                ReceiveSlot::new(),
                &source,
                Tag::new(0, recorder.clone()),
            ),
            Err(Error::ServiceShutdown)
        ));
    }

    #[test]
    fn unarmed_method_backlog_is_bounded() {
        let mut builder = Service::builder("test.Svc");
        builder.max_backlog(2);
        let method = builder.add_method::<u8, u8>("Idle");
        let service = builder.build();
        let queue = Arc::new(CompletionQueue::new());
        let source: Arc<dyn EventSource> = queue.clone();

        let mut waiting = Vec::new();
        for i in 0..2 {
            let (responder, rx) = Responder::channel();
            service
                .deliver(method, CallContext::new(), i, responder)
                .unwrap();
            waiting.push(rx);
        }
        assert_eq!(service.backlog(0), 2);

        let (responder, mut rejected) = Responder::channel();
        let err = service
            .deliver(method, CallContext::new(), 2, responder)
            .unwrap_err();
        assert!(matches!(err, Error::BacklogFull { index: 0, limit: 2 }));
        assert!(rejected.try_recv().is_err());
        assert_eq!(service.backlog(0), 2);

        // Arming drains the oldest call and frees room for one more.
        let slot = ReceiveSlot::new();
        let recorder = Arc::new(Recorder::default());
        service
            .arm_receive(method, slot.clone(), &source, Tag::new(0, recorder))
            .unwrap();
        assert_eq!(*slot.take().unwrap().request(), 0);
        assert_eq!(service.backlog(0), 1);

        let (responder, _rx) = Responder::channel();
        service
            .deliver(method, CallContext::new(), 3, responder)
            .unwrap();
        assert_eq!(service.backlog(0), 2);
    }

    #[test]
    fn foreign_method_id_is_rejected() {
        let (service, _, queue) = setup();
        let source: Arc<dyn EventSource> = queue;
        let mut other = Service::builder("other");
        for _ in 0..5 {
            other.add_method::<u8, u8>("pad");
        }
        let foreign = other.add_method::<u8, u8>("Foreign");

        let recorder = Arc::new(Recorder::default());
        let err = service
            .arm_receive(foreign, ReceiveSlot::new(), &source, Tag::new(5, recorder))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownMethod {
                index: 5,
                registered: 2
            }
        ));
    }
}
