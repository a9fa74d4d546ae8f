use super::{EventSource, Tag};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use core::sync::atomic::{AtomicBool, Ordering};
use portable_atomic::AtomicU64;

enum Event {
    Completion { tag: Tag, ok: bool },
    Shutdown,
}

/// Multi-driver completion queue.
///
/// Any number of threads may call [`run`](Self::run) (or [`next`](Self::next))
/// concurrently; each posted event is delivered to exactly one of them.
/// [`shutdown`](Self::shutdown) lets the drivers drain every event posted
/// before it and then return.
pub struct CompletionQueue {
    tx: Sender<Event>,
    rx: Receiver<Event>,
    shutdown: AtomicBool,
    delivered: AtomicU64,
}

impl CompletionQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            shutdown: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
        }
    }

    /// Blocks until the next completion is available. Returns `None` once the
    /// queue has been shut down and drained.
    pub fn next(&self) -> Option<(Tag, bool)> {
        match self.rx.recv() {
            Ok(Event::Completion { tag, ok }) => Some((tag, ok)),
            Ok(Event::Shutdown) => {
                // Pass the marker on so every other driver also stops.
                let _ = self.tx.send(Event::Shutdown);
                None
            }
            Err(_) => None,
        }
    }

    /// Non-blocking variant of [`next`](Self::next). `None` means either
    /// nothing is queued or the queue is shut down.
    pub fn try_next(&self) -> Option<(Tag, bool)> {
        match self.rx.try_recv() {
            Ok(Event::Completion { tag, ok }) => Some((tag, ok)),
            Ok(Event::Shutdown) => {
                let _ = self.tx.send(Event::Shutdown);
                None
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Driver loop: delivers completions until shutdown. Returns how many
    /// completions this driver delivered.
    pub fn run(&self) -> u64 {
        let mut delivered = 0;
        while let Some((tag, ok)) = self.next() {
            #[cfg(feature = "tracing")]
            tracing::trace!(method = tag.method_index(), ok, "delivering completion");
            tag.complete(ok);
            delivered += 1;
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }
        delivered
    }

    /// Delivers everything currently queued on the calling thread, without
    /// blocking. Returns the number of completions delivered.
    pub fn poll(&self) -> u64 {
        let mut delivered = 0;
        while let Some((tag, ok)) = self.try_next() {
            tag.complete(ok);
            delivered += 1;
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }
        delivered
    }

    /// Stops the drivers after they drain what was posted so far.
    ///
    /// Idempotent. Producers (the registry) should be shut down first so no
    /// completion is posted after the marker.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(queued = self.rx.len(), "Completion queue shutting down");
        let _ = self.tx.send(Event::Shutdown);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Number of events waiting for a driver.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Total completions delivered by all drivers.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CompletionQueue {
    fn post(&self, tag: Tag, ok: bool) {
        if self.is_shutdown() {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                method = tag.method_index(),
                ok,
                "Completion posted after shutdown; dropping"
            );
            return;
        }
        // Both halves live in `self`, so the channel cannot be disconnected.
        let _ = self.tx.send(Event::Completion { tag, ok });
    }
}
