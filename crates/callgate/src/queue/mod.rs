//! Completion tokens and the event sources that deliver them.
//!
//! An armed receive is identified by a [`Tag`]. Whoever completes the receive
//! posts `(tag, ok)` to an [`EventSource`]; a driver thread later pops the
//! event and calls [`Tag::complete`], which forwards to the tag's
//! [`CompletionListener`]. A tag is inert between being armed and being
//! delivered, so a listener never observes two concurrent completions for the
//! same tag.

mod completion;

pub use completion::CompletionQueue;

use std::sync::Arc;

/// Receives the outcome of one armed operation.
pub trait CompletionListener: Send + Sync {
    /// Called on a driver thread exactly once per armed operation. `ok ==
    /// false` means the operation will never complete (shutdown).
    fn on_complete(self: Arc<Self>, ok: bool);
}

/// Correlates an armed receive with its eventual completion.
#[derive(Clone)]
pub struct Tag {
    method_index: usize,
    listener: Arc<dyn CompletionListener>,
}

impl Tag {
    pub fn new(method_index: usize, listener: Arc<dyn CompletionListener>) -> Self {
        Self {
            method_index,
            listener,
        }
    }

    pub const fn method_index(&self) -> usize {
        self.method_index
    }

    /// Identity of the listener behind this tag, for logs and assertions.
    pub fn listener_addr(&self) -> usize {
        Arc::as_ptr(&self.listener).cast::<()>() as usize
    }

    pub fn complete(self, ok: bool) {
        self.listener.on_complete(ok);
    }
}

impl core::fmt::Debug for Tag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tag")
            .field("method_index", &self.method_index)
            .field("listener", &format_args!("{:#x}", self.listener_addr()))
            .finish()
    }
}

/// Edge-triggered sink for completion notifications.
pub trait EventSource: Send + Sync {
    /// Queues `(tag, ok)` for delivery on a driver thread. Never blocks and
    /// never invokes the listener inline.
    fn post(&self, tag: Tag, ok: bool);
}
