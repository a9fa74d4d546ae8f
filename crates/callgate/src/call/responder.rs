use crate::{Error, Result};
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// One-shot reply handle for a single call.
///
/// The transport keeps the matching [`oneshot::Receiver`] and awaits it. A
/// responder that is dropped without sending closes the channel, which the
/// transport reports to the peer as an internal error.
#[derive(Debug)]
pub struct Responder<Resp> {
    tx: Mutex<Option<oneshot::Sender<Resp>>>,
}

impl<Resp> Responder<Resp> {
    pub fn new(tx: oneshot::Sender<Resp>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Creates a responder together with the receiving half the transport
    /// awaits.
    pub fn channel() -> (Self, oneshot::Receiver<Resp>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(tx), rx)
    }

    /// Sends the response.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyResponded`] if a response was already sent.
    /// - [`Error::CallerGone`] if the transport dropped its receiver.
    pub fn send(&self, response: Resp) -> Result<()> {
        let tx = self.tx.lock().take().ok_or(Error::AlreadyResponded)?;
        tx.send(response).map_err(|_| Error::CallerGone)
    }

    pub fn is_finished(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// `true` once the transport stopped waiting (client cancelled or the
    /// connection went away).
    pub fn is_caller_gone(&self) -> bool {
        self.tx.lock().as_ref().is_some_and(oneshot::Sender::is_closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_delivers_once() {
        let (responder, mut rx) = Responder::channel();
        responder.send(7_u32).unwrap();
        assert!(responder.is_finished());
        assert_eq!(rx.try_recv().unwrap(), 7);
        assert!(matches!(responder.send(8), Err(Error::AlreadyResponded)));
    }

    #[test]
    fn send_after_receiver_dropped_reports_caller_gone() {
        let (responder, rx) = Responder::<u32>::channel();
        drop(rx);
        assert!(responder.is_caller_gone());
        assert!(matches!(responder.send(1), Err(Error::CallerGone)));
    }

    #[test]
    fn dropping_unanswered_responder_closes_channel() {
        let (responder, mut rx) = Responder::<u32>::channel();
        drop(responder);
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }
}
