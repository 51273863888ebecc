//! The serialized event stream consumed by the engine.
//!
//! Several independent sources run concurrently: timer tasks, the
//! link-receive task, and the network layer. Each holds an [`EventSender`]
//! clone and posts into one unbounded channel; the engine owns the single
//! [`EventReceiver`]. The channel is the only point of hand-off between
//! threads, so the protocol state behind it needs no locking.

use tokio::sync::mpsc;

use crate::frame::Frame;
use crate::seq::Seq;
use crate::timer::Ticket;

/// One unit of work for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The network layer has a packet ready and holds credit for it.
    NetworkLayerReady,
    /// An intact frame arrived from the physical layer.
    FrameArrival(Frame),
    /// A damaged frame arrived; its contents are unusable.
    CksumErr,
    /// The retransmission timer for `seq` expired.
    Timeout { seq: Seq, ticket: Ticket },
    /// The acknowledgment-delay timer expired.
    AckTimeout { ticket: Ticket },
}

/// Producer side of the event stream. Cheap to clone.
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Consumer side of the event stream; owned by the engine.
#[derive(Debug)]
pub struct EventReceiver {
    inner: mpsc::UnboundedReceiver<Event>,
}

impl EventReceiver {
    /// Wait for the next event.
    ///
    /// Returns `None` once every [`EventSender`] has been dropped.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.inner.recv().await
    }

    /// Take an event if one is already queued, without waiting.
    pub fn try_next_event(&mut self) -> Option<Event> {
        self.inner.try_recv().ok()
    }
}

/// Create a connected event sender/receiver pair.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, EventReceiver { inner: rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_posting_order() {
        let (tx, mut rx) = event_channel();
        let other = tx.clone();
        tx.send(Event::NetworkLayerReady).unwrap();
        other.send(Event::CksumErr).unwrap();
        drop((tx, other));

        assert_eq!(rx.next_event().await, Some(Event::NetworkLayerReady));
        assert_eq!(rx.next_event().await, Some(Event::CksumErr));
        assert_eq!(rx.next_event().await, None);
    }

    #[test]
    fn try_next_event_does_not_block() {
        let (tx, mut rx) = event_channel();
        assert_eq!(rx.try_next_event(), None);
        tx.send(Event::AckTimeout { ticket: Ticket::new(1) }).unwrap();
        assert!(matches!(rx.try_next_event(), Some(Event::AckTimeout { .. })));
    }
}
