//! Network-layer boundary: the packet source above the sender and the
//! packet sink above the receiver.
//!
//! The engine talks to the network layer only through [`NetworkLayer`].
//! Credit flows downward (`grant_credit`), packets flow both ways.
//!
//! [`network_layer`] builds the in-memory implementation used by
//! [`crate::session::Session`]: a [`QueueNetworkLayer`] for the engine and a
//! [`NetworkHandle`] for the application. The application may submit any
//! number of packets up to the link's payload limit; the queue announces one
//! [`Event::NetworkLayerReady`] per packet it is allowed to hand over, never
//! more than the credit it holds.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::{Event, EventSender};
use crate::frame::Packet;

/// Why a packet was refused at submission.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("packet of {len} bytes exceeds the link limit of {max} bytes")]
    TooLarge { len: usize, max: usize },
}

/// What the engine needs from the layer above it.
pub trait NetworkLayer {
    /// Hand over the next queued packet. Called once per
    /// [`Event::NetworkLayerReady`].
    fn pull_next_packet(&mut self) -> Option<Packet>;

    /// Pass a packet up, strictly in the order the peer submitted them.
    fn deliver(&mut self, packet: Packet);

    /// Permit `n` more packets to be submitted.
    fn grant_credit(&mut self, n: usize);
}

// ---------------------------------------------------------------------------
// Shared outbox
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Outbox {
    queue: VecDeque<Packet>,
    /// Credit granted by the engine and not yet spent on an announcement.
    credit: usize,
    /// Announcements posted whose packet has not been pulled yet.
    announced: usize,
}

impl Outbox {
    /// Post one ready event per (credit unit, unannounced packet) pair.
    fn announce(&mut self, events: &EventSender) {
        while self.credit > 0 && self.queue.len() > self.announced {
            if events.send(Event::NetworkLayerReady).is_err() {
                return;
            }
            self.credit -= 1;
            self.announced += 1;
        }
    }
}

fn lock(outbox: &Mutex<Outbox>) -> MutexGuard<'_, Outbox> {
    outbox.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Engine side
// ---------------------------------------------------------------------------

/// The engine's view of the in-memory network layer.
#[derive(Debug)]
pub struct QueueNetworkLayer {
    outbox: Arc<Mutex<Outbox>>,
    events: EventSender,
    delivered: mpsc::UnboundedSender<Packet>,
}

impl NetworkLayer for QueueNetworkLayer {
    fn pull_next_packet(&mut self) -> Option<Packet> {
        let mut outbox = lock(&self.outbox);
        let packet = outbox.queue.pop_front()?;
        outbox.announced = outbox.announced.saturating_sub(1);
        Some(packet)
    }

    fn deliver(&mut self, packet: Packet) {
        // The application may have stopped listening; deliveries are dropped.
        if self.delivered.send(packet).is_err() {
            log::debug!("[net] delivery dropped, receiver gone");
        }
    }

    fn grant_credit(&mut self, n: usize) {
        let mut outbox = lock(&self.outbox);
        outbox.credit += n;
        outbox.announce(&self.events);
    }
}

// ---------------------------------------------------------------------------
// Application side
// ---------------------------------------------------------------------------

/// The application's view: submit packets, receive deliveries.
#[derive(Debug)]
pub struct NetworkHandle {
    outbox: Arc<Mutex<Outbox>>,
    events: EventSender,
    delivered: mpsc::UnboundedReceiver<Packet>,
    max_payload: usize,
}

impl NetworkHandle {
    /// Queue a packet for transmission.
    ///
    /// Never blocks: packets beyond the current credit wait in the queue
    /// until acknowledgments free window space. A packet longer than
    /// [`max_payload`](NetworkHandle::max_payload) is refused and nothing is
    /// queued.
    pub fn submit(&self, packet: impl Into<Packet>) -> Result<(), SubmitError> {
        let packet = packet.into();
        if packet.len() > self.max_payload {
            return Err(SubmitError::TooLarge {
                len: packet.len(),
                max: self.max_payload,
            });
        }
        let mut outbox = lock(&self.outbox);
        outbox.queue.push_back(packet);
        outbox.announce(&self.events);
        Ok(())
    }

    /// Largest packet [`submit`](NetworkHandle::submit) accepts.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Wait for the next packet delivered from the peer.
    ///
    /// Returns `None` once the engine is gone.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.delivered.recv().await
    }

    /// Take a delivered packet if one is waiting.
    pub fn try_recv(&mut self) -> Option<Packet> {
        self.delivered.try_recv().ok()
    }

    /// Packets submitted and not yet handed to the engine.
    pub fn pending(&self) -> usize {
        lock(&self.outbox).queue.len()
    }
}

/// Build a connected engine-side / application-side pair posting into
/// `events`, accepting packets of at most `max_payload` bytes.
pub fn network_layer(events: EventSender, max_payload: usize) -> (QueueNetworkLayer, NetworkHandle) {
    let outbox = Arc::new(Mutex::new(Outbox::default()));
    let (tx, rx) = mpsc::unbounded_channel();
    let engine_side = QueueNetworkLayer {
        outbox: Arc::clone(&outbox),
        events: events.clone(),
        delivered: tx,
    };
    let app_side = NetworkHandle {
        outbox,
        events,
        delivered: rx,
        max_payload,
    };
    (engine_side, app_side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{event_channel, EventReceiver};
    use crate::frame::MAX_PAYLOAD;

    fn count_ready(rx: &mut EventReceiver) -> usize {
        let mut n = 0;
        while let Some(ev) = rx.try_next_event() {
            assert_eq!(ev, Event::NetworkLayerReady);
            n += 1;
        }
        n
    }

    #[test]
    fn no_announcement_without_credit() {
        let (tx, mut rx) = event_channel();
        let (_net, app) = network_layer(tx, MAX_PAYLOAD);
        app.submit("a").unwrap();
        app.submit("b").unwrap();
        assert_eq!(count_ready(&mut rx), 0);
        assert_eq!(app.pending(), 2);
    }

    #[test]
    fn announcements_bounded_by_credit() {
        let (tx, mut rx) = event_channel();
        let (mut net, app) = network_layer(tx, MAX_PAYLOAD);
        net.grant_credit(2);
        for p in ["a", "b", "c"] {
            app.submit(p).unwrap();
        }
        assert_eq!(count_ready(&mut rx), 2);

        assert_eq!(net.pull_next_packet(), Some(Packet::from("a")));
        assert_eq!(net.pull_next_packet(), Some(Packet::from("b")));
        net.grant_credit(1);
        assert_eq!(count_ready(&mut rx), 1);
        assert_eq!(net.pull_next_packet(), Some(Packet::from("c")));
        assert_eq!(net.pull_next_packet(), None);
    }

    #[test]
    fn unused_credit_waits_for_submissions() {
        let (tx, mut rx) = event_channel();
        let (mut net, app) = network_layer(tx, MAX_PAYLOAD);
        net.grant_credit(4);
        assert_eq!(count_ready(&mut rx), 0);
        app.submit("late").unwrap();
        assert_eq!(count_ready(&mut rx), 1);
    }

    #[test]
    fn oversize_packet_refused_without_queueing() {
        let (tx, mut rx) = event_channel();
        let (mut net, app) = network_layer(tx, 8);
        net.grant_credit(4);

        assert_eq!(
            app.submit(vec![0u8; 9]),
            Err(SubmitError::TooLarge { len: 9, max: 8 })
        );
        assert_eq!(app.pending(), 0);
        assert_eq!(count_ready(&mut rx), 0);

        app.submit(vec![0u8; 8]).unwrap();
        app.submit("after").unwrap();
        assert_eq!(count_ready(&mut rx), 2);
        assert_eq!(net.pull_next_packet(), Some(Packet::new(vec![0u8; 8])));
        assert_eq!(net.pull_next_packet(), Some(Packet::from("after")));
    }

    #[test]
    fn deliveries_reach_the_application_in_order() {
        let (tx, _rx) = event_channel();
        let (mut net, mut app) = network_layer(tx, MAX_PAYLOAD);
        net.deliver(Packet::from("one"));
        net.deliver(Packet::from("two"));
        assert_eq!(app.try_recv(), Some(Packet::from("one")));
        assert_eq!(app.try_recv(), Some(Packet::from("two")));
        assert_eq!(app.try_recv(), None);
    }
}
