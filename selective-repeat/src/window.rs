//! Sender and receiver windows with their slot buffers.
//!
//! Both windows are `nr_bufs` wide and index their buffers by
//! `seq mod nr_bufs`. Within one window every sequence number maps to a
//! distinct slot, so a slot never holds two live packets.
//!
//! # Sender
//!
//! ```text
//!  ack_expected      next_frame_to_send
//!      │                    │
//!  ────┼────────────────────┼────────────▶ seq space (mod max_seq + 1)
//!      │ <── outstanding ──▶│
//! ```
//!
//! # Receiver
//!
//! ```text
//!  frame_expected             too_far
//!      │                         │
//!  ────┼─────────────────────────┼───────▶
//!      │ <── acceptance window ─▶│
//! ```
//!
//! Out-of-order arrivals inside the acceptance window are buffered; the
//! in-order prefix is drained to the network layer as soon as it is
//! complete.
//!
//! This module only manages state; the engine decides when to transmit.

use crate::frame::Packet;
use crate::seq::{Seq, SeqSpace};

// ---------------------------------------------------------------------------
// SenderWindow
// ---------------------------------------------------------------------------

/// Outbound window: `[ack_expected, next_frame_to_send)`.
#[derive(Debug)]
pub struct SenderWindow {
    space: SeqSpace,
    /// Oldest unacknowledged sequence number (lower edge).
    ack_expected: Seq,
    /// Sequence number for the next fresh packet (upper edge, exclusive).
    next_frame_to_send: Seq,
    /// Sent-but-unacknowledged packets, by slot.
    out_buf: Vec<Option<Packet>>,
}

impl SenderWindow {
    pub fn new(space: SeqSpace) -> Self {
        Self {
            space,
            ack_expected: 0,
            next_frame_to_send: 0,
            out_buf: vec![None; space.nr_bufs()],
        }
    }

    pub fn ack_expected(&self) -> Seq {
        self.ack_expected
    }

    pub fn next_frame_to_send(&self) -> Seq {
        self.next_frame_to_send
    }

    /// Number of frames sent and not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.space.distance(self.ack_expected, self.next_frame_to_send) as usize
    }

    /// `true` when one more packet may be admitted.
    pub fn has_capacity(&self) -> bool {
        self.in_flight() < self.space.nr_bufs()
    }

    /// Assign the next sequence number to `packet` and hold it until
    /// acknowledged. Returns the assigned sequence number.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the window is full. Check [`has_capacity`]
    /// first.
    ///
    /// [`has_capacity`]: SenderWindow::has_capacity
    pub fn admit(&mut self, packet: Packet) -> Seq {
        debug_assert!(
            self.has_capacity(),
            "admit called on a full window ({} / {})",
            self.in_flight(),
            self.space.nr_bufs()
        );
        let seq = self.next_frame_to_send;
        self.out_buf[self.space.slot(seq)] = Some(packet);
        self.next_frame_to_send = self.space.advance(seq);
        seq
    }

    /// `true` if `seq` has been sent and not yet acknowledged.
    pub fn is_outstanding(&self, seq: Seq) -> bool {
        SeqSpace::between(self.ack_expected, seq, self.next_frame_to_send)
    }

    /// The packet held for an outstanding `seq`.
    pub fn packet(&self, seq: Seq) -> Option<&Packet> {
        if !self.is_outstanding(seq) {
            return None;
        }
        self.out_buf[self.space.slot(seq)].as_ref()
    }

    /// Process a cumulative acknowledgment of everything up to and
    /// including `ack`.
    ///
    /// Returns the sequence numbers newly acknowledged, oldest first. An
    /// `ack` outside the outstanding window acknowledges nothing.
    pub fn acknowledge(&mut self, ack: Seq) -> Vec<Seq> {
        let mut acked = Vec::new();
        while SeqSpace::between(self.ack_expected, ack, self.next_frame_to_send) {
            let seq = self.ack_expected;
            self.out_buf[self.space.slot(seq)] = None;
            self.ack_expected = self.space.advance(seq);
            acked.push(seq);
        }
        acked
    }
}

// ---------------------------------------------------------------------------
// ReceiverWindow
// ---------------------------------------------------------------------------

/// Result of offering a DATA frame to the receiver window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Stored; may now be deliverable.
    Buffered,
    /// Already buffered and awaiting delivery.
    Duplicate,
    /// Outside `[frame_expected, too_far)`: either already delivered or too
    /// far ahead.
    OutOfWindow,
}

/// Inbound window: `[frame_expected, too_far)`.
#[derive(Debug)]
pub struct ReceiverWindow {
    space: SeqSpace,
    /// Next sequence number owed to the network layer (lower edge).
    frame_expected: Seq,
    /// First sequence number beyond the acceptance window.
    too_far: Seq,
    /// Buffered out-of-order packets by slot; `Some` is the arrival bit.
    in_buf: Vec<Option<Packet>>,
}

impl ReceiverWindow {
    pub fn new(space: SeqSpace) -> Self {
        Self {
            space,
            frame_expected: 0,
            too_far: space.nr_bufs() as Seq,
            in_buf: vec![None; space.nr_bufs()],
        }
    }

    pub fn frame_expected(&self) -> Seq {
        self.frame_expected
    }

    pub fn too_far(&self) -> Seq {
        self.too_far
    }

    /// The last sequence number received in order, i.e. the value to put in
    /// the `ack` field of every outbound frame.
    pub fn last_in_order(&self) -> Seq {
        self.space.predecessor(self.frame_expected)
    }

    /// `true` if `seq` falls inside the acceptance window.
    pub fn accepts(&self, seq: Seq) -> bool {
        SeqSpace::between(self.frame_expected, seq, self.too_far)
    }

    /// Offer an arriving DATA frame.
    pub fn offer(&mut self, seq: Seq, packet: Packet) -> Arrival {
        if !self.accepts(seq) {
            return Arrival::OutOfWindow;
        }
        let slot = &mut self.in_buf[self.space.slot(seq)];
        if slot.is_some() {
            return Arrival::Duplicate;
        }
        *slot = Some(packet);
        Arrival::Buffered
    }

    /// Pop the in-order prefix: while the slot for `frame_expected` is
    /// filled, take its packet and slide both edges forward by one.
    pub fn drain(&mut self) -> Vec<Packet> {
        let mut delivered = Vec::new();
        while let Some(packet) = self.in_buf[self.space.slot(self.frame_expected)].take() {
            delivered.push(packet);
            self.frame_expected = self.space.advance(self.frame_expected);
            self.too_far = self.space.advance(self.too_far);
        }
        delivered
    }

    /// Snapshot of the arrival bitmap, by slot.
    pub fn arrived(&self) -> Vec<bool> {
        self.in_buf.iter().map(Option::is_some).collect()
    }

    /// Number of packets buffered and awaiting an earlier gap.
    pub fn buffered(&self) -> usize {
        self.in_buf.iter().filter(|p| p.is_some()).count()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
