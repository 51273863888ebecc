//! The selective-repeat protocol engine.
//!
//! # Architecture
//!
//! ```text
//!   timer tasks ─┐
//!   link rx task ─┼──▶ event stream ──▶ Engine::handle ──▶ PhysicalLayer::transmit
//!   network layer ┘                        │
//!                                          ├──▶ NetworkLayer::deliver / grant_credit
//!                                          └──▶ TimerService::start / stop
//! ```
//!
//! One [`Engine`] serves one link endpoint. It owns all protocol state (both
//! windows, both buffers, the NAK flag) and mutates it only from
//! [`Engine::handle`], one event at a time, so no locking is needed.
//!
//! Every outbound frame piggybacks the receiver's cumulative acknowledgment,
//! so any transmission cancels the ack-delay timer. Retransmission happens
//! only on timer expiry or on a NAK; sending is never retried inline.
//!
//! Frames numbered outside `[0, max_seq]` are dropped on arrival: the
//! circular window tests are only meaningful inside the space.
//!
//! The engine is generic over its three collaborators so it can be driven
//! by real tokio tasks ([`crate::session::Session`]) or stepped by hand in
//! tests.

use std::future::{self, Future};

use thiserror::Error;

use crate::config::{ConfigError, ProtocolConfig};
use crate::event::{Event, EventReceiver};
use crate::frame::{Frame, FrameBody, FrameKind, Packet};
use crate::network::NetworkLayer;
use crate::physical::PhysicalLayer;
use crate::seq::{Seq, SeqSpace};
use crate::stats::LinkStats;
use crate::timer::{Ticket, TimerKey, TimerService};
use crate::window::{Arrival, ReceiverWindow, SenderWindow};

/// Failures that stop the engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The network layer announced a packet it had no credit for.
    #[error("network layer ready with a full window ({in_flight} of {nr_bufs} in flight)")]
    WindowOverrun { in_flight: usize, nr_bufs: usize },
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Protocol state for one endpoint plus its collaborators.
#[derive(Debug)]
pub struct Engine<N, P, T> {
    config: ProtocolConfig,
    space: SeqSpace,
    sender: SenderWindow,
    receiver: ReceiverWindow,
    /// `true` while no NAK is outstanding for `frame_expected`.
    no_nak: bool,
    started: bool,
    network: N,
    physical: P,
    timers: T,
    stats: LinkStats,
}

impl<N, P, T> Engine<N, P, T>
where
    N: NetworkLayer,
    P: PhysicalLayer,
    T: TimerService,
{
    /// Build an engine in its initial state. Nothing is sent and no credit is
    /// granted until [`start`](Engine::start).
    pub fn new(
        config: ProtocolConfig,
        network: N,
        physical: P,
        timers: T,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let space = config.seq_space();
        Ok(Self {
            space,
            sender: SenderWindow::new(space),
            receiver: ReceiverWindow::new(space),
            no_nak: true,
            started: false,
            network,
            physical,
            timers,
            stats: LinkStats::default(),
            config,
        })
    }

    /// Open the sender window: grant the network layer one credit per slot.
    /// Calling it again has no effect.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        log::info!(
            "[swp] start max_seq={} nr_bufs={}",
            self.space.max_seq(),
            self.space.nr_bufs()
        );
        self.network.grant_credit(self.space.nr_bufs());
    }

    /// Consume events until every event source is gone.
    pub async fn run(self, events: EventReceiver) -> Result<LinkStats, EngineError> {
        self.run_until(events, future::pending()).await
    }

    /// Consume events until `shutdown` completes or every event source is
    /// gone. Returns the final counters.
    pub async fn run_until<F>(
        mut self,
        mut events: EventReceiver,
        shutdown: F,
    ) -> Result<LinkStats, EngineError>
    where
        F: Future<Output = ()>,
    {
        self.start();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    log::info!("[swp] shutdown requested");
                    break;
                }

                event = events.next_event() => match event {
                    Some(event) => self.handle(event)?,
                    None => {
                        log::info!("[swp] event stream closed");
                        break;
                    }
                },
            }
        }

        Ok(self.stats)
    }

    /// Process exactly one event.
    pub fn handle(&mut self, event: Event) -> Result<(), EngineError> {
        match event {
            Event::NetworkLayerReady => return self.on_network_layer_ready(),
            Event::FrameArrival(frame) => self.on_frame_arrival(frame),
            Event::CksumErr => self.on_checksum_error(),
            Event::Timeout { seq, ticket } => self.on_timeout(seq, ticket),
            Event::AckTimeout { ticket } => self.on_ack_timeout(ticket),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    fn on_network_layer_ready(&mut self) -> Result<(), EngineError> {
        if !self.sender.has_capacity() {
            return Err(EngineError::WindowOverrun {
                in_flight: self.sender.in_flight(),
                nr_bufs: self.space.nr_bufs(),
            });
        }
        let Some(packet) = self.network.pull_next_packet() else {
            log::warn!("[swp] network layer ready but no packet queued");
            return Ok(());
        };
        let max = self.physical.max_payload();
        if packet.len() > max {
            // It would never encode, so it must not take a slot.
            log::error!("[swp] rejecting {}-byte packet (limit {max})", packet.len());
            self.stats.rejected_packets += 1;
            self.network.grant_credit(1);
            return Ok(());
        }
        let seq = self.sender.admit(packet);
        self.send_frame(FrameKind::Data, seq);
        Ok(())
    }

    fn on_frame_arrival(&mut self, frame: Frame) {
        self.stats.frames_received += 1;
        log::debug!("[swp] ← {frame}");

        let in_space = self.space.contains(frame.ack)
            && frame.seq().map_or(true, |seq| self.space.contains(seq));
        if !in_space {
            log::error!(
                "[swp] dropping {frame}: outside sequence space [0, {}]",
                self.space.max_seq()
            );
            self.stats.invalid_frames += 1;
            return;
        }

        let Frame { ack, body } = frame;
        match body {
            FrameBody::Data { seq, packet } => self.on_data(seq, packet),
            FrameBody::Nak => {
                let wanted = self.space.advance(ack);
                if self.sender.is_outstanding(wanted) {
                    self.stats.nak_retransmissions += 1;
                    log::debug!("[swp] NAK asks for seq={wanted}; resending");
                    self.send_frame(FrameKind::Data, wanted);
                }
            }
            FrameBody::Ack => {}
        }

        // Every frame carries a cumulative acknowledgment.
        let acked = self.sender.acknowledge(ack);
        if !acked.is_empty() {
            for &seq in &acked {
                self.timers.stop(TimerKey::Retransmit(seq));
            }
            log::debug!(
                "[swp] acked {:?}; window [{}, {})",
                acked,
                self.sender.ack_expected(),
                self.sender.next_frame_to_send()
            );
            self.network.grant_credit(acked.len());
        }
    }

    fn on_data(&mut self, seq: Seq, packet: Packet) {
        if seq != self.receiver.frame_expected() && self.no_nak {
            self.send_frame(FrameKind::Nak, 0);
        } else {
            self.timers.start(TimerKey::Ack, self.config.ack_timeout);
        }

        match self.receiver.offer(seq, packet) {
            Arrival::Buffered => {
                for packet in self.receiver.drain() {
                    log::debug!("[swp] deliver {packet:?}");
                    self.network.deliver(packet);
                    self.stats.delivered += 1;
                    self.no_nak = true;
                    self.timers.start(TimerKey::Ack, self.config.ack_timeout);
                }
            }
            arrival @ (Arrival::Duplicate | Arrival::OutOfWindow) => {
                self.stats.discarded += 1;
                log::debug!(
                    "[swp] discard seq={seq} ({arrival:?}); window [{}, {})",
                    self.receiver.frame_expected(),
                    self.receiver.too_far()
                );
            }
        }
    }

    fn on_checksum_error(&mut self) {
        self.stats.checksum_errors += 1;
        if self.no_nak {
            self.send_frame(FrameKind::Nak, 0);
        }
    }

    fn on_timeout(&mut self, seq: Seq, ticket: Ticket) {
        if !self.timers.fire(TimerKey::Retransmit(seq), ticket) || !self.sender.is_outstanding(seq)
        {
            self.stats.stale_timeouts += 1;
            log::debug!("[swp] stale timeout for seq={seq} ignored");
            return;
        }
        self.stats.timeout_retransmissions += 1;
        log::debug!("[swp] timeout seq={seq}; resending");
        self.send_frame(FrameKind::Data, seq);
    }

    fn on_ack_timeout(&mut self, ticket: Ticket) {
        if !self.timers.fire(TimerKey::Ack, ticket) {
            self.stats.stale_timeouts += 1;
            log::debug!("[swp] stale ack timeout ignored");
            return;
        }
        self.send_frame(FrameKind::Ack, 0);
    }

    // -----------------------------------------------------------------------
    // Transmission
    // -----------------------------------------------------------------------

    /// Build and transmit one frame. `seq` is used for DATA only.
    fn send_frame(&mut self, kind: FrameKind, seq: Seq) {
        let ack = self.receiver.last_in_order();
        let frame = match kind {
            FrameKind::Data => match self.sender.packet(seq) {
                Some(packet) => Frame::data(seq, ack, packet.clone()),
                None => {
                    log::warn!("[swp] no buffered packet for seq={seq}");
                    return;
                }
            },
            FrameKind::Ack => Frame::ack(ack),
            FrameKind::Nak => Frame::nak(ack),
        };

        log::debug!("[swp] → {frame}");
        self.physical.transmit(frame);

        match kind {
            FrameKind::Data => {
                self.stats.data_sent += 1;
                self.timers
                    .start(TimerKey::Retransmit(seq), self.config.retransmit_timeout);
            }
            FrameKind::Ack => self.stats.acks_sent += 1,
            FrameKind::Nak => {
                self.stats.naks_sent += 1;
                self.no_nak = false;
            }
        }
        self.timers.stop(TimerKey::Ack);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn sender(&self) -> &SenderWindow {
        &self.sender
    }

    pub fn receiver(&self) -> &ReceiverWindow {
        &self.receiver
    }

    /// `true` while no NAK is outstanding.
    pub fn no_nak(&self) -> bool {
        self.no_nak
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }

    pub fn physical(&self) -> &P {
        &self.physical
    }

    pub fn physical_mut(&mut self) -> &mut P {
        &mut self.physical
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
