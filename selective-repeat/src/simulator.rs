//! In-process lossy channel for exercising the protocol.
//!
//! Real links drop, damage, duplicate and reorder frames. To exercise the
//! recovery paths deterministically, [`SimulatedLink::pair`] builds two
//! connected [`PhysicalLayer`]s that apply a configurable fault model to
//! every transmitted frame:
//!
//! | Fault       | Description                                              |
//! |-------------|----------------------------------------------------------|
//! | Loss        | Drop the frame with probability `loss_rate`.             |
//! | Corruption  | Flip one random bit with probability `corruption_rate`.  |
//! | Duplication | Deliver the frame twice with probability `duplicate_rate`. |
//! | Delay       | Hold every frame for `delay` plus up to `jitter`.        |
//!
//! Jitter lets later frames overtake earlier ones, which is how reordering
//! arises; without jitter the channel is strictly FIFO. Each direction draws
//! from its own seeded [`StdRng`], so a given seed and submission order replay
//! the same fault pattern.
//!
//! Frames travel as encoded bytes and are classified on arrival exactly as a
//! socket receive task would, so corruption surfaces as
//! [`Event::CksumErr`](crate::event::Event::CksumErr).

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::ConfigError;
use crate::event::EventSender;
use crate::frame::Frame;
use crate::physical::{classify, PhysicalLayer};

/// Fault model for one simulated link. Probabilities are in `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Probability that a frame is silently dropped.
    pub loss_rate: f64,
    /// Probability that a frame arrives with one bit flipped.
    pub corruption_rate: f64,
    /// Probability that a frame is delivered twice.
    pub duplicate_rate: f64,
    /// Fixed propagation delay.
    pub delay: Duration,
    /// Upper bound of the random delay added on top of `delay`.
    pub jitter: Duration,
    /// RNG seed; the reverse direction uses `seed + 1`.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // A perfect, instantaneous wire.
        Self {
            loss_rate: 0.0,
            corruption_rate: 0.0,
            duplicate_rate: 0.0,
            delay: Duration::ZERO,
            jitter: Duration::ZERO,
            seed: 0x5eed,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("loss_rate", self.loss_rate),
            ("corruption_rate", self.corruption_rate),
            ("duplicate_rate", self.duplicate_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability {
                    name,
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fault accounting
// ---------------------------------------------------------------------------

/// What the channel did to the frames given to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub transmitted: u64,
    pub dropped: u64,
    pub corrupted: u64,
    pub duplicated: u64,
}

/// Shared view of a link's [`FaultStats`], readable after the link has been
/// moved into an engine.
#[derive(Debug, Clone, Default)]
pub struct FaultLog(Arc<Mutex<FaultStats>>);

impl FaultLog {
    pub fn snapshot(&self) -> FaultStats {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, f: impl FnOnce(&mut FaultStats)) {
        f(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

// ---------------------------------------------------------------------------
// SimulatedLink
// ---------------------------------------------------------------------------

/// One direction of a simulated channel: frames given to
/// [`transmit`](PhysicalLayer::transmit) arrive as events at the peer.
#[derive(Debug)]
pub struct SimulatedLink {
    config: SimulatorConfig,
    rng: StdRng,
    peer: EventSender,
    faults: FaultLog,
    /// Forwarding task for constant-delay links, started on first use.
    line: Option<mpsc::UnboundedSender<(Instant, Vec<u8>)>>,
}

impl SimulatedLink {
    /// Build a link whose frames are posted into `peer`.
    pub fn new(config: SimulatorConfig, seed: u64, peer: EventSender) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            peer,
            faults: FaultLog::default(),
            line: None,
        })
    }

    /// Build both directions of a channel between endpoints `a` and `b`.
    ///
    /// The first link is `a`'s physical layer (it posts into `b_events`),
    /// the second is `b`'s.
    pub fn pair(
        config: SimulatorConfig,
        a_events: EventSender,
        b_events: EventSender,
    ) -> Result<(Self, Self), ConfigError> {
        let seed = config.seed;
        let a_to_b = Self::new(config.clone(), seed, b_events)?;
        let b_to_a = Self::new(config, seed.wrapping_add(1), a_events)?;
        Ok((a_to_b, b_to_a))
    }

    pub fn fault_log(&self) -> FaultLog {
        self.faults.clone()
    }

    fn chance(&mut self, p: f64) -> bool {
        p > 0.0 && self.rng.gen::<f64>() < p
    }

    fn latency(&mut self) -> Duration {
        let jitter = self.config.jitter.as_micros() as u64;
        if jitter == 0 {
            return self.config.delay;
        }
        self.config.delay + Duration::from_micros(self.rng.gen_range(0..=jitter))
    }

    fn dispatch(&mut self, bytes: Vec<u8>) {
        let latency = self.latency();
        if latency.is_zero() {
            post(&self.peer, &bytes);
            return;
        }
        let due = Instant::now() + latency;

        if self.config.jitter.is_zero() {
            // One task per link keeps equal-delay frames in send order.
            let line = self.line.get_or_insert_with(|| spawn_line(self.peer.clone()));
            if line.send((due, bytes)).is_err() {
                log::debug!("[sim] forwarding task gone, frame lost");
            }
        } else {
            let peer = self.peer.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(due).await;
                post(&peer, &bytes);
            });
        }
    }
}

fn spawn_line(peer: EventSender) -> mpsc::UnboundedSender<(Instant, Vec<u8>)> {
    let (tx, mut rx) = mpsc::unbounded_channel::<(Instant, Vec<u8>)>();
    tokio::spawn(async move {
        while let Some((due, bytes)) = rx.recv().await {
            tokio::time::sleep_until(due).await;
            post(&peer, &bytes);
        }
    });
    tx
}

fn post(peer: &EventSender, bytes: &[u8]) {
    if let Some(event) = classify(bytes) {
        // The peer engine may have shut down; the frame is simply lost.
        let _ = peer.send(event);
    }
}

impl PhysicalLayer for SimulatedLink {
    fn transmit(&mut self, frame: Frame) {
        let mut bytes = match frame.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("[sim] cannot encode {frame}: {e}");
                return;
            }
        };
        self.faults.record(|s| s.transmitted += 1);

        if self.chance(self.config.loss_rate) {
            log::trace!("[sim] drop {frame}");
            self.faults.record(|s| s.dropped += 1);
            return;
        }

        if self.chance(self.config.corruption_rate) {
            let bit = self.rng.gen_range(0..bytes.len() * 8);
            bytes[bit / 8] ^= 1 << (bit % 8);
            log::trace!("[sim] corrupt {frame} at bit {bit}");
            self.faults.record(|s| s.corrupted += 1);
        }

        if self.chance(self.config.duplicate_rate) {
            log::trace!("[sim] duplicate {frame}");
            self.faults.record(|s| s.duplicated += 1);
            self.dispatch(bytes.clone());
        }

        self.dispatch(bytes);
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{event_channel, Event, EventReceiver};
    use crate::frame::Packet;

    fn link(config: SimulatorConfig) -> (SimulatedLink, EventReceiver) {
        let (tx, rx) = event_channel();
        (SimulatedLink::new(config, 7, tx).unwrap(), rx)
    }

    fn drain(rx: &mut EventReceiver) -> Vec<Event> {
        std::iter::from_fn(|| rx.try_next_event()).collect()
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let cfg = SimulatorConfig {
            loss_rate: 1.5,
            ..SimulatorConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Probability {
                name: "loss_rate",
                ..
            })
        ));
        let nan = SimulatorConfig {
            duplicate_rate: f64::NAN,
            ..SimulatorConfig::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn perfect_link_delivers_immediately() {
        let (mut link, mut rx) = link(SimulatorConfig::default());
        let frame = Frame::data(0, 7, Packet::from("x"));
        link.transmit(frame.clone());
        assert_eq!(drain(&mut rx), vec![Event::FrameArrival(frame)]);
    }

    #[test]
    fn total_loss_delivers_nothing() {
        let (mut link, mut rx) = link(SimulatorConfig {
            loss_rate: 1.0,
            ..SimulatorConfig::default()
        });
        let log = link.fault_log();
        for _ in 0..5 {
            link.transmit(Frame::ack(0));
        }
        assert!(drain(&mut rx).is_empty());
        assert_eq!(log.snapshot().dropped, 5);
    }

    #[test]
    fn corruption_surfaces_as_checksum_error() {
        let (mut link, mut rx) = link(SimulatorConfig {
            corruption_rate: 1.0,
            ..SimulatorConfig::default()
        });
        for seq in 0..8 {
            link.transmit(Frame::data(seq, 0, Packet::from("payload")));
        }
        let events = drain(&mut rx);
        assert_eq!(events.len(), 8);
        assert!(events.iter().all(|e| *e == Event::CksumErr));
    }

    #[test]
    fn duplication_delivers_twice() {
        let (mut link, mut rx) = link(SimulatorConfig {
            duplicate_rate: 1.0,
            ..SimulatorConfig::default()
        });
        link.transmit(Frame::nak(3));
        assert_eq!(
            drain(&mut rx),
            vec![
                Event::FrameArrival(Frame::nak(3)),
                Event::FrameArrival(Frame::nak(3))
            ]
        );
    }

    #[test]
    fn same_seed_same_faults() {
        let cfg = SimulatorConfig {
            loss_rate: 0.5,
            ..SimulatorConfig::default()
        };
        let pattern = |cfg: SimulatorConfig| {
            let (mut link, mut rx) = link(cfg);
            (0..32)
                .map(|seq| {
                    link.transmit(Frame::ack(seq));
                    !drain(&mut rx).is_empty()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(pattern(cfg.clone()), pattern(cfg));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_frames_arrive_after_delay() {
        let (mut link, mut rx) = link(SimulatorConfig {
            delay: Duration::from_millis(10),
            ..SimulatorConfig::default()
        });
        link.transmit(Frame::ack(1));
        tokio::task::yield_now().await;
        assert!(drain(&mut rx).is_empty());

        tokio::time::sleep(Duration::from_millis(11)).await;
        assert_eq!(drain(&mut rx), vec![Event::FrameArrival(Frame::ack(1))]);
    }

    #[tokio::test(start_paused = true)]
    async fn constant_delay_preserves_order() {
        let (mut link, mut rx) = link(SimulatorConfig {
            delay: Duration::from_millis(5),
            ..SimulatorConfig::default()
        });
        for seq in 0..16 {
            link.transmit(Frame::ack(seq));
        }
        tokio::time::sleep(Duration::from_millis(6)).await;
        let acks: Vec<_> = drain(&mut rx)
            .into_iter()
            .map(|e| match e {
                Event::FrameArrival(f) => f.ack,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(acks, (0..16).collect::<Vec<_>>());
    }
}
