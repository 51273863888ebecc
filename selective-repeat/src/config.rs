//! Protocol constants exposed as configuration.
//!
//! [`ProtocolConfig`] holds the three knobs of the link: the sequence-space
//! bound `max_seq` (which fixes the window size) and the two timer durations.
//! The defaults are the classic textbook values: `max_seq = 7` (a window of
//! four frames), a 200 ms retransmission timer and a 50 ms ack-delay timer.
//!
//! Both sides allocate `nr_bufs` buffer slots up front, so the window is
//! capped at [`MAX_WINDOW`] frames.

use std::time::Duration;

use thiserror::Error;

use crate::seq::{Seq, SeqSpace};

/// Largest window (`nr_bufs`) a configuration may ask for.
pub const MAX_WINDOW: usize = 1 << 16;

/// Largest accepted `max_seq`, giving a window of exactly [`MAX_WINDOW`].
pub const MAX_SEQ_LIMIT: Seq = (2 * MAX_WINDOW - 1) as Seq;

/// Link-level protocol parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Largest sequence number; must be odd.
    pub max_seq: Seq,
    /// How long a DATA frame may stay unacknowledged before it is resent.
    pub retransmit_timeout: Duration,
    /// How long the receiver may hold back an acknowledgment while waiting
    /// for an outbound DATA frame to piggyback it on.
    pub ack_timeout: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_seq: 7,
            retransmit_timeout: Duration::from_millis(200),
            ack_timeout: Duration::from_millis(50),
        }
    }
}

impl ProtocolConfig {
    /// Check every invariant the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_seq % 2 == 0 {
            return Err(ConfigError::EvenMaxSeq(self.max_seq));
        }
        if self.max_seq > MAX_SEQ_LIMIT {
            return Err(ConfigError::MaxSeqTooLarge(self.max_seq));
        }
        if self.retransmit_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("retransmit_timeout"));
        }
        if self.ack_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("ack_timeout"));
        }
        if self.ack_timeout >= self.retransmit_timeout {
            return Err(ConfigError::AckTimeoutTooLong {
                ack: self.ack_timeout,
                retransmit: self.retransmit_timeout,
            });
        }
        Ok(())
    }

    pub fn seq_space(&self) -> SeqSpace {
        SeqSpace::new(self.max_seq)
    }

    /// Window size: `(max_seq + 1) / 2`.
    pub fn nr_bufs(&self) -> usize {
        self.seq_space().nr_bufs()
    }
}

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_seq must be odd so the window is half the sequence space, got {0}")]
    EvenMaxSeq(Seq),

    #[error("max_seq {0} exceeds {} (a window of {} frames)", MAX_SEQ_LIMIT, MAX_WINDOW)]
    MaxSeqTooLarge(Seq),

    #[error("{0} must be non-zero")]
    ZeroDuration(&'static str),

    #[error("ack timeout {ack:?} must be shorter than retransmit timeout {retransmit:?}")]
    AckTimeoutTooLong { ack: Duration, retransmit: Duration },

    #[error("{name} must be a probability in [0, 1], got {value}")]
    Probability { name: &'static str, value: String },
}
