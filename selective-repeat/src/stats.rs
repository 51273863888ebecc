//! Counters kept by the engine for one link endpoint.

use std::fmt;

/// Per-endpoint protocol counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// DATA frames transmitted, first sends and retransmissions alike.
    pub data_sent: u64,
    /// DATA frames resent because their retransmission timer expired.
    pub timeout_retransmissions: u64,
    /// DATA frames resent in response to a NAK.
    pub nak_retransmissions: u64,
    /// Bare ACK frames transmitted.
    pub acks_sent: u64,
    /// NAK frames transmitted.
    pub naks_sent: u64,
    /// Intact frames received.
    pub frames_received: u64,
    /// Damaged frames received.
    pub checksum_errors: u64,
    /// Packets passed up to the network layer.
    pub delivered: u64,
    /// DATA frames discarded as duplicates or outside the receive window.
    pub discarded: u64,
    /// Timer expiries ignored because they no longer applied.
    pub stale_timeouts: u64,
    /// Intact frames dropped for a seq or ack beyond `max_seq`.
    pub invalid_frames: u64,
    /// Outbound packets refused for exceeding the link's payload limit.
    pub rejected_packets: u64,
}

impl LinkStats {
    /// All retransmissions regardless of trigger.
    pub fn retransmissions(&self) -> u64 {
        self.timeout_retransmissions + self.nak_retransmissions
    }
}

impl fmt::Display for LinkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  data sent        : {}", self.data_sent)?;
        writeln!(
            f,
            "  retransmissions  : {} (timeout {}, nak {})",
            self.retransmissions(),
            self.timeout_retransmissions,
            self.nak_retransmissions
        )?;
        writeln!(f, "  acks / naks sent : {} / {}", self.acks_sent, self.naks_sent)?;
        writeln!(f, "  frames received  : {}", self.frames_received)?;
        writeln!(f, "  checksum errors  : {}", self.checksum_errors)?;
        writeln!(f, "  delivered        : {}", self.delivered)?;
        writeln!(f, "  discarded        : {}", self.discarded)?;
        writeln!(f, "  stale timeouts   : {}", self.stale_timeouts)?;
        writeln!(f, "  invalid frames   : {}", self.invalid_frames)?;
        write!(f, "  rejected packets : {}", self.rejected_packets)
    }
}
