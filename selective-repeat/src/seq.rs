//! Modulo arithmetic over the sequence-number space.
//!
//! Sequence numbers live in `[0, max_seq]` and wrap to `0` after `max_seq`.
//! The window size is half the space (`nr_bufs = (max_seq + 1) / 2`), which
//! keeps a fresh frame from ever aliasing a stale one inside the receiver's
//! acceptance window.
//!
//! [`SeqSpace::between`] is the only membership test used by the engine: the
//! sender asks it whether an acknowledgment falls inside the outstanding
//! window, the receiver asks it whether an arriving frame falls inside the
//! acceptance window.
//!
//! ```text
//!   no wrap:         lo ── x ── hi
//!   x wrapped:       x ─ hi ······ lo
//!   interval wraps:  hi ······ lo ── x
//! ```

/// A sequence number in `[0, max_seq]`.
pub type Seq = u32;

/// The sequence-number space `[0, max_seq]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace {
    max_seq: Seq,
}

impl SeqSpace {
    /// Create the space `[0, max_seq]`.
    ///
    /// `max_seq` must be odd so that the window is exactly half the space;
    /// [`crate::config::ProtocolConfig::validate`] enforces this before an
    /// engine is built.
    pub fn new(max_seq: Seq) -> Self {
        debug_assert!(max_seq % 2 == 1, "max_seq must be odd, got {max_seq}");
        Self { max_seq }
    }

    /// Largest sequence number.
    pub fn max_seq(&self) -> Seq {
        self.max_seq
    }

    /// Number of distinct sequence numbers (`max_seq + 1`).
    pub fn size(&self) -> u64 {
        u64::from(self.max_seq) + 1
    }

    /// Window size, also the number of buffer slots on each side.
    pub fn nr_bufs(&self) -> usize {
        (self.size() / 2) as usize
    }

    /// `true` iff `seq` is a member of `[0, max_seq]`.
    #[inline]
    pub fn contains(&self, seq: Seq) -> bool {
        seq <= self.max_seq
    }

    /// `(seq + 1) mod (max_seq + 1)`.
    #[inline]
    pub fn advance(&self, seq: Seq) -> Seq {
        if seq >= self.max_seq {
            0
        } else {
            seq + 1
        }
    }

    /// The sequence number immediately before `seq`, i.e. "the last sequence
    /// number correctly received" when `seq` is the next one expected.
    #[inline]
    pub fn predecessor(&self, seq: Seq) -> Seq {
        if seq == 0 {
            self.max_seq
        } else {
            seq - 1
        }
    }

    /// Buffer slot for `seq` (`seq mod nr_bufs`).
    #[inline]
    pub fn slot(&self, seq: Seq) -> usize {
        (u64::from(seq) % (self.nr_bufs() as u64)) as usize
    }

    /// Number of steps from `lo` forward to `hi`, modulo the space.
    #[inline]
    pub fn distance(&self, lo: Seq, hi: Seq) -> u64 {
        (u64::from(hi) + self.size() - u64::from(lo)) % self.size()
    }

    /// `true` iff `x` lies in the circular half-open interval `[lo, hi)`.
    ///
    /// An empty interval (`lo == hi`) contains nothing.
    #[inline]
    pub fn between(lo: Seq, x: Seq, hi: Seq) -> bool {
        (lo <= x && x < hi) || (hi < lo && lo <= x) || (x < hi && hi < lo)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
