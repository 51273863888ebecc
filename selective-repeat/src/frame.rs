//! Frames: the unit that crosses the physical-layer boundary.
//!
//! This module is responsible for:
//! - The closed set of frame kinds ([`FrameKind`]).
//! - The in-memory [`Frame`] and the opaque network-layer [`Packet`] it carries.
//! - Serialising a [`Frame`] for an unreliable link and parsing it back,
//!   rejecting truncated, corrupted, or malformed input.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Kind      |                Sequence Number                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |               |             Acknowledgment Number             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |               |        Payload Length         |   Checksum    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |               |            Payload ...                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 13 bytes.
//! kind(1) + seq(4) + ack(4) + payload_len(2) + checksum(2)

use std::fmt;

use thiserror::Error;

use crate::seq::Seq;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 13;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

const OFF_KIND: usize = 0;
const OFF_SEQ: usize = 1;
const OFF_ACK: usize = 5;
const OFF_PAYLOAD_LEN: usize = 9;
const OFF_CHECKSUM: usize = 11;

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// Opaque network-layer payload, exchanged whole with the network layer.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Packet(Vec<u8>);

impl Packet {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Packet {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl From<&[u8]> for Packet {
    fn from(data: &[u8]) -> Self {
        Self(data.to_vec())
    }
}

impl From<&str> for Packet {
    fn from(data: &str) -> Self {
        Self(data.as_bytes().to_vec())
    }
}

impl From<String> for Packet {
    fn from(data: String) -> Self {
        Self(data.into_bytes())
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "Packet({s:?})"),
            Err(_) => write!(f, "Packet({} bytes)", self.0.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// FrameKind / Frame
// ---------------------------------------------------------------------------

/// What a frame is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Carries one packet plus a piggybacked acknowledgment.
    Data,
    /// Bare acknowledgment.
    Ack,
    /// Negative acknowledgment: asks for `ack + 1` to be resent.
    Nak,
}

impl FrameKind {
    fn to_wire(self) -> u8 {
        match self {
            FrameKind::Data => 0,
            FrameKind::Ack => 1,
            FrameKind::Nak => 2,
        }
    }

    fn from_wire(byte: u8) -> Result<Self, FrameError> {
        match byte {
            0 => Ok(FrameKind::Data),
            1 => Ok(FrameKind::Ack),
            2 => Ok(FrameKind::Nak),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameKind::Data => "DATA",
            FrameKind::Ack => "ACK",
            FrameKind::Nak => "NAK",
        };
        f.write_str(name)
    }
}

/// What a frame carries besides its acknowledgment.
///
/// Only DATA has a sequence number and a packet, so a DATA frame without
/// one cannot be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    Data { seq: Seq, packet: Packet },
    Ack,
    Nak,
}

/// A complete frame.
///
/// `ack` (the last sequence number received in order) is meaningful for
/// every kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub ack: Seq,
    pub body: FrameBody,
}

impl Frame {
    pub fn data(seq: Seq, ack: Seq, packet: Packet) -> Self {
        Self {
            ack,
            body: FrameBody::Data { seq, packet },
        }
    }

    pub fn ack(ack: Seq) -> Self {
        Self {
            ack,
            body: FrameBody::Ack,
        }
    }

    pub fn nak(ack: Seq) -> Self {
        Self {
            ack,
            body: FrameBody::Nak,
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self.body {
            FrameBody::Data { .. } => FrameKind::Data,
            FrameBody::Ack => FrameKind::Ack,
            FrameBody::Nak => FrameKind::Nak,
        }
    }

    /// The sequence number of a DATA frame.
    pub fn seq(&self) -> Option<Seq> {
        match self.body {
            FrameBody::Data { seq, .. } => Some(seq),
            FrameBody::Ack | FrameBody::Nak => None,
        }
    }

    /// Serialise this frame into a newly allocated byte vector.
    ///
    /// Fails only if the payload is longer than [`MAX_PAYLOAD`].
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let (seq, payload) = match &self.body {
            FrameBody::Data { seq, packet } => (*seq, packet.as_bytes()),
            // The seq field is zero on the wire for ACK and NAK.
            FrameBody::Ack | FrameBody::Nak => (0, &[][..]),
        };
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge(payload.len()));
        }

        let mut buf = vec![0u8; HEADER_LEN + payload.len()];
        buf[OFF_KIND] = self.kind().to_wire();
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.ack.to_be_bytes());
        buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 2]
            .copy_from_slice(&(payload.len() as u16).to_be_bytes());
        // Checksum field stays zero while the checksum is computed.
        buf[HEADER_LEN..].copy_from_slice(payload);

        let csum = internet_checksum(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());
        Ok(buf)
    }

    /// Parse a [`Frame`] from a raw byte slice.
    ///
    /// Integrity is checked before the kind byte is interpreted, so a frame
    /// damaged in transit always surfaces as [`FrameError::is_corruption`].
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < HEADER_LEN {
            return Err(FrameError::BufferTooShort(buf.len()));
        }

        let payload_len = usize::from(read_u16(buf, OFF_PAYLOAD_LEN));
        if buf.len() != HEADER_LEN + payload_len {
            return Err(FrameError::LengthMismatch {
                declared: payload_len,
                actual: buf.len() - HEADER_LEN,
            });
        }

        let checksum = read_u16(buf, OFF_CHECKSUM);
        let mut scratch = buf.to_vec();
        scratch[OFF_CHECKSUM..OFF_CHECKSUM + 2].fill(0);
        if internet_checksum(&scratch) != checksum {
            return Err(FrameError::ChecksumFailed);
        }

        let kind = FrameKind::from_wire(buf[OFF_KIND])?;
        let body = match kind {
            FrameKind::Data => FrameBody::Data {
                seq: read_u32(buf, OFF_SEQ),
                packet: Packet::new(&buf[HEADER_LEN..]),
            },
            FrameKind::Ack | FrameKind::Nak if payload_len != 0 => {
                return Err(FrameError::UnexpectedPayload { kind, len: payload_len })
            }
            FrameKind::Ack => FrameBody::Ack,
            FrameKind::Nak => FrameBody::Nak,
        };

        Ok(Frame {
            ack: read_u32(buf, OFF_ACK),
            body,
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.seq() {
            Some(seq) => write!(f, "{} seq={seq} ack={}", self.kind(), self.ack),
            None => write!(f, "{} ack={}", self.kind(), self.ack),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can arise when encoding or parsing a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("buffer of {0} bytes is too short to contain a header")]
    BufferTooShort(usize),

    #[error("payload_len field says {declared} bytes, {actual} present")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("checksum verification failed")]
    ChecksumFailed,

    #[error("unknown frame kind {0:#04x}")]
    UnknownKind(u8),

    #[error("{kind} frame carries a {len}-byte payload")]
    UnexpectedPayload { kind: FrameKind, len: usize },

    #[error("payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),
}

impl FrameError {
    /// `true` when the bytes were damaged in transit rather than built wrong
    /// by the peer. Corruption is reported to the engine as a checksum error.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            FrameError::BufferTooShort(_) | FrameError::LengthMismatch { .. } | FrameError::ChecksumFailed
        )
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Compute the Internet checksum (RFC 1071) over `data`.
///
/// The caller must zero any checksum field within `data` first.
fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for pair in &mut chunks {
        sum += u32::from(u16::from_be_bytes([pair[0], pair[1]]));
    }
    // Odd trailing byte is padded with zero on the right.
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}
