//! Physical-layer boundary.
//!
//! Outbound, the engine hands every frame to a [`PhysicalLayer`] and forgets
//! about it: the channel may lose, corrupt, delay or duplicate it, and
//! recovery is driven entirely by timers and NAKs.
//!
//! Inbound, a link-receive task turns raw bytes into events with
//! [`classify`]: intact frames become [`Event::FrameArrival`], damaged ones
//! [`Event::CksumErr`]. Frames that are intact but malformed (an unknown
//! kind byte) are protocol violations by the peer; they are logged and
//! dropped so that the engine only ever sees well-formed frames.

use crate::event::Event;
use crate::frame::{Frame, MAX_PAYLOAD};

/// The unreliable channel below the engine.
pub trait PhysicalLayer {
    /// Send one frame. Fire-and-forget; no delivery guarantee.
    fn transmit(&mut self, frame: Frame);

    /// Largest packet this channel can carry in one DATA frame.
    fn max_payload(&self) -> usize {
        MAX_PAYLOAD
    }
}

/// Turn one received datagram into the event the engine should see, if any.
pub fn classify(bytes: &[u8]) -> Option<Event> {
    match Frame::decode(bytes) {
        Ok(frame) => Some(Event::FrameArrival(frame)),
        Err(e) if e.is_corruption() => {
            log::debug!("[phy] damaged frame ({e})");
            Some(Event::CksumErr)
        }
        Err(e) => {
            log::error!("[phy] malformed frame rejected: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Packet;

    #[test]
    fn intact_frame_becomes_arrival() {
        let frame = Frame::data(2, 1, Packet::from("x"));
        let bytes = frame.encode().unwrap();
        assert_eq!(classify(&bytes), Some(Event::FrameArrival(frame)));
    }

    #[test]
    fn damaged_frame_becomes_checksum_error() {
        let mut bytes = Frame::ack(3).encode().unwrap();
        bytes[4] ^= 0x10;
        assert_eq!(classify(&bytes), Some(Event::CksumErr));
        assert_eq!(classify(&bytes[..5]), Some(Event::CksumErr));
    }
}
