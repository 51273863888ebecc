//! UDP physical layer.
//!
//! [`UdpLink`] carries frames between two fixed endpoints, one frame per
//! datagram. Sending never waits: when the socket buffer is full the frame is
//! dropped, which the protocol already treats as loss. The receive side is a
//! separate task ([`UdpLink::spawn_receiver`]) that classifies every datagram
//! from the peer and posts the result into the engine's event stream.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::event::EventSender;
use crate::frame::{Frame, HEADER_LEN};
use crate::physical::{classify, PhysicalLayer};

/// Largest UDP payload over IPv4 (65535 minus IP and UDP headers).
pub const MAX_DATAGRAM: usize = 65_507;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A UDP socket bound locally and paired with one remote peer.
#[derive(Debug, Clone)]
pub struct UdpLink {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpLink {
    /// Bind `local` and talk to `peer`. Port 0 picks an ephemeral port.
    pub async fn bind(local: SocketAddr, peer: SocketAddr) -> Result<Self, SocketError> {
        let socket = UdpSocket::bind(local).await?;
        log::info!("[udp] bound {} → {peer}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
            peer,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Spawn the receive loop. It runs until the socket fails or `events`
    /// is closed.
    pub fn spawn_receiver(&self, events: EventSender) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let peer = self.peer;
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let (n, from) = match socket.recv_from(&mut buf).await {
                    Ok(r) => r,
                    Err(e) => {
                        log::error!("[udp] recv failed: {e}");
                        return;
                    }
                };
                if from != peer {
                    log::warn!("[udp] ignoring {n} bytes from stranger {from}");
                    continue;
                }
                let Some(event) = classify(&buf[..n]) else {
                    continue;
                };
                if events.send(event).is_err() {
                    log::debug!("[udp] engine gone, receiver exiting");
                    return;
                }
            }
        })
    }
}

impl PhysicalLayer for UdpLink {
    /// A frame must fit in one datagram.
    fn max_payload(&self) -> usize {
        MAX_DATAGRAM - HEADER_LEN
    }

    fn transmit(&mut self, frame: Frame) {
        let bytes = match frame.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("[udp] cannot encode {frame}: {e}");
                return;
            }
        };
        match self.socket.try_send_to(&bytes, self.peer) {
            Ok(_) => log::trace!("[udp] sent {frame} ({} bytes)", bytes.len()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                log::warn!("[udp] send buffer full, {frame} dropped");
            }
            Err(e) => log::warn!("[udp] send of {frame} failed: {e}"),
        }
    }
}
