//! A running link endpoint.
//!
//! [`Session::spawn`] wires an [`Engine`] to the tokio-backed collaborators
//! (an in-memory network layer and [`TokioTimers`]) and runs it on its own
//! task. The caller keeps the application side: submit packets, receive
//! deliveries, and finally [`close`](Session::close) to stop the engine and
//! collect its [`LinkStats`].
//!
//! ```text
//!  app ──submit──▶ NetworkHandle ─┐                  ┌─▶ PhysicalLayer ──▶ peer
//!                                 ├─▶ engine task ───┤
//!  app ◀──recv─── NetworkHandle ◀─┘        ▲          └─▶ TokioTimers
//!                                          └──────── events (timers, link rx)
//! ```

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};

use crate::config::ProtocolConfig;
use crate::engine::{Engine, EngineError};
use crate::event::{EventReceiver, EventSender};
use crate::frame::Packet;
use crate::network::{network_layer, NetworkHandle, SubmitError};
use crate::physical::PhysicalLayer;
use crate::stats::LinkStats;
use crate::timer::TokioTimers;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("engine task failed: {0}")]
    Join(#[from] JoinError),
}

/// Handle to an engine running on a background task.
#[derive(Debug)]
pub struct Session {
    network: NetworkHandle,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<LinkStats, EngineError>>,
}

impl Session {
    /// Start an engine transmitting through `physical`.
    ///
    /// `events` must be the channel the physical layer's receive side posts
    /// into; the session adds the network layer and timers as further
    /// producers. Dropping the session without closing it stops the engine.
    pub fn spawn<P>(
        config: ProtocolConfig,
        physical: P,
        events: (EventSender, EventReceiver),
    ) -> Result<Self, SessionError>
    where
        P: PhysicalLayer + Send + 'static,
    {
        let (tx, rx) = events;
        let (network, handle) = network_layer(tx.clone(), physical.max_payload());
        let timers = TokioTimers::new(config.seq_space(), tx);
        let engine = Engine::new(config, network, physical, timers)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(engine.run_until(rx, async move {
            // Either an explicit close or the session being dropped.
            let _ = shutdown_rx.await;
        }));

        Ok(Self {
            network: handle,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    /// Queue a packet for reliable, in-order transmission.
    ///
    /// Packets longer than [`max_payload`](Session::max_payload) are refused.
    pub fn submit(&self, packet: impl Into<Packet>) -> Result<(), SubmitError> {
        self.network.submit(packet)
    }

    /// Largest packet the underlying link can carry.
    pub fn max_payload(&self) -> usize {
        self.network.max_payload()
    }

    /// Wait for the next packet from the peer. `None` once the engine stopped.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.network.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Packet> {
        self.network.try_recv()
    }

    /// Packets submitted but not yet admitted to the send window.
    pub fn pending(&self) -> usize {
        self.network.pending()
    }

    /// `true` once the engine task has exited, normally or with an error.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the engine and return its final counters.
    ///
    /// Frames still in flight are abandoned.
    pub async fn close(mut self) -> Result<LinkStats, SessionError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let stats = (&mut self.task).await??;
        log::info!("[session] closed\n{stats}");
        Ok(stats)
    }
}
