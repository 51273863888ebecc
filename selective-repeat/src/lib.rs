//! `selective-repeat`: a sliding-window ARQ data link with selective
//! retransmission, piggybacked acknowledgments and negative acknowledgments.
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────┐  packets / credit  ┌──────────────────────────────┐
//!   │ NetworkLayer │◀──────────────────▶│            Engine            │
//!   └──────────────┘                    │ SenderWindow  ReceiverWindow │
//!                                       └───┬──────────────▲───────┬───┘
//!                            transmit(Frame) │              │ Event │ start/stop
//!                                   ┌────────▼──────┐       │  ┌────▼─────────┐
//!                                   │ PhysicalLayer │       │  │ TimerService │
//!                                   └────────┬──────┘       │  └────┬─────────┘
//!                                            │  bytes  ┌────┴───┐   │ expiry
//!                                            └────────▶│ events │◀──┘
//!                                              (peer)  └────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`seq`]: circular sequence arithmetic
//! - [`frame`]: frame types and wire format
//! - [`window`]: sender and receiver window state
//! - [`event`]: the serialized event stream
//! - [`timer`]: retransmission and ack-delay timers
//! - [`network`]: network-layer boundary and in-memory queue
//! - [`physical`]: physical-layer boundary and frame classification
//! - [`engine`]: the protocol state machine
//! - [`session`]: an engine running on a tokio task
//! - [`simulator`]: lossy in-process channel
//! - [`socket`]: UDP channel
//! - [`config`]: protocol parameters
//! - [`stats`]: per-endpoint counters

pub mod config;
pub mod engine;
pub mod event;
pub mod frame;
pub mod network;
pub mod physical;
pub mod seq;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod stats;
pub mod timer;
pub mod window;

pub use config::ProtocolConfig;
pub use engine::{Engine, EngineError};
pub use frame::{Frame, FrameBody, FrameKind, Packet};
pub use session::{Session, SessionError};
pub use stats::LinkStats;
