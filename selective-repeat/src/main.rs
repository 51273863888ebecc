//! Entry point for `selective-repeat`.
//!
//! Parses CLI arguments and dispatches into either **simulate** or **peer**
//! mode. All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, argument parsing) and the demo drivers.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{ensure, Context};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;

use selective_repeat::event::event_channel;
use selective_repeat::simulator::{SimulatedLink, SimulatorConfig};
use selective_repeat::socket::UdpLink;
use selective_repeat::{Packet, ProtocolConfig, Session};

/// Selective-repeat sliding-window data link.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run two endpoints over a simulated lossy link and report statistics.
    Simulate {
        #[command(flatten)]
        protocol: ProtocolArgs,
        #[command(flatten)]
        link: LinkArgs,
        /// Packets to send from the first endpoint to the second.
        #[arg(short, long, default_value_t = 100)]
        packets: usize,
        /// Also send the same number of packets in the reverse direction.
        #[arg(long)]
        duplex: bool,
        /// Give up if delivery has not completed after this many seconds.
        #[arg(long, default_value_t = 60)]
        deadline_secs: u64,
    },
    /// Run one endpoint over UDP. Each stdin line is sent as one packet and
    /// each delivered packet is printed to stdout.
    Peer {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Remote endpoint address (e.g. 127.0.0.1:9001).
        #[arg(short, long)]
        peer: SocketAddr,
        #[command(flatten)]
        protocol: ProtocolArgs,
        /// Keep running this long after stdin closes so in-flight frames
        /// can be acknowledged.
        #[arg(long, default_value_t = 2000)]
        linger_ms: u64,
    },
}

#[derive(Args)]
struct ProtocolArgs {
    /// Largest sequence number (odd); the window is (max_seq + 1) / 2.
    #[arg(long, default_value_t = 7)]
    max_seq: u32,
    /// Retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 200)]
    retransmit_ms: u64,
    /// Acknowledgment-delay timeout in milliseconds.
    #[arg(long, default_value_t = 50)]
    ack_ms: u64,
}

impl From<ProtocolArgs> for ProtocolConfig {
    fn from(a: ProtocolArgs) -> Self {
        ProtocolConfig {
            max_seq: a.max_seq,
            retransmit_timeout: Duration::from_millis(a.retransmit_ms),
            ack_timeout: Duration::from_millis(a.ack_ms),
        }
    }
}

#[derive(Args)]
struct LinkArgs {
    /// Probability that a frame is lost.
    #[arg(long, default_value_t = 0.0)]
    loss: f64,
    /// Probability that a frame is corrupted.
    #[arg(long, default_value_t = 0.0)]
    corrupt: f64,
    /// Probability that a frame is duplicated.
    #[arg(long, default_value_t = 0.0)]
    duplicate: f64,
    /// Fixed propagation delay in milliseconds.
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
    /// Maximum extra random delay in milliseconds.
    #[arg(long, default_value_t = 0)]
    jitter_ms: u64,
    /// Seed for the fault model.
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,
}

impl From<LinkArgs> for SimulatorConfig {
    fn from(a: LinkArgs) -> Self {
        SimulatorConfig {
            loss_rate: a.loss,
            corruption_rate: a.corrupt,
            duplicate_rate: a.duplicate,
            delay: Duration::from_millis(a.delay_ms),
            jitter: Duration::from_millis(a.jitter_ms),
            seed: a.seed,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Simulate {
            protocol,
            link,
            packets,
            duplex,
            deadline_secs,
        } => {
            simulate(
                protocol.into(),
                link.into(),
                packets,
                duplex,
                Duration::from_secs(deadline_secs),
            )
            .await
        }
        Mode::Peer {
            bind,
            peer,
            protocol,
            linger_ms,
        } => run_peer(bind, peer, protocol.into(), Duration::from_millis(linger_ms)).await,
    }
}

// ---------------------------------------------------------------------------
// simulate
// ---------------------------------------------------------------------------

async fn simulate(
    protocol: ProtocolConfig,
    link: SimulatorConfig,
    packets: usize,
    duplex: bool,
    deadline: Duration,
) -> anyhow::Result<()> {
    log::info!("Simulating {packets} packets (duplex={duplex}) over {link:?}");

    let (a_tx, a_rx) = event_channel();
    let (b_tx, b_rx) = event_channel();
    let (a_link, b_link) = SimulatedLink::pair(link, a_tx.clone(), b_tx.clone())?;
    let (a_faults, b_faults) = (a_link.fault_log(), b_link.fault_log());

    let mut a = Session::spawn(protocol.clone(), a_link, (a_tx, a_rx))?;
    let mut b = Session::spawn(protocol, b_link, (b_tx, b_rx))?;

    let reverse = if duplex { packets } else { 0 };
    let forward_sent: Vec<Packet> = (0..packets).map(|i| Packet::from(format!("a→b #{i}"))).collect();
    let reverse_sent: Vec<Packet> = (0..reverse).map(|i| Packet::from(format!("b→a #{i}"))).collect();
    for p in &forward_sent {
        a.submit(p.clone())?;
    }
    for p in &reverse_sent {
        b.submit(p.clone())?;
    }

    let started = Instant::now();
    let (forward_got, reverse_got) = tokio::time::timeout(deadline, async {
        tokio::join!(collect(&mut b, packets), collect(&mut a, reverse))
    })
    .await
    .with_context(|| format!("delivery incomplete after {deadline:?}"))?;
    let elapsed = started.elapsed();

    ensure!(forward_got == forward_sent, "a→b stream delivered out of order or incomplete");
    ensure!(reverse_got == reverse_sent, "b→a stream delivered out of order or incomplete");

    let a_stats = a.close().await?;
    let b_stats = b.close().await?;

    println!("delivered {} + {} packets in order in {elapsed:?}", forward_got.len(), reverse_got.len());
    println!("endpoint A:\n{a_stats}");
    println!("  channel          : {:?}", a_faults.snapshot());
    println!("endpoint B:\n{b_stats}");
    println!("  channel          : {:?}", b_faults.snapshot());
    Ok(())
}

async fn collect(session: &mut Session, n: usize) -> Vec<Packet> {
    let mut got = Vec::with_capacity(n);
    while got.len() < n {
        match session.recv().await {
            Some(p) => got.push(p),
            None => break,
        }
    }
    got
}

// ---------------------------------------------------------------------------
// peer
// ---------------------------------------------------------------------------

async fn run_peer(
    bind: SocketAddr,
    peer: SocketAddr,
    protocol: ProtocolConfig,
    linger: Duration,
) -> anyhow::Result<()> {
    let (tx, rx) = event_channel();
    let link = UdpLink::bind(bind, peer).await?;
    let receiver = link.spawn_receiver(tx.clone());
    let mut session = Session::spawn(protocol, link, (tx, rx))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_closed_at: Option<Instant> = None;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_closed_at.is_none() => match line? {
                Some(line) => {
                    if let Err(e) = session.submit(line) {
                        log::warn!("line not sent: {e}");
                        eprintln!("line not sent: {e}");
                    }
                }
                None => {
                    log::info!("stdin closed; lingering {linger:?}");
                    stdin_closed_at = Some(Instant::now());
                }
            },
            packet = session.recv() => match packet {
                Some(p) => println!("{}", String::from_utf8_lossy(p.as_bytes())),
                None => break,
            },
            _ = tokio::time::sleep_until(stdin_closed_at.unwrap_or_else(Instant::now) + linger),
                if stdin_closed_at.is_some() => break,
        }
    }

    receiver.abort();
    let stats = session.close().await?;
    eprintln!("{stats}");
    Ok(())
}
