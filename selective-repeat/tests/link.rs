//! Integration tests running two sessions over a simulated channel.
//!
//! Every test runs with tokio's clock paused, so timer-driven recovery
//! completes instantly and deterministically.

use std::time::Duration;

use selective_repeat::event::event_channel;
use selective_repeat::frame::MAX_PAYLOAD;
use selective_repeat::network::SubmitError;
use selective_repeat::simulator::{FaultLog, SimulatedLink, SimulatorConfig};
use selective_repeat::{Packet, ProtocolConfig, Session};

/// Two connected sessions plus each direction's fault log.
fn connect(protocol: ProtocolConfig, link: SimulatorConfig) -> (Session, Session, FaultLog, FaultLog) {
    let (a_tx, a_rx) = event_channel();
    let (b_tx, b_rx) = event_channel();
    let (a_link, b_link) = SimulatedLink::pair(link, a_tx.clone(), b_tx.clone()).expect("link config");
    let (a_faults, b_faults) = (a_link.fault_log(), b_link.fault_log());
    let a = Session::spawn(protocol.clone(), a_link, (a_tx, a_rx)).expect("spawn a");
    let b = Session::spawn(protocol, b_link, (b_tx, b_rx)).expect("spawn b");
    (a, b, a_faults, b_faults)
}

fn packets(tag: &str, n: usize) -> Vec<Packet> {
    (0..n).map(|i| Packet::from(format!("{tag} {i}"))).collect()
}

async fn receive(session: &mut Session, n: usize) -> Vec<Packet> {
    let mut got = Vec::with_capacity(n);
    while got.len() < n {
        match tokio::time::timeout(Duration::from_secs(600), session.recv()).await {
            Ok(Some(p)) => got.push(p),
            Ok(None) => panic!("engine stopped after {} packets", got.len()),
            Err(_) => panic!("stalled after {} of {n} packets", got.len()),
        }
    }
    got
}

/// Faulty but FIFO: with a wrapping sequence space, a delayed stale copy
/// must never overtake a newer frame carrying the same number.
fn lossy() -> SimulatorConfig {
    SimulatorConfig {
        loss_rate: 0.2,
        corruption_rate: 0.1,
        duplicate_rate: 0.1,
        delay: Duration::from_millis(5),
        jitter: Duration::ZERO,
        seed: 42,
    }
}

// ---------------------------------------------------------------------------
// Test 1: perfect channel
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_perfect_link_in_order() {
    let (a, mut b, _, _) = connect(ProtocolConfig::default(), SimulatorConfig::default());
    let sent = packets("p", 50);
    for p in &sent {
        a.submit(p.clone()).unwrap();
    }

    assert_eq!(receive(&mut b, sent.len()).await, sent);

    let a_stats = a.close().await.unwrap();
    let b_stats = b.close().await.unwrap();
    assert_eq!(a_stats.data_sent, 50);
    assert_eq!(a_stats.retransmissions(), 0);
    assert_eq!(b_stats.delivered, 50);
    assert_eq!(b_stats.naks_sent, 0);
}

// ---------------------------------------------------------------------------
// Test 2: lossy, corrupting, duplicating channel
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_faulty_link_exactly_once_in_order() {
    let (a, mut b, a_faults, _) = connect(ProtocolConfig::default(), lossy());
    let sent = packets("p", 300);
    for p in &sent {
        a.submit(p.clone()).unwrap();
    }

    assert_eq!(receive(&mut b, sent.len()).await, sent);
    // Nothing extra trickles in afterwards.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(b.try_recv(), None);

    let faults = a_faults.snapshot();
    assert!(faults.dropped > 0 && faults.corrupted > 0 && faults.duplicated > 0);

    let a_stats = a.close().await.unwrap();
    let b_stats = b.close().await.unwrap();
    assert!(a_stats.retransmissions() > 0);
    assert_eq!(b_stats.delivered, 300);
    assert!(b_stats.checksum_errors > 0);
}

// ---------------------------------------------------------------------------
// Test 3: reordering channel
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_reordering_link_in_order() {
    // Large enough that no sequence number is reused during the test.
    let protocol = ProtocolConfig {
        max_seq: 511,
        ..ProtocolConfig::default()
    };
    let link = SimulatorConfig {
        delay: Duration::from_millis(1),
        jitter: Duration::from_millis(20),
        seed: 3,
        ..SimulatorConfig::default()
    };
    let (a, mut b, _, _) = connect(protocol, link);
    let sent = packets("p", 200);
    for p in &sent {
        a.submit(p.clone()).unwrap();
    }

    assert_eq!(receive(&mut b, sent.len()).await, sent);
    a.close().await.unwrap();
    let b_stats = b.close().await.unwrap();
    assert_eq!(b_stats.delivered, 200);
}

// ---------------------------------------------------------------------------
// Test 4: traffic in both directions
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_duplex_transfer() {
    let link = SimulatorConfig {
        seed: 7,
        ..lossy()
    };
    let (mut a, mut b, _, _) = connect(ProtocolConfig::default(), link);
    let forward = packets("a→b", 150);
    let reverse = packets("b→a", 150);
    for (f, r) in forward.iter().zip(&reverse) {
        a.submit(f.clone()).unwrap();
        b.submit(r.clone()).unwrap();
    }

    let (got_b, got_a) = tokio::join!(receive(&mut b, forward.len()), receive(&mut a, reverse.len()));
    assert_eq!(got_b, forward);
    assert_eq!(got_a, reverse);

    a.close().await.unwrap();
    b.close().await.unwrap();
}

// ---------------------------------------------------------------------------
// Test 5: one-way traffic falls back to a single bare ACK
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_ack_timer_fallback() {
    let (a, mut b, _, _) = connect(ProtocolConfig::default(), SimulatorConfig::default());
    a.submit("only").unwrap();
    assert_eq!(b.recv().await, Some(Packet::from("only")));

    // Well past both timeouts.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let a_stats = a.close().await.unwrap();
    let b_stats = b.close().await.unwrap();
    assert_eq!(b_stats.acks_sent, 1);
    assert_eq!(a_stats.data_sent, 1);
    assert_eq!(a_stats.retransmissions(), 0);
}

// ---------------------------------------------------------------------------
// Test 6: submissions beyond the window wait for credit
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_backlog_waits_for_credit() {
    // A channel so slow nothing is acknowledged before we look.
    let link = SimulatorConfig {
        delay: Duration::from_secs(10),
        ..SimulatorConfig::default()
    };
    let protocol = ProtocolConfig {
        retransmit_timeout: Duration::from_secs(60),
        ..ProtocolConfig::default()
    };
    let (a, mut b, _, _) = connect(protocol, link);
    let sent = packets("p", 10);
    for p in &sent {
        a.submit(p.clone()).unwrap();
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(a.pending(), 6);

    assert_eq!(receive(&mut b, sent.len()).await, sent);
    a.close().await.unwrap();
    b.close().await.unwrap();
}

// ---------------------------------------------------------------------------
// Test 7: a packet too large for one frame is refused, not wedged
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_oversize_packet_refused_and_link_keeps_working() {
    let (a, mut b, _, _) = connect(ProtocolConfig::default(), SimulatorConfig::default());
    assert_eq!(a.max_payload(), MAX_PAYLOAD);

    assert_eq!(
        a.submit(vec![0u8; 70_000]),
        Err(SubmitError::TooLarge {
            len: 70_000,
            max: MAX_PAYLOAD
        })
    );
    a.submit("after").unwrap();
    assert_eq!(receive(&mut b, 1).await, vec![Packet::from("after")]);

    let a_stats = a.close().await.unwrap();
    b.close().await.unwrap();
    assert_eq!(a_stats.data_sent, 1);
    assert_eq!(a_stats.retransmissions(), 0);
}
