//! Retransmission and acknowledgment-delay timers.
//!
//! The engine needs two kinds of timer:
//! - one **retransmission** timer per outstanding sender slot, keyed by the
//!   sequence number it guards;
//! - one shared **ack-delay** timer, armed whenever the receiver owes an
//!   acknowledgment it has not yet piggybacked.
//!
//! Expiry never calls back into the engine. It posts an [`Event`] into the
//! event stream instead, tagged with the [`Ticket`] issued when the timer
//! was started. Cancelling a timer cannot take back an event that is already
//! queued, so the engine hands every expiry to [`TimerService::fire`], which
//! accepts it only when the ticket still matches the armed timer. Stale
//! expiries are therefore harmless.
//!
//! [`TokioTimers`] is the production implementation: every armed timer is a
//! spawned `tokio::time::sleep` task.

use std::fmt;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::event::{Event, EventSender};
use crate::seq::{Seq, SeqSpace};

/// Which timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Retransmission timer for the DATA frame with this sequence number.
    Retransmit(Seq),
    /// The shared acknowledgment-delay timer.
    Ack,
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKey::Retransmit(seq) => write!(f, "retransmit({seq})"),
            TimerKey::Ack => f.write_str("ack"),
        }
    }
}

/// Identifies one particular arming of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Timer operations the engine depends on.
///
/// `start` and `stop` are idempotent: starting an armed timer cancels it
/// first, stopping an idle or unknown timer does nothing.
pub trait TimerService {
    /// Arm `key` to expire after `duration`, replacing any earlier arming.
    fn start(&mut self, key: TimerKey, duration: Duration);

    /// Disarm `key`. A no-op when it is not armed.
    fn stop(&mut self, key: TimerKey);

    /// Consume an expiry event.
    ///
    /// Returns `true` and disarms `key` only if `ticket` belongs to the
    /// arming that is current; otherwise the expiry is stale.
    fn fire(&mut self, key: TimerKey, ticket: Ticket) -> bool;

    /// `true` while `key` is armed.
    fn is_running(&self, key: TimerKey) -> bool;
}

// ---------------------------------------------------------------------------
// TokioTimers
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Armed {
    seq: Seq,
    ticket: Ticket,
    task: JoinHandle<()>,
}

/// Timers backed by spawned tokio tasks.
///
/// Retransmission timers are stored per slot (`seq mod nr_bufs`); at most
/// one outstanding sequence number maps to each slot, so the slot index is
/// enough to find the timer, and the stored sequence number guards against
/// stopping a newer timer that reused the slot.
///
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct TokioTimers {
    space: SeqSpace,
    events: EventSender,
    retransmit: Vec<Option<Armed>>,
    ack: Option<Armed>,
    next_ticket: u64,
}

impl TokioTimers {
    pub fn new(space: SeqSpace, events: EventSender) -> Self {
        Self {
            space,
            events,
            retransmit: (0..space.nr_bufs()).map(|_| None).collect(),
            ack: None,
            next_ticket: 0,
        }
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        Ticket(self.next_ticket)
    }

    fn entry(&mut self, key: TimerKey) -> &mut Option<Armed> {
        match key {
            TimerKey::Retransmit(seq) => &mut self.retransmit[self.space.slot(seq)],
            TimerKey::Ack => &mut self.ack,
        }
    }

    fn matches(armed: &Armed, key: TimerKey) -> bool {
        match key {
            TimerKey::Retransmit(seq) => armed.seq == seq,
            TimerKey::Ack => true,
        }
    }
}

impl TimerService for TokioTimers {
    fn start(&mut self, key: TimerKey, duration: Duration) {
        // Cancel whatever occupies the slot, even if it guards another seq.
        if let Some(old) = self.entry(key).take() {
            old.task.abort();
        }

        let ticket = self.issue_ticket();
        let (seq, event) = match key {
            TimerKey::Retransmit(seq) => (seq, Event::Timeout { seq, ticket }),
            TimerKey::Ack => (0, Event::AckTimeout { ticket }),
        };
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // The engine may already be gone; nothing left to notify.
            let _ = events.send(event);
        });

        log::trace!("[timer] start {key} {ticket:?} in {duration:?}");
        *self.entry(key) = Some(Armed { seq, ticket, task });
    }

    fn stop(&mut self, key: TimerKey) {
        let entry = self.entry(key);
        if entry.as_ref().is_some_and(|armed| Self::matches(armed, key)) {
            if let Some(armed) = entry.take() {
                armed.task.abort();
                log::trace!("[timer] stop {key}");
            }
        }
    }

    fn fire(&mut self, key: TimerKey, ticket: Ticket) -> bool {
        let entry = self.entry(key);
        let current = entry
            .as_ref()
            .is_some_and(|armed| Self::matches(armed, key) && armed.ticket == ticket);
        if current {
            *entry = None;
        }
        current
    }

    fn is_running(&self, key: TimerKey) -> bool {
        let entry = match key {
            TimerKey::Retransmit(seq) => &self.retransmit[self.space.slot(seq)],
            TimerKey::Ack => &self.ack,
        };
        entry.as_ref().is_some_and(|armed| Self::matches(armed, key))
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for armed in self.retransmit.iter_mut().chain(std::iter::once(&mut self.ack)) {
            if let Some(armed) = armed.take() {
                armed.task.abort();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{event_channel, EventReceiver};

    const TR: Duration = Duration::from_millis(200);
    const ACK: Duration = Duration::from_millis(50);

    fn timers() -> (TokioTimers, EventReceiver) {
        let (tx, rx) = event_channel();
        (TokioTimers::new(SeqSpace::new(7), tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn ack_timer_expiry_is_accepted_once() {
        let (mut t, mut rx) = timers();
        t.start(TimerKey::Ack, ACK);
        assert!(t.is_running(TimerKey::Ack));

        let ticket = match rx.next_event().await {
            Some(Event::AckTimeout { ticket }) => ticket,
            other => panic!("expected ack timeout, got {other:?}"),
        };
        assert!(t.fire(TimerKey::Ack, ticket));
        assert!(!t.is_running(TimerKey::Ack));
        // A duplicate of the same expiry is stale.
        assert!(!t.fire(TimerKey::Ack, ticket));
    }

    #[tokio::test(start_paused = true)]
    async fn retransmit_timer_carries_its_seq() {
        let (mut t, mut rx) = timers();
        t.start(TimerKey::Retransmit(5), TR);

        match rx.next_event().await {
            Some(Event::Timeout { seq, ticket }) => {
                assert_eq!(seq, 5);
                assert!(t.fire(TimerKey::Retransmit(5), ticket));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_timer_never_fires() {
        let (mut t, mut rx) = timers();
        t.start(TimerKey::Retransmit(1), TR);
        t.stop(TimerKey::Retransmit(1));
        assert!(!t.is_running(TimerKey::Retransmit(1)));

        tokio::time::sleep(TR * 3).await;
        assert_eq!(rx.try_next_event(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_invalidates_earlier_ticket() {
        let (mut t, mut rx) = timers();
        t.start(TimerKey::Ack, ACK);
        tokio::time::sleep(ACK * 2).await;
        // The first arming already posted its event; restart before handling it.
        t.start(TimerKey::Ack, ACK);

        let stale = match rx.try_next_event() {
            Some(Event::AckTimeout { ticket }) => ticket,
            other => panic!("expected queued ack timeout, got {other:?}"),
        };
        assert!(!t.fire(TimerKey::Ack, stale));
        assert!(t.is_running(TimerKey::Ack));

        let fresh = match rx.next_event().await {
            Some(Event::AckTimeout { ticket }) => ticket,
            other => panic!("expected ack timeout, got {other:?}"),
        };
        assert!(t.fire(TimerKey::Ack, fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ignores_other_seq_sharing_the_slot() {
        let (mut t, _rx) = timers();
        // 1 and 5 share slot 1 when nr_bufs = 4.
        t.start(TimerKey::Retransmit(5), TR);
        t.stop(TimerKey::Retransmit(1));
        assert!(t.is_running(TimerKey::Retransmit(5)));
        assert!(!t.is_running(TimerKey::Retransmit(1)));
    }

    #[tokio::test]
    async fn stopping_an_idle_timer_is_a_no_op() {
        let (mut t, _rx) = timers();
        t.stop(TimerKey::Ack);
        t.stop(TimerKey::Retransmit(3));
        assert!(!t.fire(TimerKey::Retransmit(3), Ticket::new(42)));
    }
}
