//! Network-clock controller
//!
//! Owns the two fetch cadences for the active session:
//! - one awaited entry fetch that sets the baseline
//! - a recurring live fetch, started only after a successful entry
//!
//! The controller never performs I/O. Hosts ask it for a ticket, run the
//! fetch, and hand the result back together with the ticket. A result is
//! applied only if its ticket is still the newest one for the still-active
//! session; anything else is dropped on arrival.
//!
//! Timers hold a [`PollLease`]. Stopping or restarting polling invalidates
//! every outstanding lease so a leaked timer can't feed an old session.

use super::feed::{FeedError, FeedSnapshot};
use super::session::{LiveApplied, Session, SessionId};
use crate::settings::GameConfig;

/// Issue-order tag for live requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

/// Permission for a timer to keep issuing live polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollLease {
    pub session: SessionId,
    generation: u64,
    pub interval_ms: u64,
}

/// In-flight entry fetch
#[derive(Debug)]
pub struct EntryTicket {
    pub session: SessionId,
    pub token_reference: String,
}

/// In-flight live fetch
#[derive(Debug)]
pub struct LiveTicket {
    pub session: SessionId,
    pub token: RequestToken,
    pub token_reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Baseline captured, live polling started
    Ready(PollLease),
    /// Feed unusable; gameplay must not start
    Failed,
    /// The user moved on while the fetch was in flight
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveOutcome {
    Updated,
    Degraded,
    /// Too many failures in a row; polling has been stopped
    FeedLost,
    /// Superseded, or for a session that is no longer active
    Discarded,
}

#[derive(Debug, Default)]
pub struct PollingController {
    interval_ms: u64,
    next_token: u64,
    /// Newest live token issued; older tokens are stale
    latest: Option<RequestToken>,
    pending_entry: Option<SessionId>,
    live: Option<PollLease>,
    generation: u64,
}

impl PollingController {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            ..Self::default()
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Live polling is running for this session
    pub fn is_polling(&self, session: SessionId) -> bool {
        self.live.is_some_and(|lease| lease.session == session)
    }

    /// A timer holding this lease may keep going
    pub fn is_current(&self, lease: &PollLease) -> bool {
        self.live.as_ref() == Some(lease)
    }

    pub fn lease(&self) -> Option<PollLease> {
        self.live
    }

    /// Stop live polling and orphan every in-flight request
    pub fn stop(&mut self) {
        if let Some(lease) = self.live.take() {
            log::info!("Live polling stopped for session {}", lease.session.0);
        }
        self.pending_entry = None;
        self.latest = None;
        self.generation += 1;
    }

    /// Ticket for the entry fetch of a freshly created session
    pub fn begin_entry(&mut self, session: &Session) -> EntryTicket {
        self.stop();
        self.pending_entry = Some(session.id());
        EntryTicket {
            session: session.id(),
            token_reference: session.token_reference().to_string(),
        }
    }

    /// Apply an entry result to `active` if it is still the session the
    /// ticket was issued for
    pub fn complete_entry(
        &mut self,
        ticket: EntryTicket,
        result: Result<FeedSnapshot, FeedError>,
        active: Option<&mut Session>,
        now_ms: f64,
    ) -> EntryOutcome {
        let Some(session) = active.filter(|s| s.id() == ticket.session) else {
            log::debug!("Discarding entry result for inactive session {}", ticket.session.0);
            return EntryOutcome::Discarded;
        };
        if self.pending_entry != Some(ticket.session) {
            log::debug!("Discarding unexpected entry result for session {}", ticket.session.0);
            return EntryOutcome::Discarded;
        }
        self.pending_entry = None;

        session.apply_entry(result, now_ms);
        if session.is_playable() {
            EntryOutcome::Ready(self.start_live(session.id()))
        } else {
            EntryOutcome::Failed
        }
    }

    fn start_live(&mut self, session: SessionId) -> PollLease {
        self.generation += 1;
        let lease = PollLease {
            session,
            generation: self.generation,
            interval_ms: self.interval_ms,
        };
        self.live = Some(lease);
        self.latest = None;
        log::info!(
            "Live polling started for session {} every {}ms",
            session.0,
            self.interval_ms
        );
        lease
    }

    /// Ticket for the next live fetch, or `None` if `active` isn't being polled
    pub fn issue_live(&mut self, active: &Session) -> Option<LiveTicket> {
        if !self.is_polling(active.id()) {
            return None;
        }
        self.next_token += 1;
        let token = RequestToken(self.next_token);
        self.latest = Some(token);
        Some(LiveTicket {
            session: active.id(),
            token,
            token_reference: active.token_reference().to_string(),
        })
    }

    /// Apply a live result if its ticket is still the newest for the
    /// active session
    pub fn complete_live(
        &mut self,
        ticket: LiveTicket,
        result: Result<FeedSnapshot, FeedError>,
        active: Option<&mut Session>,
        config: &GameConfig,
        now_ms: f64,
    ) -> LiveOutcome {
        if self.latest != Some(ticket.token) {
            log::debug!("Discarding stale live result {:?}", ticket.token);
            return LiveOutcome::Discarded;
        }
        if !self.is_polling(ticket.session) {
            log::debug!("Discarding live result for stopped session {}", ticket.session.0);
            return LiveOutcome::Discarded;
        }
        let Some(session) = active.filter(|s| s.id() == ticket.session) else {
            return LiveOutcome::Discarded;
        };

        match session.apply_live(result, config, now_ms) {
            LiveApplied::Updated => LiveOutcome::Updated,
            LiveApplied::Degraded => LiveOutcome::Degraded,
            LiveApplied::FeedLost => {
                self.stop();
                LiveOutcome::FeedLost
            }
            LiveApplied::Ignored => LiveOutcome::Discarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(value: f64) -> FeedSnapshot {
        FeedSnapshot {
            metric_value: value,
            display_symbol: "TEST".to_string(),
            icon_url: None,
            pair_label: None,
            liquidity_value: 1.0,
            unit_price: 1.0,
        }
    }

    fn loading_session(id: u64) -> Session {
        let mut session = Session::new(SessionId(id), "tok", "REF", 100, 0.0);
        session.begin_loading();
        session
    }

    fn ready(controller: &mut PollingController, session: &mut Session, value: f64) -> PollLease {
        let ticket = controller.begin_entry(session);
        match controller.complete_entry(ticket, Ok(snapshot(value)), Some(session), 0.0) {
            EntryOutcome::Ready(lease) => lease,
            other => panic!("expected ready, got {:?}", other),
        }
    }

    #[test]
    fn test_entry_success_starts_live_polling() {
        let mut controller = PollingController::new(5000);
        let mut session = loading_session(1);
        let lease = ready(&mut controller, &mut session, 100.0);
        assert!(controller.is_polling(session.id()));
        assert!(controller.is_current(&lease));
        assert_eq!(lease.interval_ms, 5000);
    }

    #[test]
    fn test_entry_failure_does_not_poll() {
        let mut controller = PollingController::new(5000);
        let mut session = loading_session(1);
        let ticket = controller.begin_entry(&session);
        let outcome =
            controller.complete_entry(ticket, Err(FeedError::NoPairs), Some(&mut session), 0.0);
        assert_eq!(outcome, EntryOutcome::Failed);
        assert!(!controller.is_polling(session.id()));
        assert!(controller.issue_live(&session).is_none());
    }

    #[test]
    fn test_entry_for_replaced_session_is_discarded() {
        let mut controller = PollingController::new(5000);
        let session_a = loading_session(1);
        let mut session_b = loading_session(2);

        let ticket_a = controller.begin_entry(&session_a);
        let ticket_b = controller.begin_entry(&session_b);

        // A resolves while B is the active session
        let outcome =
            controller.complete_entry(ticket_a, Ok(snapshot(999.0)), Some(&mut session_b), 0.0);
        assert_eq!(outcome, EntryOutcome::Discarded);
        assert!(session_b.is_loading());
        assert_eq!(session_b.baseline_value(), 0.0);

        let outcome =
            controller.complete_entry(ticket_b, Ok(snapshot(50.0)), Some(&mut session_b), 0.0);
        assert!(matches!(outcome, EntryOutcome::Ready(_)));
        assert_eq!(session_b.baseline_value(), 50.0);
    }

    #[test]
    fn test_late_live_result_is_discarded() {
        let config = GameConfig::default();
        let mut controller = PollingController::new(5000);
        let mut session = loading_session(1);
        ready(&mut controller, &mut session, 100.0);

        let t1 = controller.issue_live(&session).unwrap();
        let t2 = controller.issue_live(&session).unwrap();
        assert!(t1.token < t2.token);

        // t2 lands first
        let outcome =
            controller.complete_live(t2, Ok(snapshot(130.0)), Some(&mut session), &config, 1.0);
        assert_eq!(outcome, LiveOutcome::Updated);

        // t1 lands late and must change nothing
        let outcome =
            controller.complete_live(t1, Ok(snapshot(60.0)), Some(&mut session), &config, 2.0);
        assert_eq!(outcome, LiveOutcome::Discarded);
        assert_eq!(session.current_value(), 130.0);
        assert!((session.multiplier() - 2.5).abs() < 1e-12);
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn test_stop_orphans_in_flight_requests() {
        let config = GameConfig::default();
        let mut controller = PollingController::new(5000);
        let mut session = loading_session(1);
        let lease = ready(&mut controller, &mut session, 100.0);

        let ticket = controller.issue_live(&session).unwrap();
        controller.stop();
        assert!(!controller.is_current(&lease));

        let outcome =
            controller.complete_live(ticket, Ok(snapshot(200.0)), Some(&mut session), &config, 1.0);
        assert_eq!(outcome, LiveOutcome::Discarded);
        assert_eq!(session.current_value(), 100.0);
    }

    #[test]
    fn test_live_result_for_other_session_is_discarded() {
        let config = GameConfig::default();
        let mut controller = PollingController::new(5000);
        let mut first = loading_session(1);
        ready(&mut controller, &mut first, 100.0);
        let ticket = controller.issue_live(&first).unwrap();

        let mut second = loading_session(2);
        let lease = ready(&mut controller, &mut second, 10.0);
        assert_eq!(lease.session, SessionId(2));

        let outcome =
            controller.complete_live(ticket, Ok(snapshot(500.0)), Some(&mut second), &config, 1.0);
        assert_eq!(outcome, LiveOutcome::Discarded);
        assert_eq!(second.current_value(), 10.0);
    }

    #[test]
    fn test_feed_loss_stops_polling() {
        let config = GameConfig {
            max_consecutive_failures: 2,
            ..GameConfig::default()
        };
        let mut controller = PollingController::new(5000);
        let mut session = loading_session(1);
        ready(&mut controller, &mut session, 100.0);

        for expected in [LiveOutcome::Degraded, LiveOutcome::FeedLost] {
            let ticket = controller.issue_live(&session).unwrap();
            let outcome = controller.complete_live(
                ticket,
                Err(FeedError::Status(500)),
                Some(&mut session),
                &config,
                1.0,
            );
            assert_eq!(outcome, expected);
        }
        assert!(!controller.is_polling(session.id()));
        assert!(controller.issue_live(&session).is_none());
    }

    #[test]
    fn test_restarting_polling_invalidates_old_lease() {
        let mut controller = PollingController::new(1000);
        let mut first = loading_session(1);
        let old = ready(&mut controller, &mut first, 1.0);
        let mut second = loading_session(2);
        let new = ready(&mut controller, &mut second, 1.0);
        assert!(!controller.is_current(&old));
        assert!(controller.is_current(&new));
    }
}
