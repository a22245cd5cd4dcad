//! Per-token session state
//!
//! A [`Session`] is the market side of one play-through of one token. It is
//! created fresh on every selection or restart and never reused, so a restart
//! can't inherit an old baseline.
//!
//! ```text
//! Uninitialized -> Loading -> Ready <-> Error
//!                     \-> Error
//! (any) -> Abandoned
//! ```

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::feed::{FeedError, FeedSnapshot};
use super::multiplier::compute_multiplier;
use crate::settings::GameConfig;

/// Identity of one session instance (not of the token)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Uninitialized,
    /// Entry fetch in flight
    Loading,
    /// Market data is usable
    Ready,
    /// Last fetch failed; last-known-good data (if any) is kept
    Error,
    /// Discarded by the lifecycle, no further transitions
    Abandoned,
}

/// Direction of the latest live move, for the flash effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChangeDirection {
    #[default]
    None,
    Up,
    Down,
}

/// One chart sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp_ms: f64,
    pub value: f64,
    /// 0.5 at the baseline, +/-0.5 per 100% move
    pub normalized: f64,
}

/// Bounded, chronological sample buffer; the oldest sample is evicted first
#[derive(Debug, Clone)]
pub struct PriceHistory {
    samples: VecDeque<PricePoint>,
    capacity: usize,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: PricePoint) {
        self.samples.push_back(point);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.samples.back()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.samples.iter()
    }
}

/// What a live result did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveApplied {
    Updated,
    /// Failure; last-known-good data kept
    Degraded,
    /// Failure that crossed the consecutive-failure threshold
    FeedLost,
    /// Session was not in a state that accepts live data
    Ignored,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    token_id: String,
    token_reference: String,
    status: SessionStatus,

    baseline_value: f64,
    current_value: f64,
    previous_value: f64,
    multiplier: f64,
    /// Highest multiplier seen this session (for the leaderboard)
    peak_multiplier: f64,
    history: PriceHistory,

    change_direction: ChangeDirection,
    flash_until_ms: f64,

    last_fetch_failed: bool,
    consecutive_failures: u32,
    feed_lost: bool,
    last_active_ms: f64,

    display: Option<FeedSnapshot>,
}

impl Session {
    pub fn new(
        id: SessionId,
        token_id: impl Into<String>,
        token_reference: impl Into<String>,
        history_capacity: usize,
        now_ms: f64,
    ) -> Self {
        Self {
            id,
            token_id: token_id.into(),
            token_reference: token_reference.into(),
            status: SessionStatus::Uninitialized,
            baseline_value: 0.0,
            current_value: 0.0,
            previous_value: 0.0,
            multiplier: 1.0,
            peak_multiplier: 1.0,
            history: PriceHistory::new(history_capacity),
            change_direction: ChangeDirection::None,
            flash_until_ms: 0.0,
            last_fetch_failed: false,
            consecutive_failures: 0,
            feed_lost: false,
            last_active_ms: now_ms,
            display: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    pub fn token_reference(&self) -> &str {
        &self.token_reference
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn baseline_value(&self) -> f64 {
        self.baseline_value
    }

    pub fn current_value(&self) -> f64 {
        self.current_value
    }

    pub fn previous_value(&self) -> f64 {
        self.previous_value
    }

    /// The only field the frame loop reads
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn peak_multiplier(&self) -> f64 {
        self.peak_multiplier
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Uninitialized | SessionStatus::Loading
        )
    }

    pub fn last_fetch_failed(&self) -> bool {
        self.last_fetch_failed
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Live polling gave up after too many consecutive failures
    pub fn feed_lost(&self) -> bool {
        self.feed_lost
    }

    pub fn last_active_ms(&self) -> f64 {
        self.last_active_ms
    }

    /// Latest symbol/icon/pair info from the feed
    pub fn display(&self) -> Option<&FeedSnapshot> {
        self.display.as_ref()
    }

    /// Gameplay may start only on fresh, usable data
    pub fn is_playable(&self) -> bool {
        self.status == SessionStatus::Ready && !self.last_fetch_failed && !self.feed_lost
    }

    /// Direction flash, or `None` once it has expired
    pub fn change_direction(&self, now_ms: f64) -> ChangeDirection {
        if now_ms < self.flash_until_ms {
            self.change_direction
        } else {
            ChangeDirection::None
        }
    }

    /// Drop an expired flash back to `None`
    pub fn settle_flash(&mut self, now_ms: f64) {
        if now_ms >= self.flash_until_ms {
            self.change_direction = ChangeDirection::None;
        }
    }

    pub fn touch(&mut self, now_ms: f64) {
        self.last_active_ms = now_ms;
    }

    pub fn begin_loading(&mut self) {
        if self.status == SessionStatus::Uninitialized {
            self.status = SessionStatus::Loading;
        }
    }

    pub fn abandon(&mut self) {
        self.status = SessionStatus::Abandoned;
    }

    /// Apply the entry fetch. This is the only place the baseline is set.
    ///
    /// Returns false if the session was not waiting for an entry result.
    pub fn apply_entry(&mut self, result: Result<FeedSnapshot, FeedError>, now_ms: f64) -> bool {
        if self.status != SessionStatus::Loading {
            log::debug!(
                "Entry result for {} ignored in {:?}",
                self.token_id,
                self.status
            );
            return false;
        }

        match result {
            Ok(snapshot) if snapshot.metric_value > 0.0 => {
                let value = snapshot.metric_value;
                self.baseline_value = value;
                self.current_value = value;
                self.previous_value = value;
                self.multiplier = 1.0;
                self.peak_multiplier = 1.0;
                self.change_direction = ChangeDirection::None;
                self.flash_until_ms = 0.0;
                self.history.clear();
                self.history.push(PricePoint {
                    timestamp_ms: now_ms,
                    value,
                    normalized: 0.5,
                });
                self.last_fetch_failed = false;
                self.consecutive_failures = 0;
                self.feed_lost = false;
                self.display = Some(snapshot);
                self.status = SessionStatus::Ready;
                log::info!(
                    "Session {} ready: baseline {:.0} for {}",
                    self.id.0,
                    value,
                    self.token_id
                );
            }
            Ok(snapshot) => {
                log::warn!(
                    "Entry fetch for {} returned unusable value {}",
                    self.token_id,
                    snapshot.metric_value
                );
                self.last_fetch_failed = true;
                self.status = SessionStatus::Error;
            }
            Err(err) => {
                log::warn!("Entry fetch for {} failed: {}", self.token_id, err);
                self.last_fetch_failed = true;
                self.status = SessionStatus::Error;
            }
        }
        true
    }

    /// Apply one live poll result
    pub fn apply_live(
        &mut self,
        result: Result<FeedSnapshot, FeedError>,
        config: &GameConfig,
        now_ms: f64,
    ) -> LiveApplied {
        let accepts_live = matches!(self.status, SessionStatus::Ready | SessionStatus::Error)
            && self.baseline_value > 0.0
            && !self.feed_lost;
        if !accepts_live {
            return LiveApplied::Ignored;
        }

        let snapshot = match result {
            Ok(snapshot) if snapshot.metric_value > 0.0 => snapshot,
            Ok(snapshot) => {
                return self.record_failure(
                    &FeedError::NonPositiveMetric(snapshot.metric_value),
                    config,
                );
            }
            Err(err) => return self.record_failure(&err, config),
        };

        let value = snapshot.metric_value;
        self.previous_value = self.current_value;
        self.current_value = value;
        self.multiplier = compute_multiplier(
            self.baseline_value,
            value,
            config.sensitivity,
            config.multiplier_floor,
        );
        self.peak_multiplier = self.peak_multiplier.max(self.multiplier);

        self.change_direction = if value > self.previous_value {
            ChangeDirection::Up
        } else if value < self.previous_value {
            ChangeDirection::Down
        } else {
            ChangeDirection::None
        };
        self.flash_until_ms = now_ms + config.flash_duration_ms;

        self.history.push(PricePoint {
            timestamp_ms: now_ms,
            value,
            normalized: 0.5 + ((value - self.baseline_value) / self.baseline_value) * 0.5,
        });

        self.last_fetch_failed = false;
        self.consecutive_failures = 0;
        self.display = Some(snapshot);
        self.status = SessionStatus::Ready;
        LiveApplied::Updated
    }

    fn record_failure(&mut self, err: &FeedError, config: &GameConfig) -> LiveApplied {
        self.last_fetch_failed = true;
        self.consecutive_failures += 1;
        self.status = SessionStatus::Error;

        if self.consecutive_failures >= config.max_consecutive_failures {
            self.feed_lost = true;
            log::warn!(
                "Feed for {} lost after {} consecutive failures: {}",
                self.token_id,
                self.consecutive_failures,
                err
            );
            LiveApplied::FeedLost
        } else {
            log::warn!(
                "Live fetch for {} failed ({}), keeping previous data",
                self.token_id,
                err
            );
            LiveApplied::Degraded
        }
    }
}
