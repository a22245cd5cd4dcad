//! Menu / selection / play / game-over orchestration
//!
//! [`SessionLifecycle`] owns the one optional active [`Session`], the polling
//! controller and the run state. UI intents come in as method calls; network
//! work goes out as tickets that a host (see `driver`) fulfils and hands back.
//! Nothing here awaits, so the frame loop can call [`SessionLifecycle::frame`]
//! at any time and always sees the last committed multiplier.

use thiserror::Error;

use crate::highscores::HighScores;
use crate::market::{
    CatalogError, EntryOutcome, EntryTicket, FeedError, FeedSnapshot, LiveOutcome, LiveTicket,
    PollLease, PollingController, Session, SessionId, TokenCatalog, TokenEntry,
};
use crate::persistence::SavedState;
use crate::settings::{GameConfig, Settings};
use crate::sim::{self, FrameInput, RunState, RunSummary, SkillKind};

/// Which screen the player is looking at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Token selection
    Menu,
    /// Entry fetch in flight
    Loading,
    /// Baseline captured, waiting for start
    Ready,
    Playing,
    GameOver,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("no token is selected")]
    NoActiveSession,

    #[error("market data for {0} is not ready")]
    NotReady(String),

    #[error("cannot {action} while on {screen:?}")]
    WrongScreen { action: &'static str, screen: Screen },

    #[error("at most {0} skills can be equipped")]
    TooManySkills(usize),
}

pub struct SessionLifecycle {
    config: GameConfig,
    catalog: TokenCatalog,
    polling: PollingController,
    session: Option<Session>,
    next_session_id: u64,
    run: RunState,
    screen: Screen,
    equipped: Vec<SkillKind>,
    skin_id: Option<String>,
    balance_usd: f64,
    high_scores: HighScores,
    last_run: Option<RunSummary>,
    /// Message for the menu's error indicator
    last_error: Option<String>,
}

impl SessionLifecycle {
    pub fn new(settings: Settings) -> Self {
        let config = settings.config.sanitized();
        let mut equipped: Vec<SkillKind> = Vec::new();
        for skill in settings.equipped_skills {
            if !equipped.contains(&skill) && equipped.len() < config.max_equipped_skills {
                equipped.push(skill);
            }
        }
        Self {
            polling: PollingController::new(config.poll_interval_ms),
            config,
            catalog: TokenCatalog::with_presets(),
            session: None,
            next_session_id: 0,
            run: RunState::default(),
            screen: Screen::Menu,
            equipped,
            skin_id: settings.skin_id,
            balance_usd: 0.0,
            high_scores: HighScores::new(),
            last_run: None,
            last_error: None,
        }
    }

    /// Bring back saved tokens, balance and leaderboard
    pub fn restore(&mut self, saved: SavedState, high_scores: HighScores, now_ms: f64) {
        self.balance_usd = saved.restore_into(&mut self.catalog);
        let ids: Vec<String> = self.catalog.custom_entries().map(|e| e.id.clone()).collect();
        for id in &ids {
            self.catalog.touch(id, now_ms);
        }
        self.high_scores = high_scores;
        log::info!(
            "Restored {} custom tokens and ${:.2} balance",
            ids.len(),
            self.balance_usd
        );
    }

    pub fn saved_state(&self) -> SavedState {
        SavedState::capture(&self.catalog, self.balance_usd)
    }

    pub fn settings(&self) -> Settings {
        Settings {
            config: self.config.clone(),
            equipped_skills: self.equipped.clone(),
            skin_id: self.skin_id.clone(),
        }
    }

    fn persist(&self) {
        self.saved_state().save();
    }

    // --- accessors ---

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn catalog(&self) -> &TokenCatalog {
        &self.catalog
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn run(&self) -> &RunState {
        &self.run
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn balance_usd(&self) -> f64 {
        self.balance_usd
    }

    pub fn high_scores(&self) -> &HighScores {
        &self.high_scores
    }

    pub fn last_run(&self) -> Option<&RunSummary> {
        self.last_run.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn equipped_skills(&self) -> &[SkillKind] {
        &self.equipped
    }

    /// Multiplier the frame loop applies right now
    pub fn multiplier(&self) -> f64 {
        self.session.as_ref().map_or(1.0, Session::multiplier)
    }

    pub fn poll_lease(&self) -> Option<PollLease> {
        self.polling.lease()
    }

    pub fn is_lease_current(&self, lease: &PollLease) -> bool {
        self.polling.is_current(lease)
    }

    fn active_token_id(&self) -> Option<&str> {
        self.session.as_ref().map(Session::token_id)
    }

    // --- session transitions ---

    /// Pick a token and get the entry fetch to perform
    pub fn select_token(&mut self, token_id: &str, now_ms: f64) -> Result<EntryTicket, LifecycleError> {
        if self.screen == Screen::Playing {
            return Err(LifecycleError::WrongScreen {
                action: "select a token",
                screen: self.screen,
            });
        }
        self.enter(token_id, now_ms)
    }

    /// Replay the current token against a freshly fetched baseline
    pub fn restart(&mut self, now_ms: f64) -> Result<EntryTicket, LifecycleError> {
        let token_id = self
            .active_token_id()
            .ok_or(LifecycleError::NoActiveSession)?
            .to_string();
        log::info!("Restarting {} with a fresh entry fetch", token_id);
        self.enter(&token_id, now_ms)
    }

    /// Replace the active session with a fresh one in `Loading`
    fn enter(&mut self, token_id: &str, now_ms: f64) -> Result<EntryTicket, LifecycleError> {
        let reference = self
            .catalog
            .get(token_id)
            .ok_or_else(|| CatalogError::UnknownToken(token_id.to_string()))?
            .token_reference
            .clone();

        if let Some(mut old) = self.session.take() {
            old.abandon();
            log::info!("Leaving session {} for {}", old.id().0, old.token_id());
        }

        self.next_session_id += 1;
        let mut session = Session::new(
            SessionId(self.next_session_id),
            token_id,
            reference,
            self.config.history_capacity,
            now_ms,
        );
        session.begin_loading();
        let ticket = self.polling.begin_entry(&session);

        self.catalog.touch(token_id, now_ms);
        self.session = Some(session);
        self.run = RunState::default();
        self.last_error = None;
        self.screen = Screen::Loading;
        log::info!("Selected {} (session {})", token_id, self.next_session_id);
        Ok(ticket)
    }

    /// Hand back the entry fetch result
    pub fn complete_entry(
        &mut self,
        ticket: EntryTicket,
        result: Result<FeedSnapshot, FeedError>,
        now_ms: f64,
    ) -> EntryOutcome {
        let outcome = self
            .polling
            .complete_entry(ticket, result, self.session.as_mut(), now_ms);
        match outcome {
            EntryOutcome::Ready(_) => {
                self.screen = Screen::Ready;
                self.last_error = None;
            }
            EntryOutcome::Failed => {
                let name = self
                    .active_token_id()
                    .and_then(|id| self.catalog.get(id))
                    .map_or_else(|| "token".to_string(), |e| e.name.clone());
                self.last_error = Some(format!("Could not load market data for {}", name));
                self.screen = Screen::Menu;
            }
            EntryOutcome::Discarded => {}
        }
        outcome
    }

    /// Begin a run against the ready session
    pub fn start_run(&mut self, seed: u64) -> Result<(), LifecycleError> {
        if self.screen != Screen::Ready {
            return Err(LifecycleError::WrongScreen {
                action: "start a run",
                screen: self.screen,
            });
        }
        let session = self.session.as_ref().ok_or(LifecycleError::NoActiveSession)?;
        if !session.is_playable() {
            return Err(LifecycleError::NotReady(session.token_id().to_string()));
        }

        sim::start(&mut self.run, seed, &self.equipped);
        self.last_run = None;
        self.screen = Screen::Playing;
        log::info!(
            "Run started on {} at {:.2}x",
            session.token_id(),
            session.multiplier()
        );
        Ok(())
    }

    /// Advance the run by one frame
    pub fn frame(&mut self, input: &FrameInput, now_ms: f64) -> Option<RunSummary> {
        if let Some(session) = self.session.as_mut() {
            session.settle_flash(now_ms);
        }
        let multiplier = self.multiplier();
        let summary = sim::step(&mut self.run, input, multiplier)?;
        self.finish_run(summary, now_ms);
        Some(summary)
    }

    fn finish_run(&mut self, summary: RunSummary, now_ms: f64) {
        self.balance_usd += summary.final_score;
        self.last_run = Some(summary);
        self.screen = Screen::GameOver;

        let (symbol, peak) = match self.session.as_ref() {
            Some(session) => (
                session
                    .display()
                    .map(|d| d.display_symbol.clone())
                    .unwrap_or_else(|| session.token_id().to_string()),
                session.peak_multiplier(),
            ),
            None => ("UNKNOWN".to_string(), 1.0),
        };
        if let Some(rank) = self
            .high_scores
            .add_score(summary.final_score, &symbol, peak, now_ms)
        {
            log::info!("New high score #{}: ${:.2} on {}", rank, summary.final_score, symbol);
            self.high_scores.save();
        }
        self.persist();
    }

    /// Stop polling, drop the session and go back to selection
    pub fn abandon_to_menu(&mut self) {
        self.polling.stop();
        if let Some(mut session) = self.session.take() {
            session.abandon();
            log::info!("Abandoned session {} ({})", session.id().0, session.token_id());
        }
        self.run = RunState::default();
        self.screen = Screen::Menu;
    }

    // --- live polling ---

    /// Next live fetch for a timer holding `lease`, if it may still poll
    pub fn issue_live_poll(&mut self, lease: &PollLease) -> Option<LiveTicket> {
        if !self.polling.is_current(lease) {
            return None;
        }
        let session = self.session.as_ref()?;
        self.polling.issue_live(session)
    }

    pub fn complete_live_poll(
        &mut self,
        ticket: LiveTicket,
        result: Result<FeedSnapshot, FeedError>,
        now_ms: f64,
    ) -> LiveOutcome {
        let outcome = self.polling.complete_live(
            ticket,
            result,
            self.session.as_mut(),
            &self.config,
            now_ms,
        );
        match outcome {
            LiveOutcome::Updated => {
                if let Some(session) = self.session.as_mut() {
                    session.touch(now_ms);
                    let id = session.token_id().to_string();
                    self.catalog.touch(&id, now_ms);
                }
            }
            LiveOutcome::FeedLost => {
                self.last_error = Some("Price feed lost, pick the token again".to_string());
            }
            LiveOutcome::Degraded | LiveOutcome::Discarded => {}
        }
        outcome
    }

    // --- catalog ---

    /// Local validation before the verification fetch
    pub fn check_custom_token(&self, reference: &str) -> Result<String, LifecycleError> {
        self.catalog.check_can_add(reference)?;
        Ok(reference.trim().to_string())
    }

    /// Insert a token once its verification fetch has come back
    pub fn finish_custom_token(
        &mut self,
        reference: &str,
        name: Option<&str>,
        verification: Result<FeedSnapshot, FeedError>,
        now_ms: f64,
    ) -> Result<String, LifecycleError> {
        let snapshot = verification.map_err(|err| {
            log::info!("Rejected token {}: {}", reference, err);
            CatalogError::VerificationFailed {
                reference: reference.trim().to_string(),
                reason: err.to_string(),
            }
        })?;
        let id = self
            .catalog
            .insert_verified(reference, name, snapshot, now_ms)?
            .id
            .clone();
        self.persist();
        Ok(id)
    }

    /// Remove a user-added token, leaving its session if it was active
    pub fn remove_token(&mut self, token_id: &str) -> Result<TokenEntry, LifecycleError> {
        let entry = self.catalog.remove(token_id)?;
        if self.active_token_id() == Some(token_id) {
            self.abandon_to_menu();
        }
        self.persist();
        Ok(entry)
    }

    /// Drop user-added tokens nobody has touched for a while
    pub fn evict_idle_tokens(&mut self, now_ms: f64) -> Vec<TokenEntry> {
        let active = self.session.as_ref().map(|s| s.token_id().to_string());
        let evicted = self
            .catalog
            .evict_idle(now_ms, self.config.idle_eviction_ms, active.as_deref());
        if !evicted.is_empty() {
            self.persist();
        }
        evicted
    }

    /// Tokens whose dashboard preview may be refreshed
    pub fn preview_targets(&self) -> Vec<(String, String)> {
        let active = self.active_token_id();
        self.catalog
            .entries()
            .iter()
            .filter(|e| Some(e.id.as_str()) != active)
            .map(|e| (e.id.clone(), e.token_reference.clone()))
            .collect()
    }

    pub fn record_preview(&mut self, token_id: &str, result: Result<FeedSnapshot, FeedError>) {
        match result {
            Ok(snapshot) => {
                let active = self.session.as_ref().map(|s| s.token_id().to_string());
                self.catalog
                    .record_preview(token_id, snapshot, active.as_deref());
            }
            Err(err) => log::debug!("Preview for {} failed: {}", token_id, err),
        }
    }

    // --- skills ---

    /// Toggle a skill for the next run; returns whether it is now equipped
    pub fn toggle_skill(&mut self, skill: SkillKind) -> Result<bool, LifecycleError> {
        if let Some(pos) = self.equipped.iter().position(|s| *s == skill) {
            self.equipped.remove(pos);
            return Ok(false);
        }
        if self.equipped.len() >= self.config.max_equipped_skills {
            return Err(LifecycleError::TooManySkills(self.config.max_equipped_skills));
        }
        self.equipped.push(skill);
        Ok(true)
    }
}
