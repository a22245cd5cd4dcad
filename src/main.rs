//! Degen Runner entry point
//!
//! Browser: a `requestAnimationFrame` loop drives the run while a
//! `setInterval` timer polls the price feed. Native: a headless autopilot run
//! on a tokio current-thread runtime, useful for watching the feed and the
//! multiplier from a terminal.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_game {
    use std::cell::RefCell;
    use std::rc::Rc;

    use wasm_bindgen::prelude::*;
    use web_sys::{Document, Element, HtmlInputElement, KeyboardEvent, MouseEvent};

    use degen_runner::consts::*;
    use degen_runner::driver::{self, SharedLifecycle};
    use degen_runner::market::{DexScreenerClient, EntryOutcome, SessionStatus};
    use degen_runner::persistence::SavedState;
    use degen_runner::platform::now_ms;
    use degen_runner::platform::web::{IntervalHandle, LivePollInterval};
    use degen_runner::sim::{FrameInput, SkillKind};
    use degen_runner::{HighScores, Screen, SessionLifecycle, Settings};

    /// Dashboard preview refresh cadence
    const PREVIEW_REFRESH_MS: u64 = 30_000;
    /// Idle-token sweep cadence
    const EVICTION_SWEEP_MS: f64 = 30_000.0;

    struct Game {
        lifecycle: SharedLifecycle,
        feed: Rc<DexScreenerClient>,
        poller: Option<LivePollInterval>,
        input: FrameInput,
        last_time: f64,
        last_sweep_ms: f64,
        /// Last rendered token list, to skip redundant DOM writes
        token_list_html: String,
        _timers: Vec<IntervalHandle>,
    }

    impl Game {
        fn new(lifecycle: SharedLifecycle, feed: Rc<DexScreenerClient>) -> Self {
            Self {
                lifecycle,
                feed,
                poller: None,
                input: FrameInput::default(),
                last_time: 0.0,
                last_sweep_ms: now_ms(),
                token_list_html: String::new(),
                _timers: Vec::new(),
            }
        }

        fn update(&mut self, frame_ms: f32) {
            let now = now_ms();
            self.input.frame_ms = frame_ms;
            self.lifecycle.borrow_mut().frame(&self.input, now);
            self.input = FrameInput::default();

            self.sync_poller();

            if now - self.last_sweep_ms >= EVICTION_SWEEP_MS {
                self.last_sweep_ms = now;
                self.lifecycle.borrow_mut().evict_idle_tokens(now);
            }
        }

        /// Keep exactly one browser timer, for the current lease
        fn sync_poller(&mut self) {
            let lease = self.lifecycle.borrow().poll_lease();
            let current = self.poller.as_ref().map(LivePollInterval::lease);
            if lease == current {
                return;
            }
            self.poller = lease.and_then(|lease| {
                LivePollInterval::spawn(self.lifecycle.clone(), self.feed.clone(), lease)
            });
        }

        fn update_hud(&mut self, document: &Document) {
            let lc = self.lifecycle.borrow();
            let now = now_ms();

            if let Some(body) = document.body() {
                let _ = body.set_attribute("data-screen", screen_name(lc.screen()));
            }
            set_text(document, "hud-score", &format!("${:.2}", lc.run().score));
            set_text(document, "hud-balance", &format!("${:.2}", lc.balance_usd()));
            set_text(document, "hud-multiplier", &format!("{:.2}x", lc.multiplier()));

            let (symbol, status, direction) = match lc.session() {
                Some(session) => {
                    let symbol = session
                        .display()
                        .map(|d| format!("${}", d.display_symbol))
                        .unwrap_or_else(|| session.token_id().to_string());
                    let status = match session.status() {
                        SessionStatus::Loading | SessionStatus::Uninitialized => "Loading market data...",
                        SessionStatus::Error if session.feed_lost() => "Price feed lost",
                        SessionStatus::Error => "Connection issue, showing last known data",
                        SessionStatus::Ready | SessionStatus::Abandoned => "",
                    };
                    let direction = format!("{:?}", session.change_direction(now)).to_lowercase();
                    (symbol, status, direction)
                }
                None => (String::new(), "", "none".to_string()),
            };
            set_text(document, "hud-symbol", &symbol);
            set_text(document, "hud-status", lc.last_error().unwrap_or(status));
            if let Some(el) = document.get_element_by_id("hud-multiplier") {
                let _ = el.set_attribute("data-direction", &direction);
            }

            let skills: Vec<String> = lc
                .run()
                .power_ups
                .slots()
                .map(|(kind, timer)| {
                    if timer.is_active() {
                        format!("{} {:.0}s", kind.name(), timer.active_ms / 1000.0)
                    } else if timer.cooldown_ms > 0.0 {
                        format!("{} ({:.0}s)", kind.name(), timer.cooldown_ms / 1000.0)
                    } else if timer.spent {
                        format!("{} (used)", kind.name())
                    } else {
                        kind.name().to_string()
                    }
                })
                .collect();
            set_text(document, "hud-skills", &skills.join(" | "));

            if let Some(run) = lc.last_run() {
                set_text(document, "final-score", &format!("${:.2}", run.final_score));
            }

            let html = token_list_html(&lc);
            drop(lc);
            if html != self.token_list_html {
                if let Some(el) = document.get_element_by_id("token-list") {
                    el.set_inner_html(&html);
                }
                self.token_list_html = html;
            }
        }
    }

    fn screen_name(screen: Screen) -> &'static str {
        match screen {
            Screen::Menu => "menu",
            Screen::Loading => "loading",
            Screen::Ready => "ready",
            Screen::Playing => "playing",
            Screen::GameOver => "game-over",
        }
    }

    fn set_text(document: &Document, id: &str, text: &str) {
        if let Some(el) = document.get_element_by_id(id) {
            if el.text_content().as_deref() != Some(text) {
                el.set_text_content(Some(text));
            }
        }
    }

    fn escape_html(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#39;"),
                _ => out.push(c),
            }
        }
        out
    }

    fn token_list_html(lc: &SessionLifecycle) -> String {
        let mut html = String::new();
        for entry in lc.catalog().entries() {
            let preview = entry
                .preview
                .as_ref()
                .map(|p| format!(" <small>${:.0}</small>", p.metric_value))
                .unwrap_or_default();
            let id = escape_html(&entry.id);
            html.push_str(&format!(
                "<li><button data-token=\"{}\" style=\"border-color:{}\">{}{}</button>",
                id,
                escape_html(&entry.theme_color),
                escape_html(&entry.name),
                preview
            ));
            if entry.kind == degen_runner::market::TokenKind::Custom {
                html.push_str(&format!("<button data-remove=\"{}\">x</button>", id));
            }
            html.push_str("</li>");
        }
        html
    }

    pub async fn run() {
        console_error_panic_hook::set_once();
        if console_log::init_with_level(log::Level::Info).is_err() {
            web_sys::console::warn_1(&"Logger already initialized".into());
        }

        log::info!("Degen Runner starting...");

        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            log::error!("No document, cannot start");
            return;
        };

        let settings = Settings::load();
        let mut lifecycle = SessionLifecycle::new(settings);
        lifecycle.restore(SavedState::load(), HighScores::load(), now_ms());

        let feed = match DexScreenerClient::new(lifecycle.config()) {
            Ok(feed) => Rc::new(feed),
            Err(err) => {
                log::error!("Price feed unavailable: {}", err);
                return;
            }
        };

        let game = Rc::new(RefCell::new(Game::new(driver::shared(lifecycle), feed)));

        setup_click_handlers(&document, game.clone());
        setup_keyboard(game.clone());
        setup_add_token(&document, game.clone());
        setup_preview_refresh(game.clone());

        if let Some(loading) = document.get_element_by_id("loading") {
            let _ = loading.set_attribute("class", "hidden");
        }

        request_animation_frame(game);

        log::info!("Degen Runner running!");
    }

    /// Spawn an entry fetch for `token_id`
    fn select(game: &Rc<RefCell<Game>>, token_id: String) {
        let (lifecycle, feed) = {
            let g = game.borrow();
            (g.lifecycle.clone(), g.feed.clone())
        };
        wasm_bindgen_futures::spawn_local(async move {
            match driver::select_token(&lifecycle, &*feed, &token_id).await {
                Ok(EntryOutcome::Ready(_)) => log::info!("{} ready to play", token_id),
                Ok(outcome) => log::info!("Entry for {} ended as {:?}", token_id, outcome),
                Err(err) => log::warn!("Could not select {}: {}", token_id, err),
            }
        });
    }

    fn restart(game: &Rc<RefCell<Game>>) {
        let (lifecycle, feed) = {
            let g = game.borrow();
            (g.lifecycle.clone(), g.feed.clone())
        };
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(err) = driver::restart(&lifecycle, &*feed).await {
                log::warn!("Restart failed: {}", err);
            }
        });
    }

    /// Delegated clicks for token, remove and skill buttons
    fn setup_click_handlers(document: &Document, game: Rc<RefCell<Game>>) {
        let closure = Closure::<dyn FnMut(_)>::new(move |event: MouseEvent| {
            let Some(target) = event
                .target()
                .and_then(|t| t.dyn_into::<Element>().ok())
            else {
                return;
            };

            if let Some(id) = attribute_of(&target, "data-token") {
                select(&game, id);
            } else if let Some(id) = attribute_of(&target, "data-remove") {
                let lifecycle = game.borrow().lifecycle.clone();
                if let Err(err) = lifecycle.borrow_mut().remove_token(&id) {
                    log::info!("{}", err);
                }
            } else if let Some(key) = attribute_of(&target, "data-skill") {
                let Some(skill) = key.chars().next().and_then(SkillKind::from_key) else {
                    return;
                };
                let lifecycle = game.borrow().lifecycle.clone();
                let mut lc = lifecycle.borrow_mut();
                match lc.toggle_skill(skill) {
                    Ok(_) => lc.settings().save(),
                    Err(err) => log::info!("{}", err),
                }
            }
        });
        let _ = document.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn attribute_of(target: &Element, name: &str) -> Option<String> {
        target
            .closest(&format!("[{}]", name))
            .ok()
            .flatten()
            .and_then(|el| el.get_attribute(name))
    }

    fn setup_keyboard(game: Rc<RefCell<Game>>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
            let lifecycle = game.borrow().lifecycle.clone();
            let screen = lifecycle.borrow().screen();
            match (event.key().as_str(), screen) {
                (" " | "ArrowUp", Screen::Playing) => game.borrow_mut().input.jump = true,
                (" " | "Enter", Screen::Ready) => {
                    let seed = js_sys::Date::now() as u64;
                    if let Err(err) = lifecycle.borrow_mut().start_run(seed) {
                        log::warn!("Cannot start: {}", err);
                    }
                }
                (" " | "Enter" | "r" | "R", Screen::GameOver) => restart(&game),
                ("Escape", Screen::Ready | Screen::GameOver | Screen::Loading) => {
                    lifecycle.borrow_mut().abandon_to_menu();
                }
                (key, Screen::Playing) => {
                    if let Some(skill) = key.chars().next().and_then(SkillKind::from_key) {
                        game.borrow_mut().input.activate = Some(skill);
                    }
                }
                _ => {}
            }
        });
        let _ = window.add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn setup_add_token(document: &Document, game: Rc<RefCell<Game>>) {
        let Some(btn) = document.get_element_by_id("add-token-btn") else {
            return;
        };
        let document = document.clone();
        let closure = Closure::<dyn FnMut(_)>::new(move |_event: MouseEvent| {
            let value_of = |id: &str| {
                document
                    .get_element_by_id(id)
                    .and_then(|el| el.dyn_into::<HtmlInputElement>().ok())
                    .map(|input| input.value())
            };
            let Some(address) = value_of("token-address") else {
                return;
            };
            let name = value_of("token-name").filter(|n| !n.trim().is_empty());

            let (lifecycle, feed) = {
                let g = game.borrow();
                (g.lifecycle.clone(), g.feed.clone())
            };
            let document = document.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let message = match driver::add_custom_token(&lifecycle, &*feed, &address, name.as_deref()).await {
                    Ok(id) => format!("Added {}", id),
                    Err(err) => err.to_string(),
                };
                set_text(&document, "add-token-status", &message);
            });
        });
        let _ = btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn setup_preview_refresh(game: Rc<RefCell<Game>>) {
        let refresh = {
            let game = game.clone();
            move || {
                let (lifecycle, feed) = {
                    let g = game.borrow();
                    (g.lifecycle.clone(), g.feed.clone())
                };
                if lifecycle.borrow().screen() != Screen::Menu {
                    return;
                }
                wasm_bindgen_futures::spawn_local(async move {
                    driver::refresh_previews(&lifecycle, &*feed).await;
                });
            }
        };
        refresh();
        if let Some(timer) = IntervalHandle::new(PREVIEW_REFRESH_MS, refresh) {
            game.borrow_mut()._timers.push(timer);
        }
    }

    fn request_animation_frame(game: Rc<RefCell<Game>>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let closure = Closure::once(move |time: f64| {
            game_loop(game, time);
        });
        let _ = window.request_animation_frame(closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn game_loop(game: Rc<RefCell<Game>>, time: f64) {
        {
            let mut g = game.borrow_mut();

            let frame_ms = if g.last_time > 0.0 {
                ((time - g.last_time) as f32).clamp(0.0, 100.0)
            } else {
                FRAME_MS
            };
            g.last_time = time;

            g.update(frame_ms);
            if let Some(document) = web_sys::window().and_then(|w| w.document()) {
                g.update_hud(&document);
            }
        }

        request_animation_frame(game);
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn wasm_main() {
    wasm_game::run().await;
}

#[cfg(not(target_arch = "wasm32"))]
mod headless {
    use std::rc::Rc;
    use std::time::Duration;

    use anyhow::{Context, bail};
    use tokio::task::LocalSet;

    use degen_runner::consts::*;
    use degen_runner::driver;
    use degen_runner::market::{DexScreenerClient, EntryOutcome};
    use degen_runner::persistence::SavedState;
    use degen_runner::platform::native::LivePollTask;
    use degen_runner::platform::now_ms;
    use degen_runner::sim::{FrameInput, RunState, SkillKind};
    use degen_runner::{HighScores, SessionLifecycle, Settings};

    /// Longest headless run before giving up
    const MAX_RUN: Duration = Duration::from_secs(120);

    /// Jump when the next obstacle is close
    fn autopilot(run: &RunState) -> FrameInput {
        let runner_front = run.runner.pos.x + run.runner.size.x;
        let reach = run.frame_speed * 14.0;
        let jump = !run.runner.jumping
            && run
                .obstacles
                .iter()
                .any(|o| o.pos.x > runner_front - 5.0 && o.pos.x - runner_front < reach);
        let activate = if run.power_ups.has(SkillKind::CoinMagnet) {
            Some(SkillKind::CoinMagnet)
        } else {
            None
        };
        FrameInput {
            jump,
            activate,
            ..Default::default()
        }
    }

    pub fn run(token_id: &str) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("building tokio runtime")?;
        LocalSet::new().block_on(&runtime, play(token_id))
    }

    async fn play(token_id: &str) -> anyhow::Result<()> {
        let settings = Settings::load();
        let mut lifecycle = SessionLifecycle::new(settings);
        lifecycle.restore(SavedState::load(), HighScores::load(), now_ms());

        let feed = Rc::new(DexScreenerClient::new(lifecycle.config())?);
        let lifecycle = driver::shared(lifecycle);

        let lease = match driver::select_token(&lifecycle, &*feed, token_id).await? {
            EntryOutcome::Ready(lease) => lease,
            outcome => bail!(
                "{} is not playable ({:?}): {}",
                token_id,
                outcome,
                lifecycle.borrow().last_error().unwrap_or("no data")
            ),
        };
        let mut poller = LivePollTask::spawn(lifecycle.clone(), feed.clone(), lease);

        let seed = now_ms() as u64;
        lifecycle.borrow_mut().start_run(seed)?;
        log::info!("Autopilot running {} with seed {}", token_id, seed);

        let mut ticker = tokio::time::interval(Duration::from_secs_f32(FRAME_MS / 1000.0));
        let started = tokio::time::Instant::now();
        let summary = loop {
            ticker.tick().await;
            let input = autopilot(lifecycle.borrow().run());
            if let Some(summary) = lifecycle.borrow_mut().frame(&input, now_ms()) {
                break Some(summary);
            }
            if started.elapsed() >= MAX_RUN {
                break None;
            }

            let lease = lifecycle.borrow().poll_lease();
            if let Some(lease) = lease.filter(|l| *l != poller.lease()) {
                poller = LivePollTask::spawn(lifecycle.clone(), feed.clone(), lease);
            }

            let lc = lifecycle.borrow();
            if lc.run().frame_count % 300 == 0 {
                log::info!(
                    "distance {:.0} score ${:.2} multiplier {:.2}x",
                    lc.run().distance,
                    lc.run().score,
                    lc.multiplier()
                );
            }
        };

        let lc = lifecycle.borrow();
        match summary {
            Some(summary) => println!(
                "Run over: ${:.2} over {:.0}px, balance ${:.2}",
                summary.final_score,
                summary.distance,
                lc.balance_usd()
            ),
            None => println!(
                "Autopilot survived {}s with ${:.2}",
                MAX_RUN.as_secs(),
                lc.run().score
            ),
        }
        drop(lc);
        lifecycle.borrow_mut().abandon_to_menu();
        drop(poller);
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    env_logger::init();
    log::info!("Degen Runner (native) starting...");

    let token_id = std::env::args().nth(1).unwrap_or_else(|| "bonk".to_string());
    headless::run(&token_id)
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}
