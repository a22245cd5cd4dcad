//! Game configuration and player preferences
//!
//! Persisted separately from the token list in LocalStorage. On native the
//! config is read from the JSON file named by `DEGEN_RUNNER_CONFIG`.

use serde::{Deserialize, Serialize};

use crate::sim::SkillKind;

/// Tuning for the market side of the game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// How strongly a relative market-cap change moves the multiplier
    pub sensitivity: f64,
    /// Lowest multiplier ever applied
    pub multiplier_floor: f64,
    /// Live poll cadence (also the retry cadence after a failure)
    pub poll_interval_ms: u64,
    /// Samples kept for the background chart
    pub history_capacity: usize,
    /// How long an up/down flash stays visible
    pub flash_duration_ms: f64,
    /// Consecutive live failures before the session is declared lost
    pub max_consecutive_failures: u32,
    /// Token endpoint of the price feed
    pub feed_base_url: String,
    /// Native request timeout (the browser applies its own)
    pub request_timeout_ms: u64,
    /// User-added tokens idle this long are evicted from the catalog
    pub idle_eviction_ms: f64,
    /// Maximum skills equipped for one run
    pub max_equipped_skills: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            sensitivity: 5.0,
            multiplier_floor: 0.1,
            poll_interval_ms: 5000,
            history_capacity: 100,
            flash_duration_ms: 500.0,
            max_consecutive_failures: 6,
            feed_base_url: "https://api.dexscreener.com/latest/dex/tokens".to_string(),
            request_timeout_ms: 8000,
            idle_eviction_ms: 5.0 * 60.0 * 1000.0,
            max_equipped_skills: 3,
        }
    }
}

impl GameConfig {
    /// Clamp values that would break invariants elsewhere
    pub fn sanitized(mut self) -> Self {
        // Entry sets the multiplier to 1.0, so the floor must not exceed it
        if !(self.multiplier_floor > 0.0 && self.multiplier_floor <= 1.0) {
            log::warn!(
                "multiplier_floor {} is outside (0, 1], using default",
                self.multiplier_floor
            );
            self.multiplier_floor = Self::default().multiplier_floor;
        }
        self.history_capacity = self.history_capacity.max(1);
        self.poll_interval_ms = self.poll_interval_ms.max(250);
        self.max_consecutive_failures = self.max_consecutive_failures.max(1);
        self
    }
}

/// Player preferences plus game tuning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub config: GameConfig,
    /// Skills to equip when a run starts
    pub equipped_skills: Vec<SkillKind>,
    /// Cosmetic skin id (drawn by the page, not the core)
    pub skin_id: Option<String>,
}

impl Settings {
    /// LocalStorage key (used only in wasm32)
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "degen_runner_settings";

    /// Env var naming a JSON settings file (native only)
    pub const CONFIG_ENV: &'static str = "DEGEN_RUNNER_CONFIG";

    /// Parse settings JSON, falling back to defaults on malformed input
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str::<Settings>(json) {
            Ok(mut settings) => {
                settings.config = settings.config.sanitized();
                settings
            }
            Err(err) => {
                log::warn!("Ignoring malformed settings: {}", err);
                Self::default()
            }
        }
    }

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        if let Some(storage) = crate::platform::web::local_storage() {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                log::info!("Loaded settings from LocalStorage");
                return Self::from_json(&json);
            }
        }

        log::info!("Using default settings");
        Self::default()
    }

    /// Save settings to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        if let Some(storage) = crate::platform::web::local_storage() {
            if let Ok(json) = serde_json::to_string(self) {
                let _ = storage.set_item(Self::STORAGE_KEY, &json);
                log::info!("Settings saved");
            }
        }
    }

    /// Load settings from the file named by `DEGEN_RUNNER_CONFIG`
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        let Ok(path) = std::env::var(Self::CONFIG_ENV) else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(json) => {
                log::info!("Loaded settings from {}", path);
                Self::from_json(&json)
            }
            Err(err) => {
                log::warn!("Could not read {}: {}", path, err);
                Self::default()
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save(&self) {
        // Native settings are read-only
    }
}
