//! Saved token list and balance
//!
//! Only the catalog entries a player added and their running balance survive
//! a reload. Market data is never stored: a restored token comes back with no
//! preview and its first selection starts a fresh `Loading` session.

use serde::{Deserialize, Serialize};

use crate::market::{TokenCatalog, TokenEntry};

/// Current save format
pub const SAVE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavedState {
    pub version: u32,
    /// User-added tokens only; presets are rebuilt in code
    pub custom_tokens: Vec<TokenEntry>,
    /// Accumulated winnings in dollars
    pub balance_usd: f64,
}

impl Default for SavedState {
    fn default() -> Self {
        Self {
            version: SAVE_VERSION,
            custom_tokens: Vec::new(),
            balance_usd: 0.0,
        }
    }
}

impl SavedState {
    /// LocalStorage key (used only in wasm32)
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "degen_runner_state";

    /// Snapshot the persistable parts of the catalog
    pub fn capture(catalog: &TokenCatalog, balance_usd: f64) -> Self {
        Self {
            version: SAVE_VERSION,
            custom_tokens: catalog
                .custom_entries()
                .cloned()
                .map(|mut entry| {
                    entry.preview = None;
                    entry
                })
                .collect(),
            balance_usd,
        }
    }

    /// Parse a save, discarding anything unusable
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str::<SavedState>(json) {
            Ok(mut state) => {
                if state.version > SAVE_VERSION {
                    log::warn!(
                        "Save version {} is newer than {}, loading best effort",
                        state.version,
                        SAVE_VERSION
                    );
                }
                if !(state.balance_usd.is_finite() && state.balance_usd >= 0.0) {
                    log::warn!("Discarding invalid saved balance {}", state.balance_usd);
                    state.balance_usd = 0.0;
                }
                state
            }
            Err(err) => {
                log::warn!("Ignoring corrupt save: {}", err);
                Self::default()
            }
        }
    }

    /// Add saved tokens to `catalog` as fresh entries
    pub fn restore_into(self, catalog: &mut TokenCatalog) -> f64 {
        for entry in self.custom_tokens {
            catalog.restore_custom(entry);
        }
        self.balance_usd
    }

    /// Load from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        if let Some(storage) = crate::platform::web::local_storage() {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                let state = Self::from_json(&json);
                log::info!(
                    "Restored {} saved tokens, balance ${:.2}",
                    state.custom_tokens.len(),
                    state.balance_usd
                );
                return state;
            }
        }

        log::info!("No saved state found, starting fresh");
        Self::default()
    }

    /// Save to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        if let Some(storage) = crate::platform::web::local_storage() {
            if let Ok(json) = serde_json::to_string(self) {
                let _ = storage.set_item(Self::STORAGE_KEY, &json);
                log::debug!("State saved ({} tokens)", self.custom_tokens.len());
            }
        }
    }

    /// Native stubs
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        Self::default()
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save(&self) {
        // No-op for native
    }
}
