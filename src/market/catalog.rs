//! Playable token list
//!
//! Three preset tokens are always present. Players can add their own by
//! contract address; those are validated locally, verified against the feed,
//! and evicted again after sitting idle.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::feed::FeedSnapshot;

/// Theme colors handed out to user-added tokens
pub const THEME_COLORS: [&str; 15] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
    "#BB8FCE", "#85C1E9", "#F8B500", "#00CED1", "#FF69B4", "#7FFF00", "#FF4500",
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("'{0}' is not a valid token address")]
    InvalidReference(String),

    #[error("token {0} is already in the list")]
    Duplicate(String),

    #[error("unknown token '{0}'")]
    UnknownToken(String),

    #[error("preset token '{0}' cannot be removed")]
    PresetLocked(String),

    #[error("token {reference} could not be verified: {reason}")]
    VerificationFailed { reference: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Preset,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEntry {
    /// Stable id used by the UI
    pub id: String,
    pub name: String,
    /// Address queried on the feed
    pub token_reference: String,
    pub theme_color: String,
    pub kind: TokenKind,
    pub last_accessed_ms: f64,
    /// Dashboard preview; never read by gameplay
    #[serde(skip)]
    pub preview: Option<FeedSnapshot>,
}

/// Base58 (no `0`, `O`, `I`, `l`), 32 to 44 characters
pub fn validate_token_reference(reference: &str) -> Result<(), CatalogError> {
    const ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    let len_ok = (32..=44).contains(&reference.len());
    if len_ok && reference.chars().all(|c| ALPHABET.contains(c)) {
        Ok(())
    } else {
        Err(CatalogError::InvalidReference(reference.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct TokenCatalog {
    entries: Vec<TokenEntry>,
}

impl Default for TokenCatalog {
    fn default() -> Self {
        Self::with_presets()
    }
}

impl TokenCatalog {
    pub fn with_presets() -> Self {
        let preset = |id: &str, name: &str, reference: &str, color: &str| TokenEntry {
            id: id.to_string(),
            name: name.to_string(),
            token_reference: reference.to_string(),
            theme_color: color.to_string(),
            kind: TokenKind::Preset,
            last_accessed_ms: 0.0,
            preview: None,
        };
        Self {
            entries: vec![
                preset(
                    "fartcoin",
                    "$FARTCOIN",
                    "9BB6NFEcjBCtnNLFko2FqVQBq8HHM13kCyYcdQbgpump",
                    "#9945FF",
                ),
                preset(
                    "bonk",
                    "$BONK",
                    "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263",
                    "#FFA500",
                ),
                preset(
                    "wif",
                    "$WIF",
                    "EKpQGSJtjMFqKZ9KQnvvSB3MVVDHn8aLNbHrTYJmKKED",
                    "#8B4513",
                ),
            ],
        }
    }

    pub fn entries(&self) -> &[TokenEntry] {
        &self.entries
    }

    pub fn custom_entries(&self) -> impl Iterator<Item = &TokenEntry> {
        self.entries.iter().filter(|e| e.kind == TokenKind::Custom)
    }

    pub fn get(&self, id: &str) -> Option<&TokenEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn touch(&mut self, id: &str, now_ms: f64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.last_accessed_ms = now_ms;
        }
    }

    /// Local checks run before any network call
    pub fn check_can_add(&self, reference: &str) -> Result<(), CatalogError> {
        let reference = reference.trim();
        validate_token_reference(reference)?;
        if self.entries.iter().any(|e| e.token_reference == reference) {
            return Err(CatalogError::Duplicate(reference.to_string()));
        }
        Ok(())
    }

    /// Insert a token the feed has already vouched for
    pub fn insert_verified(
        &mut self,
        reference: &str,
        name: Option<&str>,
        snapshot: FeedSnapshot,
        now_ms: f64,
    ) -> Result<&TokenEntry, CatalogError> {
        let reference = reference.trim();
        self.check_can_add(reference)?;

        let color = THEME_COLORS[(now_ms as u64 % THEME_COLORS.len() as u64) as usize];
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => format!("${}", snapshot.display_symbol),
        };
        let entry = TokenEntry {
            id: format!("custom_{}_{}", reference, now_ms as u64),
            name,
            token_reference: reference.to_string(),
            theme_color: color.to_string(),
            kind: TokenKind::Custom,
            last_accessed_ms: now_ms,
            preview: Some(snapshot),
        };
        log::info!("Added token {} ({})", entry.name, entry.token_reference);
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Re-add a saved custom token without market data
    pub fn restore_custom(&mut self, mut entry: TokenEntry) {
        if validate_token_reference(&entry.token_reference).is_err()
            || self.entries.iter().any(|e| e.id == entry.id || e.token_reference == entry.token_reference)
        {
            log::warn!("Skipping unusable saved token {}", entry.id);
            return;
        }
        entry.kind = TokenKind::Custom;
        entry.preview = None;
        self.entries.push(entry);
    }

    pub fn remove(&mut self, id: &str) -> Result<TokenEntry, CatalogError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| CatalogError::UnknownToken(id.to_string()))?;
        if self.entries[index].kind == TokenKind::Preset {
            return Err(CatalogError::PresetLocked(id.to_string()));
        }
        Ok(self.entries.remove(index))
    }

    /// Drop custom tokens idle longer than `max_idle_ms`, except `active_id`
    pub fn evict_idle(
        &mut self,
        now_ms: f64,
        max_idle_ms: f64,
        active_id: Option<&str>,
    ) -> Vec<TokenEntry> {
        let (evicted, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.entries).into_iter().partition(|e| {
                e.kind == TokenKind::Custom
                    && Some(e.id.as_str()) != active_id
                    && now_ms - e.last_accessed_ms >= max_idle_ms
            });
        self.entries = kept;
        for entry in &evicted {
            log::info!("Evicted idle token {}", entry.name);
        }
        evicted
    }

    /// Store a dashboard preview unless the token is being played
    pub fn record_preview(&mut self, id: &str, snapshot: FeedSnapshot, active_id: Option<&str>) {
        if Some(id) == active_id {
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.preview = Some(snapshot);
        }
    }
}
