//! Price feed client
//!
//! Fetches token pair listings and reduces them to one [`FeedSnapshot`]. The
//! listing may contain many trading pairs for one token; only the pair with the
//! deepest liquidity is trusted because thin pairs print noisy prices.
//!
//! Every failure (transport, HTTP status, decode, empty listing, worthless
//! pair) comes back as a [`FeedError`]. Nothing here retries; the polling
//! cadence is the retry policy.

use std::future::Future;

use serde::Deserialize;
use thiserror::Error;

use crate::settings::GameConfig;

/// Normalized result of one successful fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    /// Fully diluted valuation, or market cap when FDV is missing
    pub metric_value: f64,
    pub display_symbol: String,
    pub icon_url: Option<String>,
    /// e.g. "BONK/SOL"
    pub pair_label: Option<String>,
    pub liquidity_value: f64,
    pub unit_price: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("price feed request failed: {0}")]
    Transport(String),

    #[error("price feed responded with HTTP {0}")]
    Status(u16),

    #[error("price feed payload could not be decoded: {0}")]
    Decode(String),

    #[error("no trading pairs listed for token")]
    NoPairs,

    #[error("best pair reports a non-positive market value ({0})")]
    NonPositiveMetric(f64),
}

/// Source of price snapshots
///
/// Futures are not required to be `Send`: both hosts run the network clock on
/// a single thread.
pub trait PriceFeed {
    fn fetch(&self, token_reference: &str)
    -> impl Future<Output = Result<FeedSnapshot, FeedError>>;
}

// --- wire format ---

#[derive(Debug, Deserialize)]
struct TokensResponse {
    #[serde(default)]
    pairs: Option<Vec<PairDto>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairDto {
    #[serde(default)]
    base_token: Option<TokenDto>,
    #[serde(default)]
    quote_token: Option<TokenDto>,
    #[serde(default)]
    price_usd: Option<String>,
    #[serde(default)]
    fdv: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    liquidity: Option<LiquidityDto>,
    #[serde(default)]
    info: Option<InfoDto>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenDto {
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LiquidityDto {
    #[serde(default)]
    usd: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoDto {
    #[serde(default)]
    image_url: Option<String>,
}

impl PairDto {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity
            .as_ref()
            .and_then(|l| l.usd)
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    /// FDV when it is a usable number, otherwise market cap, otherwise 0
    fn metric_value(&self) -> f64 {
        let usable = |v: &f64| *v != 0.0 && !v.is_nan();
        self.fdv
            .filter(usable)
            .or(self.market_cap.filter(usable))
            .unwrap_or(0.0)
    }

    fn base_symbol(&self) -> Option<&str> {
        self.base_token.as_ref().and_then(|t| t.symbol.as_deref())
    }

    fn quote_symbol(&self) -> Option<&str> {
        self.quote_token.as_ref().and_then(|t| t.symbol.as_deref())
    }
}

/// Deepest-liquidity pair; ties keep the first one listed
fn select_best_pair(pairs: &[PairDto]) -> Option<&PairDto> {
    let mut best: Option<&PairDto> = None;
    for pair in pairs {
        match best {
            Some(current) if pair.liquidity_usd() <= current.liquidity_usd() => {}
            _ => best = Some(pair),
        }
    }
    best
}

/// Decode a token listing body and reduce it to a snapshot
pub fn parse_snapshot(body: &[u8]) -> Result<FeedSnapshot, FeedError> {
    let response: TokensResponse =
        serde_json::from_slice(body).map_err(|err| FeedError::Decode(err.to_string()))?;
    let pairs = response.pairs.unwrap_or_default();
    let best = select_best_pair(&pairs).ok_or(FeedError::NoPairs)?;

    let metric_value = best.metric_value();
    if !(metric_value > 0.0) {
        return Err(FeedError::NonPositiveMetric(metric_value));
    }

    let pair_label = match (best.base_symbol(), best.quote_symbol()) {
        (Some(base), Some(quote)) => Some(format!("{}/{}", base, quote)),
        _ => None,
    };

    Ok(FeedSnapshot {
        metric_value,
        display_symbol: best.base_symbol().unwrap_or("UNKNOWN").to_string(),
        icon_url: best.info.as_ref().and_then(|i| i.image_url.clone()),
        pair_label,
        liquidity_value: best.liquidity_usd(),
        unit_price: best
            .price_usd
            .as_deref()
            .and_then(|p| p.trim().parse::<f64>().ok())
            .filter(|p| p.is_finite())
            .unwrap_or(0.0),
    })
}

/// DexScreener token endpoint client
#[derive(Clone)]
pub struct DexScreenerClient {
    base_url: String,
    http: reqwest::Client,
}

impl DexScreenerClient {
    pub fn new(config: &GameConfig) -> Result<Self, FeedError> {
        let base_url = config.feed_base_url.trim_end_matches('/').to_string();
        let builder = reqwest::Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(std::time::Duration::from_millis(config.request_timeout_ms));
        let http = builder
            .build()
            .map_err(|err| FeedError::Transport(err.to_string()))?;
        Ok(Self { base_url, http })
    }

    /// Request URL with a cache-busting timestamp
    fn url(&self, token_reference: &str, now_ms: f64) -> String {
        format!("{}/{}?t={}", self.base_url, token_reference, now_ms as u64)
    }

    /// GET request that no cache layer may answer
    fn request(&self, token_reference: &str, now_ms: f64) -> Result<reqwest::Request, FeedError> {
        self.http
            .get(self.url(token_reference, now_ms))
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .header(reqwest::header::PRAGMA, "no-cache")
            .build()
            .map_err(|err| FeedError::Transport(err.to_string()))
    }
}

impl PriceFeed for DexScreenerClient {
    async fn fetch(&self, token_reference: &str) -> Result<FeedSnapshot, FeedError> {
        let request = self.request(token_reference, crate::platform::now_ms())?;
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|err| FeedError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| FeedError::Transport(err.to_string()))?;
        parse_snapshot(&body)
    }
}
