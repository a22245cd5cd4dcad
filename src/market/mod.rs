//! Live market data side of the game
//!
//! Everything that runs on the network clock lives here. The frame loop only
//! ever reads `Session::multiplier()`; `PollingController` is the single
//! writer of session market fields.

pub mod catalog;
pub mod feed;
pub mod multiplier;
pub mod polling;
pub mod session;

pub use catalog::{CatalogError, TokenCatalog, TokenEntry, TokenKind, validate_token_reference};
pub use feed::{DexScreenerClient, FeedError, FeedSnapshot, PriceFeed, parse_snapshot};
pub use multiplier::compute_multiplier;
pub use polling::{
    EntryOutcome, EntryTicket, LiveOutcome, LiveTicket, PollLease, PollingController,
    RequestToken,
};
pub use session::{
    ChangeDirection, LiveApplied, PriceHistory, PricePoint, Session, SessionId, SessionStatus,
};
