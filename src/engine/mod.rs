//! Components A-D of the matching core: fixed-scale decimal helpers, the
//! FIFO price level, the per-symbol order book, and the matching engine that
//! ties them together under price-time priority.
//!
//! Nothing in this module touches the database or the risk gate; it is pure
//! in-memory matching plus the bounded trade stream. Composition with risk
//! checks and ledger settlement happens one layer up, in
//! `crate::orchestrator::TradingService`.

pub mod decimal;
pub mod matching_engine;
pub mod order_book;
pub mod price_level;

pub use matching_engine::{FeeConfig, MatchingEngine, MatchingError};
pub use order_book::{Depth, OrderBook};
pub use price_level::PriceLevel;
