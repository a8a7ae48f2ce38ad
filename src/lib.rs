//! Solana market aggregator
//!
//! Derives USD prices for SPL tokens from on-chain order books, staking
//! programs and an external price feed, on top of a deduplicating account
//! cache. One aggregation cycle produces a price map plus mint metadata
//! for every priced token.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod deployments;
pub mod errors;
pub mod fetch;
pub mod logger;
pub mod parsers;
pub mod registry;
pub mod rpc;
pub mod sources;
pub mod types;

pub use aggregator::{AggregateResult, MarketAggregator};
pub use cache::AccountCache;
pub use config::AggregatorConfig;
pub use errors::{AggregatorError, AggregatorResult};
pub use rpc::{AccountReader, SolanaReader};
pub use types::{MarketDataRecord, MintInfoMap, PriceMap, PriceSource, NO_BOOK_PRICE};
