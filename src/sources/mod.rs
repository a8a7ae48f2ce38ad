//! Price sources
//!
//! Primary sources (`orderbook`, `coingecko`) produce prices from scratch;
//! derived sources compute a price as a function of an already-computed
//! anchor price plus on-chain facts.

use async_trait::async_trait;

use crate::errors::AggregatorResult;
use crate::types::PriceMap;

pub mod coingecko;
pub mod derived;
pub mod oracle;
pub mod orderbook;
pub mod simulated;

/// A price computed from another token's price
///
/// `derive` reads its anchor from `prices`. A missing anchor is not an
/// error: the source yields an empty map and the pipeline moves on. The
/// orchestrator runs derived sources in a fixed order so a source may read
/// the output of an earlier one.
#[async_trait]
pub trait DerivedSource: Send + Sync {
    /// Short name used in log lines
    fn name(&self) -> &str;

    async fn derive(&self, prices: &PriceMap) -> AggregatorResult<PriceMap>;
}
