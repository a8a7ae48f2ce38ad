//! Core data model shared between all price sources

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;

/// Serialize pubkeys as base58 strings so the JSON output is readable
pub mod pubkey_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(value: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Pubkey::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// `Option<Pubkey>` companion to [`pubkey_string`]
pub mod opt_pubkey_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(
        value: &Option<Pubkey>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(key) => serializer.serialize_some(&key.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Pubkey>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| Pubkey::from_str(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Sentinel meaning "no observable side of the book". Distinct from a
/// legitimate `0.0`, which only arises from stale mid initialization.
pub const NO_BOOK_PRICE: f64 = -1.0;

/// Where a price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// External HTTP price feed (CoinGecko)
    ExternalFeed,
    /// On-chain DEX order book
    Orderbook,
    /// On-chain oracle program feed (Switchboard)
    Contract,
    /// Algebraic function of an already-computed price plus on-chain facts
    Derived,
}

/// Top-of-book prices attached to order-book records so callers can
/// distinguish "books fetched but empty" from "market never resolved".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketPrices {
    pub bid: f64,
    pub ask: f64,
    pub mid: f64,
}

/// The unit exchanged between all price sources and the final result map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataRecord {
    pub source: PriceSource,
    pub symbol: String,
    #[serde(with = "pubkey_string")]
    pub address: Pubkey,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MarketPrices>,
}

/// Token address -> market data. Later writes for the same key replace
/// earlier ones; the collision policy is defined by the orchestrator.
pub type PriceMap = HashMap<Pubkey, MarketDataRecord>;

/// Decoded SPL mint state. Immutable once fetched (decimals never change
/// for a mint), cached indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRecord {
    #[serde(with = "opt_pubkey_string")]
    pub mint_authority: Option<Pubkey>,
    pub supply: u64,
    pub decimals: u8,
    pub is_initialized: bool,
    #[serde(with = "opt_pubkey_string")]
    pub freeze_authority: Option<Pubkey>,
}

/// Mint address -> mint state, returned alongside the price map
pub type MintInfoMap = HashMap<Pubkey, MintRecord>;

impl MintRecord {
    /// Supply scaled by the mint's own decimals
    pub fn ui_supply(&self) -> f64 {
        (self.supply as f64) / 10f64.powi(self.decimals as i32)
    }
}
