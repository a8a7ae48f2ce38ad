//! Vault-ratio and constant-multiplier derived sources
//!
//! A staked wrapper token prices as its anchor times the vault/supply
//! ratio: one vault holds the staked anchor tokens, the wrapper mint's
//! supply is the claim on them. A zero supply prices the wrapper at 0
//! rather than erroring; absent anchors always yield an empty map.

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

use crate::cache::AccountCache;
use crate::errors::AggregatorResult;
use crate::logger::{self, LogTag};
use crate::parsers::{AccountRecord, ParserKind};
use crate::rpc::AccountReader;
use crate::sources::DerivedSource;
use crate::types::{MarketDataRecord, PriceMap, PriceSource};

fn derived_record(symbol: &str, address: Pubkey, price: f64) -> MarketDataRecord {
    MarketDataRecord {
        source: PriceSource::Derived,
        symbol: symbol.to_string(),
        address,
        price,
        metadata: None,
    }
}

// =============================================================================
// SINGLE VAULT RATIO
// =============================================================================

/// One wrapper mint backed by one vault, ratio read via the token RPCs
pub struct StakedVaultSource {
    reader: Arc<dyn AccountReader>,
    symbol: String,
    anchor_mint: Pubkey,
    derived_mint: Pubkey,
    vault: Pubkey,
}

impl StakedVaultSource {
    pub fn new(
        reader: Arc<dyn AccountReader>,
        symbol: impl Into<String>,
        anchor_mint: Pubkey,
        derived_mint: Pubkey,
        vault: Pubkey,
    ) -> Self {
        Self {
            reader,
            symbol: symbol.into(),
            anchor_mint,
            derived_mint,
            vault,
        }
    }
}

#[async_trait]
impl DerivedSource for StakedVaultSource {
    fn name(&self) -> &str {
        &self.symbol
    }

    async fn derive(&self, prices: &PriceMap) -> AggregatorResult<PriceMap> {
        let Some(anchor) = prices.get(&self.anchor_mint) else {
            return Ok(PriceMap::new());
        };
        let balance = self.reader.get_token_account_balance(&self.vault).await?;
        let supply = self.reader.get_token_supply(&self.derived_mint).await?;
        let ratio = if supply == 0.0 { 0.0 } else { balance / supply };
        logger::verbose(
            LogTag::Source,
            &format!("{}: vault ratio {:.6}", self.symbol, ratio),
        );
        Ok(PriceMap::from([(
            self.derived_mint,
            derived_record(&self.symbol, self.derived_mint, anchor.price * ratio),
        )]))
    }
}

// =============================================================================
// MULTI-OUTPUT VAULT RATIO
// =============================================================================

pub struct StakedVaultOutput {
    pub symbol: String,
    pub derived_mint: Pubkey,
    pub vault: Pubkey,
}

/// Several wrapper mints sharing one anchor, each with its own vault.
/// Ratio facts come from cached account state (token-account and mint
/// records) instead of the token RPCs.
pub struct MultiStakedVaultSource {
    cache: Arc<AccountCache>,
    name: String,
    anchor_mint: Pubkey,
    outputs: Vec<StakedVaultOutput>,
}

impl MultiStakedVaultSource {
    pub fn new(
        cache: Arc<AccountCache>,
        name: impl Into<String>,
        anchor_mint: Pubkey,
        outputs: Vec<StakedVaultOutput>,
    ) -> Self {
        Self {
            cache,
            name: name.into(),
            anchor_mint,
            outputs,
        }
    }
}

#[async_trait]
impl DerivedSource for MultiStakedVaultSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn derive(&self, prices: &PriceMap) -> AggregatorResult<PriceMap> {
        let Some(anchor) = prices.get(&self.anchor_mint) else {
            return Ok(PriceMap::new());
        };
        let anchor_mint = self.cache.query_mint(&self.anchor_mint).await?;

        let mut out = PriceMap::new();
        for output in &self.outputs {
            let vault = self
                .cache
                .query(&output.vault, Some(ParserKind::TokenAccount))
                .await?;
            let AccountRecord::TokenAccount(vault) = vault.record else {
                continue;
            };
            // The vault holds anchor tokens, so its balance scales by the
            // anchor mint's decimals; supply by the wrapper's own.
            let balance = (vault.amount as f64) / 10f64.powi(anchor_mint.decimals as i32);
            let supply = self.cache.query_mint(&output.derived_mint).await?.ui_supply();
            let ratio = if supply == 0.0 { 0.0 } else { balance / supply };
            out.insert(
                output.derived_mint,
                derived_record(&output.symbol, output.derived_mint, anchor.price * ratio),
            );
        }
        Ok(out)
    }
}

// =============================================================================
// CONSTANT MULTIPLE
// =============================================================================

/// A wrapper defined as a fixed integer multiple of its anchor; no
/// network reads at all
pub struct ConstantMultipleSource {
    symbol: String,
    anchor_mint: Pubkey,
    derived_mint: Pubkey,
    multiplier: u64,
}

impl ConstantMultipleSource {
    pub fn new(
        symbol: impl Into<String>,
        anchor_mint: Pubkey,
        derived_mint: Pubkey,
        multiplier: u64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            anchor_mint,
            derived_mint,
            multiplier,
        }
    }
}

#[async_trait]
impl DerivedSource for ConstantMultipleSource {
    fn name(&self) -> &str {
        &self.symbol
    }

    async fn derive(&self, prices: &PriceMap) -> AggregatorResult<PriceMap> {
        let Some(anchor) = prices.get(&self.anchor_mint) else {
            return Ok(PriceMap::new());
        };
        Ok(PriceMap::from([(
            self.derived_mint,
            derived_record(
                &self.symbol,
                self.derived_mint,
                anchor.price * self.multiplier as f64,
            ),
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::{mint_account_bytes, token_account_bytes, MockReader};

    fn anchor_prices(anchor_mint: Pubkey, price: f64) -> PriceMap {
        PriceMap::from([(
            anchor_mint,
            MarketDataRecord {
                source: PriceSource::Orderbook,
                symbol: "ANCHOR".to_string(),
                address: anchor_mint,
                price,
                metadata: None,
            },
        )])
    }

    #[tokio::test]
    async fn vault_ratio_scales_the_anchor_price() {
        let anchor = Pubkey::new_unique();
        let derived = Pubkey::new_unique();
        let vault = Pubkey::new_unique();
        let reader: Arc<dyn AccountReader> = Arc::new(
            MockReader::new()
                .with_token_balance(vault, 150.0)
                .with_token_supply(derived, 100.0),
        );
        let source = StakedVaultSource::new(reader, "sFOO", anchor, derived, vault);

        let out = source.derive(&anchor_prices(anchor, 2.0)).await.unwrap();
        let record = out.get(&derived).unwrap();
        assert_eq!(record.price, 3.0);
        assert_eq!(record.source, PriceSource::Derived);
        assert_eq!(record.symbol, "sFOO");
    }

    #[tokio::test]
    async fn derivation_is_linear_in_the_anchor() {
        let anchor = Pubkey::new_unique();
        let derived = Pubkey::new_unique();
        let vault = Pubkey::new_unique();
        let reader: Arc<dyn AccountReader> = Arc::new(
            MockReader::new()
                .with_token_balance(vault, 500.0)
                .with_token_supply(derived, 1000.0),
        );
        let source = StakedVaultSource::new(reader, "sFOO", anchor, derived, vault);

        let out = source.derive(&anchor_prices(anchor, 1.0)).await.unwrap();
        assert_eq!(out.get(&derived).unwrap().price, 0.5);

        let out = source.derive(&anchor_prices(anchor, 1000.0)).await.unwrap();
        assert_eq!(out.get(&derived).unwrap().price, 500.0);
    }

    #[tokio::test]
    async fn zero_supply_prices_at_zero() {
        let anchor = Pubkey::new_unique();
        let derived = Pubkey::new_unique();
        let vault = Pubkey::new_unique();
        let reader: Arc<dyn AccountReader> =
            Arc::new(MockReader::new().with_token_balance(vault, 150.0));
        let source = StakedVaultSource::new(reader, "sFOO", anchor, derived, vault);

        let out = source.derive(&anchor_prices(anchor, 2.0)).await.unwrap();
        assert_eq!(out.get(&derived).unwrap().price, 0.0);
    }

    #[tokio::test]
    async fn absent_anchor_yields_empty_map() {
        let anchor = Pubkey::new_unique();
        let reader: Arc<dyn AccountReader> = Arc::new(MockReader::new());
        let source = StakedVaultSource::new(
            reader,
            "sFOO",
            anchor,
            Pubkey::new_unique(),
            Pubkey::new_unique(),
        );
        let out = source.derive(&PriceMap::new()).await.unwrap();
        assert!(out.is_empty());

        let constant =
            ConstantMultipleSource::new("MFOO", anchor, Pubkey::new_unique(), 1_000_000);
        let out = constant.derive(&PriceMap::new()).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn multi_output_prices_each_wrapper_from_cached_state() {
        let anchor = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let derived_a = Pubkey::new_unique();
        let vault_a = Pubkey::new_unique();
        let derived_b = Pubkey::new_unique();
        let vault_b = Pubkey::new_unique();

        let reader: Arc<dyn AccountReader> = Arc::new(
            MockReader::new()
                .with_account(anchor, mint_account_bytes(6, 0))
                // 3.0 anchor tokens backing 2.0 wrappers: ratio 1.5
                .with_account(vault_a, token_account_bytes(&anchor, &owner, 3_000_000))
                .with_account(derived_a, mint_account_bytes(6, 2_000_000))
                // 1.0 backing 4.0: ratio 0.25
                .with_account(vault_b, token_account_bytes(&anchor, &owner, 1_000_000))
                .with_account(derived_b, mint_account_bytes(6, 4_000_000)),
        );
        let cache = Arc::new(AccountCache::new(reader));
        let source = MultiStakedVaultSource::new(
            cache,
            "wrapped-foo",
            anchor,
            vec![
                StakedVaultOutput {
                    symbol: "sFOO".to_string(),
                    derived_mint: derived_a,
                    vault: vault_a,
                },
                StakedVaultOutput {
                    symbol: "lsFOO".to_string(),
                    derived_mint: derived_b,
                    vault: vault_b,
                },
            ],
        );

        let out = source.derive(&anchor_prices(anchor, 4.0)).await.unwrap();
        assert_eq!(out.get(&derived_a).unwrap().price, 6.0);
        assert_eq!(out.get(&derived_b).unwrap().price, 1.0);
    }

    #[tokio::test]
    async fn constant_multiple_needs_no_reads() {
        let anchor = Pubkey::new_unique();
        let derived = Pubkey::new_unique();
        let source = ConstantMultipleSource::new("MFOO", anchor, derived, 1_000_000);

        let out = source.derive(&anchor_prices(anchor, 0.05)).await.unwrap();
        assert_eq!(out.get(&derived).unwrap().price, 50_000.0);
    }
}
