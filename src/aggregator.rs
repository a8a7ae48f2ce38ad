//! Aggregation orchestrator
//!
//! Wires registries, primary sources and the derived-source chain into one
//! refresh cycle. Merge policy: the external feed overwrites the order
//! book on collision, derived sources extend the map afterwards in their
//! configured order. A failed registry load keeps the previous lists; a
//! failed derived source is skipped unless the failure is transport-level.

use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use crate::cache::AccountCache;
use crate::config::AggregatorConfig;
use crate::deployments;
use crate::errors::{AggregatorError, AggregatorResult};
use crate::fetch::MAX_ACCOUNTS_PER_REQUEST;
use crate::logger::{self, LogTag};
use crate::registry::{MarketDescriptor, RegistryClient, TokenMap};
use crate::rpc::AccountReader;
use crate::sources::coingecko::CoinGeckoSource;
use crate::sources::oracle::OracleSource;
use crate::sources::orderbook::OrderbookSource;
use crate::sources::DerivedSource;
use crate::types::{MintInfoMap, PriceMap};

/// One refresh cycle's output
#[derive(Debug, Default)]
pub struct AggregateResult {
    pub prices: PriceMap,
    pub mint_info: MintInfoMap,
}

pub struct MarketAggregator {
    reader: Arc<dyn AccountReader>,
    cache: Arc<AccountCache>,
    registry: RegistryClient,
    coingecko: CoinGeckoSource,
    oracles: Vec<OracleSource>,
    derived: Vec<Box<dyn DerivedSource>>,
    commitment: CommitmentConfig,
    tokens: TokenMap,
    markets: Vec<MarketDescriptor>,
}

impl MarketAggregator {
    pub fn new(
        config: &AggregatorConfig,
        reader: Arc<dyn AccountReader>,
    ) -> AggregatorResult<Self> {
        let commitment = CommitmentConfig::from_str(&config.commitment).map_err(|e| {
            AggregatorError::NetworkFailure(format!("bad commitment level: {}", e))
        })?;
        let http = reqwest::Client::new();
        let cache = Arc::new(AccountCache::new(reader.clone()));
        let derived = deployments::default_derived_sources(cache.clone(), reader.clone());
        let oracles = deployments::default_oracle_sources(reader.clone());
        Ok(Self {
            registry: RegistryClient::new(
                http.clone(),
                config.token_list_url.clone(),
                config.saber_token_list_url.clone(),
                config.market_list_url.clone(),
                config.nft_registry_url.clone(),
            ),
            coingecko: CoinGeckoSource::new(http, config.coingecko_base_url.clone()),
            cache,
            oracles,
            derived,
            commitment,
            reader,
            tokens: TokenMap::new(),
            markets: Vec::new(),
        })
    }

    pub fn cache(&self) -> &Arc<AccountCache> {
        &self.cache
    }

    /// Inject token and market lists directly, bypassing the registries
    pub fn set_lists(&mut self, tokens: TokenMap, markets: Vec<MarketDescriptor>) {
        self.tokens = tokens;
        self.markets = markets;
    }

    /// Replace the oracle feed set
    pub fn set_oracles(&mut self, oracles: Vec<OracleSource>) {
        self.oracles = oracles;
    }

    /// Reload all registries. Returns `false` on any failure, in which
    /// case the previously loaded lists stay in effect.
    pub async fn query_lists(&mut self) -> bool {
        let loaded = futures::try_join!(
            self.registry.load_token_map(),
            self.registry.load_market_list(),
            self.registry.load_nft_registry(),
        );
        match loaded {
            Ok((mut tokens, mut markets, (nft_tokens, nft_markets))) => {
                tokens.extend(nft_tokens);
                markets.extend(nft_markets);
                logger::info(
                    LogTag::Aggregator,
                    &format!(
                        "Registries loaded: {} tokens, {} markets",
                        tokens.len(),
                        markets.len()
                    ),
                );
                self.tokens = tokens;
                self.markets = markets;
                true
            }
            Err(err) => {
                logger::warning(
                    LogTag::Aggregator,
                    &format!("Registry load failed, keeping prior lists: {}", err),
                );
                false
            }
        }
    }

    /// Run one full aggregation cycle
    pub async fn query_sources(&mut self) -> AggregatorResult<AggregateResult> {
        if self.tokens.is_empty() {
            self.query_lists().await;
        }

        // Tokens with an external-feed id are priced there; the rest go
        // through their order book.
        let book_tokens = self
            .tokens
            .values()
            .filter(|t| t.coingecko_id.is_none())
            .cloned()
            .collect::<Vec<_>>();
        let orderbook = OrderbookSource::new(
            self.cache.clone(),
            self.reader.clone(),
            self.commitment,
            book_tokens,
            &self.markets,
        );

        let book_prices = orderbook.refresh().await?;
        let feed_prices = self.coingecko.query(&self.tokens).await?;
        let mut prices = merge_primary(book_prices, feed_prices);

        // Oracle feeds run before the derived chain so wrappers derive
        // from the oracle-corrected anchor.
        apply_oracle_sources(&mut prices, &self.oracles).await?;
        apply_derived_sources(&mut prices, &self.derived).await?;

        let mint_info = self.collect_mint_info(&prices).await?;
        logger::info(
            LogTag::Aggregator,
            &format!(
                "Cycle complete: {} prices, {} mints",
                prices.len(),
                mint_info.len()
            ),
        );
        Ok(AggregateResult { prices, mint_info })
    }

    /// Bulk mint scan over every known token address plus every priced
    /// address (derived mints are not registry tokens); addresses that
    /// are not mint accounts are skipped silently
    async fn collect_mint_info(&self, prices: &PriceMap) -> AggregatorResult<MintInfoMap> {
        let mut candidates: HashSet<Pubkey> = self.tokens.keys().copied().collect();
        candidates.extend(prices.keys().copied());
        let missing: Vec<Pubkey> = candidates
            .iter()
            .filter(|a| !self.cache.has_mint(a))
            .copied()
            .collect();
        let responses = futures::future::try_join_all(
            missing
                .chunks(MAX_ACCOUNTS_PER_REQUEST)
                .map(|chunk| self.reader.get_multiple_accounts(chunk, self.commitment)),
        )
        .await?;
        for (address, data) in missing.iter().zip(responses.into_iter().flatten()) {
            let Some(data) = data else { continue };
            let _ = self.cache.add_mint(address, &data);
        }

        Ok(candidates
            .iter()
            .filter_map(|a| self.cache.get_mint(a).map(|m| (*a, m)))
            .collect())
    }
}

/// External feed overwrites the order book on collision
pub fn merge_primary(book_prices: PriceMap, feed_prices: PriceMap) -> PriceMap {
    let mut merged = book_prices;
    merged.extend(feed_prices);
    merged
}

/// Oracle records overwrite whatever the primaries produced for their
/// mint. A feed with no usable round contributes nothing; a transport
/// failure aborts the cycle like any other primary.
pub async fn apply_oracle_sources(
    prices: &mut PriceMap,
    oracles: &[OracleSource],
) -> AggregatorResult<()> {
    for oracle in oracles {
        prices.extend(oracle.query().await?);
    }
    Ok(())
}

/// Run derived sources in order, each extending the map so later sources
/// can read earlier outputs. Non-transport failures skip that source only.
pub async fn apply_derived_sources(
    prices: &mut PriceMap,
    sources: &[Box<dyn DerivedSource>],
) -> AggregatorResult<()> {
    for source in sources {
        match source.derive(prices).await {
            Ok(out) => prices.extend(out),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                logger::warning(
                    LogTag::Aggregator,
                    &format!("Derived source {} skipped: {}", source.name(), err),
                );
            }
        }
    }
    Ok(())
}
