//! Hosted token and market registries
//!
//! Three HTTP-published lists feed the pipeline: the community token list
//! (symbols, decimals, CoinGecko ids), the curated Serum market list, and
//! the Star Atlas NFT registry. NFTs are folded into the token map as
//! 0-decimal tokens with a USDC-quoted market so the order-book source can
//! price them like any other token.

use serde::Deserialize;
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use crate::errors::{AggregatorError, AggregatorResult};
use crate::logger::{self, LogTag};

/// Token-list tags that should never be priced as regular tokens
const EXCLUDED_TAGS: &[&str] = &["lp-token", "tokenized-stock"];

/// Tags excluded from the Saber list specifically; its pool LP tokens
/// carry their own tag names
const SABER_EXCLUDED_TAGS: &[&str] = &["saber-stableswap-lp", "saber-hidden"];

pub const USDC_MINT: Pubkey = pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
pub const USDT_MINT: Pubkey = pubkey!("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB");
pub const SERUM_DEX_PROGRAM: Pubkey = pubkey!("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin");

#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub address: Pubkey,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub coingecko_id: Option<String>,
    pub tags: Vec<String>,
}

pub type TokenMap = HashMap<Pubkey, TokenInfo>;

/// A market-list entry. Only the base side is declared; the quote side is
/// resolved from the on-chain market account.
#[derive(Debug, Clone)]
pub struct MarketDescriptor {
    pub address: Pubkey,
    pub name: String,
    /// Explicit base mint for markets whose name does not follow the
    /// "SYMBOL/QUOTE" convention
    pub base_mint_address: Option<Pubkey>,
    pub deprecated: bool,
    pub program_id: Pubkey,
}

// =============================================================================
// WIRE SHAPES
// =============================================================================

#[derive(Deserialize)]
struct TokenListFile {
    tokens: Vec<TokenListEntry>,
}

#[derive(Deserialize)]
struct TokenListEntry {
    address: String,
    symbol: String,
    name: String,
    decimals: u8,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    extensions: Option<TokenExtensions>,
}

#[derive(Deserialize)]
struct TokenExtensions {
    #[serde(rename = "coingeckoId")]
    coingecko_id: Option<String>,
}

#[derive(Deserialize)]
struct MarketListEntry {
    address: String,
    name: String,
    #[serde(rename = "baseMintAddress", default)]
    base_mint_address: Option<String>,
    #[serde(default)]
    deprecated: bool,
    #[serde(rename = "programId")]
    program_id: String,
}

#[derive(Deserialize)]
struct NftEntry {
    mint: String,
    name: String,
    symbol: String,
    markets: Vec<NftMarket>,
}

#[derive(Deserialize)]
struct NftMarket {
    id: String,
    #[serde(rename = "quotePair")]
    quote_pair: String,
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct RegistryClient {
    http: reqwest::Client,
    token_list_url: String,
    saber_token_list_url: String,
    market_list_url: String,
    nft_registry_url: String,
}

impl RegistryClient {
    pub fn new(
        http: reqwest::Client,
        token_list_url: String,
        saber_token_list_url: String,
        market_list_url: String,
        nft_registry_url: String,
    ) -> Self {
        Self {
            http,
            token_list_url,
            saber_token_list_url,
            market_list_url,
            nft_registry_url,
        }
    }

    /// Base community list merged with the Saber list; a Saber entry for
    /// an address already present overwrites the base entry.
    pub async fn load_token_map(&self) -> AggregatorResult<TokenMap> {
        let base: TokenListFile = self
            .http
            .get(&self.token_list_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let saber: TokenListFile = self
            .http
            .get(&self.saber_token_list_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let map = merge_token_lists(base.tokens, saber.tokens);
        logger::info(
            LogTag::Registry,
            &format!("Loaded {} tokens from token lists", map.len()),
        );
        Ok(map)
    }

    pub async fn load_market_list(&self) -> AggregatorResult<Vec<MarketDescriptor>> {
        let entries: Vec<MarketListEntry> = self
            .http
            .get(&self.market_list_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let markets = parse_market_list(entries)?;
        logger::info(
            LogTag::Registry,
            &format!("Loaded {} markets from market list", markets.len()),
        );
        Ok(markets)
    }

    /// NFT registry entries become 0-decimal tokens plus a USDC-quoted
    /// market each, so downstream pricing needs no NFT-specific path.
    pub async fn load_nft_registry(
        &self,
    ) -> AggregatorResult<(TokenMap, Vec<MarketDescriptor>)> {
        let entries: Vec<NftEntry> = self
            .http
            .get(&self.nft_registry_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let (tokens, markets) = parse_nft_registry(entries);
        logger::info(
            LogTag::Registry,
            &format!("Loaded {} NFT markets from registry", markets.len()),
        );
        Ok((tokens, markets))
    }
}

fn merge_token_lists(
    base: Vec<TokenListEntry>,
    saber: Vec<TokenListEntry>,
) -> TokenMap {
    let mut map = parse_token_list(base, EXCLUDED_TAGS);
    map.extend(parse_token_list(saber, SABER_EXCLUDED_TAGS));
    map
}

fn parse_token_list(entries: Vec<TokenListEntry>, excluded_tags: &[&str]) -> TokenMap {
    let mut map = TokenMap::new();
    for entry in entries {
        if entry
            .tags
            .iter()
            .any(|tag| excluded_tags.contains(&tag.as_str()))
        {
            continue;
        }
        // Malformed addresses do exist in the hosted list; skip them
        let Ok(address) = Pubkey::from_str(&entry.address) else {
            logger::debug(
                LogTag::Registry,
                &format!("Skipping token with bad address {}", entry.address),
            );
            continue;
        };
        map.insert(
            address,
            TokenInfo {
                address,
                symbol: entry.symbol,
                name: entry.name,
                decimals: entry.decimals,
                coingecko_id: entry.extensions.and_then(|e| e.coingecko_id),
                tags: entry.tags,
            },
        );
    }
    map
}

fn parse_market_list(entries: Vec<MarketListEntry>) -> AggregatorResult<Vec<MarketDescriptor>> {
    let mut markets = Vec::with_capacity(entries.len());
    let mut seen = HashSet::new();
    for entry in entries {
        let address = Pubkey::from_str(&entry.address)
            .map_err(|_| AggregatorError::InvalidAddress(entry.address.clone()))?;
        if !seen.insert(address) {
            continue;
        }
        let base_mint_address = match &entry.base_mint_address {
            Some(s) => Some(
                Pubkey::from_str(s).map_err(|_| AggregatorError::InvalidAddress(s.clone()))?,
            ),
            None => None,
        };
        let program_id = Pubkey::from_str(&entry.program_id)
            .map_err(|_| AggregatorError::InvalidAddress(entry.program_id.clone()))?;
        markets.push(MarketDescriptor {
            address,
            name: entry.name,
            base_mint_address,
            deprecated: entry.deprecated,
            program_id,
        });
    }
    Ok(markets)
}

fn parse_nft_registry(entries: Vec<NftEntry>) -> (TokenMap, Vec<MarketDescriptor>) {
    let mut tokens = TokenMap::new();
    let mut markets = Vec::new();
    for entry in entries {
        let Ok(mint) = Pubkey::from_str(&entry.mint) else {
            continue;
        };
        let Some(market) = entry.markets.iter().find(|m| m.quote_pair == "USDC") else {
            continue;
        };
        let Ok(market_address) = Pubkey::from_str(&market.id) else {
            continue;
        };
        tokens.insert(
            mint,
            TokenInfo {
                address: mint,
                symbol: entry.symbol.clone(),
                name: entry.name.clone(),
                decimals: 0,
                coingecko_id: None,
                tags: vec!["nft".to_string()],
            },
        );
        markets.push(MarketDescriptor {
            address: market_address,
            name: format!("{}/USDC", entry.symbol),
            base_mint_address: Some(mint),
            deprecated: false,
            program_id: SERUM_DEX_PROGRAM,
        });
    }
    (tokens, markets)
}
