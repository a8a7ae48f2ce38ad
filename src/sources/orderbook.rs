//! On-chain order-book price source
//!
//! Pairs registry tokens with their Serum market, resolves market state,
//! both book sides and both mints through the cache, and prices each token
//! from the top of its book. Only USD-stable-quoted markets (USDC/USDT)
//! produce records; a side with no observable levels prices as the
//! `NO_BOOK_PRICE` sentinel rather than `0.0`.

use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::AccountCache;
use crate::errors::AggregatorResult;
use crate::fetch::{self, MAX_ACCOUNTS_PER_REQUEST};
use crate::logger::{self, LogTag};
use crate::parsers::{AccountRecord, DexMarketRecord, ParserKind};
use crate::registry::{MarketDescriptor, TokenInfo, USDC_MINT, USDT_MINT};
use crate::rpc::AccountReader;
use crate::types::{MarketDataRecord, MarketPrices, PriceMap, PriceSource, NO_BOOK_PRICE};

struct TokenMarketPair {
    token: TokenInfo,
    market: Pubkey,
}

pub struct OrderbookSource {
    cache: Arc<AccountCache>,
    reader: Arc<dyn AccountReader>,
    commitment: CommitmentConfig,
    pairs: Vec<TokenMarketPair>,
}

impl OrderbookSource {
    /// Pair each token with at most one live market: an explicit
    /// `base_mint_address` match wins, otherwise the `"SYMBOL/USDC"` /
    /// `"SYMBOL/USDT"` naming convention. Deprecated markets never match.
    pub fn new(
        cache: Arc<AccountCache>,
        reader: Arc<dyn AccountReader>,
        commitment: CommitmentConfig,
        tokens: Vec<TokenInfo>,
        markets: &[MarketDescriptor],
    ) -> Self {
        let pairs = tokens
            .into_iter()
            .filter_map(|token| {
                let market = match_market(&token, markets)?;
                Some(TokenMarketPair {
                    token,
                    market: market.address,
                })
            })
            .collect::<Vec<_>>();
        logger::debug(
            LogTag::Market,
            &format!("Matched {} tokens to order-book markets", pairs.len()),
        );
        Self {
            cache,
            reader,
            commitment,
            pairs,
        }
    }

    pub async fn refresh(&self) -> AggregatorResult<PriceMap> {
        self.resolve_markets().await?;
        self.resolve_books_and_mints().await?;

        let mut prices = PriceMap::new();
        for pair in &self.pairs {
            // A matched token whose market account never resolved still
            // gets a record, carrying the sentinel on every field so the
            // caller can tell "market missing" from "books empty".
            let Some(account) = self.cache.get(&pair.market) else {
                prices.insert(pair.token.address, unresolved_record(&pair.token));
                continue;
            };
            let AccountRecord::DexMarket(market) = account.record else {
                prices.insert(pair.token.address, unresolved_record(&pair.token));
                continue;
            };
            if market.quote_mint != USDC_MINT && market.quote_mint != USDT_MINT {
                continue;
            }
            prices.insert(pair.token.address, self.price_market(&pair.token, &market));
        }
        logger::info(
            LogTag::Source,
            &format!("Order-book source produced {} prices", prices.len()),
        );
        Ok(prices)
    }

    /// Batch-fetch market accounts not yet cached
    async fn resolve_markets(&self) -> AggregatorResult<()> {
        let uncached: Vec<Pubkey> = self
            .pairs
            .iter()
            .map(|p| p.market)
            .filter(|m| !self.cache.has(m))
            .collect();
        for market in &uncached {
            self.cache.register_parser(market, ParserKind::DexMarket);
        }
        fetch::fetch_multiple(&self.reader, &self.cache, &uncached, self.commitment).await?;
        Ok(())
    }

    /// One batch round over everything the resolved markets reference that
    /// is still missing: base/quote mints for the mint store, bid/ask book
    /// accounts for the generic store. Absent accounts stay missing and
    /// price as unresolved.
    async fn resolve_books_and_mints(&self) -> AggregatorResult<()> {
        let mut mint_deficit = Vec::new();
        let mut book_deficit = Vec::new();
        let mut seen = HashSet::new();

        for pair in &self.pairs {
            let Some(account) = self.cache.get(&pair.market) else {
                continue;
            };
            let AccountRecord::DexMarket(market) = account.record else {
                continue;
            };
            for mint in [market.base_mint, market.quote_mint] {
                if !self.cache.has_mint(&mint) && seen.insert(mint) {
                    mint_deficit.push(mint);
                }
            }
            for book in [market.bids, market.asks] {
                if !self.cache.has(&book) && seen.insert(book) {
                    book_deficit.push(book);
                }
            }
        }
        if mint_deficit.is_empty() && book_deficit.is_empty() {
            return Ok(());
        }

        let mut combined = mint_deficit.clone();
        combined.extend(&book_deficit);
        let responses = futures::future::try_join_all(
            combined
                .chunks(MAX_ACCOUNTS_PER_REQUEST)
                .map(|chunk| self.reader.get_multiple_accounts(chunk, self.commitment)),
        )
        .await?;
        let datas = responses.into_iter().flatten();

        for (address, data) in combined.iter().zip(datas) {
            let Some(data) = data else { continue };
            let result = if mint_deficit.contains(address) {
                self.cache.add_mint(address, &data).map(|_| ())
            } else {
                self.cache.add(address, &data, None).map(|_| ())
            };
            if let Err(err) = result {
                logger::warning(
                    LogTag::Market,
                    &format!("Skipping account {}: {}", address, err),
                );
            }
        }
        Ok(())
    }

    fn price_market(&self, token: &TokenInfo, market: &DexMarketRecord) -> MarketDataRecord {
        let base_decimals = self.cache.decimals_or_default(&market.base_mint);
        let quote_decimals = self.cache.decimals_or_default(&market.quote_mint);

        // Each side resolves independently; one cached book says nothing
        // about the other.
        let bid = self.side_price(&market.bids, market, base_decimals, quote_decimals);
        let ask = self.side_price(&market.asks, market, base_decimals, quote_decimals);

        let both = bid != NO_BOOK_PRICE && ask != NO_BOOK_PRICE;
        let mid = if both { (bid + ask) / 2.0 } else { 0.0 };
        let price = if both {
            mid
        } else if ask != NO_BOOK_PRICE {
            ask
        } else if bid != NO_BOOK_PRICE {
            bid
        } else {
            NO_BOOK_PRICE
        };

        MarketDataRecord {
            source: PriceSource::Orderbook,
            symbol: token.symbol.clone(),
            address: token.address,
            price,
            metadata: Some(MarketPrices { bid, ask, mid }),
        }
    }

    /// Best price of one book side, `NO_BOOK_PRICE` when the account is
    /// unresolved or holds no levels
    fn side_price(
        &self,
        book: &Pubkey,
        market: &DexMarketRecord,
        base_decimals: u8,
        quote_decimals: u8,
    ) -> f64 {
        let Some(account) = self.cache.get(book) else {
            return NO_BOOK_PRICE;
        };
        let AccountRecord::OrderBook(record) = account.record else {
            return NO_BOOK_PRICE;
        };
        match record.best_price_lots() {
            Some(lots) => scale_price(lots, market, base_decimals, quote_decimals),
            None => NO_BOOK_PRICE,
        }
    }
}

/// Record for a market whose account never resolved: both sides carry the
/// sentinel, `mid` its initial value. Quote acceptance was established at
/// pairing time by the market name or the explicit base-mint match.
fn unresolved_record(token: &TokenInfo) -> MarketDataRecord {
    MarketDataRecord {
        source: PriceSource::Orderbook,
        symbol: token.symbol.clone(),
        address: token.address,
        price: NO_BOOK_PRICE,
        metadata: Some(MarketPrices {
            bid: NO_BOOK_PRICE,
            ask: NO_BOOK_PRICE,
            mid: 0.0,
        }),
    }
}

fn match_market<'a>(
    token: &TokenInfo,
    markets: &'a [MarketDescriptor],
) -> Option<&'a MarketDescriptor> {
    let live = markets.iter().filter(|m| !m.deprecated);
    let usdc_name = format!("{}/USDC", token.symbol);
    let usdt_name = format!("{}/USDT", token.symbol);
    let mut by_name = None;
    for market in live {
        if market.base_mint_address == Some(token.address) {
            return Some(market);
        }
        if by_name.is_none() && (market.name == usdc_name || market.name == usdt_name) {
            by_name = Some(market);
        }
    }
    by_name
}

/// Convert a lot-denominated price to a UI price:
/// `lots * quote_lot_size * 10^base_decimals / (base_lot_size * 10^quote_decimals)`
fn scale_price(
    lots: u64,
    market: &DexMarketRecord,
    base_decimals: u8,
    quote_decimals: u8,
) -> f64 {
    (lots as f64) * (market.quote_lot_size as f64) * 10f64.powi(base_decimals as i32)
        / ((market.base_lot_size as f64) * 10f64.powi(quote_decimals as i32))
}
