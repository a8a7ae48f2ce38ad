//! External HTTP price feed
//!
//! Prices every token whose registry entry carries a CoinGecko id. The
//! `/coins/markets` endpoint caps `per_page` at 250, so ids are requested
//! in pages of that size.

use serde::Deserialize;
use std::collections::HashMap;

use crate::errors::AggregatorResult;
use crate::logger::{self, LogTag};
use crate::registry::TokenMap;
use crate::types::{MarketDataRecord, PriceMap, PriceSource};

const IDS_PER_PAGE: usize = 250;

#[derive(Deserialize)]
struct MarketsEntry {
    id: String,
    current_price: Option<f64>,
}

pub struct CoinGeckoSource {
    http: reqwest::Client,
    base_url: String,
}

impl CoinGeckoSource {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    /// Fetch USD prices for every token in `tokens` with a CoinGecko id.
    /// Tokens whose id returns no price are simply absent from the result.
    pub async fn query(&self, tokens: &TokenMap) -> AggregatorResult<PriceMap> {
        let mut ids: Vec<&str> = tokens
            .values()
            .filter_map(|t| t.coingecko_id.as_deref())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(PriceMap::new());
        }

        let mut prices_by_id: HashMap<String, f64> = HashMap::new();
        let url = format!("{}/coins/markets", self.base_url);
        let per_page = IDS_PER_PAGE.to_string();
        for page in ids.chunks(IDS_PER_PAGE) {
            let page_ids = page.join(",");
            let entries: Vec<MarketsEntry> = self
                .http
                .get(&url)
                .query(&[
                    ("vs_currency", "usd"),
                    ("ids", page_ids.as_str()),
                    ("per_page", per_page.as_str()),
                ])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            for entry in entries {
                if let Some(price) = entry.current_price {
                    prices_by_id.insert(entry.id, price);
                }
            }
        }

        let prices = records_from_prices(tokens, &prices_by_id);
        logger::info(
            LogTag::Source,
            &format!(
                "External feed priced {} of {} ids",
                prices.len(),
                ids.len()
            ),
        );
        Ok(prices)
    }
}

fn records_from_prices(tokens: &TokenMap, prices_by_id: &HashMap<String, f64>) -> PriceMap {
    let mut prices = PriceMap::new();
    for token in tokens.values() {
        let Some(id) = token.coingecko_id.as_deref() else {
            continue;
        };
        let Some(price) = prices_by_id.get(id) else {
            continue;
        };
        prices.insert(
            token.address,
            MarketDataRecord {
                source: PriceSource::ExternalFeed,
                symbol: token.symbol.clone(),
                address: token.address,
                price: *price,
                metadata: None,
            },
        );
    }
    prices
}
