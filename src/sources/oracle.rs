//! On-chain oracle feed source
//!
//! Reads a Switchboard v2 aggregator account and turns its latest
//! confirmed round into one price record tagged `Contract`. A stale
//! round, an unconfirmed round or an absent feed account yields an empty
//! map, never an error: the token keeps whatever price the other sources
//! produced.
//!
//! The aggregator account is zero-copy program state, read at fixed
//! offsets after the 8-byte account discriminator.

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

use crate::errors::AggregatorResult;
use crate::logger::{self, LogTag};
use crate::rpc::AccountReader;
use crate::types::{MarketDataRecord, PriceMap, PriceSource};

// Field offsets into AggregatorAccountData. The latest confirmed round
// sits after the static config block; its result is a decimal with an
// i128 mantissa and a u32 scale.
const MIN_ORACLE_RESULTS_OFFSET: usize = 236;
const ROUND_NUM_SUCCESS_OFFSET: usize = 341;
const ROUND_OPEN_TIMESTAMP_OFFSET: usize = 358;
const RESULT_MANTISSA_OFFSET: usize = 366;
const RESULT_SCALE_OFFSET: usize = 382;
const AGGREGATOR_MIN_LEN: usize = RESULT_SCALE_OFFSET + 4;

/// Rounds older than this are treated as having no value
pub const DEFAULT_MAX_STALENESS_SECS: i64 = 600;

pub struct OracleSource {
    reader: Arc<dyn AccountReader>,
    symbol: String,
    mint: Pubkey,
    feed: Pubkey,
    max_staleness_secs: i64,
}

impl OracleSource {
    pub fn new(
        reader: Arc<dyn AccountReader>,
        symbol: impl Into<String>,
        mint: Pubkey,
        feed: Pubkey,
    ) -> Self {
        Self {
            reader,
            symbol: symbol.into(),
            mint,
            feed,
            max_staleness_secs: DEFAULT_MAX_STALENESS_SECS,
        }
    }

    pub async fn query(&self) -> AggregatorResult<PriceMap> {
        let Some(data) = self.reader.get_account(&self.feed).await? else {
            logger::debug(
                LogTag::Source,
                &format!("{}: oracle feed account absent", self.symbol),
            );
            return Ok(PriceMap::new());
        };
        let Some(price) =
            decode_latest_value(&data, Utc::now().timestamp(), self.max_staleness_secs)
        else {
            logger::debug(
                LogTag::Source,
                &format!("{}: oracle feed has no usable round", self.symbol),
            );
            return Ok(PriceMap::new());
        };
        logger::verbose(
            LogTag::Source,
            &format!("{}: oracle price {:.6}", self.symbol, price),
        );
        Ok(PriceMap::from([(
            self.mint,
            MarketDataRecord {
                source: PriceSource::Contract,
                symbol: self.symbol.clone(),
                address: self.mint,
                price,
                metadata: None,
            },
        )]))
    }
}

/// Latest confirmed aggregator value, or `None` when the account is not
/// an aggregator, the round never confirmed, or it is older than
/// `max_staleness_secs`.
fn decode_latest_value(data: &[u8], now_unix: i64, max_staleness_secs: i64) -> Option<f64> {
    if data.len() < AGGREGATOR_MIN_LEN {
        return None;
    }
    let min_results = read_u32(data, MIN_ORACLE_RESULTS_OFFSET);
    let num_success = read_u32(data, ROUND_NUM_SUCCESS_OFFSET);
    if num_success < min_results.max(1) {
        return None;
    }
    let round_open = read_i64(data, ROUND_OPEN_TIMESTAMP_OFFSET);
    if now_unix - round_open > max_staleness_secs {
        return None;
    }
    let mantissa = i128::from_le_bytes(
        data[RESULT_MANTISSA_OFFSET..RESULT_MANTISSA_OFFSET + 16]
            .try_into()
            .ok()?,
    );
    let scale = read_u32(data, RESULT_SCALE_OFFSET);
    Some(mantissa as f64 / 10f64.powi(scale as i32))
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn read_i64(data: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(data[offset..offset + 8].try_into().unwrap())
}
