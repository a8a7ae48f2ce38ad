//! Batched account fetching
//!
//! The RPC `getMultipleAccounts` endpoint caps out below 100 addresses per
//! request, so bulk loads are split into chunks of at most 99 and issued
//! concurrently. Results flow into the cache through `AccountCache::add`,
//! which silently drops absent and empty accounts.

use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

use crate::cache::AccountCache;
use crate::errors::AggregatorResult;
use crate::logger::{self, LogTag};
use crate::parsers::ParsedAccount;
use crate::rpc::AccountReader;

/// Hard ceiling imposed by the RPC endpoint
pub const MAX_ACCOUNTS_PER_REQUEST: usize = 99;

/// Fetch every address in one round of concurrent chunked requests and
/// store the decoded results in `cache`. Addresses whose account is
/// absent, empty or undecodable are dropped from the output; callers
/// observe their absence from the cache. A transport failure on any
/// chunk fails the whole call.
///
/// Each address must already have a parser registered in the cache
/// (directly or via a market's related-accounts declaration).
pub async fn fetch_multiple(
    reader: &Arc<dyn AccountReader>,
    cache: &AccountCache,
    addresses: &[Pubkey],
    commitment: CommitmentConfig,
) -> AggregatorResult<Vec<ParsedAccount>> {
    if addresses.is_empty() {
        return Ok(Vec::new());
    }

    logger::debug(
        LogTag::Fetch,
        &format!(
            "Fetching {} accounts in {} requests",
            addresses.len(),
            addresses.len().div_ceil(MAX_ACCOUNTS_PER_REQUEST)
        ),
    );

    let chunks = addresses.chunks(MAX_ACCOUNTS_PER_REQUEST);
    let responses = futures::future::try_join_all(
        chunks
            .clone()
            .map(|chunk| reader.get_multiple_accounts(chunk, commitment)),
    )
    .await?;

    let mut parsed = Vec::with_capacity(addresses.len());
    for (chunk, datas) in chunks.zip(responses) {
        for (address, data) in chunk.iter().zip(datas) {
            let Some(data) = data else { continue };
            match cache.add(address, &data, None) {
                Ok(Some(account)) => parsed.push(account),
                Ok(None) => {}
                Err(err) => {
                    logger::warning(
                        LogTag::Fetch,
                        &format!("Skipping account {}: {}", address, err),
                    );
                }
            }
        }
    }
    Ok(parsed)
}
