//! Deduplicating, parser-aware cache over on-chain account reads
//!
//! Two stores: a generic store of decoded accounts and a separate mint
//! store, because mint lookups are extremely hot (every price computation
//! needs two mints) and never invalidate. Concurrent `query` calls for the
//! same address coalesce onto a single in-flight fetch; the completed
//! result is broadcast to every waiter. A failed fetch removes the pending
//! marker so the next caller retries; it never poisons other lookups.
//!
//! The cache is an explicit instance owned by the orchestrator and passed
//! to every component needing account state.

use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;

use crate::errors::{AggregatorError, AggregatorResult};
use crate::logger::{self, LogTag};
use crate::parsers::{self, AccountRecord, ParsedAccount, ParserKind};
use crate::rpc::AccountReader;
use crate::types::MintRecord;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Notification raised on every successful `add`/`add_mint`. No component
/// in this crate consumes it; it is the extension point for subscribers
/// that want to react to account refreshes.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    pub address: Pubkey,
    pub parser: ParserKind,
    /// True when the address was newly added, false on refresh
    pub is_new: bool,
}

enum QueryRole<T> {
    Hit(T),
    Wait(broadcast::Receiver<AggregatorResult<T>>),
    Fetch,
}

pub struct AccountCache {
    reader: Arc<dyn AccountReader>,
    accounts: RwLock<HashMap<Pubkey, ParsedAccount>>,
    mints: RwLock<HashMap<Pubkey, MintRecord>>,
    parsers: RwLock<HashMap<Pubkey, ParserKind>>,
    pending: Mutex<HashMap<Pubkey, broadcast::Sender<AggregatorResult<ParsedAccount>>>>,
    pending_mints: Mutex<HashMap<Pubkey, broadcast::Sender<AggregatorResult<MintRecord>>>>,
    events: broadcast::Sender<CacheEvent>,
}

impl AccountCache {
    pub fn new(reader: Arc<dyn AccountReader>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            reader,
            accounts: RwLock::new(HashMap::new()),
            mints: RwLock::new(HashMap::new()),
            parsers: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            pending_mints: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to cache-updated notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // GENERIC STORE
    // =========================================================================

    /// Synchronous, non-blocking lookup; no network effect
    pub fn get(&self, address: &Pubkey) -> Option<ParsedAccount> {
        self.accounts.read().unwrap().get(address).cloned()
    }

    pub fn has(&self, address: &Pubkey) -> bool {
        self.accounts.read().unwrap().contains_key(address)
    }

    /// Associate a decode function with an address for later implicit use;
    /// always overwrites any prior association.
    pub fn register_parser(&self, address: &Pubkey, parser: ParserKind) {
        self.parsers.write().unwrap().insert(*address, parser);
    }

    pub fn registered_parser(&self, address: &Pubkey) -> Option<ParserKind> {
        self.parsers.read().unwrap().get(address).copied()
    }

    /// Cached-or-fetch lookup. Concurrent callers for the same address
    /// share one network fetch. Fails with `AccountNotFound` when the
    /// network reports the account does not exist.
    pub async fn query(
        &self,
        address: &Pubkey,
        parser: Option<ParserKind>,
    ) -> AggregatorResult<ParsedAccount> {
        let role = {
            let mut pending = self.pending.lock().unwrap();
            // Re-check the store under the pending lock: a finishing
            // fetcher inserts into the store before clearing its marker.
            if let Some(account) = self.accounts.read().unwrap().get(address) {
                QueryRole::Hit(account.clone())
            } else if let Some(sender) = pending.get(address) {
                QueryRole::Wait(sender.subscribe())
            } else {
                let (sender, _) = broadcast::channel(1);
                pending.insert(*address, sender);
                QueryRole::Fetch
            }
        };

        match role {
            QueryRole::Hit(account) => Ok(account),
            QueryRole::Wait(mut receiver) => receiver.recv().await.map_err(|_| {
                AggregatorError::NetworkFailure("in-flight account fetch abandoned".to_string())
            })?,
            QueryRole::Fetch => {
                let result = self.fetch_and_store(address, parser).await;
                let sender = self.pending.lock().unwrap().remove(address);
                if let Some(sender) = sender {
                    let _ = sender.send(result.clone());
                }
                result
            }
        }
    }

    async fn fetch_and_store(
        &self,
        address: &Pubkey,
        parser: Option<ParserKind>,
    ) -> AggregatorResult<ParsedAccount> {
        let data = self.reader.get_account(address).await?;
        let Some(data) = data else {
            return Err(AggregatorError::AccountNotFound { address: *address });
        };
        match self.add(address, &data, parser)? {
            Some(account) => Ok(account),
            // Zero-length accounts are treated as absent
            None => Err(AggregatorError::AccountNotFound { address: *address }),
        }
    }

    /// Decode-and-store bytes already fetched by a batch operation.
    /// Empty bytes are silently skipped (`Ok(None)`), not an error.
    /// Registers the parser used for future calls on this address and
    /// applies a market record's declared related parsers.
    pub fn add(
        &self,
        address: &Pubkey,
        data: &[u8],
        parser: Option<ParserKind>,
    ) -> AggregatorResult<Option<ParsedAccount>> {
        if data.is_empty() {
            return Ok(None);
        }

        let kind = match parser.or_else(|| self.registered_parser(address)) {
            Some(kind) => kind,
            None => {
                return Err(AggregatorError::decode(
                    *address,
                    "a parser must be registered or passed as a parameter",
                ))
            }
        };
        self.register_parser(address, kind);

        let parsed = parsers::decode(kind, address, data)?;
        if let AccountRecord::DexMarket(market) = &parsed.record {
            for (related, related_kind) in market.related_accounts() {
                self.register_parser(&related, related_kind);
            }
        }

        let is_new = self
            .accounts
            .write()
            .unwrap()
            .insert(*address, parsed.clone())
            .is_none();
        let _ = self.events.send(CacheEvent {
            address: *address,
            parser: kind,
            is_new,
        });
        logger::verbose(
            LogTag::Cache,
            &format!(
                "{} account {} ({:?})",
                if is_new { "Cached" } else { "Refreshed" },
                address,
                kind
            ),
        );
        Ok(Some(parsed))
    }

    // =========================================================================
    // MINT STORE
    // =========================================================================

    pub fn get_mint(&self, address: &Pubkey) -> Option<MintRecord> {
        self.mints.read().unwrap().get(address).cloned()
    }

    pub fn has_mint(&self, address: &Pubkey) -> bool {
        self.mints.read().unwrap().contains_key(address)
    }

    /// Decimals for price scaling. Missing mints scale as 0 decimals;
    /// documented fallback, not an error.
    pub fn decimals_or_default(&self, address: &Pubkey) -> u8 {
        match self.get_mint(address) {
            Some(mint) => mint.decimals,
            None => {
                logger::debug(
                    LogTag::Cache,
                    &format!("No mint cached for {}, scaling with 0 decimals", address),
                );
                0
            }
        }
    }

    /// Cached-or-fetch mint lookup with the same coalescing behavior as
    /// `query`. Mint records never invalidate.
    pub async fn query_mint(&self, address: &Pubkey) -> AggregatorResult<MintRecord> {
        let role = {
            let mut pending = self.pending_mints.lock().unwrap();
            if let Some(mint) = self.mints.read().unwrap().get(address) {
                QueryRole::Hit(mint.clone())
            } else if let Some(sender) = pending.get(address) {
                QueryRole::Wait(sender.subscribe())
            } else {
                let (sender, _) = broadcast::channel(1);
                pending.insert(*address, sender);
                QueryRole::Fetch
            }
        };

        match role {
            QueryRole::Hit(mint) => Ok(mint),
            QueryRole::Wait(mut receiver) => receiver.recv().await.map_err(|_| {
                AggregatorError::NetworkFailure("in-flight mint fetch abandoned".to_string())
            })?,
            QueryRole::Fetch => {
                let result = self.fetch_mint(address).await;
                let sender = self.pending_mints.lock().unwrap().remove(address);
                if let Some(sender) = sender {
                    let _ = sender.send(result.clone());
                }
                result
            }
        }
    }

    async fn fetch_mint(&self, address: &Pubkey) -> AggregatorResult<MintRecord> {
        let data = self.reader.get_account(address).await?;
        let Some(data) = data else {
            return Err(AggregatorError::AccountNotFound { address: *address });
        };
        self.add_mint(address, &data)
    }

    /// Decode-and-store mint bytes already fetched by a batch operation
    pub fn add_mint(&self, address: &Pubkey, data: &[u8]) -> AggregatorResult<MintRecord> {
        let mint = parsers::decode_mint(address, data)?;
        let is_new = self
            .mints
            .write()
            .unwrap()
            .insert(*address, mint.clone())
            .is_none();
        let _ = self.events.send(CacheEvent {
            address: *address,
            parser: ParserKind::Mint,
            is_new,
        });
        Ok(mint)
    }

    /// Seed the mint store from an already-known mint map
    pub fn add_mint_records(&self, records: impl IntoIterator<Item = (Pubkey, MintRecord)>) {
        let mut mints = self.mints.write().unwrap();
        for (address, record) in records {
            mints.insert(address, record);
        }
    }

    /// Empty both stores. Used only at controlled boundaries, never
    /// implicitly.
    pub fn clear(&self) {
        self.accounts.write().unwrap().clear();
        self.mints.write().unwrap().clear();
        logger::info(LogTag::Cache, "Cleared account and mint stores");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::{mint_account_bytes, token_account_bytes, MockReader};
    use std::time::Duration;

    fn cache_with(reader: MockReader) -> (Arc<AccountCache>, Arc<MockReader>) {
        let reader = Arc::new(reader);
        (Arc::new(AccountCache::new(reader.clone())), reader)
    }

    #[tokio::test]
    async fn concurrent_queries_issue_one_fetch() {
        let address = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let (cache, reader) = cache_with(
            MockReader::new()
                .with_fetch_delay(Duration::from_millis(20))
                .with_account(address, token_account_bytes(&mint, &owner, 7)),
        );

        let queries = (0..8).map(|_| {
            let cache = cache.clone();
            async move { cache.query(&address, Some(ParserKind::TokenAccount)).await }
        });
        let results = futures::future::join_all(queries).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(reader.single_fetch_count(), 1);
    }

    #[tokio::test]
    async fn cached_query_issues_no_fetch() {
        let address = Pubkey::new_unique();
        let (cache, reader) = cache_with(
            MockReader::new().with_account(address, mint_account_bytes(9, 100)),
        );
        cache
            .add(&address, &mint_account_bytes(9, 100), Some(ParserKind::Mint))
            .unwrap();

        let account = cache.query(&address, None).await.unwrap();
        assert_eq!(account.address, address);
        assert_eq!(reader.single_fetch_count(), 0);
    }

    #[tokio::test]
    async fn failed_fetch_clears_pending_so_next_call_retries() {
        let address = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let (cache, reader) = cache_with(
            MockReader::new().with_account(address, token_account_bytes(&mint, &owner, 1)),
        );
        reader.fail_next_fetch();

        let first = cache.query(&address, Some(ParserKind::TokenAccount)).await;
        assert!(matches!(first, Err(AggregatorError::NetworkFailure(_))));

        let second = cache.query(&address, Some(ParserKind::TokenAccount)).await;
        assert!(second.is_ok());
        assert_eq!(reader.single_fetch_count(), 2);
    }

    #[tokio::test]
    async fn missing_account_is_account_not_found() {
        let (cache, _) = cache_with(MockReader::new());
        let address = Pubkey::new_unique();
        let result = cache.query(&address, Some(ParserKind::Mint)).await;
        assert!(matches!(
            result,
            Err(AggregatorError::AccountNotFound { address: a }) if a == address
        ));
    }

    #[test]
    fn add_empty_bytes_is_silently_skipped() {
        let (cache, _) = cache_with(MockReader::new());
        let address = Pubkey::new_unique();
        let result = cache.add(&address, &[], Some(ParserKind::Mint)).unwrap();
        assert!(result.is_none());
        assert!(!cache.has(&address));
    }

    #[test]
    fn add_without_parser_fails() {
        let (cache, _) = cache_with(MockReader::new());
        let address = Pubkey::new_unique();
        let result = cache.add(&address, &mint_account_bytes(0, 0), None);
        assert!(matches!(result, Err(AggregatorError::DecodeFailure { .. })));
    }

    #[test]
    fn add_registers_parser_for_reuse_and_overwrites_records() {
        let (cache, _) = cache_with(MockReader::new());
        let address = Pubkey::new_unique();

        cache
            .add(&address, &mint_account_bytes(6, 10), Some(ParserKind::Mint))
            .unwrap();
        assert_eq!(cache.registered_parser(&address), Some(ParserKind::Mint));

        // No explicit parser this time; the registered one is used and the
        // record is overwritten in place.
        cache.add(&address, &mint_account_bytes(6, 99), None).unwrap();
        match cache.get(&address).unwrap().record {
            AccountRecord::Mint(mint) => assert_eq!(mint.supply, 99),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn market_add_declares_related_parsers() {
        use crate::rpc::testing::{market_account_bytes, MarketImage};

        let (cache, _) = cache_with(MockReader::new());
        let image = MarketImage {
            own_address: Pubkey::new_unique(),
            base_mint: Pubkey::new_unique(),
            quote_mint: Pubkey::new_unique(),
            bids: Pubkey::new_unique(),
            asks: Pubkey::new_unique(),
            base_lot_size: 1,
            quote_lot_size: 1,
        };
        let address = Pubkey::new_unique();
        cache
            .add(&address, &market_account_bytes(&image), Some(ParserKind::DexMarket))
            .unwrap();

        assert_eq!(cache.registered_parser(&image.base_mint), Some(ParserKind::Mint));
        assert_eq!(cache.registered_parser(&image.quote_mint), Some(ParserKind::Mint));
        assert_eq!(cache.registered_parser(&image.bids), Some(ParserKind::OrderBook));
        assert_eq!(cache.registered_parser(&image.asks), Some(ParserKind::OrderBook));
    }

    #[test]
    fn events_distinguish_new_from_refreshed() {
        let (cache, _) = cache_with(MockReader::new());
        let mut events = cache.subscribe();
        let address = Pubkey::new_unique();

        cache
            .add(&address, &mint_account_bytes(0, 1), Some(ParserKind::Mint))
            .unwrap();
        cache
            .add(&address, &mint_account_bytes(0, 2), Some(ParserKind::Mint))
            .unwrap();

        let first = events.try_recv().unwrap();
        let second = events.try_recv().unwrap();
        assert!(first.is_new);
        assert!(!second.is_new);
    }

    #[tokio::test]
    async fn concurrent_mint_queries_issue_one_fetch() {
        let mint = Pubkey::new_unique();
        let (cache, reader) = cache_with(
            MockReader::new()
                .with_fetch_delay(Duration::from_millis(20))
                .with_account(mint, mint_account_bytes(9, 5_000)),
        );

        let queries = (0..6).map(|_| {
            let cache = cache.clone();
            async move { cache.query_mint(&mint).await }
        });
        let results = futures::future::join_all(queries).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(reader.single_fetch_count(), 1);
        assert_eq!(cache.get_mint(&mint).unwrap().decimals, 9);
    }

    #[test]
    fn clear_empties_both_stores() {
        let (cache, _) = cache_with(MockReader::new());
        let a = Pubkey::new_unique();
        let m = Pubkey::new_unique();
        cache.add(&a, &mint_account_bytes(0, 1), Some(ParserKind::Mint)).unwrap();
        cache.add_mint(&m, &mint_account_bytes(2, 3)).unwrap();

        cache.clear();
        assert!(cache.get(&a).is_none());
        assert!(cache.get_mint(&m).is_none());
    }

    #[test]
    fn decimals_default_to_zero_when_mint_missing() {
        let (cache, _) = cache_with(MockReader::new());
        assert_eq!(cache.decimals_or_default(&Pubkey::new_unique()), 0);
    }
}
