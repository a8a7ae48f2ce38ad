//! Test transport and account byte images
//!
//! `MockReader` serves canned account bytes while counting the underlying
//! round trips, which is what the coalescing and batching tests assert on.
//! The builders at the bottom produce byte images matching the layouts in
//! `parsers`.

use async_trait::async_trait;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::AccountReader;
use crate::errors::{AggregatorError, AggregatorResult};

#[derive(Default)]
pub struct MockReader {
    accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    token_balances: Mutex<HashMap<Pubkey, f64>>,
    token_supplies: Mutex<HashMap<Pubkey, f64>>,
    simulation_logs: Mutex<Vec<String>>,
    /// Widen the race window so concurrent queries overlap reliably
    fetch_delay: Option<Duration>,
    fail_next_fetch: AtomicBool,
    pub single_fetches: AtomicUsize,
    pub batch_fetches: AtomicUsize,
    pub simulations: AtomicUsize,
}

impl MockReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn with_account(self, address: Pubkey, data: Vec<u8>) -> Self {
        self.accounts.lock().unwrap().insert(address, data);
        self
    }

    pub fn with_token_balance(self, address: Pubkey, balance: f64) -> Self {
        self.token_balances.lock().unwrap().insert(address, balance);
        self
    }

    pub fn with_token_supply(self, mint: Pubkey, supply: f64) -> Self {
        self.token_supplies.lock().unwrap().insert(mint, supply);
        self
    }

    pub fn with_simulation_logs(self, logs: Vec<String>) -> Self {
        *self.simulation_logs.lock().unwrap() = logs;
        self
    }

    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(address, data);
    }

    /// Make the next single-account fetch fail with a network error
    pub fn fail_next_fetch(&self) {
        self.fail_next_fetch.store(true, Ordering::SeqCst);
    }

    pub fn single_fetch_count(&self) -> usize {
        self.single_fetches.load(Ordering::SeqCst)
    }

    pub fn batch_fetch_count(&self) -> usize {
        self.batch_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountReader for MockReader {
    async fn get_account(&self, address: &Pubkey) -> AggregatorResult<Option<Vec<u8>>> {
        self.single_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next_fetch.swap(false, Ordering::SeqCst) {
            return Err(AggregatorError::NetworkFailure(
                "injected transport failure".to_string(),
            ));
        }
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
        _commitment: CommitmentConfig,
    ) -> AggregatorResult<Vec<Option<Vec<u8>>>> {
        self.batch_fetches.fetch_add(1, Ordering::SeqCst);
        let accounts = self.accounts.lock().unwrap();
        Ok(addresses.iter().map(|a| accounts.get(a).cloned()).collect())
    }

    async fn get_token_supply(&self, mint: &Pubkey) -> AggregatorResult<f64> {
        Ok(self
            .token_supplies
            .lock()
            .unwrap()
            .get(mint)
            .copied()
            .unwrap_or(0.0))
    }

    async fn get_token_account_balance(&self, address: &Pubkey) -> AggregatorResult<f64> {
        Ok(self
            .token_balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0.0))
    }

    async fn simulate_instruction(
        &self,
        _instruction: Instruction,
        _payer: &Pubkey,
    ) -> AggregatorResult<Vec<String>> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        Ok(self.simulation_logs.lock().unwrap().clone())
    }
}

// =============================================================================
// ACCOUNT BYTE IMAGES
// =============================================================================

fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn write_pubkey(buf: &mut [u8], offset: usize, value: &Pubkey) {
    buf[offset..offset + 32].copy_from_slice(value.as_ref());
}

/// SPL mint account image (82 bytes)
pub fn mint_account_bytes(decimals: u8, supply: u64) -> Vec<u8> {
    let mut data = vec![0u8; 82];
    write_u64(&mut data, 36, supply);
    data[44] = decimals;
    data[45] = 1; // initialized
    data
}

/// SPL token account image (165 bytes)
pub fn token_account_bytes(mint: &Pubkey, owner: &Pubkey, amount: u64) -> Vec<u8> {
    let mut data = vec![0u8; 165];
    write_pubkey(&mut data, 0, mint);
    write_pubkey(&mut data, 32, owner);
    write_u64(&mut data, 64, amount);
    data[108] = 1; // state: initialized
    data
}

pub struct MarketImage {
    pub own_address: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub base_lot_size: u64,
    pub quote_lot_size: u64,
}

/// Serum v3 market state image (388 bytes)
pub fn market_account_bytes(image: &MarketImage) -> Vec<u8> {
    let mut data = vec![0u8; 388];
    write_u64(&mut data, 5, 0x03); // initialized | market
    write_pubkey(&mut data, 13, &image.own_address);
    write_pubkey(&mut data, 53, &image.base_mint);
    write_pubkey(&mut data, 85, &image.quote_mint);
    write_pubkey(&mut data, 285, &image.bids);
    write_pubkey(&mut data, 317, &image.asks);
    write_u64(&mut data, 349, image.base_lot_size);
    write_u64(&mut data, 357, image.quote_lot_size);
    data
}

/// Switchboard v2 aggregator image: latest confirmed round fields at the
/// fixed offsets the oracle source reads
pub fn aggregator_feed_bytes(
    min_results: u32,
    num_success: u32,
    round_open: i64,
    mantissa: i128,
    scale: u32,
) -> Vec<u8> {
    let mut data = vec![0u8; 386];
    data[236..240].copy_from_slice(&min_results.to_le_bytes());
    data[341..345].copy_from_slice(&num_success.to_le_bytes());
    data[358..366].copy_from_slice(&round_open.to_le_bytes());
    data[366..382].copy_from_slice(&mantissa.to_le_bytes());
    data[382..386].copy_from_slice(&scale.to_le_bytes());
    data
}

/// Serum order-book slab image holding the given (price_lots, quantity)
/// leaves. `bids` selects the account-flags side bit.
pub fn orderbook_bytes(bids: bool, levels: &[(u64, u64)]) -> Vec<u8> {
    let node_count = levels.len();
    let mut data = vec![0u8; 13 + 32 + node_count * 72 + 7];

    let side_flag = if bids { 0x20 } else { 0x40 };
    write_u64(&mut data, 5, 0x01 | side_flag); // initialized | bids/asks

    // Slab header: bump_index and leaf_count; tree links are not read
    data[13..17].copy_from_slice(&(node_count as u32).to_le_bytes());
    data[37..41].copy_from_slice(&(node_count as u32).to_le_bytes());

    for (i, (price_lots, quantity)) in levels.iter().enumerate() {
        let node = 45 + i * 72;
        data[node..node + 4].copy_from_slice(&2u32.to_le_bytes()); // leaf tag
        let key = (*price_lots as u128) << 64;
        data[node + 8..node + 24].copy_from_slice(&key.to_le_bytes());
        write_u64(&mut data, node + 56, *quantity);
    }

    data
}
