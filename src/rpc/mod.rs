//! Account reader boundary
//!
//! Everything in the pipeline reads chain state through the `AccountReader`
//! trait so the cache, fetcher and sources can be exercised against a mock
//! transport in tests. `SolanaReader` is the production implementation over
//! the nonblocking RPC client.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSimulateTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;

use crate::errors::{AggregatorError, AggregatorResult};
use crate::logger::{self, LogTag};

#[cfg(test)]
pub mod testing;

/// Read-only access to on-chain account state
#[async_trait]
pub trait AccountReader: Send + Sync {
    /// Fetch a single account's raw data. `None` means the account does
    /// not exist; transport failures are errors.
    async fn get_account(&self, address: &Pubkey) -> AggregatorResult<Option<Vec<u8>>>;

    /// Fetch up to one RPC request's worth of accounts in a single round
    /// trip. The result is positional: `result[i]` corresponds to
    /// `addresses[i]`, `None` for absent accounts.
    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
        commitment: CommitmentConfig,
    ) -> AggregatorResult<Vec<Option<Vec<u8>>>>;

    /// Decimal-scaled total supply of a mint
    async fn get_token_supply(&self, mint: &Pubkey) -> AggregatorResult<f64>;

    /// Decimal-scaled balance of a token account
    async fn get_token_account_balance(&self, address: &Pubkey) -> AggregatorResult<f64>;

    /// Run a simulate-only call of a single instruction (no transaction is
    /// submitted, no signature beyond the nominal read-only payer) and
    /// return the emitted log lines.
    async fn simulate_instruction(
        &self,
        instruction: Instruction,
        payer: &Pubkey,
    ) -> AggregatorResult<Vec<String>>;
}

/// Production reader over the Solana JSON-RPC API
pub struct SolanaReader {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaReader {
    pub fn new(rpc_url: &str, commitment: &str) -> AggregatorResult<Self> {
        let commitment = CommitmentConfig::from_str(commitment)
            .map_err(|e| AggregatorError::NetworkFailure(format!("bad commitment level: {}", e)))?;
        logger::debug(LogTag::Rpc, &format!("Using RPC endpoint {}", rpc_url));
        Ok(Self {
            client: RpcClient::new_with_commitment(rpc_url.to_string(), commitment),
            commitment,
        })
    }

    pub fn commitment(&self) -> CommitmentConfig {
        self.commitment
    }
}

#[async_trait]
impl AccountReader for SolanaReader {
    async fn get_account(&self, address: &Pubkey) -> AggregatorResult<Option<Vec<u8>>> {
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await?;
        Ok(response.value.map(|account| account.data))
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
        commitment: CommitmentConfig,
    ) -> AggregatorResult<Vec<Option<Vec<u8>>>> {
        let response = self
            .client
            .get_multiple_accounts_with_commitment(addresses, commitment)
            .await?;
        Ok(response
            .value
            .into_iter()
            .map(|account| account.map(|a| a.data))
            .collect())
    }

    async fn get_token_supply(&self, mint: &Pubkey) -> AggregatorResult<f64> {
        let supply = self.client.get_token_supply(mint).await?;
        Ok(supply.ui_amount.unwrap_or(0.0))
    }

    async fn get_token_account_balance(&self, address: &Pubkey) -> AggregatorResult<f64> {
        let balance = self.client.get_token_account_balance(address).await?;
        Ok(balance.ui_amount.unwrap_or(0.0))
    }

    async fn simulate_instruction(
        &self,
        instruction: Instruction,
        payer: &Pubkey,
    ) -> AggregatorResult<Vec<String>> {
        let transaction = Transaction::new_unsigned(Message::new(&[instruction], Some(payer)));
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(self.commitment),
            ..Default::default()
        };
        let response = self
            .client
            .simulate_transaction_with_config(&transaction, config)
            .await?;
        if let Some(err) = response.value.err {
            return Err(AggregatorError::SimulationFailure(format!(
                "program returned {:?}",
                err
            )));
        }
        Ok(response.value.logs.unwrap_or_default())
    }
}
