//! Error taxonomy for the aggregation pipeline
//!
//! Variants are `Clone` because the account cache broadcasts a completed
//! fetch result to every caller coalesced onto the same in-flight request.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

pub type AggregatorResult<T> = Result<T, AggregatorError>;

#[derive(Debug, Clone, Error)]
pub enum AggregatorError {
    /// The fetch succeeded but the address has no account on chain.
    /// Terminal for that lookup; the next caller re-attempts.
    #[error("account not found: {address}")]
    AccountNotFound { address: Pubkey },

    /// Bytes were present but did not match the expected layout.
    /// Skipped during bulk mint scans, propagated for explicit queries.
    #[error("failed to decode account {address}: {reason}")]
    DecodeFailure { address: Pubkey, reason: String },

    /// Transport-level failure; aborts the enclosing refresh cycle only.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// A read-only program simulation ran but produced no parseable
    /// price event. The anchor price was present, so a result was expected.
    #[error("simulation produced no usable price event: {0}")]
    SimulationFailure(String),

    /// A registry entry did not parse as a valid account address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl AggregatorError {
    pub fn decode(address: Pubkey, reason: impl Into<String>) -> Self {
        AggregatorError::DecodeFailure {
            address,
            reason: reason.into(),
        }
    }

    /// True for errors that should abort a whole refresh cycle rather
    /// than be skipped per entry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AggregatorError::NetworkFailure(_))
    }
}

impl From<reqwest::Error> for AggregatorError {
    fn from(err: reqwest::Error) -> Self {
        AggregatorError::NetworkFailure(err.to_string())
    }
}

impl From<solana_client::client_error::ClientError> for AggregatorError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        AggregatorError::NetworkFailure(err.to_string())
    }
}
