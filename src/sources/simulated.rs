//! Program-simulation price source
//!
//! Some staking programs expose their exchange rate only through an
//! `emit_price` instruction that logs an event. The instruction is run as
//! a read-only simulation (nothing is signed or submitted) and the first
//! emitted event is decoded from the base64 "Program data:" log line.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

use crate::errors::{AggregatorError, AggregatorResult};
use crate::logger::{self, LogTag};
use crate::rpc::AccountReader;
use crate::sources::DerivedSource;
use crate::types::{MarketDataRecord, PriceMap, PriceSource};

/// Anchor global discriminator: sha256("global:emit_price")[..8]
const EMIT_PRICE_DISCRIMINATOR: [u8; 8] = [0xe1, 0xe2, 0x61, 0xea, 0x10, 0xc1, 0x4d, 0x1c];

const EVENT_LOG_PREFIX: &str = "Program data: ";

/// Events carry a u64 price-per-wrapper scaled by 1e9
const PRICE_SCALE: f64 = 1e9;

pub struct SimulatedStakeSource {
    reader: Arc<dyn AccountReader>,
    symbol: String,
    anchor_mint: Pubkey,
    derived_mint: Pubkey,
    vault: Pubkey,
    program_id: Pubkey,
    payer: Pubkey,
}

impl SimulatedStakeSource {
    pub fn new(
        reader: Arc<dyn AccountReader>,
        symbol: impl Into<String>,
        anchor_mint: Pubkey,
        derived_mint: Pubkey,
        vault: Pubkey,
        program_id: Pubkey,
        payer: Pubkey,
    ) -> Self {
        Self {
            reader,
            symbol: symbol.into(),
            anchor_mint,
            derived_mint,
            vault,
            program_id,
            payer,
        }
    }

    fn emit_price_instruction(&self) -> Instruction {
        Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new_readonly(self.anchor_mint, false),
                AccountMeta::new_readonly(self.derived_mint, false),
                AccountMeta::new_readonly(self.vault, false),
            ],
            data: EMIT_PRICE_DISCRIMINATOR.to_vec(),
        }
    }
}

#[async_trait]
impl DerivedSource for SimulatedStakeSource {
    fn name(&self) -> &str {
        &self.symbol
    }

    async fn derive(&self, prices: &PriceMap) -> AggregatorResult<PriceMap> {
        let Some(anchor) = prices.get(&self.anchor_mint) else {
            return Ok(PriceMap::new());
        };

        let logs = self
            .reader
            .simulate_instruction(self.emit_price_instruction(), &self.payer)
            .await?;
        let ratio = parse_price_event(&logs).ok_or_else(|| {
            AggregatorError::SimulationFailure(format!(
                "{} emit_price logged no event",
                self.symbol
            ))
        })?;
        logger::verbose(
            LogTag::Source,
            &format!("{}: simulated exchange rate {:.6}", self.symbol, ratio),
        );

        Ok(PriceMap::from([(
            self.derived_mint,
            MarketDataRecord {
                source: PriceSource::Derived,
                symbol: self.symbol.clone(),
                address: self.derived_mint,
                price: anchor.price * ratio,
                metadata: None,
            },
        )]))
    }
}

/// Decode the first anchor event in the simulation logs: base64 payload,
/// 8-byte event discriminator, then the u64 LE scaled price.
fn parse_price_event(logs: &[String]) -> Option<f64> {
    for line in logs {
        let Some(payload) = line.strip_prefix(EVENT_LOG_PREFIX) else {
            continue;
        };
        let Ok(bytes) = BASE64.decode(payload) else {
            continue;
        };
        if bytes.len() < 16 {
            continue;
        }
        let raw = u64::from_le_bytes(bytes[8..16].try_into().ok()?);
        return Some(raw as f64 / PRICE_SCALE);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::MockReader;

    fn event_log(scaled_price: u64) -> String {
        let mut bytes = vec![0xAAu8; 8]; // event discriminator, not inspected
        bytes.extend_from_slice(&scaled_price.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]); // trailing event fields
        format!("{}{}", EVENT_LOG_PREFIX, BASE64.encode(bytes))
    }

    fn source(reader: MockReader, anchor: Pubkey, derived: Pubkey) -> SimulatedStakeSource {
        SimulatedStakeSource::new(
            Arc::new(reader),
            "xFOO",
            anchor,
            derived,
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
        )
    }

    fn anchor_prices(anchor: Pubkey, price: f64) -> PriceMap {
        PriceMap::from([(
            anchor,
            MarketDataRecord {
                source: PriceSource::ExternalFeed,
                symbol: "FOO".to_string(),
                address: anchor,
                price,
                metadata: None,
            },
        )])
    }

    #[tokio::test]
    async fn scales_anchor_by_the_simulated_rate() {
        let anchor = Pubkey::new_unique();
        let derived = Pubkey::new_unique();
        // 1.25 anchor per wrapper
        let reader = MockReader::new().with_simulation_logs(vec![
            "Program log: Instruction: EmitPrice".to_string(),
            event_log(1_250_000_000),
        ]);
        let source = source(reader, anchor, derived);

        let out = source.derive(&anchor_prices(anchor, 2.0)).await.unwrap();
        let record = out.get(&derived).unwrap();
        assert_eq!(record.price, 2.5);
        assert_eq!(record.source, PriceSource::Derived);
    }

    #[tokio::test]
    async fn missing_event_is_a_simulation_failure() {
        let anchor = Pubkey::new_unique();
        let reader = MockReader::new()
            .with_simulation_logs(vec!["Program log: nothing emitted".to_string()]);
        let source = source(reader, anchor, Pubkey::new_unique());

        let result = source.derive(&anchor_prices(anchor, 2.0)).await;
        assert!(matches!(result, Err(AggregatorError::SimulationFailure(_))));
    }

    #[tokio::test]
    async fn absent_anchor_skips_the_simulation() {
        let anchor = Pubkey::new_unique();
        let reader = MockReader::new().with_simulation_logs(vec![event_log(1)]);
        let source = source(reader, anchor, Pubkey::new_unique());

        let out = source.derive(&PriceMap::new()).await.unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn first_event_wins_and_garbage_lines_are_skipped() {
        let logs = vec![
            "Program log: noise".to_string(),
            format!("{}not-base64!!!", EVENT_LOG_PREFIX),
            event_log(3_000_000_000),
            event_log(9_000_000_000),
        ];
        assert_eq!(parse_price_event(&logs), Some(3.0));
        assert_eq!(parse_price_event(&[]), None);
    }
}
