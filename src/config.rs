use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::logger::{self, LogTag};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub rpc_url: String,
    /// Commitment level used for account reads ("processed" | "confirmed" | "finalized")
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default = "default_token_list_url")]
    pub token_list_url: String,
    #[serde(default = "default_saber_token_list_url")]
    pub saber_token_list_url: String,
    #[serde(default = "default_market_list_url")]
    pub market_list_url: String,
    #[serde(default = "default_nft_registry_url")]
    pub nft_registry_url: String,
    #[serde(default = "default_coingecko_base_url")]
    pub coingecko_base_url: String,
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_token_list_url() -> String {
    "https://raw.githubusercontent.com/solana-labs/token-list/main/src/tokens/solana.tokenlist.json"
        .to_string()
}

fn default_saber_token_list_url() -> String {
    "https://registry.saber.so/data/token-list.mainnet.json".to_string()
}

fn default_market_list_url() -> String {
    "https://raw.githubusercontent.com/step-finance/serum-markets/main/src/markets.json".to_string()
}

fn default_nft_registry_url() -> String {
    "https://galaxy.staratlas.com/nfts".to_string()
}

fn default_coingecko_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: default_commitment(),
            token_list_url: default_token_list_url(),
            saber_token_list_url: default_saber_token_list_url(),
            market_list_url: default_market_list_url(),
            nft_registry_url: default_nft_registry_url(),
            coingecko_base_url: default_coingecko_base_url(),
        }
    }
}

impl AggregatorConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            logger::warning(
                LogTag::Config,
                &format!("{} not found, using default configuration", path.display()),
            );
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: AggregatorConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        logger::info(
            LogTag::Config,
            &format!("Loaded configuration from {}", path.display()),
        );
        Ok(config)
    }
}
