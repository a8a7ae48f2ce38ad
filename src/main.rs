use anyhow::{bail, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use market_aggregator::logger::{self, LogLevel, LogTag};
use market_aggregator::types::PriceSource;
use market_aggregator::{AggregatorConfig, MarketAggregator, SolanaReader};

#[derive(Parser)]
#[command(name = "market-aggregator")]
#[command(about = "Derive USD prices for SPL tokens from on-chain state")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "aggregator.toml")]
    config: PathBuf,

    /// Print the full price map as JSON
    #[arg(long)]
    json: bool,

    /// Minimum log level (error|warning|info|debug|verbose)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Shorthand for --log-level verbose
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(raw) = cli.log_level.as_deref() {
        match LogLevel::from_str(raw) {
            Some(level) => logger::set_min_level(level),
            None => bail!("unknown log level '{}'", raw),
        }
    } else if cli.verbose {
        logger::set_min_level(LogLevel::Verbose);
    }

    let config = AggregatorConfig::load(&cli.config)?;
    let reader = Arc::new(SolanaReader::new(&config.rpc_url, &config.commitment)?);
    let mut aggregator = MarketAggregator::new(&config, reader)?;

    let result = match aggregator.query_sources().await {
        Ok(result) => result,
        Err(err) => {
            logger::error(LogTag::Aggregator, &format!("Aggregation cycle failed: {}", err));
            return Err(err.into());
        }
    };

    let mut by_source = BTreeMap::new();
    for record in result.prices.values() {
        let label = match record.source {
            PriceSource::ExternalFeed => "external feed",
            PriceSource::Orderbook => "order book",
            PriceSource::Contract => "contract",
            PriceSource::Derived => "derived",
        };
        *by_source.entry(label).or_insert(0usize) += 1;
    }
    for (label, count) in &by_source {
        logger::info(LogTag::Aggregator, &format!("{}: {} prices", label, count));
    }

    if cli.json {
        // Keyed by base58 address for stable, readable output
        let output: BTreeMap<String, &market_aggregator::MarketDataRecord> = result
            .prices
            .iter()
            .map(|(address, record)| (address.to_string(), record))
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(())
}
