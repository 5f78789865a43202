//! Unifeed - unified market data pipeline
//!
//! Runs one fetch → validate → normalize pass over the configured
//! sources and prints the aggregated report as JSON.

use anyhow::Result;
use tracing::info;

use unifeed::config::AppConfig;
use unifeed::pipeline::MarketDataService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = AppConfig::load()?;
    info!(config = %config.digest(), "Configuration loaded");

    let mut service = MarketDataService::new(config);
    service.initialize()?;

    let mut symbols: Vec<String> = std::env::args().skip(1).collect();
    if symbols.is_empty() {
        symbols = vec!["BTC".to_string(), "ETH".to_string()];
    }

    let report = service.get_market_data(&symbols, None).await?;
    info!(records = report.records().len(), "{}", report.summary());

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
