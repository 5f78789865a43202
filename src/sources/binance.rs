//! Binance spot price source
//!
//! Fetches last-trade prices from the public `/api/v3/ticker/price`
//! endpoint. No API key required.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::sources::SourceAdapter;
use crate::types::{MarketRecord, PriceRecord, RawPayload, SourceKind};

const SOURCE_NAME: &str = "binance";

#[derive(Debug, Clone)]
pub struct BinanceSource {
    base_url: String,
}

impl BinanceSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Binance quotes crypto against USDT
    fn trading_pair(symbol: &str) -> String {
        format!("{}USDT", symbol.to_uppercase())
    }
}

/// One entry of the `/api/v3/ticker/price` response
#[derive(Debug, Clone, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

#[async_trait]
impl SourceAdapter for BinanceSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Price
    }

    async fn fetch(&self, symbols: &[String]) -> Result<RawPayload> {
        if symbols.is_empty() {
            bail!("no symbols requested");
        }

        let pairs: Vec<String> = symbols
            .iter()
            .map(|s| format!("\"{}\"", Self::trading_pair(s)))
            .collect();
        let url = format!(
            "{}/api/v3/ticker/price?symbols=[{}]",
            self.base_url,
            pairs.join(",")
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let response = client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch ticker prices from Binance")?;

        if !response.status().is_success() {
            bail!("Binance API returned error: {}", response.status());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse Binance ticker response")?;

        Ok(RawPayload::new(SOURCE_NAME, body))
    }

    async fn validate(&self, payload: &RawPayload) -> Result<Vec<String>> {
        let mut issues = Vec::new();

        match payload.body.as_array() {
            None => issues.push("expected a JSON array of tickers".to_string()),
            Some(entries) => {
                if entries.is_empty() {
                    issues.push("ticker array is empty".to_string());
                }
                for (i, entry) in entries.iter().enumerate() {
                    match serde_json::from_value::<TickerPrice>(entry.clone()) {
                        Err(_) => issues.push(format!("entry {i} is not a ticker object")),
                        Ok(ticker) => {
                            if ticker.price.parse::<f64>().is_err() {
                                issues.push(format!(
                                    "entry {i} ({}) has an unparsable price",
                                    ticker.symbol
                                ));
                            }
                        }
                    }
                }
            }
        }

        Ok(issues)
    }

    async fn normalize(&self, payload: &RawPayload) -> Result<Vec<MarketRecord>> {
        let entries: Vec<TickerPrice> = serde_json::from_value(payload.body.clone())
            .context("Binance payload is not a ticker array")?;

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let price: f64 = entry
                .price
                .parse()
                .with_context(|| format!("unparsable price for {}", entry.symbol))?;
            let symbol = entry
                .symbol
                .strip_suffix("USDT")
                .unwrap_or(&entry.symbol)
                .to_string();
            records.push(MarketRecord::Price(PriceRecord {
                symbol,
                price,
                currency: "USD".to_string(),
                ts: payload.fetched_at,
            }));
        }

        Ok(records)
    }
}
