//! Coinbase spot price source
//!
//! Fetches spot prices from the public `/v2/prices/{pair}/spot`
//! endpoint, one request per symbol, and bundles them into a single
//! payload.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::sources::SourceAdapter;
use crate::types::{MarketRecord, PriceRecord, RawPayload, SourceKind};

const SOURCE_NAME: &str = "coinbase";

#[derive(Debug, Clone)]
pub struct CoinbaseSource {
    base_url: String,
}

impl CoinbaseSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Coinbase quotes pairs as "BTC-USD"
    fn spot_pair(symbol: &str) -> String {
        format!("{}-USD", symbol.to_uppercase())
    }
}

/// Body of one `/v2/prices/{pair}/spot` response
#[derive(Debug, Clone, Deserialize)]
struct SpotEnvelope {
    data: SpotPrice,
}

#[derive(Debug, Clone, Deserialize)]
struct SpotPrice {
    base: String,
    currency: String,
    amount: String,
}

#[async_trait]
impl SourceAdapter for CoinbaseSource {
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

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let mut quotes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let url = format!("{}/v2/prices/{}/spot", self.base_url, Self::spot_pair(symbol));

            let response = client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("Failed to fetch {symbol} spot price from Coinbase"))?;

            if !response.status().is_success() {
                bail!("Coinbase API returned error: {}", response.status());
            }

            let body: serde_json::Value = response
                .json()
                .await
                .context("Failed to parse Coinbase spot response")?;
            quotes.push(body);
        }

        Ok(RawPayload::new(SOURCE_NAME, json!(quotes)))
    }

    async fn validate(&self, payload: &RawPayload) -> Result<Vec<String>> {
        let mut issues = Vec::new();

        match payload.body.as_array() {
            None => issues.push("expected a JSON array of spot quotes".to_string()),
            Some(entries) => {
                if entries.is_empty() {
                    issues.push("spot quote array is empty".to_string());
                }
                for (i, entry) in entries.iter().enumerate() {
                    match serde_json::from_value::<SpotEnvelope>(entry.clone()) {
                        Err(_) => issues.push(format!("entry {i} is not a spot quote")),
                        Ok(envelope) => {
                            if envelope.data.amount.parse::<f64>().is_err() {
                                issues.push(format!(
                                    "entry {i} ({}) has an unparsable amount",
                                    envelope.data.base
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
        let entries: Vec<SpotEnvelope> = serde_json::from_value(payload.body.clone())
            .context("Coinbase payload is not a spot quote array")?;

        let mut records = Vec::with_capacity(entries.len());
        for envelope in entries {
            let spot = envelope.data;
            let price: f64 = spot
                .amount
                .parse()
                .with_context(|| format!("unparsable amount for {}", spot.base))?;
            records.push(MarketRecord::Price(PriceRecord {
                symbol: spot.base,
                price,
                currency: spot.currency,
                ts: payload.fetched_at,
            }));
        }

        Ok(records)
    }
}
