//! Frankfurter macro FX source
//!
//! Fetches daily USD reference exchange rates from the public
//! `/latest` endpoint. Used as the pipeline's macro indicator feed.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::sources::SourceAdapter;
use crate::types::{MacroRecord, MarketRecord, RawPayload, SourceKind};

const SOURCE_NAME: &str = "frankfurter";

#[derive(Debug, Clone)]
pub struct FrankfurterSource {
    base_url: String,
}

impl FrankfurterSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Shape of the `/latest` response
#[derive(Debug, Clone, Deserialize)]
struct LatestRates {
    base: String,
    date: NaiveDate,
    rates: BTreeMap<String, f64>,
}

#[async_trait]
impl SourceAdapter for FrankfurterSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Macro
    }

    async fn fetch(&self, _symbols: &[String]) -> Result<RawPayload> {
        // Reference rates are not symbol-scoped; the full USD table is small.
        let url = format!("{}/latest?base=USD", self.base_url);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let response = client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch reference rates from Frankfurter")?;

        if !response.status().is_success() {
            bail!("Frankfurter API returned error: {}", response.status());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse Frankfurter rates response")?;

        Ok(RawPayload::new(SOURCE_NAME, body))
    }

    async fn validate(&self, payload: &RawPayload) -> Result<Vec<String>> {
        let mut issues = Vec::new();

        let rates = match serde_json::from_value::<LatestRates>(payload.body.clone()) {
            Ok(rates) => rates,
            Err(_) => {
                issues.push("missing base/date/rates fields".to_string());
                return Ok(issues);
            }
        };

        if rates.rates.is_empty() {
            issues.push("rate table is empty".to_string());
        }
        for (currency, rate) in &rates.rates {
            if !rate.is_finite() || *rate <= 0.0 {
                issues.push(format!("rate for {currency} is not a positive number"));
            }
        }

        Ok(issues)
    }

    async fn normalize(&self, payload: &RawPayload) -> Result<Vec<MarketRecord>> {
        let rates: LatestRates = serde_json::from_value(payload.body.clone())
            .context("Frankfurter payload is not a rate table")?;

        let as_of = Utc
            .from_utc_datetime(&rates.date.and_hms_opt(0, 0, 0).context("invalid rate date")?);

        let records = rates
            .rates
            .into_iter()
            .map(|(currency, value)| {
                MarketRecord::Macro(MacroRecord {
                    indicator: format!("{}/{}", rates.base, currency),
                    value,
                    as_of,
                })
            })
            .collect();

        Ok(records)
    }
}
