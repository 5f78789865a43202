//! CryptoCompare news source
//!
//! Fetches market news headlines from the public `/data/v2/news/`
//! endpoint, filtered to the requested symbols via categories.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::sources::SourceAdapter;
use crate::types::{MarketRecord, NewsRecord, RawPayload, SourceKind};

const SOURCE_NAME: &str = "cryptocompare";

#[derive(Debug, Clone)]
pub struct CryptoCompareSource {
    base_url: String,
}

impl CryptoCompareSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Top-level shape of the `/data/v2/news/` response
#[derive(Debug, Clone, Deserialize)]
struct NewsEnvelope {
    #[serde(rename = "Data")]
    data: Vec<NewsItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct NewsItem {
    title: String,
    url: Option<String>,
    /// Pipe-separated tags, e.g. "BTC|ETH|Regulation"
    categories: Option<String>,
    published_on: i64,
}

impl NewsItem {
    fn symbols(&self) -> Vec<String> {
        self.categories
            .as_deref()
            .unwrap_or_default()
            .split('|')
            .filter(|tag| !tag.is_empty())
            .map(|tag| tag.to_uppercase())
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for CryptoCompareSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::News
    }

    async fn fetch(&self, symbols: &[String]) -> Result<RawPayload> {
        let mut url = format!("{}/data/v2/news/?lang=EN", self.base_url);
        if !symbols.is_empty() {
            let categories: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
            url.push_str(&format!("&categories={}", categories.join(",")));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let response = client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch news from CryptoCompare")?;

        if !response.status().is_success() {
            bail!("CryptoCompare API returned error: {}", response.status());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse CryptoCompare news response")?;

        Ok(RawPayload::new(SOURCE_NAME, body))
    }

    async fn validate(&self, payload: &RawPayload) -> Result<Vec<String>> {
        let mut issues = Vec::new();

        let envelope = match serde_json::from_value::<NewsEnvelope>(payload.body.clone()) {
            Ok(envelope) => envelope,
            Err(_) => {
                issues.push("missing or malformed `Data` article list".to_string());
                return Ok(issues);
            }
        };
        for (i, item) in envelope.data.iter().enumerate() {
            if item.title.trim().is_empty() {
                issues.push(format!("article {i} has an empty title"));
            }
            if item.published_on <= 0 {
                issues.push(format!("article {i} has an invalid publish timestamp"));
            }
        }

        Ok(issues)
    }

    async fn normalize(&self, payload: &RawPayload) -> Result<Vec<MarketRecord>> {
        let envelope: NewsEnvelope = serde_json::from_value(payload.body.clone())
            .context("CryptoCompare payload is not a news envelope")?;

        let mut records = Vec::with_capacity(envelope.data.len());
        for item in envelope.data {
            let published_at: DateTime<Utc> = DateTime::from_timestamp(item.published_on, 0)
                .with_context(|| format!("invalid publish timestamp {}", item.published_on))?;
            records.push(MarketRecord::News(NewsRecord {
                symbols: item.symbols(),
                headline: item.title,
                url: item.url,
                published_at,
            }));
        }

        Ok(records)
    }
}
