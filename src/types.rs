//! Core types used throughout Unifeed
//!
//! Canonical market-data records plus the raw payload envelope that
//! source adapters hand to the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a source is capable of producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Price,
    News,
    Macro,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Price => write!(f, "price"),
            SourceKind::News => write!(f, "news"),
            SourceKind::Macro => write!(f, "macro"),
        }
    }
}

/// Raw, source-shaped response captured by the fetch phase.
///
/// The body is kept opaque (whatever JSON the vendor returned); only
/// `validate` and `normalize` of the owning adapter know its shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPayload {
    pub source: String,
    pub body: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

impl RawPayload {
    pub fn new(source: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            source: source.into(),
            body,
            fetched_at: Utc::now(),
        }
    }
}

/// One canonical market-data entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketRecord {
    Price(PriceRecord),
    News(NewsRecord),
    Macro(MacroRecord),
}

/// Spot price for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRecord {
    pub symbol: String,
    pub price: f64,
    /// Quote currency (e.g. "USD")
    pub currency: String,
    pub ts: DateTime<Utc>,
}

/// One news headline, tagged with the symbols it mentions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsRecord {
    pub headline: String,
    pub url: Option<String>,
    pub symbols: Vec<String>,
    pub published_at: DateTime<Utc>,
}

/// One macro indicator observation (e.g. an FX reference rate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroRecord {
    pub indicator: String,
    pub value: f64,
    pub as_of: DateTime<Utc>,
}
