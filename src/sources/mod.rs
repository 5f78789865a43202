//! Source adapters (built-ins + the adapter contract)

mod binance;
mod coinbase;
mod cryptocompare;
mod frankfurter;
mod registry;

pub use binance::BinanceSource;
pub use coinbase::CoinbaseSource;
pub use cryptocompare::CryptoCompareSource;
pub use frankfurter::FrankfurterSource;
pub use registry::{SourceDescriptor, SourceRegistry};

use crate::types::{MarketRecord, RawPayload, SourceKind};
use anyhow::Result;
use async_trait::async_trait;

/// Contract every source adapter satisfies.
///
/// `fetch` talks to the upstream vendor and returns the raw response
/// body; `validate` inspects a payload and returns the issues found
/// (empty = valid); `normalize` maps a payload into canonical records.
/// Adapters never see each other and hold no pipeline state; every
/// per-source failure is contained by the orchestrator.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique source name, used as the registry key.
    fn name(&self) -> &str;

    /// What this source produces.
    fn kind(&self) -> SourceKind;

    /// Fetch the raw vendor response for the requested symbols.
    async fn fetch(&self, symbols: &[String]) -> Result<RawPayload>;

    /// Check a payload's shape. Returns the list of issues found;
    /// an empty list means the payload is valid.
    async fn validate(&self, payload: &RawPayload) -> Result<Vec<String>>;

    /// Map a validated payload into canonical market-data records.
    async fn normalize(&self, payload: &RawPayload) -> Result<Vec<MarketRecord>>;
}
