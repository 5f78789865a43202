//! Unified interface - the single entry point callers use
//!
//! Sequences fetch → validate → normalize against one shared deadline
//! and returns the aggregated report. Lifecycle is explicit:
//! `initialize()` → ready → `shutdown()`; there is no global state.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, SourcesConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{aggregate, Orchestrator, PipelineReport};
use crate::sources::{
    BinanceSource, CoinbaseSource, CryptoCompareSource, FrankfurterSource, SourceAdapter,
    SourceDescriptor, SourceRegistry,
};

/// Single entry point for unified market data retrieval.
pub struct MarketDataService {
    config: AppConfig,
    /// Adapters provided up front; empty means "use the built-ins
    /// enabled in the config".
    adapters: Vec<Arc<dyn SourceAdapter>>,
    ready: Option<Ready>,
}

struct Ready {
    registry: Arc<SourceRegistry>,
    orchestrator: Orchestrator,
}

impl MarketDataService {
    /// Service over the built-in sources enabled in `config`.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            adapters: Vec::new(),
            ready: None,
        }
    }

    /// Service over an explicit adapter set. The registry is still
    /// constructed by `initialize()`.
    pub fn with_adapters(config: AppConfig, adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self {
            config,
            adapters,
            ready: None,
        }
    }

    /// Build the registry and orchestrator. Safe to call repeatedly:
    /// after the first success this is a no-op.
    pub fn initialize(&mut self) -> PipelineResult<()> {
        if self.ready.is_some() {
            debug!("Service already initialized");
            return Ok(());
        }

        let mut registry = SourceRegistry::new();
        let adapters = if self.adapters.is_empty() {
            builtin_adapters(&self.config.sources)
        } else {
            self.adapters.clone()
        };
        for adapter in adapters {
            registry.register(SourceDescriptor::new(adapter))?;
        }

        if registry.is_empty() {
            warn!("No sources enabled; every run will report failure");
        }

        let registry = Arc::new(registry);
        let orchestrator = Orchestrator::new(registry.clone(), &self.config.pipeline);
        info!(sources = registry.len(), "✅ Market data service initialized");

        self.ready = Some(Ready {
            registry,
            orchestrator,
        });
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.ready.is_some()
    }

    /// Names of the enabled sources, in registration order.
    pub fn source_names(&self) -> PipelineResult<Vec<String>> {
        let ready = self.ready.as_ref().ok_or(PipelineError::NotInitialized)?;
        Ok(ready.registry.enabled_names())
    }

    /// Run one full fetch → validate → normalize pass and aggregate
    /// the report. Per-source failures are captured into the report;
    /// only lifecycle misuse returns `Err`.
    pub async fn get_market_data(
        &self,
        symbols: &[String],
        timeout: Option<Duration>,
    ) -> PipelineResult<PipelineReport> {
        let ready = self.ready.as_ref().ok_or(PipelineError::NotInitialized)?;

        let budget = timeout.unwrap_or_else(|| self.config.pipeline.overall_timeout());
        let deadline = Instant::now() + budget;
        info!(
            symbols = ?symbols,
            timeout_ms = budget.as_millis() as u64,
            "Starting pipeline run"
        );

        let fetches = ready.orchestrator.fetch_all(symbols, deadline).await;
        let validations = ready.orchestrator.validate_all(&fetches, deadline).await;
        let normalizations = ready
            .orchestrator
            .normalize_all(&validations, &fetches, deadline)
            .await;

        let report = aggregate(fetches, validations, normalizations);
        info!(
            status = %report.status,
            succeeded = report.succeeded_sources,
            total = report.total_sources,
            "Pipeline run complete"
        );
        Ok(report)
    }

    /// Drop the registry and return to the uninitialized state.
    pub fn shutdown(&mut self) {
        if self.ready.take().is_some() {
            info!("Market data service shut down");
        }
    }
}

fn builtin_adapters(sources: &SourcesConfig) -> Vec<Arc<dyn SourceAdapter>> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    if sources.binance_enabled {
        adapters.push(Arc::new(BinanceSource::new(&sources.binance_url)));
    }
    if sources.coinbase_enabled {
        adapters.push(Arc::new(CoinbaseSource::new(&sources.coinbase_url)));
    }
    if sources.cryptocompare_enabled {
        adapters.push(Arc::new(CryptoCompareSource::new(
            &sources.cryptocompare_url,
        )));
    }
    if sources.frankfurter_enabled {
        adapters.push(Arc::new(FrankfurterSource::new(&sources.frankfurter_url)));
    }
    adapters
}
