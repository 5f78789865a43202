//! Configuration management for Unifeed
//!
//! Loads from YAML files + environment variables via .env

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Budget for one adapter fetch/validate/normalize call, in milliseconds
    pub per_source_timeout_ms: u64,
    /// Whole-call budget in milliseconds (the 30s default of the call contract)
    pub overall_timeout_ms: u64,
    /// Maximum simultaneously in-flight adapter calls per stage
    pub max_concurrent_fetches: usize,
    /// Extra attempts for a failed (not timed-out) fetch
    pub fetch_retries: usize,
}

impl PipelineConfig {
    pub fn per_source_timeout(&self) -> Duration {
        Duration::from_millis(self.per_source_timeout_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            per_source_timeout_ms: 10_000,
            overall_timeout_ms: 30_000,
            max_concurrent_fetches: 8,
            fetch_retries: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// Enable the Binance spot price feed
    pub binance_enabled: bool,
    pub binance_url: String,
    /// Enable the Coinbase spot price feed
    pub coinbase_enabled: bool,
    pub coinbase_url: String,
    /// Enable the CryptoCompare news feed
    pub cryptocompare_enabled: bool,
    pub cryptocompare_url: String,
    /// Enable the Frankfurter FX reference rate feed
    pub frankfurter_enabled: bool,
    pub frankfurter_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            binance_enabled: true,
            binance_url: "https://api.binance.com".to_string(),
            coinbase_enabled: true,
            coinbase_url: "https://api.coinbase.com".to_string(),
            cryptocompare_enabled: true,
            cryptocompare_url: "https://min-api.cryptocompare.com".to_string(),
            frankfurter_enabled: true,
            frankfurter_url: "https://api.frankfurter.app".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Pipeline defaults
            .set_default("pipeline.per_source_timeout_ms", 10_000)?
            .set_default("pipeline.overall_timeout_ms", 30_000)?
            .set_default("pipeline.max_concurrent_fetches", 8)?
            .set_default("pipeline.fetch_retries", 0)?
            // Source defaults
            .set_default("sources.binance_enabled", true)?
            .set_default("sources.binance_url", "https://api.binance.com")?
            .set_default("sources.coinbase_enabled", true)?
            .set_default("sources.coinbase_url", "https://api.coinbase.com")?
            .set_default("sources.cryptocompare_enabled", true)?
            .set_default(
                "sources.cryptocompare_url",
                "https://min-api.cryptocompare.com",
            )?
            .set_default("sources.frankfurter_enabled", true)?
            .set_default("sources.frankfurter_url", "https://api.frankfurter.app")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (UNIFEED_*)
            .add_source(Environment::with_prefix("UNIFEED").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "per_source={}ms overall={}ms cap={} retries={} sources=[{}]",
            self.pipeline.per_source_timeout_ms,
            self.pipeline.overall_timeout_ms,
            self.pipeline.max_concurrent_fetches,
            self.pipeline.fetch_retries,
            self.enabled_source_names().join(",")
        )
    }

    fn enabled_source_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.sources.binance_enabled {
            names.push("binance");
        }
        if self.sources.coinbase_enabled {
            names.push("coinbase");
        }
        if self.sources.cryptocompare_enabled {
            names.push("cryptocompare");
        }
        if self.sources.frankfurter_enabled {
            names.push("frankfurter");
        }
        names
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
