//! Orchestrator - concurrent fan-out/fan-in over the registered sources
//!
//! Each stage starts every eligible source operation at once (bounded
//! by a semaphore), collects outcomes over an mpsc channel, and stops
//! at the stage deadline. A source's failure, panic, or stall is
//! captured into its own outcome and never touches a sibling, and
//! never escapes the stage call. Tasks still running at the deadline
//! are abandoned: their late sends land on a closed channel and are
//! discarded, since an opaque adapter call cannot be forcibly stopped.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::{FetchOutcome, NormalizedRecord, ValidationOutcome};
use crate::sources::SourceRegistry;

pub struct Orchestrator {
    registry: Arc<SourceRegistry>,
    per_source_timeout: Duration,
    max_concurrency: usize,
    fetch_retries: usize,
}

impl Orchestrator {
    pub fn new(registry: Arc<SourceRegistry>, config: &PipelineConfig) -> Self {
        Self {
            registry,
            per_source_timeout: config.per_source_timeout(),
            max_concurrency: config.max_concurrent_fetches.max(1),
            fetch_retries: config.fetch_retries,
        }
    }

    /// Fetch from every enabled source concurrently.
    ///
    /// A source exceeding the per-source budget yields `TimedOut`
    /// without cancelling siblings; a source still pending at the
    /// stage deadline is marked `TimedOut` and abandoned. The returned
    /// map is keyed exactly by the enabled-source name set.
    pub async fn fetch_all(
        &self,
        symbols: &[String],
        deadline: Instant,
    ) -> HashMap<String, FetchOutcome> {
        let stage_started = Instant::now();
        let mut tasks: Vec<(String, BoxFuture<'static, FetchOutcome>)> = Vec::new();

        for descriptor in self.registry.list() {
            let name = descriptor.name().to_string();
            let adapter = descriptor.adapter();
            let symbols = symbols.to_vec();
            let per_source = self.per_source_timeout;
            let retries = self.fetch_retries;

            let task_name = name.clone();
            let fut = async move {
                let mut outcome = FetchOutcome::pending(task_name.clone());
                for attempt in 0..=retries {
                    let started = Instant::now();
                    let fetch = AssertUnwindSafe(adapter.fetch(&symbols)).catch_unwind();
                    match timeout(per_source, fetch).await {
                        Ok(Ok(Ok(payload))) => {
                            let latency_ms = started.elapsed().as_millis() as u64;
                            debug!(source = %task_name, latency_ms, "Fetch succeeded");
                            outcome = FetchOutcome::succeeded(task_name, payload, latency_ms);
                            break;
                        }
                        Ok(Ok(Err(err))) => {
                            let latency_ms = started.elapsed().as_millis() as u64;
                            warn!(
                                source = %task_name,
                                error = %err,
                                attempt,
                                "Fetch failed"
                            );
                            outcome = FetchOutcome::failed(
                                task_name.clone(),
                                PipelineError::Fetch(err.to_string()),
                                latency_ms,
                            );
                            // The retry point: failed fetches may be
                            // re-invoked, timeouts are not.
                        }
                        Ok(Err(_panic)) => {
                            let latency_ms = started.elapsed().as_millis() as u64;
                            warn!(source = %task_name, "Fetch panicked");
                            outcome = FetchOutcome::failed(
                                task_name,
                                PipelineError::Fetch("adapter panicked".to_string()),
                                latency_ms,
                            );
                            break;
                        }
                        Err(_) => {
                            let elapsed_ms = started.elapsed().as_millis() as u64;
                            warn!(source = %task_name, elapsed_ms, "Fetch timed out");
                            outcome = FetchOutcome::timed_out(task_name, elapsed_ms);
                            break;
                        }
                    }
                }
                outcome
            }
            .boxed();

            tasks.push((name, fut));
        }

        self.run_stage("fetch", tasks, deadline, move |source| {
            FetchOutcome::timed_out(
                source.to_string(),
                stage_started.elapsed().as_millis() as u64,
            )
        })
        .await
    }

    /// Validate every payload whose fetch succeeded, concurrently.
    ///
    /// Sources without a successful fetch are `Skipped`; validator
    /// errors, panics, and stalls all become `Invalid` for that source
    /// only.
    pub async fn validate_all(
        &self,
        fetches: &HashMap<String, FetchOutcome>,
        deadline: Instant,
    ) -> HashMap<String, ValidationOutcome> {
        let mut outcomes = HashMap::new();
        let mut tasks: Vec<(String, BoxFuture<'static, ValidationOutcome>)> = Vec::new();

        for descriptor in self.registry.list() {
            let name = descriptor.name().to_string();
            let payload = fetches.get(&name).and_then(|fetch| {
                if fetch.is_succeeded() {
                    fetch.payload.clone()
                } else {
                    None
                }
            });

            let payload = match payload {
                Some(payload) => payload,
                None => {
                    outcomes.insert(name.clone(), ValidationOutcome::skipped(name));
                    continue;
                }
            };

            let adapter = descriptor.adapter();
            let per_source = self.per_source_timeout;
            let task_name = name.clone();
            let fut = async move {
                let validate = AssertUnwindSafe(adapter.validate(&payload)).catch_unwind();
                match timeout(per_source, validate).await {
                    Ok(Ok(Ok(issues))) => {
                        if issues.is_empty() {
                            ValidationOutcome::valid(task_name)
                        } else {
                            debug!(source = %task_name, issues = issues.len(), "Payload invalid");
                            ValidationOutcome::invalid(task_name, issues)
                        }
                    }
                    Ok(Ok(Err(err))) => {
                        warn!(source = %task_name, error = %err, "Validation errored");
                        ValidationOutcome::invalid(task_name, vec![err.to_string()])
                    }
                    Ok(Err(_panic)) => {
                        warn!(source = %task_name, "Validator panicked");
                        ValidationOutcome::invalid(
                            task_name,
                            vec!["validator panicked".to_string()],
                        )
                    }
                    Err(_) => ValidationOutcome::invalid(
                        task_name,
                        vec![format!(
                            "validation timed out after {}ms",
                            per_source.as_millis()
                        )],
                    ),
                }
            }
            .boxed();

            tasks.push((name, fut));
        }

        let ran = self
            .run_stage("validate", tasks, deadline, |source| {
                ValidationOutcome::invalid(
                    source.to_string(),
                    vec!["validation did not complete before the stage deadline".to_string()],
                )
            })
            .await;

        outcomes.extend(ran);
        outcomes
    }

    /// Normalize every payload whose validation passed, concurrently.
    ///
    /// Sources without a valid payload are `Skipped`; normalizer
    /// errors, panics, and stalls all become `Failed` for that source
    /// only.
    pub async fn normalize_all(
        &self,
        validations: &HashMap<String, ValidationOutcome>,
        fetches: &HashMap<String, FetchOutcome>,
        deadline: Instant,
    ) -> HashMap<String, NormalizedRecord> {
        let mut outcomes = HashMap::new();
        let mut tasks: Vec<(String, BoxFuture<'static, NormalizedRecord>)> = Vec::new();

        for descriptor in self.registry.list() {
            let name = descriptor.name().to_string();
            let valid = validations
                .get(&name)
                .map(|v| v.is_valid())
                .unwrap_or(false);
            let payload = if valid {
                fetches.get(&name).and_then(|fetch| fetch.payload.clone())
            } else {
                None
            };

            let payload = match payload {
                Some(payload) => payload,
                None => {
                    outcomes.insert(name.clone(), NormalizedRecord::skipped(name));
                    continue;
                }
            };

            let adapter = descriptor.adapter();
            let per_source = self.per_source_timeout;
            let task_name = name.clone();
            let fut = async move {
                let normalize = AssertUnwindSafe(adapter.normalize(&payload)).catch_unwind();
                match timeout(per_source, normalize).await {
                    Ok(Ok(Ok(records))) => {
                        debug!(source = %task_name, records = records.len(), "Normalized");
                        NormalizedRecord::normalized(task_name, records)
                    }
                    Ok(Ok(Err(err))) => {
                        warn!(source = %task_name, error = %err, "Normalization errored");
                        NormalizedRecord::failed(
                            task_name,
                            PipelineError::Normalization(err.to_string()),
                        )
                    }
                    Ok(Err(_panic)) => {
                        warn!(source = %task_name, "Normalizer panicked");
                        NormalizedRecord::failed(
                            task_name,
                            PipelineError::Normalization("normalizer panicked".to_string()),
                        )
                    }
                    Err(_) => NormalizedRecord::failed(
                        task_name,
                        PipelineError::Normalization(format!(
                            "normalization timed out after {}ms",
                            per_source.as_millis()
                        )),
                    ),
                }
            }
            .boxed();

            tasks.push((name, fut));
        }

        let ran = self
            .run_stage("normalize", tasks, deadline, |source| {
                NormalizedRecord::failed(
                    source.to_string(),
                    PipelineError::Normalization(
                        "normalization did not complete before the stage deadline".to_string(),
                    ),
                )
            })
            .await;

        outcomes.extend(ran);
        outcomes
    }

    /// Fan out one task per source, collect until every source has
    /// reported or the deadline elapsed, then fill placeholder outcomes
    /// for the stragglers. Outcome writes need no locking: each task
    /// owns its slot and the channel is the single synchronization
    /// point.
    async fn run_stage<T>(
        &self,
        stage: &'static str,
        tasks: Vec<(String, BoxFuture<'static, T>)>,
        deadline: Instant,
        stalled: impl Fn(&str) -> T,
    ) -> HashMap<String, T>
    where
        T: Send + 'static,
    {
        let expected: Vec<String> = tasks.iter().map(|(name, _)| name.clone()).collect();
        let (tx, mut rx) = mpsc::channel::<(String, T)>(expected.len().max(1));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        for (name, fut) in tasks {
            let tx = tx.clone();
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                // Sources beyond the concurrency cap queue here, in
                // spawn order; the per-source clock starts only once
                // the adapter call actually begins.
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let outcome = fut.await;
                let _ = tx.send((name, outcome)).await;
            });
        }
        drop(tx);

        let mut outcomes = HashMap::with_capacity(expected.len());
        while outcomes.len() < expected.len() {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Some((name, outcome))) => {
                    outcomes.insert(name, outcome);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        stage,
                        pending = expected.len() - outcomes.len(),
                        "Stage deadline elapsed, abandoning stragglers"
                    );
                    break;
                }
            }
        }

        for name in &expected {
            if !outcomes.contains_key(name) {
                outcomes.insert(name.clone(), stalled(name));
            }
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{FetchStatus, NormalizationStatus, ValidationStatus};
    use crate::sources::{SourceAdapter, SourceDescriptor};
    use crate::types::{MarketRecord, PriceRecord, RawPayload, SourceKind};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Behavior {
        Ok,
        FailFetch,
        HangFetch,
        PanicNormalize,
    }

    struct ScriptedSource {
        name: &'static str,
        behavior: Behavior,
    }

    impl ScriptedSource {
        fn new(name: &'static str, behavior: Behavior) -> Arc<dyn SourceAdapter> {
            Arc::new(Self { name, behavior })
        }
    }

    #[async_trait]
    impl SourceAdapter for ScriptedSource {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> SourceKind {
            SourceKind::Price
        }

        async fn fetch(&self, _symbols: &[String]) -> Result<RawPayload> {
            match self.behavior {
                Behavior::FailFetch => bail!("connection refused"),
                Behavior::HangFetch => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    bail!("unreachable")
                }
                _ => Ok(RawPayload::new(
                    self.name,
                    json!([{"symbol": "BTC", "price": 50000.0}]),
                )),
            }
        }

        async fn validate(&self, payload: &RawPayload) -> Result<Vec<String>> {
            if payload.body.is_array() {
                Ok(Vec::new())
            } else {
                Ok(vec!["expected a JSON array".to_string()])
            }
        }

        async fn normalize(&self, payload: &RawPayload) -> Result<Vec<MarketRecord>> {
            if matches!(self.behavior, Behavior::PanicNormalize) {
                panic!("normalizer bug");
            }
            let rows = payload.body.as_array().cloned().unwrap_or_default();
            Ok(rows
                .iter()
                .map(|row| {
                    MarketRecord::Price(PriceRecord {
                        symbol: row["symbol"].as_str().unwrap_or("?").to_string(),
                        price: row["price"].as_f64().unwrap_or(0.0),
                        currency: "USD".to_string(),
                        ts: payload.fetched_at,
                    })
                })
                .collect())
        }
    }

    fn orchestrator(adapters: Vec<Arc<dyn SourceAdapter>>, per_source_ms: u64) -> Orchestrator {
        let mut registry = SourceRegistry::new();
        for adapter in adapters {
            registry.register(SourceDescriptor::new(adapter)).unwrap();
        }
        let config = PipelineConfig {
            per_source_timeout_ms: per_source_ms,
            overall_timeout_ms: 5_000,
            max_concurrent_fetches: 8,
            fetch_retries: 0,
        };
        Orchestrator::new(Arc::new(registry), &config)
    }

    fn symbols() -> Vec<String> {
        vec!["BTC".to_string()]
    }

    fn deadline_in(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[tokio::test]
    async fn fetch_all_is_keyed_exactly_by_the_enabled_set() {
        let orchestrator = orchestrator(
            vec![
                ScriptedSource::new("alpha", Behavior::Ok),
                ScriptedSource::new("bravo", Behavior::FailFetch),
                ScriptedSource::new("charlie", Behavior::Ok),
            ],
            500,
        );

        let fetches = orchestrator.fetch_all(&symbols(), deadline_in(2_000)).await;
        let mut keys: Vec<&str> = fetches.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["alpha", "bravo", "charlie"]);
    }

    #[tokio::test]
    async fn one_failing_source_does_not_affect_siblings() {
        let orchestrator = orchestrator(
            vec![
                ScriptedSource::new("alpha", Behavior::Ok),
                ScriptedSource::new("bravo", Behavior::FailFetch),
            ],
            500,
        );

        let fetches = orchestrator.fetch_all(&symbols(), deadline_in(2_000)).await;
        assert_eq!(fetches["alpha"].status, FetchStatus::Succeeded);
        assert_eq!(fetches["bravo"].status, FetchStatus::Failed);

        let validations = orchestrator.validate_all(&fetches, deadline_in(2_000)).await;
        assert_eq!(validations["alpha"].status, ValidationStatus::Valid);
        assert_eq!(validations["bravo"].status, ValidationStatus::Skipped);

        let normalized = orchestrator
            .normalize_all(&validations, &fetches, deadline_in(2_000))
            .await;
        assert_eq!(normalized["alpha"].status, NormalizationStatus::Normalized);
        assert_eq!(normalized["alpha"].records.len(), 1);
        assert_eq!(normalized["bravo"].status, NormalizationStatus::Skipped);
    }

    #[tokio::test]
    async fn slow_source_times_out_without_stalling_the_stage() {
        let orchestrator = orchestrator(
            vec![
                ScriptedSource::new("alpha", Behavior::Ok),
                ScriptedSource::new("slow", Behavior::HangFetch),
            ],
            100,
        );

        let started = Instant::now();
        let fetches = orchestrator.fetch_all(&symbols(), deadline_in(2_000)).await;
        assert!(started.elapsed() < Duration::from_millis(1_500));

        assert_eq!(fetches["alpha"].status, FetchStatus::Succeeded);
        assert_eq!(fetches["slow"].status, FetchStatus::TimedOut);
        assert!(matches!(
            fetches["slow"].error,
            Some(PipelineError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn stage_returns_at_the_overall_deadline() {
        // Per-source budget larger than the stage deadline: the stage
        // deadline must win and the straggler gets a placeholder.
        let orchestrator = orchestrator(vec![ScriptedSource::new("slow", Behavior::HangFetch)], 10_000);

        let started = Instant::now();
        let fetches = orchestrator.fetch_all(&symbols(), deadline_in(200)).await;
        assert!(started.elapsed() < Duration::from_millis(1_000));
        assert_eq!(fetches["slow"].status, FetchStatus::TimedOut);
    }

    #[tokio::test]
    async fn panicking_normalizer_is_contained() {
        let orchestrator = orchestrator(
            vec![
                ScriptedSource::new("alpha", Behavior::Ok),
                ScriptedSource::new("buggy", Behavior::PanicNormalize),
            ],
            500,
        );

        let fetches = orchestrator.fetch_all(&symbols(), deadline_in(2_000)).await;
        let validations = orchestrator.validate_all(&fetches, deadline_in(2_000)).await;
        let normalized = orchestrator
            .normalize_all(&validations, &fetches, deadline_in(2_000))
            .await;

        assert_eq!(normalized["alpha"].status, NormalizationStatus::Normalized);
        assert_eq!(normalized["buggy"].status, NormalizationStatus::Failed);
        assert!(matches!(
            normalized["buggy"].error,
            Some(PipelineError::Normalization(_))
        ));
    }

    #[tokio::test]
    async fn concurrency_cap_bounds_in_flight_fetches() {
        struct CountingSource {
            name: &'static str,
            in_flight: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl SourceAdapter for CountingSource {
            fn name(&self) -> &str {
                self.name
            }

            fn kind(&self) -> SourceKind {
                SourceKind::Price
            }

            async fn fetch(&self, _symbols: &[String]) -> Result<RawPayload> {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(RawPayload::new(self.name, json!([])))
            }

            async fn validate(&self, _payload: &RawPayload) -> Result<Vec<String>> {
                Ok(Vec::new())
            }

            async fn normalize(&self, _payload: &RawPayload) -> Result<Vec<MarketRecord>> {
                Ok(Vec::new())
            }
        }

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let names = ["s1", "s2", "s3", "s4", "s5"];

        let mut registry = SourceRegistry::new();
        for name in names {
            registry
                .register(SourceDescriptor::new(Arc::new(CountingSource {
                    name,
                    in_flight: in_flight.clone(),
                    peak: peak.clone(),
                })))
                .unwrap();
        }
        let config = PipelineConfig {
            per_source_timeout_ms: 1_000,
            overall_timeout_ms: 5_000,
            max_concurrent_fetches: 2,
            fetch_retries: 0,
        };
        let orchestrator = Orchestrator::new(Arc::new(registry), &config);

        let fetches = orchestrator.fetch_all(&symbols(), deadline_in(5_000)).await;
        assert_eq!(fetches.len(), names.len());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn failed_fetches_are_retried_when_configured() {
        struct FlakySource {
            attempts: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl SourceAdapter for FlakySource {
            fn name(&self) -> &str {
                "flaky"
            }

            fn kind(&self) -> SourceKind {
                SourceKind::Price
            }

            async fn fetch(&self, _symbols: &[String]) -> Result<RawPayload> {
                if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    bail!("transient error");
                }
                Ok(RawPayload::new("flaky", json!([])))
            }

            async fn validate(&self, _payload: &RawPayload) -> Result<Vec<String>> {
                Ok(Vec::new())
            }

            async fn normalize(&self, _payload: &RawPayload) -> Result<Vec<MarketRecord>> {
                Ok(Vec::new())
            }
        }

        let attempts = Arc::new(AtomicUsize::new(0));
        let mut registry = SourceRegistry::new();
        registry
            .register(SourceDescriptor::new(Arc::new(FlakySource {
                attempts: attempts.clone(),
            })))
            .unwrap();
        let config = PipelineConfig {
            per_source_timeout_ms: 500,
            overall_timeout_ms: 5_000,
            max_concurrent_fetches: 8,
            fetch_retries: 1,
        };
        let orchestrator = Orchestrator::new(Arc::new(registry), &config);

        let fetches = orchestrator.fetch_all(&symbols(), deadline_in(2_000)).await;
        assert_eq!(fetches["flaky"].status, FetchStatus::Succeeded);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
