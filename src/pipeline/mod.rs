//! Pipeline stages and report model
//!
//! The fetch → validate → normalize fan-out stages, the per-source
//! outcome types they produce, and the aggregated report handed back
//! to callers.

mod orchestrator;
mod report;
mod service;

pub use orchestrator::Orchestrator;
pub use report::{aggregate, FetchSummary, PipelineReport, PipelineStatus, SourceReport};
pub use service::MarketDataService;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::{MarketRecord, RawPayload};

/// Fetch phase states. `Pending` only exists while a fetch is in
/// flight; outcome maps returned by the orchestrator hold terminal
/// states only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStatus {
    Pending,
    Succeeded,
    Failed,
    TimedOut,
}

/// Validation phase terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Valid,
    Invalid,
    /// The fetch did not succeed, so there was nothing to validate.
    Skipped,
}

/// Normalization phase terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizationStatus {
    Normalized,
    /// The payload never became valid, so there was nothing to normalize.
    Skipped,
    Failed,
}

/// Per-source result of the fetch phase. Exactly one per enabled source
/// per run; consumed by the validate phase, never retained across runs.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub source: String,
    pub status: FetchStatus,
    pub payload: Option<RawPayload>,
    pub error: Option<PipelineError>,
    pub latency_ms: u64,
}

impl FetchOutcome {
    pub fn pending(source: String) -> Self {
        Self {
            source,
            status: FetchStatus::Pending,
            payload: None,
            error: None,
            latency_ms: 0,
        }
    }

    pub fn succeeded(source: String, payload: RawPayload, latency_ms: u64) -> Self {
        Self {
            source,
            status: FetchStatus::Succeeded,
            payload: Some(payload),
            error: None,
            latency_ms,
        }
    }

    pub fn failed(source: String, error: PipelineError, latency_ms: u64) -> Self {
        Self {
            source,
            status: FetchStatus::Failed,
            payload: None,
            error: Some(error),
            latency_ms,
        }
    }

    pub fn timed_out(source: String, elapsed_ms: u64) -> Self {
        Self {
            source,
            status: FetchStatus::TimedOut,
            payload: None,
            error: Some(PipelineError::Timeout { elapsed_ms }),
            latency_ms: elapsed_ms,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == FetchStatus::Succeeded
    }
}

/// Per-source result of the validate phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub source: String,
    pub status: ValidationStatus,
    pub issues: Vec<String>,
}

impl ValidationOutcome {
    pub fn valid(source: String) -> Self {
        Self {
            source,
            status: ValidationStatus::Valid,
            issues: Vec::new(),
        }
    }

    pub fn invalid(source: String, issues: Vec<String>) -> Self {
        Self {
            source,
            status: ValidationStatus::Invalid,
            issues,
        }
    }

    pub fn skipped(source: String) -> Self {
        Self {
            source,
            status: ValidationStatus::Skipped,
            issues: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Valid
    }
}

/// Per-source result of the normalize phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub source: String,
    pub status: NormalizationStatus,
    pub records: Vec<MarketRecord>,
    pub error: Option<PipelineError>,
}

impl NormalizedRecord {
    pub fn normalized(source: String, records: Vec<MarketRecord>) -> Self {
        Self {
            source,
            status: NormalizationStatus::Normalized,
            records,
            error: None,
        }
    }

    pub fn skipped(source: String) -> Self {
        Self {
            source,
            status: NormalizationStatus::Skipped,
            records: Vec::new(),
            error: None,
        }
    }

    pub fn failed(source: String, error: PipelineError) -> Self {
        Self {
            source,
            status: NormalizationStatus::Failed,
            records: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_normalized(&self) -> bool {
        self.status == NormalizationStatus::Normalized
    }
}
