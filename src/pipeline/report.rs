//! Pipeline report - deterministic merge of per-source outcomes
//!
//! Aggregation is a pure function of the three outcome maps; the report
//! content is independent of the order sources completed in.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::{FetchOutcome, FetchStatus, NormalizedRecord, ValidationOutcome};

/// Overall pipeline status - the contract callers use to decide
/// whether to proceed with partial data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Every enabled source reached `Normalized`.
    Success,
    /// Some, but not all, sources reached `Normalized`.
    Partial,
    /// No source reached `Normalized`.
    Failure,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStatus::Success => write!(f, "success"),
            PipelineStatus::Partial => write!(f, "partial"),
            PipelineStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Fetch result as reported to callers. The payload itself is lifted
/// into the report's `raw_data` map.
#[derive(Debug, Clone, Serialize)]
pub struct FetchSummary {
    pub status: FetchStatus,
    pub error: Option<PipelineError>,
    pub latency_ms: u64,
}

/// All three phase outcomes for one source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub fetch: FetchSummary,
    pub validation: ValidationOutcome,
    pub normalization: NormalizedRecord,
}

/// The unified result of one `get_market_data` call. Owned exclusively
/// by the caller; never shared across concurrent calls.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub status: PipelineStatus,
    pub run_id: Uuid,
    pub sources: BTreeMap<String, SourceReport>,
    pub total_sources: usize,
    pub succeeded_sources: usize,
    pub timestamp: DateTime<Utc>,
    pub raw_data: BTreeMap<String, Option<serde_json::Value>>,
    pub validation_results: BTreeMap<String, ValidationOutcome>,
}

impl PipelineReport {
    /// One-line summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "status={} sources={}/{} run_id={}",
            self.status, self.succeeded_sources, self.total_sources, self.run_id
        )
    }

    /// All canonical records across sources, in source-name order.
    pub fn records(&self) -> Vec<&crate::types::MarketRecord> {
        self.sources
            .values()
            .flat_map(|source| source.normalization.records.iter())
            .collect()
    }
}

/// Merge the three per-source outcome maps into one report.
///
/// Status rule: `Success` iff every enabled source reached
/// `Normalized`; `Failure` iff none did (including the degenerate
/// zero-source run); `Partial` otherwise.
pub fn aggregate(
    fetches: HashMap<String, FetchOutcome>,
    validations: HashMap<String, ValidationOutcome>,
    normalizations: HashMap<String, NormalizedRecord>,
) -> PipelineReport {
    let total_sources = fetches.len();
    let mut sources = BTreeMap::new();
    let mut raw_data = BTreeMap::new();
    let mut validation_results = BTreeMap::new();
    let mut succeeded_sources = 0;

    for (name, fetch) in fetches {
        let validation = validations
            .get(&name)
            .cloned()
            .unwrap_or_else(|| ValidationOutcome::skipped(name.clone()));
        let normalization = normalizations
            .get(&name)
            .cloned()
            .unwrap_or_else(|| NormalizedRecord::skipped(name.clone()));

        if normalization.is_normalized() {
            succeeded_sources += 1;
        }

        raw_data.insert(name.clone(), fetch.payload.as_ref().map(|p| p.body.clone()));
        validation_results.insert(name.clone(), validation.clone());
        sources.insert(
            name,
            SourceReport {
                fetch: FetchSummary {
                    status: fetch.status,
                    error: fetch.error,
                    latency_ms: fetch.latency_ms,
                },
                validation,
                normalization,
            },
        );
    }

    let status = if total_sources > 0 && succeeded_sources == total_sources {
        PipelineStatus::Success
    } else if succeeded_sources == 0 {
        PipelineStatus::Failure
    } else {
        PipelineStatus::Partial
    };

    PipelineReport {
        status,
        run_id: Uuid::new_v4(),
        sources,
        total_sources,
        succeeded_sources,
        timestamp: Utc::now(),
        raw_data,
        validation_results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawPayload;
    use serde_json::json;

    fn outcome_maps(
        names: &[&str],
        normalized: &[&str],
    ) -> (
        HashMap<String, FetchOutcome>,
        HashMap<String, ValidationOutcome>,
        HashMap<String, NormalizedRecord>,
    ) {
        let mut fetches = HashMap::new();
        let mut validations = HashMap::new();
        let mut normalizations = HashMap::new();

        for &name in names {
            let name_owned = name.to_string();
            if normalized.contains(&name) {
                let payload = RawPayload::new(name, json!([{"ok": true}]));
                fetches.insert(
                    name_owned.clone(),
                    FetchOutcome::succeeded(name_owned.clone(), payload, 12),
                );
                validations.insert(
                    name_owned.clone(),
                    ValidationOutcome::valid(name_owned.clone()),
                );
                normalizations.insert(
                    name_owned.clone(),
                    NormalizedRecord::normalized(name_owned, Vec::new()),
                );
            } else {
                fetches.insert(
                    name_owned.clone(),
                    FetchOutcome::failed(
                        name_owned.clone(),
                        PipelineError::Fetch("boom".to_string()),
                        7,
                    ),
                );
                validations.insert(
                    name_owned.clone(),
                    ValidationOutcome::skipped(name_owned.clone()),
                );
                normalizations.insert(name_owned.clone(), NormalizedRecord::skipped(name_owned));
            }
        }

        (fetches, validations, normalizations)
    }

    #[test]
    fn all_normalized_is_success() {
        let (f, v, n) = outcome_maps(&["a", "b", "c"], &["a", "b", "c"]);
        let report = aggregate(f, v, n);
        assert_eq!(report.status, PipelineStatus::Success);
        assert_eq!(report.succeeded_sources, 3);
        assert_eq!(report.total_sources, 3);
    }

    #[test]
    fn some_normalized_is_partial() {
        let (f, v, n) = outcome_maps(&["a", "b", "c"], &["a"]);
        let report = aggregate(f, v, n);
        assert_eq!(report.status, PipelineStatus::Partial);
        assert_eq!(report.succeeded_sources, 1);
    }

    #[test]
    fn none_normalized_is_failure() {
        let (f, v, n) = outcome_maps(&["a", "b", "c"], &[]);
        let report = aggregate(f, v, n);
        assert_eq!(report.status, PipelineStatus::Failure);
        assert_eq!(report.succeeded_sources, 0);
    }

    #[test]
    fn zero_sources_is_failure() {
        let report = aggregate(HashMap::new(), HashMap::new(), HashMap::new());
        assert_eq!(report.status, PipelineStatus::Failure);
        assert_eq!(report.total_sources, 0);
    }

    #[test]
    fn report_keys_match_the_fetch_key_set() {
        let (f, v, n) = outcome_maps(&["a", "b"], &["a"]);
        let report = aggregate(f, v, n);
        let keys: Vec<&str> = report.sources.keys().map(String::as_str).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(report.raw_data.len(), 2);
        assert_eq!(report.validation_results.len(), 2);
    }

    #[test]
    fn raw_data_is_null_for_sources_without_a_payload() {
        let (f, v, n) = outcome_maps(&["a", "b"], &["a"]);
        let report = aggregate(f, v, n);
        assert!(report.raw_data["a"].is_some());
        assert!(report.raw_data["b"].is_none());
    }

    #[test]
    fn status_serializes_lowercase() {
        let (f, v, n) = outcome_maps(&["a"], &[]);
        let report = aggregate(f, v, n);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "failure");
        assert_eq!(value["sources"]["a"]["fetch"]["status"], "Failed");
    }
}
