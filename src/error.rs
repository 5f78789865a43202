//! Pipeline error types
//!
//! Per-source failures are captured into outcome values and embedded in
//! the report; only registry misuse and lifecycle errors surface as
//! `Err` from the service.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the pipeline core.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum PipelineError {
    #[error("source `{0}` is already registered")]
    DuplicateSource(String),

    #[error("unknown source `{0}`")]
    UnknownSource(String),

    #[error("service used before initialize()")]
    NotInitialized,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("normalization failed: {0}")]
    Normalization(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_the_offending_source() {
        let err = PipelineError::DuplicateSource("binance".to_string());
        assert_eq!(err.to_string(), "source `binance` is already registered");

        let err = PipelineError::Timeout { elapsed_ms: 1500 };
        assert_eq!(err.to_string(), "timed out after 1500ms");

        let err = PipelineError::Validation("price is not a number".to_string());
        assert_eq!(err.to_string(), "validation failed: price is not a number");

        let err = PipelineError::Config("missing sources section".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: missing sources section"
        );
    }

    #[test]
    fn errors_serialize_with_a_type_tag() {
        let value = serde_json::to_value(PipelineError::Timeout { elapsed_ms: 250 }).unwrap();
        assert_eq!(value["type"], "timeout");
        assert_eq!(value["detail"]["elapsed_ms"], 250);

        let value = serde_json::to_value(PipelineError::NotInitialized).unwrap();
        assert_eq!(value["type"], "not_initialized");
    }
}
