//! Error types for course-forge operations.
//!
//! Defines the error types shared across subsystems:
//! - Generative service calls (streaming, rate limiting)
//! - Tolerant parsing of model output
//! - Checkpoint storage
//! - Document export
//! - Identifier validation
//!
//! Stage-level errors live next to the pipeline in [`crate::pipeline::PipelineError`].

use thiserror::Error;

/// Errors that can occur during generative service calls.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: {0} environment variable not set")]
    MissingApiKey(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LlmError {
    /// Returns true when the failure carries a rate-limit signature.
    ///
    /// A call is considered rate limited when the service answered with
    /// HTTP 429, reported a rate-limit error explicitly, or produced an
    /// error message mentioning "rate" (case-insensitive).
    pub fn is_rate_limited(&self) -> bool {
        match self {
            LlmError::RateLimited(_) => true,
            LlmError::ApiError { code: 429, .. } => true,
            other => {
                let message = other.to_string();
                message.contains("429") || message.to_lowercase().contains("rate")
            }
        }
    }
}

/// Errors produced by the tolerant parser and the record conversion layer.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The final parser error after all repair attempts, unmodified.
    #[error("Invalid JSON: {0}")]
    Invalid(#[from] serde_json::Error),

    /// The JSON parsed but did not have the expected shape.
    #[error("Unexpected shape for {record}: {message}")]
    Conversion { record: String, message: String },
}

/// Errors that can occur while reading or writing checkpoints.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid checkpoint key: {0}")]
    InvalidKey(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Checkpoint '{key}' is not valid UTF-8")]
    NotUtf8 { key: String },
}

/// Errors that can occur during document export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Tera template rendering error: {0}")]
    Tera(#[from] tera::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported document for {exporter} exporter: {kind}")]
    Unsupported { exporter: String, kind: String },

    #[error("Checkpoint error: {0}")]
    Store(#[from] StoreError),

    #[error("No syllabus found: run the syllabus stage first")]
    MissingSyllabus,
}

/// Errors raised by external identifier validators.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Validator request failed: {0}")]
    RequestFailed(String),

    #[error("Validator returned an invalid response: {0}")]
    InvalidResponse(String),
}
