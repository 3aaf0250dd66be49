//! Error types for helix-ask.

use thiserror::Error;

/// Result type alias using helix-ask's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while answering a question.
#[derive(Error, Debug)]
pub enum Error {
    /// LLM endpoint error
    #[error("LLM error ({label}): {message}")]
    Llm { label: String, message: String },

    /// Prompt and requested output do not fit the model context window
    #[error("Context overflow: {prompt_tokens} prompt + {max_tokens} output tokens exceed capacity {capacity}")]
    ContextOverflow {
        prompt_tokens: u32,
        max_tokens: u32,
        capacity: u32,
    },

    /// Code-lattice snapshot could not be loaded
    #[error("Lattice snapshot error: {0}")]
    Lattice(String),

    /// Trace store error
    #[error("Trace store error: {0}")]
    TraceStore(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout during operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Unknown job id (or expired record)
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Unknown plan trace id
    #[error("Plan record not found: {0}")]
    PlanNotFound(String),

    /// Variant trace denied by the alpha governor
    #[error("Alpha governor engaged: run ratio {run:.3} below target {target:.3}")]
    AlphaGovernor {
        target: f64,
        run: f64,
        live: u64,
        variant: u64,
    },

    /// Upstream HTTP proxy failure
    #[error("Upstream HTTP error: {0}")]
    Http(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an LLM error for a labeled pass.
    pub fn llm(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Llm {
            label: label.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a lattice error.
    pub fn lattice(message: impl Into<String>) -> Self {
        Self::Lattice(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status code for the error, used by the JSON error envelope.
    pub fn status(&self) -> u16 {
        match self {
            Self::JobNotFound(_) | Self::PlanNotFound(_) => 404,
            Self::AlphaGovernor { .. } => 409,
            Self::Config(_) => 400,
            Self::Timeout { .. } => 504,
            _ => 500,
        }
    }

    /// Short machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Llm { .. } => "llm_error",
            Self::ContextOverflow { .. } => "context_overflow",
            Self::Lattice(_) => "lattice_unavailable",
            Self::TraceStore(_) => "trace_store_error",
            Self::Serialization(_) => "serialization_error",
            Self::Config(_) => "config_error",
            Self::Timeout { .. } => "timeout",
            Self::JobNotFound(_) => "job_not_found",
            Self::PlanNotFound(_) => "plan_not_found",
            Self::AlphaGovernor { .. } => "alpha_governor_engaged",
            Self::Http(_) => "upstream_http_error",
            Self::Internal(_) => "internal_error",
        }
    }
}
