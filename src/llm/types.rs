//! Request/response types for the local LLM endpoint.

use serde::{Deserialize, Serialize};

/// A single completion request against the local endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Full prompt text
    pub prompt: String,
    /// Output token budget
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Sampling seed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Pass label for debug attribution (`plan`, `repo_evidence`, `answer`, ...)
    #[serde(skip)]
    pub label: String,
}

impl CompletionRequest {
    /// Build a request with the given label and budget.
    pub fn new(label: impl Into<String>, prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            temperature: None,
            seed: None,
            stop: None,
            label: label.into(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

/// Completion response from the local endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text
    pub text: String,
    /// Tokens consumed by the prompt
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Tokens generated
    #[serde(default)]
    pub completion_tokens: u32,
}
