//! LLM client trait and implementations.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Error, Result};

use super::types::{CompletionRequest, CompletionResponse};

/// Client for a completion endpoint.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a prompt.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Context window of the backing model, in tokens.
    fn context_tokens(&self) -> u32;
}

/// Configuration for the local LLM endpoint.
#[derive(Debug, Clone)]
pub struct LocalLlmConfig {
    /// Base URL, e.g. `http://127.0.0.1:8080`
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Context window of the served model
    pub context_tokens: u32,
}

impl LocalLlmConfig {
    pub fn new(base_url: impl Into<String>, context_tokens: u32) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: 120,
            context_tokens,
        }
    }
}

/// Client for the local completion endpoint (`POST {base}/completion`).
pub struct LocalLlmClient {
    config: LocalLlmConfig,
    http: Client,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(alias = "content")]
    text: String,
    #[serde(default, alias = "tokens_evaluated")]
    prompt_tokens: u32,
    #[serde(default, alias = "tokens_predicted")]
    completion_tokens: u32,
}

impl LocalLlmClient {
    pub fn new(config: LocalLlmConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, http }
    }
}

#[async_trait]
impl LlmClient for LocalLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/completion", self.config.base_url.trim_end_matches('/'));
        let wire = WireRequest {
            prompt: &request.prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            seed: request.seed,
            stop: request.stop.as_deref(),
        };

        let response = self
            .http
            .post(&url)
            .json(&wire)
            .send()
            .await
            .map_err(|e| Error::llm(&request.label, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::llm(&request.label, e.to_string()))?;

        if !status.is_success() {
            return Err(Error::llm(
                &request.label,
                format!("status {status}: {body}"),
            ));
        }

        let wire: WireResponse = serde_json::from_str(&body)
            .map_err(|e| Error::llm(&request.label, format!("decode: {e}")))?;

        Ok(CompletionResponse {
            text: wire.text,
            prompt_tokens: wire.prompt_tokens,
            completion_tokens: wire.completion_tokens,
        })
    }

    fn context_tokens(&self) -> u32 {
        self.config.context_tokens
    }
}

/// Deterministic scripted client for tests and dry runs.
///
/// Responses are popped in order; errors can be interleaved to exercise the
/// overflow-retry path. Every request is recorded for inspection.
pub struct ScriptedLlm {
    script: Mutex<Vec<Result<CompletionResponse>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    /// Answer used once the script is exhausted, if set
    fallback: Mutex<Option<String>>,
    context_tokens: u32,
}

impl ScriptedLlm {
    /// Build a scripted client over a response queue (front first).
    pub fn new(responses: Vec<Result<CompletionResponse>>, context_tokens: u32) -> Self {
        let mut script = responses;
        script.reverse();
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
            fallback: Mutex::new(None),
            context_tokens,
        }
    }

    /// Scripted client that answers every request with the same text.
    pub fn repeating(text: impl Into<String>, context_tokens: u32) -> Self {
        let client = Self::new(Vec::new(), context_tokens);
        *client.fallback.lock().unwrap_or_else(|e| e.into_inner()) = Some(text.into());
        client
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of completion calls made.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop());
        match next {
            Some(result) => result,
            None => {
                let fallback = self
                    .fallback
                    .lock()
                    .ok()
                    .and_then(|f| f.clone());
                match fallback {
                    Some(text) => Ok(CompletionResponse {
                        prompt_tokens: (request.prompt.len() as u32).div_ceil(4),
                        completion_tokens: (text.len() as u32).div_ceil(4),
                        text,
                    }),
                    None => Err(Error::llm(&request.label, "script exhausted")),
                }
            }
        }
    }

    fn context_tokens(&self) -> u32 {
        self.context_tokens
    }
}
