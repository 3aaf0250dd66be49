//! Overflow retry runner: shrink context or output to fit the model window.
//!
//! Steps apply twice: predictively, before the first call, when the token
//! estimate already exceeds capacity; and reactively, when the endpoint
//! returns an error that looks like a context overflow. Exhausted steps
//! propagate the error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::OnceLock;

use crate::error::Result;
use crate::text::estimate_tokens;

use super::client::LlmClient;
use super::types::{CompletionRequest, CompletionResponse};

/// Marker that opens the answer block in synthesis prompts. The context-drop
/// step replaces everything between the `Context:` header and this marker.
pub const ANSWER_START: &str = "ANSWER_START";
/// Marker that closes the answer block.
pub const ANSWER_END: &str = "ANSWER_END";

const CONTEXT_HEADER: &str = "Context:";
const CONTEXT_OMITTED: &str = "Context omitted due to overflow.";

fn overflow_error_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(context|ctx|token|prompt too long|max context|n_ctx|exceed)").unwrap()
    })
}

/// Retry policy. Only one policy exists today; the name is kept in debug
/// output so traces stay comparable across configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    DropContextThenDropOutput,
}

impl std::fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DropContextThenDropOutput => write!(f, "drop_context_then_drop_output"),
        }
    }
}

/// One shrink step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStep {
    /// Replace the `Context:` section body with a single omission line
    DropContext,
    /// Reduce `max_tokens` to what the window still admits
    DropOutput,
}

/// Debug record of an overflow-retry invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverflowDebug {
    /// Steps applied, in order
    pub overflow_retry_steps: Vec<OverflowStep>,
    /// At least one step was applied
    pub applied: bool,
    /// Final prompt token estimate
    pub prompt_tokens: u32,
    /// Final output budget
    pub max_tokens: u32,
}

/// Generic invocation wrapper applying the overflow policy around a client.
pub struct OverflowRunner {
    client: Arc<dyn LlmClient>,
    policy: OverflowPolicy,
}

impl OverflowRunner {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            policy: OverflowPolicy::DropContextThenDropOutput,
        }
    }

    /// The active policy.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// The wrapped client.
    pub fn client(&self) -> &Arc<dyn LlmClient> {
        &self.client
    }

    /// Run a labeled completion under the overflow policy.
    ///
    /// `allow_context_drop` gates the first step; passes whose context is the
    /// whole point (evidence distillation) disable it and go straight to
    /// output shrinking.
    pub async fn run(
        &self,
        mut request: CompletionRequest,
        allow_context_drop: bool,
    ) -> Result<(CompletionResponse, OverflowDebug)> {
        let capacity = self.client.context_tokens();
        let mut overflow_debug = OverflowDebug::default();
        let mut steps = self.step_queue(allow_context_drop);

        // Predictive application: shrink before ever calling out.
        loop {
            let prompt_tokens = estimate_tokens(&request.prompt);
            if prompt_tokens + request.max_tokens <= capacity {
                break;
            }
            if !Self::apply_next(&mut steps, &mut request, capacity, &mut overflow_debug) {
                break;
            }
        }

        loop {
            match self.client.complete(request.clone()).await {
                Ok(response) => {
                    overflow_debug.prompt_tokens = estimate_tokens(&request.prompt);
                    overflow_debug.max_tokens = request.max_tokens;
                    overflow_debug.applied = !overflow_debug.overflow_retry_steps.is_empty();
                    return Ok((response, overflow_debug));
                }
                Err(err) => {
                    let message = err.to_string();
                    if !overflow_error_re().is_match(&message) {
                        return Err(err);
                    }
                    if !Self::apply_next(&mut steps, &mut request, capacity, &mut overflow_debug) {
                        return Err(err);
                    }
                    tracing::debug!(
                        label = %request.label,
                        steps = ?overflow_debug.overflow_retry_steps,
                        "overflow retry"
                    );
                }
            }
        }
    }

    fn step_queue(&self, allow_context_drop: bool) -> Vec<OverflowStep> {
        match self.policy {
            OverflowPolicy::DropContextThenDropOutput => {
                let mut steps = Vec::new();
                if allow_context_drop {
                    steps.push(OverflowStep::DropContext);
                }
                steps.push(OverflowStep::DropOutput);
                steps
            }
        }
    }

    /// Apply the next applicable step; false when none applies.
    fn apply_next(
        steps: &mut Vec<OverflowStep>,
        request: &mut CompletionRequest,
        capacity: u32,
        overflow_debug: &mut OverflowDebug,
    ) -> bool {
        while !steps.is_empty() {
            let step = steps.remove(0);
            match step {
                OverflowStep::DropContext => {
                    if let Some(shrunk) = drop_context_section(&request.prompt) {
                        request.prompt = shrunk;
                        overflow_debug.overflow_retry_steps.push(step);
                        return true;
                    }
                    // No context section; step not applicable, fall through.
                }
                OverflowStep::DropOutput => {
                    let prompt_tokens = estimate_tokens(&request.prompt);
                    let reduced = capacity
                        .saturating_sub(prompt_tokens)
                        .saturating_sub(8)
                        .min(request.max_tokens);
                    if reduced > 0 && reduced < request.max_tokens {
                        request.max_tokens = reduced;
                        overflow_debug.overflow_retry_steps.push(step);
                        return true;
                    }
                }
            }
        }
        false
    }
}

/// Replace the `Context:` section body (between its header and the
/// `ANSWER_START` marker) with the omission line. Returns `None` when the
/// prompt carries no context section.
fn drop_context_section(prompt: &str) -> Option<String> {
    let start = prompt.find(CONTEXT_HEADER)?;
    let body_start = start + CONTEXT_HEADER.len();
    let end = prompt[body_start..].find(ANSWER_START)? + body_start;
    // Nothing to drop when the section is already the omission line.
    if prompt[body_start..end].trim() == CONTEXT_OMITTED {
        return None;
    }
    let mut out = String::with_capacity(prompt.len());
    out.push_str(&prompt[..body_start]);
    out.push('\n');
    out.push_str(CONTEXT_OMITTED);
    out.push('\n');
    out.push_str(&prompt[end..]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;

    fn prompt_with_context(context: &str) -> String {
        format!(
            "You answer questions.\nQuestion: why?\nContext:\n{context}\nEmit between {ANSWER_START} and {ANSWER_END}."
        )
    }

    #[test]
    fn drop_context_replaces_section_once() {
        let prompt = prompt_with_context("block one\nblock two");
        let shrunk = drop_context_section(&prompt).unwrap();
        assert!(shrunk.contains(CONTEXT_OMITTED));
        assert!(!shrunk.contains("block one"));
        assert!(shrunk.contains("Question: why?"));
        // Second application is a no-op.
        assert!(drop_context_section(&shrunk).is_none());
    }

    #[tokio::test]
    async fn predictive_shrink_keeps_request_within_capacity() {
        let client = Arc::new(ScriptedLlm::repeating("ok", 64));
        let runner = OverflowRunner::new(client);
        let big_context = "x".repeat(4000);
        let request = CompletionRequest::new("answer", prompt_with_context(&big_context), 32);

        let (_, debug) = runner.run(request, true).await.unwrap();
        assert!(debug.applied);
        assert!(debug.overflow_retry_steps.contains(&OverflowStep::DropContext));
        assert!(debug.prompt_tokens + debug.max_tokens <= 64);
    }

    #[tokio::test]
    async fn reactive_retry_applies_next_step() {
        let client = Arc::new(ScriptedLlm::new(
            vec![
                Err(crate::error::Error::llm("answer", "prompt too long: n_ctx exceeded")),
                Ok(CompletionResponse {
                    text: "recovered".to_string(),
                    prompt_tokens: 10,
                    completion_tokens: 2,
                }),
            ],
            8192,
        ));
        let runner = OverflowRunner::new(client.clone());
        let request = CompletionRequest::new("answer", prompt_with_context("small"), 128);

        let (response, debug) = runner.run(request, true).await.unwrap();
        assert_eq!(response.text, "recovered");
        assert!(debug.applied);
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn non_overflow_errors_propagate() {
        let client = Arc::new(ScriptedLlm::new(
            vec![Err(crate::error::Error::llm("answer", "connection refused"))],
            8192,
        ));
        let runner = OverflowRunner::new(client);
        let request = CompletionRequest::new("answer", prompt_with_context("small"), 128);
        assert!(runner.run(request, true).await.is_err());
    }

    #[tokio::test]
    async fn exhausted_steps_propagate_overflow_error() {
        let client = Arc::new(ScriptedLlm::new(
            vec![
                Err(crate::error::Error::llm("answer", "n_ctx exceeded")),
                Err(crate::error::Error::llm("answer", "n_ctx exceeded")),
                Err(crate::error::Error::llm("answer", "n_ctx exceeded")),
            ],
            8192,
        ));
        let runner = OverflowRunner::new(client);
        let request = CompletionRequest::new("answer", prompt_with_context("small"), 128);
        let err = runner.run(request, true).await.unwrap_err();
        assert!(err.to_string().contains("n_ctx"));
    }
}
