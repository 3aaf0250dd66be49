//! Sequential plan execution with a final output-schema check.

use serde_json::{json, Value};
use std::collections::HashMap;

use crate::trajectory::ExecutionEnvelope;

use super::{classify_error, ExecErrorKind, PlanRecord, ToolContext, ToolRegistry};

/// Canonical refusal message, substituted for any output carrying a safety
/// refusal.
pub const CANONICAL_REFUSAL: &str =
    "Sorry, I cannot comply with that request. It conflicts with the operating policy.";

/// Canonical fallback for unrecovered execution failures.
pub const CANONICAL_EXECUTION_FALLBACK: &str =
    "The requested execution could not be completed. No partial result is available.";

/// Result of executing a plan.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub trace_id: String,
    pub envelopes: Vec<ExecutionEnvelope>,
    /// Output of the final step (post schema check)
    pub output: Value,
    /// Rationale for why the cited evidence belongs to the goal
    pub why_belongs: String,
    pub error: Option<ExecErrorKind>,
}

/// Sequential executor over a plan record.
pub struct Executor {
    registry: ToolRegistry,
}

impl Executor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Run the executor steps in order. A failing step records its
    /// classified error and the run continues with the canonical fallback as
    /// that step's output; the final step's output is checked against the
    /// routine-declared schema.
    pub async fn execute(&self, record: &PlanRecord, session_id: Option<String>) -> ExecutionOutcome {
        let mut summaries: HashMap<String, String> = HashMap::new();
        let mut envelopes = Vec::new();
        let mut last_output = Value::Null;
        let mut terminal_error: Option<ExecErrorKind> = None;

        for step in &record.executor_steps {
            let appended: Vec<String> = step
                .append_summaries
                .iter()
                .filter_map(|id| summaries.get(id).cloned())
                .collect();
            let ctx = ToolContext {
                trace_id: record.trace_id.clone(),
                session_id: session_id.clone(),
                appended_summaries: appended,
            };

            let outcome = match self.registry.get(&step.tool) {
                Some(tool) => tool.handle(&step.params, &ctx).await,
                None => Err(crate::error::Error::internal(format!(
                    "tool contract mismatch: {} not registered",
                    step.tool
                ))),
            };

            match outcome {
                Ok(mut output) => {
                    if output_is_refusal(&output) {
                        output = json!({ "text": CANONICAL_REFUSAL });
                    }
                    let summary = summarize(&output);
                    envelopes.push(ExecutionEnvelope {
                        step: step.id.clone(),
                        ok: true,
                        error_kind: None,
                        output_chars: summary.len(),
                    });
                    summaries.insert(step.id.clone(), summary);
                    last_output = output;
                    terminal_error = None;
                }
                Err(err) => {
                    let kind = classify_error(&err.to_string());
                    tracing::warn!(step = %step.id, error = %err, kind = %kind, "step failed");
                    envelopes.push(ExecutionEnvelope {
                        step: step.id.clone(),
                        ok: false,
                        error_kind: Some(kind.to_string()),
                        output_chars: 0,
                    });
                    summaries.insert(step.id.clone(), CANONICAL_EXECUTION_FALLBACK.to_string());
                    last_output = json!({ "text": CANONICAL_EXECUTION_FALLBACK });
                    terminal_error = Some(kind);
                }
            }
        }

        // Final schema check against the routine's declaration.
        let error = match terminal_error {
            Some(kind) => Some(kind),
            None => {
                if schema_matches(&record.task_trace, &last_output) {
                    None
                } else {
                    envelopes.push(ExecutionEnvelope {
                        step: "final-schema".to_string(),
                        ok: false,
                        error_kind: Some(ExecErrorKind::FinalOutputSchemaMismatch.to_string()),
                        output_chars: 0,
                    });
                    Some(ExecErrorKind::FinalOutputSchemaMismatch)
                }
            }
        };

        let why_belongs = build_why_belongs(record, &last_output);

        ExecutionOutcome {
            trace_id: record.trace_id.clone(),
            envelopes,
            output: last_output,
            why_belongs,
            error,
        }
    }
}

/// True when the declared final schema's keys are all present.
fn schema_matches(task_trace: &Value, output: &Value) -> bool {
    let Some(declared) = task_trace.get("final_schema").and_then(Value::as_array) else {
        return true;
    };
    let Some(map) = output.as_object() else {
        return false;
    };
    declared
        .iter()
        .filter_map(Value::as_str)
        .all(|key| map.contains_key(key))
}

fn output_is_refusal(output: &Value) -> bool {
    let text = output
        .get("text")
        .and_then(Value::as_str)
        .or_else(|| output.as_str())
        .unwrap_or_default()
        .to_lowercase();
    text.contains("i cannot comply") || text.contains("i can't help with") || text.contains("i refuse to")
}

fn summarize(output: &Value) -> String {
    let text = output
        .get("summary")
        .or_else(|| output.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| output.to_string());
    text.chars().take(400).collect()
}

fn build_why_belongs(record: &PlanRecord, output: &Value) -> String {
    let citations = output
        .get("citations")
        .and_then(Value::as_array)
        .map(|a| a.len())
        .unwrap_or(0);
    format!(
        "Plan `{}` answered the goal \"{}\" via {} steps with {citations} grounded citations.",
        record.strategy,
        record.goal,
        record.executor_steps.len()
    )
}
