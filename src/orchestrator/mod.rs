//! Plan/execute orchestration: build a plan from a goal plus resonance
//! patches, compile to executor steps, run them sequentially, and classify
//! failures into a closed error set.

mod cache;
mod execute;
mod plan;

pub use cache::PlanCache;
pub use execute::{ExecutionOutcome, Executor, CANONICAL_EXECUTION_FALLBACK, CANONICAL_REFUSAL};
pub use plan::{build_plan, ResonanceBundle, ResonancePatch};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;

/// Closed execution-error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecErrorKind {
    ExecutionTimeout,
    ExecutionRateLimited,
    ExecutionAuth,
    ExecutionPolicy,
    ExecutionNetwork,
    ExecutionInvalidArgs,
    ExecutionToolContractMismatch,
    ExecutionPlaywrightCrash,
    ExecutionResourceExhaustion,
    ExecutionTool5xx,
    /// Fallback
    ExecutionToolError,
    /// The final step output did not match the routine's schema
    FinalOutputSchemaMismatch,
}

impl std::fmt::Display for ExecErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ExecutionTimeout => "execution_timeout",
            Self::ExecutionRateLimited => "execution_rate_limited",
            Self::ExecutionAuth => "execution_auth",
            Self::ExecutionPolicy => "execution_policy",
            Self::ExecutionNetwork => "execution_network",
            Self::ExecutionInvalidArgs => "execution_invalid_args",
            Self::ExecutionToolContractMismatch => "execution_tool_contract_mismatch",
            Self::ExecutionPlaywrightCrash => "execution_playwright_crash",
            Self::ExecutionResourceExhaustion => "execution_resource_exhaustion",
            Self::ExecutionTool5xx => "execution_tool_5xx",
            Self::ExecutionToolError => "execution_tool_error",
            Self::FinalOutputSchemaMismatch => "final_output_schema_mismatch",
        };
        write!(f, "{s}")
    }
}

/// Map a raw error message onto the closed taxonomy.
pub fn classify_error(message: &str) -> ExecErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        ExecErrorKind::ExecutionTimeout
    } else if lower.contains("rate limit") || lower.contains("429") {
        ExecErrorKind::ExecutionRateLimited
    } else if lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("401")
        || lower.contains("403")
        || lower.contains("auth")
    {
        ExecErrorKind::ExecutionAuth
    } else if lower.contains("policy") || lower.contains("refused") {
        ExecErrorKind::ExecutionPolicy
    } else if lower.contains("connection")
        || lower.contains("network")
        || lower.contains("dns")
        || lower.contains("unreachable")
    {
        ExecErrorKind::ExecutionNetwork
    } else if lower.contains("invalid arg") || lower.contains("missing param") {
        ExecErrorKind::ExecutionInvalidArgs
    } else if lower.contains("contract") || lower.contains("schema") {
        ExecErrorKind::ExecutionToolContractMismatch
    } else if lower.contains("playwright") {
        ExecErrorKind::ExecutionPlaywrightCrash
    } else if lower.contains("out of memory")
        || lower.contains("oom")
        || lower.contains("resource exhaust")
    {
        ExecErrorKind::ExecutionResourceExhaustion
    } else if lower.contains("500") || lower.contains("502") || lower.contains("503") {
        ExecErrorKind::ExecutionTool5xx
    } else {
        ExecErrorKind::ExecutionToolError
    }
}

/// Context handed to tool invocations.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub trace_id: String,
    pub session_id: Option<String>,
    /// Summaries of earlier steps referenced via `append_summaries`
    pub appended_summaries: Vec<String>,
}

/// A registered tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    async fn handle(&self, params: &Value, ctx: &ToolContext) -> Result<Value>;
}

/// Tool built from a closure, for boot-time registration.
pub struct FnTool<F> {
    name: String,
    version: String,
    handler: F,
}

impl<F> FnTool<F>
where
    F: Fn(&Value, &ToolContext) -> Result<Value> + Send + Sync,
{
    pub fn new(name: impl Into<String>, version: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            handler,
        }
    }
}

#[async_trait]
impl<F> Tool for FnTool<F>
where
    F: Fn(&Value, &ToolContext) -> Result<Value> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    async fn handle(&self, params: &Value, ctx: &ToolContext) -> Result<Value> {
        (self.handler)(params, ctx)
    }
}

/// Manifest map of tools, registered at boot.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Manifest entries as `name@version`, sorted.
    pub fn manifest(&self) -> Vec<String> {
        let mut entries: Vec<String> = self
            .tools
            .values()
            .map(|t| format!("{}@{}", t.name(), t.version()))
            .collect();
        entries.sort();
        entries
    }

    /// Deterministic tool selection for a goal.
    pub fn select_tool_for_goal(&self, goal: &str) -> Option<&str> {
        let lower = goal.to_lowercase();
        let preference = if lower.contains("viability") {
            "warp-viability"
        } else if lower.contains("warp") {
            "warp-ask"
        } else if lower.contains("grounding") || lower.contains("gravity") {
            "gr-grounding"
        } else {
            "helix-ask"
        };
        self.tools.get(preference).map(|t| t.name())
    }
}

/// One compiled plan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub tool: String,
    pub params: Value,
    /// Ids of earlier steps whose summaries embed into this step's context
    #[serde(default)]
    pub append_summaries: Vec<String>,
}

/// A cached plan record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub trace_id: String,
    pub goal: String,
    pub plan_dsl: String,
    pub plan_steps: Vec<PlanStep>,
    pub tool_manifest: Vec<String>,
    pub executor_steps: Vec<PlanStep>,
    pub strategy: String,
    /// Routine metadata, including the declared final output schema
    pub task_trace: Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_classification() {
        assert_eq!(classify_error("request timed out"), ExecErrorKind::ExecutionTimeout);
        assert_eq!(classify_error("HTTP 429 rate limited"), ExecErrorKind::ExecutionRateLimited);
        assert_eq!(classify_error("401 unauthorized"), ExecErrorKind::ExecutionAuth);
        assert_eq!(classify_error("connection refused"), ExecErrorKind::ExecutionNetwork);
        assert_eq!(classify_error("playwright crashed"), ExecErrorKind::ExecutionPlaywrightCrash);
        assert_eq!(classify_error("server returned 503"), ExecErrorKind::ExecutionTool5xx);
        assert_eq!(classify_error("mystery"), ExecErrorKind::ExecutionToolError);
    }

    #[tokio::test]
    async fn registry_registers_and_selects() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new("warp-ask", "1", |_, _| {
            Ok(serde_json::json!({"ok": true}))
        })));
        registry.register(Arc::new(FnTool::new("helix-ask", "1", |_, _| {
            Ok(serde_json::json!({"ok": true}))
        })));
        assert_eq!(registry.select_tool_for_goal("explain warp drive"), Some("warp-ask"));
        assert_eq!(registry.select_tool_for_goal("explain retrieval"), Some("helix-ask"));
        assert_eq!(registry.manifest(), vec!["helix-ask@1", "warp-ask@1"]);
    }
}
