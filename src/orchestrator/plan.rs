//! Plan building: goal + resonance bundle → plan record.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::{PlanRecord, PlanStep, ToolRegistry};

/// One candidate patch from the code-lattice loader. Patches reference
/// lattice nodes by index and stay read-only during plan compile.
#[derive(Debug, Clone, PartialEq)]
pub struct ResonancePatch {
    pub node_index: usize,
    pub summary: String,
    pub paths: Vec<String>,
}

/// The resonance bundle consulted while planning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResonanceBundle {
    pub patches: Vec<ResonancePatch>,
}

/// Goals whose intent warrants the physics tool steps.
fn wants_physics(goal: &str) -> bool {
    let lower = goal.to_lowercase();
    lower.contains("warp") || lower.contains("viability") || lower.contains("grounding")
}

/// The injected physics step triple.
const PHYSICS_STEPS: &[&str] = &["warp-ask", "warp-viability", "gr-grounding"];

/// Build a plan record for a goal.
///
/// The core step asks the answering engine; resonance patches contribute a
/// context step each. When the goal warrants, the three physics tool steps
/// are injected ahead of the core step, and every following step receives
/// the injected ids in `append_summaries` so its output embeds theirs.
pub fn build_plan(goal: &str, resonance: &ResonanceBundle, registry: &ToolRegistry) -> PlanRecord {
    let trace_id = Uuid::new_v4().to_string();
    let mut steps: Vec<PlanStep> = Vec::new();

    for (i, patch) in resonance.patches.iter().enumerate() {
        steps.push(PlanStep {
            id: format!("resonance-{i}"),
            tool: "lattice-context".to_string(),
            params: json!({
                "node_index": patch.node_index,
                "summary": patch.summary,
                "paths": patch.paths,
            }),
            append_summaries: Vec::new(),
        });
    }

    let mut injected: Vec<String> = Vec::new();
    if wants_physics(goal) {
        for name in PHYSICS_STEPS {
            let id = format!("physics-{name}");
            steps.push(PlanStep {
                id: id.clone(),
                tool: name.to_string(),
                params: json!({ "goal": goal }),
                append_summaries: injected.clone(),
            });
            injected.push(id);
        }
    }

    let core_tool = registry.select_tool_for_goal(goal).unwrap_or("helix-ask");
    steps.push(PlanStep {
        id: "answer".to_string(),
        tool: core_tool.to_string(),
        params: json!({ "question": goal }),
        append_summaries: injected.clone(),
    });

    let plan_dsl = steps
        .iter()
        .map(|s| format!("step {}: {}", s.id, s.tool))
        .collect::<Vec<_>>()
        .join("\n");

    let strategy = if wants_physics(goal) {
        "physics_grounded"
    } else {
        "answer_first"
    };

    PlanRecord {
        trace_id,
        goal: goal.to_string(),
        plan_dsl,
        executor_steps: steps.clone(),
        plan_steps: steps,
        tool_manifest: registry.manifest(),
        strategy: strategy.to_string(),
        task_trace: json!({
            "final_schema": ["answer", "citations", "why_belongs"],
        }),
        created_at: Utc::now(),
    }
}
