//! Plan/execute endpoints and pipeline status.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::Error;
use crate::orchestrator::{build_plan, ResonanceBundle, ResonancePatch};
use crate::trajectory::{AdmitDecision, TraceOrigin, Trajectory};

use super::{ApiError, SharedState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanBody {
    pub goal: String,
    pub session_id: Option<String>,
}

/// `POST /plan` — build a plan record from the goal and resonance bundle,
/// cache it, and persist the task trace.
pub async fn build(
    State(state): State<SharedState>,
    Json(body): Json<PlanBody>,
) -> Result<Json<Value>, ApiError> {
    let goal = body.goal.trim().to_string();
    if goal.is_empty() {
        return Err(Error::Config("goal is required".to_string()).into());
    }

    let resonance_timeout = Duration::from_millis(state.settings.resonance_build_timeout_ms);
    let snapshot = state.snapshot.clone();
    let goal_for_bundle = goal.clone();
    let resonance = tokio::time::timeout(resonance_timeout, async move {
        build_resonance(&goal_for_bundle, &snapshot)
    })
    .await
    .unwrap_or_default();

    let record = build_plan(&goal, &resonance, &state.registry);

    // Persist the task trace within its own ceiling; plan building still
    // succeeds if persistence is slow.
    let payload = serde_json::to_string(&record).map_err(Error::from)?;
    let store = state.trace_store.clone();
    let trace_id = record.trace_id.clone();
    let save = tokio::time::timeout(
        Duration::from_millis(state.settings.save_task_trace_timeout_ms),
        tokio::task::spawn_blocking(move || store.save_task_trace(&trace_id, &payload)),
    )
    .await;
    if save.is_err() {
        tracing::warn!(trace_id = %record.trace_id, "task trace persistence timed out");
    }

    state.plan_cache.insert(record.clone());

    Ok(Json(json!({
        "traceId": record.trace_id,
        "goal": record.goal,
        "plan_dsl": record.plan_dsl,
        "plan_steps": record.plan_steps,
        "tool_manifest": record.tool_manifest,
        "executor_steps": record.executor_steps,
        "strategy": record.strategy,
        "task_trace": record.task_trace,
    })))
}

/// Derive resonance patches from lattice nodes overlapping the goal.
fn build_resonance(goal: &str, snapshot: &crate::lattice::LatticeSnapshot) -> ResonanceBundle {
    let tokens = crate::text::content_tokens(goal);
    let mut patches = Vec::new();
    for (index, node) in snapshot.nodes().iter().enumerate() {
        let haystack = format!("{} {} {}", node.symbol, node.file_path, node.doc).to_lowercase();
        if tokens.iter().filter(|t| haystack.contains(t.as_str())).count() >= 2 {
            patches.push(ResonancePatch {
                node_index: index,
                summary: if node.doc.is_empty() {
                    node.signature.clone()
                } else {
                    node.doc.clone()
                },
                paths: vec![node.file_path.clone()],
            });
        }
        if patches.len() >= 4 {
            break;
        }
    }
    ResonanceBundle { patches }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBody {
    pub trace_id: String,
    #[serde(default)]
    pub debug_sources: bool,
    /// `live` (default) or `variant`
    pub origin: Option<String>,
}

/// `POST /execute` — run a cached plan, emit the trajectory under the alpha
/// governor, and return the grounded result.
pub async fn execute(
    State(state): State<SharedState>,
    Json(body): Json<ExecuteBody>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .plan_cache
        .get_or_rehydrate(&body.trace_id, &state.trace_store)
        .ok_or_else(|| Error::PlanNotFound(body.trace_id.clone()))?;

    let outcome = state.executor.execute(&record, None).await;

    let origin = body
        .origin
        .as_deref()
        .and_then(TraceOrigin::parse)
        .unwrap_or(TraceOrigin::Live);

    let mut trajectory = Trajectory::new(&record.goal, origin);
    trajectory.envelopes = outcome.envelopes.clone();
    trajectory.citations = outcome
        .output
        .get("citations")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    trajectory.evidence = trajectory.citations.clone();

    let decision = {
        let emitter = state.trajectory.clone();
        let trajectory = trajectory.clone();
        tokio::task::spawn_blocking(move || emitter.emit(&trajectory))
            .await
            .map_err(|e| Error::internal(e.to_string()))??
    };
    if let AdmitDecision::Deny {
        target,
        run,
        live,
        variant,
    } = decision
    {
        return Err(Error::AlphaGovernor {
            target,
            run,
            live,
            variant,
        }
        .into());
    }

    let mut response = json!({
        "traceId": outcome.trace_id,
        "output": outcome.output,
        "why_belongs": outcome.why_belongs,
        "envelopes": outcome.envelopes,
        "error": outcome.error.map(|e| e.to_string()),
    });
    if body.debug_sources {
        response["plan_dsl"] = json!(record.plan_dsl);
        response["tool_manifest"] = json!(record.tool_manifest);
    }
    Ok(Json(response))
}

/// `GET /pipeline/status`.
pub async fn status(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let accepted = {
        let store = state.trace_store.clone();
        tokio::task::spawn_blocking(move || store.accepted_count())
            .await
            .map_err(|e| Error::internal(e.to_string()))??
    };
    Ok(Json(json!({
        "ok": true,
        "lattice_nodes": state.snapshot.len(),
        "accepted_traces": accepted,
        "tool_manifest": state.registry.manifest(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastPlanQuery {
    pub trace_id: String,
}

/// `GET /pipeline/last-plan-debug?traceId=...`.
pub async fn last_plan_debug(
    State(state): State<SharedState>,
    Query(query): Query<LastPlanQuery>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .plan_cache
        .get_or_rehydrate(&query.trace_id, &state.trace_store)
        .ok_or_else(|| Error::PlanNotFound(query.trace_id.clone()))?;
    Ok(Json(json!({
        "traceId": record.trace_id,
        "goal": record.goal,
        "plan_dsl": record.plan_dsl,
        "strategy": record.strategy,
        "created_at": record.created_at,
    })))
}
