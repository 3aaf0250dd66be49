//! helix-askd: the Helix Ask HTTP server.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use helix_ask::error::Result;
use helix_ask::orchestrator::{Executor, FnTool, PlanCache, Tool, ToolContext, ToolRegistry};
use helix_ask::server::{router, AppState, TelemetryStore};
use helix_ask::trajectory::{AlphaGovernor, TraceStore, TrajectoryEmitter};
use helix_ask::{
    AskPipeline, AskRequest, ConceptStore, IngestLimiter, IntentDirectory, JobStore,
    LatticeSnapshot, LocalLlmClient, LocalLlmConfig, Settings, ToolLogStore,
};

/// The answering engine exposed as an orchestrator tool.
struct AskTool {
    pipeline: Arc<AskPipeline>,
}

#[async_trait]
impl Tool for AskTool {
    fn name(&self) -> &str {
        "helix-ask"
    }

    fn version(&self) -> &str {
        "1"
    }

    async fn handle(&self, params: &Value, ctx: &ToolContext) -> Result<Value> {
        let question = params
            .get("question")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let context = if ctx.appended_summaries.is_empty() {
            None
        } else {
            Some(ctx.appended_summaries.join("\n\n"))
        };
        let request = AskRequest {
            question,
            context,
            trace_id: Some(ctx.trace_id.clone()),
            session_id: ctx.session_id.clone(),
            ..Default::default()
        };
        let outcome = self.pipeline.run(&request, None).await?;
        Ok(json!({
            "answer": outcome.text,
            "citations": outcome.citations,
            "why_belongs": format!(
                "Evidence drawn from {} files with mode {}.",
                outcome.evidence_files.len(),
                outcome.mode
            ),
        }))
    }
}

fn physics_tool(name: &'static str, summary: &'static str) -> Arc<dyn Tool> {
    Arc::new(FnTool::new(name, "1", move |params: &Value, _ctx: &ToolContext| {
        let goal = params
            .get("goal")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(json!({ "summary": format!("{summary} for goal: {goal}") }))
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::from_env();

    let snapshot = match std::env::var("HELIX_ASK_LATTICE_SNAPSHOT") {
        Ok(path) => match LatticeSnapshot::load(&path) {
            Ok(snapshot) => {
                tracing::info!(path, nodes = snapshot.len(), "lattice snapshot loaded");
                Arc::new(snapshot)
            }
            Err(err) => {
                tracing::warn!(path, error = %err, "lattice snapshot unavailable");
                Arc::new(LatticeSnapshot::empty())
            }
        },
        Err(_) => Arc::new(LatticeSnapshot::empty()),
    };

    let concepts = match std::env::var("HELIX_ASK_CONCEPT_CARDS") {
        Ok(path) => ConceptStore::load(&path).unwrap_or_else(|err| {
            tracing::warn!(path, error = %err, "concept cards unavailable, using builtin");
            ConceptStore::builtin()
        }),
        Err(_) => ConceptStore::builtin(),
    };

    let llm = Arc::new(LocalLlmClient::new(LocalLlmConfig::new(
        settings.llm_base_url.clone(),
        settings.local_context_tokens,
    )));

    let pipeline = Arc::new(AskPipeline::new(
        settings.clone(),
        llm.clone(),
        snapshot.clone(),
        concepts,
        IntentDirectory::builtin(),
    ));

    let trace_db =
        std::env::var("HELIX_ASK_TRACE_DB").unwrap_or_else(|_| "helix-traces.db".to_string());
    let trace_store = Arc::new(TraceStore::open(&trace_db)?);

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(AskTool {
        pipeline: pipeline.clone(),
    }));
    registry.register(physics_tool("warp-ask", "Warp field question answered"));
    registry.register(physics_tool("warp-viability", "Viability signal computed"));
    registry.register(physics_tool("gr-grounding", "GR grounding cross-checked"));

    let state = Arc::new(AppState {
        pipeline,
        snapshot,
        jobs: Arc::new(JobStore::new(settings.job_ttl_ms)),
        toollog: Arc::new(ToolLogStore::new(2048)),
        limiter: Arc::new(IngestLimiter::new(120, 60_000)),
        plan_cache: Arc::new(PlanCache::new(
            settings.plan_cache_ttl_ms,
            settings.plan_cache_max,
        )),
        trace_store: trace_store.clone(),
        trajectory: Arc::new(TrajectoryEmitter::new(
            trace_store,
            AlphaGovernor::new(settings.alpha.clone()),
        )),
        executor: Arc::new(Executor::new(registry.clone())),
        registry,
        telemetry: Arc::new(TelemetryStore::new(1024)),
        llm,
        http: reqwest::Client::new(),
        settings: settings.clone(),
    });

    // Background pruning of expired jobs and plan records.
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                let pruned_jobs = state.jobs.prune().await;
                let pruned_plans = state.plan_cache.prune();
                if pruned_jobs + pruned_plans > 0 {
                    tracing::debug!(pruned_jobs, pruned_plans, "pruned expired records");
                }
            }
        });
    }

    let addr = std::env::var("HELIX_ASK_ADDR").unwrap_or_else(|_| "0.0.0.0:5050".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| helix_ask::Error::Config(format!("bind {addr}: {e}")))?;
    tracing::info!(%addr, "helix-askd listening");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| helix_ask::Error::internal(e.to_string()))?;
    Ok(())
}
