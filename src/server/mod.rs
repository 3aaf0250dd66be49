//! HTTP surface: routes, shared state, and the JSON error envelope.

mod ask;
mod jobs;
mod mood;
mod plan;
mod proxy;
mod telemetry;
mod tools;

pub use telemetry::TelemetryStore;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::error::Error;
use crate::jobs::JobStore;
use crate::llm::LlmClient;
use crate::orchestrator::{Executor, PlanCache, ToolRegistry};
use crate::pipeline::AskPipeline;
use crate::toollog::{IngestLimiter, ToolLogStore};
use crate::trajectory::{TraceStore, TrajectoryEmitter};

/// Shared application state, injected into every handler.
pub struct AppState {
    pub settings: Settings,
    pub pipeline: Arc<AskPipeline>,
    pub snapshot: Arc<crate::lattice::LatticeSnapshot>,
    pub jobs: Arc<JobStore>,
    pub toollog: Arc<ToolLogStore>,
    pub limiter: Arc<IngestLimiter>,
    pub plan_cache: Arc<PlanCache>,
    pub trace_store: Arc<TraceStore>,
    pub trajectory: Arc<TrajectoryEmitter>,
    pub registry: ToolRegistry,
    pub executor: Arc<Executor>,
    pub telemetry: Arc<TelemetryStore>,
    pub llm: Arc<dyn LlmClient>,
    pub http: reqwest::Client,
}

pub type SharedState = Arc<AppState>;

/// JSON error envelope. The Ask endpoints always answer JSON, never HTML.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({
            "ok": false,
            "error": self.0.code(),
            "message": self.0.to_string(),
            "status": status.as_u16(),
        });
        if let Error::AlphaGovernor {
            target,
            run,
            live,
            variant,
        } = &self.0
        {
            body["alphaTarget"] = json!(target);
            body["alphaRun"] = json!(run);
            body["alphaLive"] = json!(live);
            body["alphaVariant"] = json!(variant);
        }
        (status, Json(body)).into_response()
    }
}

/// Build the application router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ask", post(ask::ask))
        .route("/ask/jobs", post(jobs::create_job))
        .route("/ask/jobs/:job_id", get(jobs::get_job))
        .route("/plan", post(plan::build))
        .route("/execute", post(plan::execute))
        .route("/pipeline/status", get(plan::status))
        .route("/pipeline/last-plan-debug", get(plan::last_plan_debug))
        .route("/tools/logs", get(tools::query_logs))
        .route("/tools/logs/stream", get(tools::stream_logs))
        .route("/tools/logs/ingest", post(tools::ingest_log))
        .route("/console/telemetry", post(telemetry::ingest_console))
        .route("/telemetry/badges", get(telemetry::badges))
        .route("/telemetry/panels", get(telemetry::panels))
        .route("/local-call-spec", post(proxy::call_spec))
        .route("/tts/local", post(proxy::tts))
        .route("/stt/local", post(proxy::stt))
        .route("/mood-hint", post(mood::mood_hint))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}
