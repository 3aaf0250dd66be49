//! Async Ask jobs: create, poll, and background execution with partial
//! streaming.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::time::Duration;

use crate::jobs::JobResult;

use super::ask::AskBody;
use super::{ApiError, SharedState};

/// `POST /ask/jobs` — 202 with the queued job; the pipeline runs in the
/// background and streams partials into the record.
pub async fn create_job(
    State(state): State<SharedState>,
    Json(body): Json<AskBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.into_request()?;
    let job = state
        .jobs
        .create(
            request.session_id.clone(),
            request.trace_id.clone(),
            Some(request.question.clone()),
        )
        .await;

    let job_id = job.id.clone();
    let state_bg = state.clone();
    tokio::spawn(async move {
        run_job(state_bg, job_id, request).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "jobId": job.id,
            "status": job.status,
            "sessionId": job.session_id,
            "traceId": job.trace_id,
        })),
    ))
}

async fn run_job(state: SharedState, job_id: String, request: crate::pipeline::AskRequest) {
    if !state.jobs.mark_running(&job_id).await {
        return;
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(32);
    let jobs = state.jobs.clone();
    let append_id = job_id.clone();
    let appender = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            jobs.append_partial(&append_id, &chunk).await;
        }
    });

    let timeout = Duration::from_millis(state.settings.job_timeout_ms);
    let outcome = tokio::time::timeout(timeout, state.pipeline.run(&request, Some(tx))).await;
    let _ = appender.await;

    match outcome {
        Ok(Ok(outcome)) => {
            let envelope = outcome
                .envelope
                .as_ref()
                .and_then(|e| serde_json::to_value(e).ok());
            state
                .jobs
                .complete(
                    &job_id,
                    JobResult {
                        text: outcome.text,
                        envelope,
                    },
                )
                .await;
        }
        Ok(Err(err)) => {
            state.jobs.fail(&job_id, err.code()).await;
        }
        Err(_) => {
            state.jobs.fail(&job_id, "helix_ask_timeout").await;
        }
    }
}

/// `GET /ask/jobs/:job_id`.
pub async fn get_job(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state
        .jobs
        .get(&job_id)
        .await
        .ok_or(crate::error::Error::JobNotFound(job_id))?;
    Ok(Json(json!({
        "jobId": job.id,
        "status": job.status,
        "createdAt": job.created_at,
        "updatedAt": job.updated_at,
        "expiresAt": job.expires_at,
        "sessionId": job.session_id,
        "traceId": job.trace_id,
        "partialText": job.partial_text,
        "error": job.error,
        "result": job.result,
    })))
}
