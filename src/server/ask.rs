//! The synchronous ask endpoint.

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::pipeline::{AskOutcome, AskRequest};

use super::{ApiError, SharedState};

/// Wire shape of the ask body; `prompt` is accepted as an alias of
/// `question`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskBody {
    pub question: Option<String>,
    pub prompt: Option<String>,
    pub context: Option<String>,
    pub search_query: Option<String>,
    pub top_k: Option<usize>,
    #[serde(alias = "max_tokens")]
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub seed: Option<u64>,
    pub debug: Option<bool>,
    pub dry_run: Option<bool>,
    pub session_id: Option<String>,
    pub trace_id: Option<String>,
}

impl AskBody {
    pub fn into_request(self) -> Result<AskRequest, ApiError> {
        let question = self
            .question
            .or(self.prompt)
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| {
                ApiError(crate::error::Error::Config(
                    "question (or prompt) is required".to_string(),
                ))
            })?;
        Ok(AskRequest {
            question,
            context: self.context,
            search_query: self.search_query,
            top_k: self.top_k,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            seed: self.seed,
            debug: self.debug.unwrap_or(false),
            dry_run: self.dry_run.unwrap_or(false),
            session_id: self.session_id,
            trace_id: self.trace_id,
        })
    }
}

pub(super) fn outcome_body(outcome: &AskOutcome) -> Value {
    let mut body = json!({
        "text": outcome.text,
        "prompt_ingested": outcome.prompt_ingested,
        "mode": outcome.mode,
        "traceId": outcome.trace_id,
    });
    if let Some(envelope) = &outcome.envelope {
        body["envelope"] = serde_json::to_value(envelope).unwrap_or(Value::Null);
    }
    if let Some(debug) = &outcome.debug {
        body["debug"] = serde_json::to_value(debug).unwrap_or(Value::Null);
    }
    if let Some(source) = &outcome.prompt_ingest_source {
        body["prompt_ingest_source"] = json!(source);
    }
    if let Some(reason) = &outcome.prompt_ingest_reason {
        body["prompt_ingest_reason"] = json!(reason.to_string());
    }
    if outcome.dry_run {
        body["dry_run"] = json!(true);
    }
    body
}

/// `POST /ask`.
///
/// With keep-alive pings enabled the response body is streamed: whitespace
/// is emitted every ~15 s while the pipeline runs, then the JSON object.
/// Leading whitespace keeps the body valid JSON.
pub async fn ask(
    State(state): State<SharedState>,
    Json(body): Json<AskBody>,
) -> Result<Response, ApiError> {
    let request = body.into_request()?;

    if !state.settings.keepalive_pings {
        let outcome = state.pipeline.run(&request, None).await?;
        return Ok(Json(outcome_body(&outcome)).into_response());
    }

    let pipeline = state.pipeline.clone();
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<String, std::io::Error>>(8);
    tokio::spawn(async move {
        let mut work = Box::pin(pipeline.run(&request, None));
        loop {
            tokio::select! {
                outcome = &mut work => {
                    let payload = match outcome {
                        Ok(outcome) => outcome_body(&outcome).to_string(),
                        Err(err) => json!({
                            "ok": false,
                            "error": err.code(),
                            "message": err.to_string(),
                            "status": err.status(),
                        })
                        .to_string(),
                    };
                    let _ = tx.send(Ok(payload)).await;
                    break;
                }
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    if tx.send(Ok(" ".to_string())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let stream = tokio_stream::wrappers::ReceiverStream::new(rx);
    let response = Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError(crate::error::Error::internal(e.to_string())))?;
    Ok(response)
}
