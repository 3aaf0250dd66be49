//! Tool-log endpoints: keyed queries, SSE streaming, and rate-limited
//! ingest.

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::error::Error;
use crate::toollog::ToolLogQuery;

use super::{ApiError, SharedState};

/// `GET /tools/logs` — keyed query over the ring.
pub async fn query_logs(
    State(state): State<SharedState>,
    Query(query): Query<ToolLogQuery>,
) -> Json<Value> {
    let events = state.toollog.query(&query).await;
    Json(json!({ "events": events }))
}

/// `GET /tools/logs/stream` — SSE fan-out in server seq order.
pub async fn stream_logs(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let receiver = state.toollog.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(|item| match item {
        Ok(event) => {
            let data = serde_json::to_string(&event).ok()?;
            Some(Ok(Event::default().id(event.seq.to_string()).data(data)))
        }
        // A lagging subscriber drops events rather than blocking the ring.
        Err(BroadcastStreamRecvError::Lagged(_)) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestBody {
    pub tool: String,
    pub tenant_id: Option<String>,
    pub session_id: Option<String>,
    pub trace_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// `POST /tools/logs/ingest` — append an event, rate-limited per tenant.
pub async fn ingest_log(
    State(state): State<SharedState>,
    Json(body): Json<IngestBody>,
) -> Result<Json<Value>, ApiError> {
    let tenant = body.tenant_id.clone().unwrap_or_else(|| "default".to_string());
    if !state.limiter.allow(&tenant).await {
        return Err(Error::Config(format!("ingest rate limit exceeded for {tenant}")).into());
    }
    let event = state
        .toollog
        .append(
            body.tool,
            body.tenant_id,
            body.session_id,
            body.trace_id,
            body.payload,
        )
        .await;
    Ok(Json(json!({ "ok": true, "seq": event.seq })))
}
