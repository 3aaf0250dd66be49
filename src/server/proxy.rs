//! Opaque proxies for the local call-spec, TTS, and STT services.

use axum::extract::State;
use axum::Json;
use serde_json::Value;
use std::time::Duration;

use crate::error::Error;

use super::{ApiError, SharedState};

async fn forward(
    state: &SharedState,
    url: Option<&str>,
    name: &str,
    body: Value,
) -> Result<Json<Value>, ApiError> {
    let url = url.ok_or_else(|| Error::Config(format!("{name} endpoint not configured")))?;
    let timeout = Duration::from_millis(state.settings.proxy.timeout_ms);

    let response = state
        .http
        .post(url)
        .timeout(timeout)
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                Error::timeout(state.settings.proxy.timeout_ms)
            } else {
                Error::Http(format!("{name}: {e}"))
            }
        })?;

    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| Error::Http(format!("{name} decode: {e}")))?;
    if !status.is_success() {
        return Err(Error::Http(format!("{name} returned {status}")).into());
    }
    Ok(Json(payload))
}

/// `POST /local-call-spec`.
pub async fn call_spec(
    State(state): State<SharedState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let url = state.settings.proxy.call_spec_url.clone();
    forward(&state, url.as_deref(), "call-spec", body).await
}

/// `POST /tts/local`.
pub async fn tts(
    State(state): State<SharedState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let url = state.settings.proxy.tts_url.clone();
    forward(&state, url.as_deref(), "tts", body).await
}

/// `POST /stt/local`.
pub async fn stt(
    State(state): State<SharedState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let url = state.settings.proxy.stt_url.clone();
    forward(&state, url.as_deref(), "stt", body).await
}
