//! Console telemetry ingest and snapshot endpoints.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::collections::VecDeque;
use tokio::sync::RwLock;

use super::SharedState;

/// Bounded in-memory telemetry snapshot store.
pub struct TelemetryStore {
    events: RwLock<VecDeque<Value>>,
    capacity: usize,
}

impl TelemetryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub async fn ingest(&self, event: Value) {
        let mut events = self.events.write().await;
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub async fn snapshot(&self) -> Vec<Value> {
        self.events.read().await.iter().cloned().collect()
    }
}

/// `POST /console/telemetry`.
pub async fn ingest_console(
    State(state): State<SharedState>,
    Json(event): Json<Value>,
) -> Json<Value> {
    state.telemetry.ingest(event).await;
    Json(json!({ "ok": true }))
}

/// `GET /telemetry/badges` — counts per event kind.
pub async fn badges(State(state): State<SharedState>) -> Json<Value> {
    let events = state.telemetry.snapshot().await;
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for event in &events {
        let kind = event
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        *counts.entry(kind).or_insert(0) += 1;
    }
    Json(json!({ "badges": counts, "total": events.len() }))
}

/// `GET /telemetry/panels` — recent raw events for the console panels.
pub async fn panels(State(state): State<SharedState>) -> Json<Value> {
    let events = state.telemetry.snapshot().await;
    let recent: Vec<&Value> = events.iter().rev().take(50).collect();
    Json(json!({ "panels": recent }))
}
