//! Tool-log store: an append-only ring with per-subscriber fan-out and a
//! per-tenant ingest rate limiter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// One tool-log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolLogEvent {
    /// Server-assigned sequence number; subscribers observe seq order
    pub seq: u64,
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Filter for keyed queries over the ring.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolLogQuery {
    pub tenant_id: Option<String>,
    pub session_id: Option<String>,
    pub trace_id: Option<String>,
    pub tool: Option<String>,
    /// Only events with seq greater than this
    pub after_seq: Option<u64>,
    pub limit: Option<usize>,
}

impl ToolLogQuery {
    fn matches(&self, event: &ToolLogEvent) -> bool {
        self.tenant_id
            .as_ref()
            .is_none_or(|t| event.tenant_id.as_ref() == Some(t))
            && self
                .session_id
                .as_ref()
                .is_none_or(|s| event.session_id.as_ref() == Some(s))
            && self
                .trace_id
                .as_ref()
                .is_none_or(|t| event.trace_id.as_ref() == Some(t))
            && self.tool.as_ref().is_none_or(|t| &event.tool == t)
            && self.after_seq.is_none_or(|s| event.seq > s)
    }
}

/// Append-only bounded ring of tool-log events with broadcast fan-out.
pub struct ToolLogStore {
    inner: Arc<RwLock<Ring>>,
    sender: broadcast::Sender<ToolLogEvent>,
}

struct Ring {
    events: VecDeque<ToolLogEvent>,
    capacity: usize,
    next_seq: u64,
}

impl ToolLogStore {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(RwLock::new(Ring {
                events: VecDeque::with_capacity(capacity),
                capacity,
                next_seq: 1,
            })),
            sender,
        }
    }

    /// Append an event; assigns the next seq and fans out to subscribers.
    pub async fn append(
        &self,
        tool: impl Into<String>,
        tenant_id: Option<String>,
        session_id: Option<String>,
        trace_id: Option<String>,
        payload: serde_json::Value,
    ) -> ToolLogEvent {
        let mut ring = self.inner.write().await;
        let event = ToolLogEvent {
            seq: ring.next_seq,
            tool: tool.into(),
            tenant_id,
            session_id,
            trace_id,
            payload,
            created_at: Utc::now(),
        };
        ring.next_seq += 1;
        if ring.events.len() == ring.capacity {
            ring.events.pop_front();
        }
        ring.events.push_back(event.clone());
        // Fan-out is best-effort; lagging subscribers drop events.
        let _ = self.sender.send(event.clone());
        event
    }

    /// Query the ring with a key filter, in seq order.
    pub async fn query(&self, query: &ToolLogQuery) -> Vec<ToolLogEvent> {
        let ring = self.inner.read().await;
        let limit = query.limit.unwrap_or(100);
        ring.events
            .iter()
            .filter(|e| query.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Subscribe to live events.
    pub fn subscribe(&self) -> broadcast::Receiver<ToolLogEvent> {
        self.sender.subscribe()
    }
}

/// Per-tenant token bucket with window reset.
pub struct IngestLimiter {
    buckets: Arc<RwLock<HashMap<String, Bucket>>>,
    capacity: u32,
    window_ms: u64,
}

struct Bucket {
    remaining: u32,
    window_start: DateTime<Utc>,
}

impl IngestLimiter {
    pub fn new(capacity: u32, window_ms: u64) -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            window_ms,
        }
    }

    /// Take one token for the tenant; false when the bucket is empty.
    pub async fn allow(&self, tenant: &str) -> bool {
        let now = Utc::now();
        let mut buckets = self.buckets.write().await;
        let bucket = buckets.entry(tenant.to_string()).or_insert(Bucket {
            remaining: self.capacity,
            window_start: now,
        });
        let elapsed_ms = (now - bucket.window_start).num_milliseconds().max(0) as u64;
        if elapsed_ms >= self.window_ms {
            bucket.remaining = self.capacity;
            bucket.window_start = now;
        }
        if bucket.remaining == 0 {
            return false;
        }
        bucket.remaining -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn seq_is_monotone_and_ring_bounded() {
        let store = ToolLogStore::new(3);
        for i in 0..5 {
            store
                .append("warp-ask", None, None, None, json!({ "i": i }))
                .await;
        }
        let events = store.query(&ToolLogQuery::default()).await;
        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
        assert_eq!(events[0].seq, 3);
    }

    #[tokio::test]
    async fn keyed_queries_filter() {
        let store = ToolLogStore::new(16);
        store
            .append("warp-ask", Some("t1".into()), None, Some("tr-1".into()), json!({}))
            .await;
        store
            .append("gr-grounding", Some("t2".into()), None, Some("tr-1".into()), json!({}))
            .await;
        let by_tenant = store
            .query(&ToolLogQuery {
                tenant_id: Some("t1".to_string()),
                ..Default::default()
            })
            .await;
        assert_eq!(by_tenant.len(), 1);
        let by_trace = store
            .query(&ToolLogQuery {
                trace_id: Some("tr-1".to_string()),
                ..Default::default()
            })
            .await;
        assert_eq!(by_trace.len(), 2);
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let store = ToolLogStore::new(16);
        let mut rx = store.subscribe();
        store.append("warp-ask", None, None, None, json!({})).await;
        store.append("warp-viability", None, None, None, json!({})).await;
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(first.seq < second.seq);
    }

    #[tokio::test]
    async fn limiter_enforces_capacity_and_resets() {
        let limiter = IngestLimiter::new(2, 10);
        assert!(limiter.allow("t1").await);
        assert!(limiter.allow("t1").await);
        assert!(!limiter.allow("t1").await);
        // A different tenant has its own bucket.
        assert!(limiter.allow("t2").await);
        tokio::time::sleep(std::time::Duration::from_millis(15)).await;
        assert!(limiter.allow("t1").await);
    }
}
