//! Async Ask jobs: queued → running → (completed | failed), with partial
//! streaming and TTL expiry.
//!
//! Writes for a given job id are linearized behind the store lock;
//! `append_partial` is append-only, so a job's partial text is always a
//! prefix of the completed result.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Job lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Completed job payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<serde_json::Value>,
}

/// One async Ask job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub partial_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

/// In-memory job store with per-id linearized writes and TTL pruning.
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<String, JobRecord>>>,
    ttl: Duration,
}

impl JobStore {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::milliseconds(ttl_ms as i64),
        }
    }

    /// Create a queued job.
    pub async fn create(
        &self,
        session_id: Option<String>,
        trace_id: Option<String>,
        question: Option<String>,
    ) -> JobRecord {
        let now = Utc::now();
        let record = JobRecord {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            expires_at: now + self.ttl,
            session_id,
            trace_id,
            question,
            partial_text: String::new(),
            error: None,
            result: None,
        };
        self.jobs
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        record
    }

    /// Transition queued → running. False when the job is missing, expired,
    /// or already past queued.
    pub async fn mark_running(&self, id: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(id) {
            Some(job) if job.status == JobStatus::Queued && job.expires_at > Utc::now() => {
                job.status = JobStatus::Running;
                job.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Append a streamed chunk. Append-only; repeating an identical tail is
    /// harmless because concatenation preserves the prefix property.
    pub async fn append_partial(&self, id: &str, chunk: &str) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.status == JobStatus::Running {
                job.partial_text.push_str(chunk);
                job.updated_at = Utc::now();
            }
        }
    }

    /// Complete a job with its result.
    pub async fn complete(&self, id: &str, result: JobResult) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if matches!(job.status, JobStatus::Queued | JobStatus::Running) {
                job.status = JobStatus::Completed;
                job.result = Some(result);
                job.updated_at = Utc::now();
            }
        }
    }

    /// Fail a job with an error code.
    pub async fn fail(&self, id: &str, error: impl Into<String>) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if matches!(job.status, JobStatus::Queued | JobStatus::Running) {
                job.status = JobStatus::Failed;
                job.error = Some(error.into());
                job.updated_at = Utc::now();
            }
        }
    }

    /// Fetch a live record; expired records return nothing.
    pub async fn get(&self, id: &str) -> Option<JobRecord> {
        let jobs = self.jobs.read().await;
        jobs.get(id)
            .filter(|j| j.expires_at > Utc::now())
            .cloned()
    }

    /// Remove expired records; returns how many were pruned.
    pub async fn prune(&self) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        let now = Utc::now();
        jobs.retain(|_, j| j.expires_at > now);
        before - jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_queued_running_completed() {
        let store = JobStore::new(60_000);
        let job = store.create(None, None, Some("q".to_string())).await;
        assert_eq!(job.status, JobStatus::Queued);

        assert!(store.mark_running(&job.id).await);
        // Second transition is rejected.
        assert!(!store.mark_running(&job.id).await);

        store.append_partial(&job.id, "Hello").await;
        store.append_partial(&job.id, ", world").await;
        store
            .complete(
                &job.id,
                JobResult {
                    text: "Hello, world!".to_string(),
                    envelope: None,
                },
            )
            .await;

        let done = store.get(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        // Partial text is a prefix of the final result.
        assert!(done.result.unwrap().text.starts_with(&done.partial_text));
    }

    #[tokio::test]
    async fn failure_records_error() {
        let store = JobStore::new(60_000);
        let job = store.create(None, None, None).await;
        store.mark_running(&job.id).await;
        store.fail(&job.id, "helix_ask_timeout").await;
        let failed = store.get(&job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("helix_ask_timeout"));
    }

    #[tokio::test]
    async fn expired_records_vanish() {
        let store = JobStore::new(0);
        let job = store.create(None, None, None).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(store.get(&job.id).await.is_none());
        assert_eq!(store.prune().await, 1);
    }

    #[tokio::test]
    async fn completed_jobs_reject_further_writes() {
        let store = JobStore::new(60_000);
        let job = store.create(None, None, None).await;
        store.mark_running(&job.id).await;
        store
            .complete(
                &job.id,
                JobResult {
                    text: "done".to_string(),
                    envelope: None,
                },
            )
            .await;
        store.fail(&job.id, "late").await;
        store.append_partial(&job.id, "late").await;
        let record = store.get(&job.id).await.unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert!(record.error.is_none());
        assert_eq!(record.partial_text, "");
    }
}
