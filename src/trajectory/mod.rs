//! Trajectories: ordered records of plan/execute runs emitted to the
//! training store under the alpha-governor admission policy.

mod governor;
mod store;

pub use governor::{AdmitDecision, AlphaGovernor};
pub use store::TraceStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gates::GateReport;
use crate::retrieval::RetrievalMetrics;

/// Where a trace came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOrigin {
    /// Produced by a live user request
    Live,
    /// Produced by a variant/replay run
    Variant,
}

impl std::fmt::Display for TraceOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Variant => write!(f, "variant"),
        }
    }
}

impl TraceOrigin {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "live" => Some(Self::Live),
            "variant" => Some(Self::Variant),
            _ => None,
        }
    }
}

/// One executed step's envelope inside a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEnvelope {
    pub step: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub output_chars: usize,
}

/// A full trajectory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub id: String,
    pub goal: String,
    pub intent_tags: Vec<String>,
    /// Evidence files or chunk ids consulted
    pub evidence: Vec<String>,
    /// Citations surviving into the final answer
    pub citations: Vec<String>,
    pub retrieval: RetrievalMetrics,
    pub envelopes: Vec<ExecutionEnvelope>,
    pub gates: GateReport,
    pub origin: TraceOrigin,
    pub created_at: DateTime<Utc>,
}

impl Trajectory {
    /// Start a trajectory for a goal.
    pub fn new(goal: impl Into<String>, origin: TraceOrigin) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            goal: goal.into(),
            intent_tags: Vec::new(),
            evidence: Vec::new(),
            citations: Vec::new(),
            retrieval: RetrievalMetrics::default(),
            envelopes: Vec::new(),
            gates: GateReport::default(),
            origin,
            created_at: Utc::now(),
        }
    }

    /// Fraction of evidence files that ended up cited.
    pub fn citation_completion(&self) -> f64 {
        if self.evidence.is_empty() {
            return 0.0;
        }
        let cited = self
            .evidence
            .iter()
            .filter(|e| {
                self.citations
                    .iter()
                    .any(|c| crate::answer::citation_matches(c, e))
            })
            .count();
        cited as f64 / self.evidence.len() as f64
    }
}

/// Emits trajectories to the training store under the governor.
pub struct TrajectoryEmitter {
    store: std::sync::Arc<TraceStore>,
    governor: AlphaGovernor,
}

impl TrajectoryEmitter {
    pub fn new(store: std::sync::Arc<TraceStore>, governor: AlphaGovernor) -> Self {
        Self { store, governor }
    }

    /// Admit or deny a trajectory. Admission persists the full record;
    /// denial persists a minimal block record and reports the ratios.
    pub fn emit(&self, trajectory: &Trajectory) -> crate::error::Result<AdmitDecision> {
        let recent = self.store.recent_origins(self.governor.window())?;
        let decision = self.governor.evaluate(trajectory.origin, &recent);
        match &decision {
            AdmitDecision::Admit => {
                self.store.append_trajectory(trajectory)?;
                tracing::info!(id = %trajectory.id, origin = %trajectory.origin, "trajectory admitted");
            }
            AdmitDecision::Deny { run, .. } => {
                self.store
                    .append_block_record(&trajectory.id, trajectory.origin, *run)?;
                tracing::info!(id = %trajectory.id, run = run, "trajectory blocked by alpha governor");
            }
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citation_completion_counts_suffix_matches() {
        let mut t = Trajectory::new("goal", TraceOrigin::Live);
        t.evidence = vec![
            "server/services/helix-ask/envelope.ts".to_string(),
            "docs/flow.md".to_string(),
        ];
        t.citations = vec!["helix-ask/envelope.ts".to_string()];
        assert!((t.citation_completion() - 0.5).abs() < f64::EPSILON);
    }
}
