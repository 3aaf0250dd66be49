//! The gate stack: grounding discipline over the current answer and
//! evidence.
//!
//! Gates either fail closed (the pipeline replaces the answer with a clarify
//! line), downgrade the intent domain, or annotate debug only. Every gate
//! observes the monotonically accumulated evidence of its request.

pub mod ambiguity;
pub mod arbiter;
pub mod belief;
pub mod claims;
pub mod evidence;
pub mod format;
pub mod lint;
pub mod rattling;
pub mod slots;

pub use ambiguity::{ambiguity_gate, resolve_pre_intent};
pub use arbiter::{Arbiter, ArbiterDecision, ArbiterSignals};
pub use belief::{belief_gate, BeliefGateResult, BeliefGraph};
pub use claims::{claim_gate, ClaimCheck, ClaimGateResult};
pub use evidence::{evidence_gate, EvidenceGateResult};
pub use format::enforce_format;
pub use lint::{lint_answer, LintResult};
pub use rattling::{rattling_gate, RattlingResult};
pub use slots::{must_include_gate, slot_coverage_gate, verification_anchor_gate, SlotGateResult};

use serde::{Deserialize, Serialize};

/// One gate's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub name: String,
    pub pass: bool,
}

impl GateOutcome {
    pub fn new(name: impl Into<String>, pass: bool) -> Self {
        Self {
            name: name.into(),
            pass,
        }
    }
}

/// Numeric signals accumulated across the stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateMetrics {
    pub match_ratio: f64,
    pub matched_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_support_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsupported_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rattling_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_confidence: Option<f64>,
}

/// Full report over a request, attached to the trajectory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub gates: Vec<GateOutcome>,
    pub metrics: GateMetrics,
    /// Every gate passed
    pub accepted: bool,
    pub notes: Vec<String>,
}

impl GateReport {
    /// Record a gate outcome.
    pub fn record(&mut self, name: impl Into<String>, pass: bool) {
        self.gates.push(GateOutcome::new(name, pass));
        self.accepted = self.gates.iter().all(|g| g.pass);
    }

    /// Attach a human-readable note.
    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Look up a recorded outcome by name.
    pub fn passed(&self, name: &str) -> Option<bool> {
        self.gates.iter().find(|g| g.name == name).map(|g| g.pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_tracks_all_gates() {
        let mut report = GateReport::default();
        report.record("evidence", true);
        assert!(report.accepted);
        report.record("claims", false);
        assert!(!report.accepted);
        assert_eq!(report.passed("claims"), Some(false));
        assert_eq!(report.passed("missing"), None);
    }
}
