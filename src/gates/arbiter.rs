//! Arbiter: selects the final answer mode from retrieval confidence.

use serde::{Deserialize, Serialize};

use crate::config::ArbiterSettings;
use crate::intent::IntentDomain;
use crate::retrieval::{EvidencePack, RetrievalMetrics};

/// Final answer path selected by the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbiterDecision {
    RepoGrounded,
    Hybrid,
    General,
    Clarify,
}

impl std::fmt::Display for ArbiterDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RepoGrounded => "repo_grounded",
            Self::Hybrid => "hybrid",
            Self::General => "general",
            Self::Clarify => "clarify",
        };
        write!(f, "{s}")
    }
}

/// Signals feeding the confidence combination.
#[derive(Debug, Clone, Default)]
pub struct ArbiterSignals {
    pub match_ratio: f64,
    pub must_include_ok: bool,
    /// Share of context files under docs trees
    pub doc_share: f64,
    pub file_count: usize,
    /// Channels that produced candidates, out of four
    pub channel_coverage: f64,
    pub score_gap: f64,
    /// Physics viability flags, when the question touches them
    pub viability_ok: bool,
}

impl ArbiterSignals {
    /// Derive signals from the evidence pack and evidence-gate output.
    pub fn derive(pack: &EvidencePack, match_ratio: f64, viability_ok: bool) -> Self {
        let metrics: &RetrievalMetrics = &pack.metrics;
        let doc_files = pack.files.iter().filter(|f| f.starts_with("docs/")).count();
        let doc_share = if pack.files.is_empty() {
            0.0
        } else {
            doc_files as f64 / pack.files.len() as f64
        };
        Self {
            match_ratio,
            must_include_ok: metrics.must_include_ok,
            doc_share,
            file_count: pack.files.len(),
            channel_coverage: (metrics.channel_hits.len() as f64 / 4.0).min(1.0),
            score_gap: metrics.score_gap,
            viability_ok,
        }
    }
}

/// The arbiter.
pub struct Arbiter {
    settings: ArbiterSettings,
}

impl Arbiter {
    pub fn new(settings: ArbiterSettings) -> Self {
        Self { settings }
    }

    /// Bounded retrieval confidence.
    ///
    /// The term weights intentionally sum past 1.0; the combination clamps
    /// once at the end.
    pub fn confidence(&self, signals: &ArbiterSignals) -> f64 {
        let raw = 0.55 * signals.match_ratio
            + 0.15 * f64::from(u8::from(signals.must_include_ok))
            + 0.10 * signals.doc_share
            + 0.10 * (signals.file_count as f64 / 5.0).min(1.0)
            + 0.10 * signals.channel_coverage
            + 0.10 * (signals.score_gap * 50.0).min(1.0)
            + 0.05 * f64::from(u8::from(signals.viability_ok));
        raw.clamp(0.0, 1.0)
    }

    /// Select the final mode. Obligation violations force the downgrade
    /// chain repo → hybrid → clarify.
    pub fn decide(
        &self,
        signals: &ArbiterSignals,
        domain: IntentDomain,
        obligation: bool,
    ) -> (ArbiterDecision, f64) {
        let confidence = self.confidence(signals);

        let mode = if confidence >= self.settings.repo_threshold {
            ArbiterDecision::RepoGrounded
        } else if confidence >= self.settings.hybrid_threshold {
            ArbiterDecision::Hybrid
        } else if obligation {
            // Repo evidence was required but could not be confirmed.
            ArbiterDecision::Clarify
        } else {
            ArbiterDecision::General
        };

        // A repo-domain intent that missed the repo threshold downgrades one
        // step rather than answering ungrounded.
        let mode = match (domain, mode) {
            (IntentDomain::Repo, ArbiterDecision::General) => {
                if obligation {
                    ArbiterDecision::Clarify
                } else {
                    ArbiterDecision::Hybrid
                }
            }
            (_, m) => m,
        };

        (mode, confidence)
    }
}
