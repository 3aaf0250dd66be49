//! Claim gate: per-claim support coverage over the context.
//!
//! Claims are the distilled evidence items; each is an atomic assertion the
//! synthesizer may rely on. A claim counts as supported when enough of its
//! signal tokens appear in the retrieved context.

use crate::answer::extract_citations;
use crate::config::GateSettings;
use crate::retrieval::EvidencePack;
use crate::text::content_tokens;

/// One claim with its support verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimCheck {
    pub text: String,
    pub supported: bool,
    /// Signal tokens found in context / total signal tokens
    pub coverage: f64,
}

/// Result of the claim gate.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimGateResult {
    pub pass: bool,
    pub checks: Vec<ClaimCheck>,
    pub supported: usize,
    pub total: usize,
    /// supported / total
    pub support_ratio: f64,
}

/// Evaluate claim support. The gate fails when `supported/total` drops below
/// the configured support ratio.
pub fn claim_gate(
    evidence_items: &[String],
    pack: &EvidencePack,
    settings: &GateSettings,
) -> ClaimGateResult {
    let haystack = pack.haystack();
    let mut checks = Vec::new();

    for item in evidence_items.iter().take(settings.claim_max) {
        // Signal tokens exclude the citation and its path fragments.
        let mut stripped = item.clone();
        for citation in extract_citations(item) {
            stripped = stripped.replace(&citation, "");
        }
        let signal: Vec<String> = content_tokens(&stripped)
            .into_iter()
            .filter(|t| !t.contains('/'))
            .collect();
        if signal.is_empty() {
            continue;
        }
        let hits = signal
            .iter()
            .filter(|t| haystack.contains(t.as_str()))
            .count();
        let coverage = hits as f64 / signal.len() as f64;
        checks.push(ClaimCheck {
            text: item.clone(),
            supported: coverage >= settings.claim_min_ratio && hits >= settings.claim_min_tokens,
            coverage,
        });
    }

    let total = checks.len();
    let supported = checks.iter().filter(|c| c.supported).count();
    let support_ratio = if total == 0 {
        1.0
    } else {
        supported as f64 / total as f64
    };

    ClaimGateResult {
        pass: support_ratio >= settings.claim_support_ratio,
        checks,
        supported,
        total,
        support_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{Candidate, Channel, RetrievalMetrics};

    fn pack() -> EvidencePack {
        EvidencePack::from_candidates(
            &[Candidate::new(
                "docs/governor.md",
                1.0,
                "The alpha governor counts accepted origins over a sliding window \
                 and denies variant traces beyond the target share.",
                Channel::Lexical,
            )],
            500,
            RetrievalMetrics::default(),
        )
    }

    #[test]
    fn supported_claims_pass() {
        let items = vec![
            "- The governor counts accepted origins (docs/governor.md)".to_string(),
            "- Variant traces beyond the target share are denied (docs/governor.md)".to_string(),
        ];
        let result = claim_gate(&items, &pack(), &GateSettings::default());
        assert!(result.pass);
        assert_eq!(result.supported, 2);
    }

    #[test]
    fn fabricated_claims_fail() {
        let items = vec![
            "- The governor deletes databases nightly (docs/governor.md)".to_string(),
            "- Kubernetes pods restart the governor hourly (docs/governor.md)".to_string(),
            "- The governor counts accepted origins (docs/governor.md)".to_string(),
        ];
        let result = claim_gate(&items, &pack(), &GateSettings::default());
        assert!(!result.pass);
        assert!(result.support_ratio < 0.6);
    }

    #[test]
    fn empty_items_pass_vacuously() {
        let result = claim_gate(&[], &pack(), &GateSettings::default());
        assert!(result.pass);
        assert_eq!(result.total, 0);
    }
}
