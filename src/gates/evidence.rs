//! Evidence gate: question-token coverage of the retrieved context.

use crate::config::GateSettings;
use crate::retrieval::EvidencePack;
use crate::text::content_tokens;

/// Result of the evidence gate.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceGateResult {
    pub pass: bool,
    /// matched / total filtered question tokens
    pub match_ratio: f64,
    pub matched: usize,
    pub total: usize,
}

/// Check that enough filtered question tokens appear in the context.
///
/// Passes when `match_ratio >= min_ratio` and `matched >= min_tokens`. The
/// critic variant tightens both floors.
pub fn evidence_gate(question: &str, pack: &EvidencePack, settings: &GateSettings) -> EvidenceGateResult {
    let tokens = content_tokens(question);
    let haystack = pack.haystack();

    let matched = tokens
        .iter()
        .filter(|t| haystack.contains(t.as_str()))
        .count();
    let total = tokens.len().max(1);
    let match_ratio = matched as f64 / total as f64;

    let (min_ratio, min_tokens) = if settings.evidence_critic {
        (settings.evidence_min_ratio + 0.15, settings.evidence_min_tokens + 1)
    } else {
        (settings.evidence_min_ratio, settings.evidence_min_tokens)
    };

    EvidenceGateResult {
        pass: match_ratio >= min_ratio && matched >= min_tokens,
        match_ratio,
        matched,
        total: tokens.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{Candidate, Channel, RetrievalMetrics};

    fn pack(preview: &str) -> EvidencePack {
        EvidencePack::from_candidates(
            &[Candidate::new("docs/a.md", 1.0, preview, Channel::Lexical)],
            500,
            RetrievalMetrics::default(),
        )
    }

    #[test]
    fn passes_with_good_coverage() {
        let result = evidence_gate(
            "How does the alpha governor admit traces?",
            &pack("The alpha governor admits traces within a window."),
            &GateSettings::default(),
        );
        assert!(result.pass);
        assert!(result.match_ratio > 0.8);
    }

    #[test]
    fn fails_on_unrelated_context() {
        let result = evidence_gate(
            "How does the alpha governor admit traces?",
            &pack("Completely different subject matter."),
            &GateSettings::default(),
        );
        assert!(!result.pass);
    }

    #[test]
    fn critic_variant_is_stricter() {
        let mut settings = GateSettings::default();
        let borderline_pack = pack("alpha governor only");
        let loose = evidence_gate("alpha governor admit traces window", &borderline_pack, &settings);
        settings.evidence_critic = true;
        let strict = evidence_gate("alpha governor admit traces window", &borderline_pack, &settings);
        assert!(loose.match_ratio == strict.match_ratio);
        assert!(loose.pass || !strict.pass);
    }
}
