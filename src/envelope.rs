//! Answer envelope: the bounded structured response.

use serde::{Deserialize, Serialize};

use crate::answer::AnswerFormat;
use crate::intent::IntentTier;

/// Envelope verbosity mode, derived from answer size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeMode {
    Brief,
    Standard,
    Extended,
}

/// The bounded response packaged at the end of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEnvelope {
    pub answer_text: String,
    pub format: AnswerFormat,
    pub tier: IntentTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_tier: Option<IntentTier>,
    pub mode: EnvelopeMode,
    /// Evidence files or chunk ids cited by the pack, bounded
    pub evidence_refs: Vec<String>,
    pub trace_id: String,
}

/// Evidence refs are capped so the envelope stays bounded.
const MAX_EVIDENCE_REFS: usize = 8;
const BRIEF_CHARS: usize = 700;
const STANDARD_CHARS: usize = 2200;

/// Build the envelope. Deterministic given its inputs.
pub fn build_envelope(
    answer_text: &str,
    format: AnswerFormat,
    tier: IntentTier,
    secondary_tier: Option<IntentTier>,
    evidence_refs: &[String],
    trace_id: &str,
) -> AnswerEnvelope {
    let mode = if answer_text.len() <= BRIEF_CHARS {
        EnvelopeMode::Brief
    } else if answer_text.len() <= STANDARD_CHARS {
        EnvelopeMode::Standard
    } else {
        EnvelopeMode::Extended
    };
    AnswerEnvelope {
        answer_text: answer_text.to_string(),
        format,
        tier,
        secondary_tier,
        mode,
        evidence_refs: evidence_refs.iter().take(MAX_EVIDENCE_REFS).cloned().collect(),
        trace_id: trace_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_is_deterministic() {
        let refs = vec!["docs/a.md".to_string()];
        let a = build_envelope("short", AnswerFormat::Brief, IntentTier::F1, None, &refs, "t-1");
        let b = build_envelope("short", AnswerFormat::Brief, IntentTier::F1, None, &refs, "t-1");
        assert_eq!(a, b);
        assert_eq!(a.mode, EnvelopeMode::Brief);
    }

    #[test]
    fn mode_scales_with_length() {
        let refs = Vec::new();
        let long = "x".repeat(3000);
        let e = build_envelope(&long, AnswerFormat::Steps, IntentTier::F1, None, &refs, "t");
        assert_eq!(e.mode, EnvelopeMode::Extended);
    }

    #[test]
    fn evidence_refs_are_capped() {
        let refs: Vec<String> = (0..20).map(|i| format!("docs/{i}.md")).collect();
        let e = build_envelope("a", AnswerFormat::Brief, IntentTier::F0, None, &refs, "t");
        assert_eq!(e.evidence_refs.len(), 8);
    }
}
