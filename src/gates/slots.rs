//! Slot coverage, must-include, and verification-anchor gates.

use crate::intent::Strategy;
use crate::planner::RequiredSlot;
use crate::retrieval::EvidencePack;

/// Result of the slot coverage gate.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotGateResult {
    pub pass: bool,
    pub missing: Vec<RequiredSlot>,
}

const VERIFICATION_VOCAB: &[&str] = &["verify", "verification", "test", "assert", "check", "gate"];
const FAILURE_VOCAB: &[&str] = &["fail", "failure", "error", "fallback", "clarify", "timeout"];
const FLOW_VOCAB: &[&str] = &["pipeline", "stage", "flow", "step", "then", "sequence"];

/// Test each required slot against a slot-specific signal on the context.
pub fn slot_coverage_gate(
    required: &[RequiredSlot],
    pack: &EvidencePack,
    concept_label: Option<&str>,
) -> SlotGateResult {
    let haystack = pack.haystack();
    let mut missing = Vec::new();

    for slot in required {
        let present = match slot {
            RequiredSlot::Definition => {
                haystack.contains("defined as")
                    || haystack.contains("definition")
                    || concept_label
                        .map(|l| haystack.contains(&l.to_lowercase()))
                        .unwrap_or(false)
            }
            RequiredSlot::RepoMapping => pack.files.iter().any(|f| f.contains('/')),
            RequiredSlot::Verification => VERIFICATION_VOCAB.iter().any(|w| haystack.contains(w)),
            RequiredSlot::FailurePath => FAILURE_VOCAB.iter().any(|w| haystack.contains(w)),
            RequiredSlot::Flow => FLOW_VOCAB.iter().any(|w| haystack.contains(w)),
        };
        if !present {
            missing.push(*slot);
        }
    }

    SlotGateResult {
        pass: missing.is_empty(),
        missing,
    }
}

/// Must-include gate: the retriever already verified coverage; the gate
/// re-reports it so failures show up in the gate report.
pub fn must_include_gate(pack: &EvidencePack) -> bool {
    pack.metrics.must_include_ok
}

/// Anchor paths per strategy; contexts for these intents must cite one.
fn anchors_for(strategy: Strategy) -> &'static [&'static str] {
    match strategy {
        Strategy::EndpointLookup => &["server/routes/agi.plan.ts", "server/routes/"],
        Strategy::PipelineOverview => &["docs/helix-ask-flow.md", "server/services/helix-ask/"],
        _ => &[],
    }
}

/// Verification-anchor gate. Returns `None` when the strategy declares no
/// anchors (gate not applicable), otherwise the pass verdict.
pub fn verification_anchor_gate(strategy: Strategy, pack: &EvidencePack) -> Option<bool> {
    let anchors = anchors_for(strategy);
    if anchors.is_empty() {
        return None;
    }
    Some(
        pack.files
            .iter()
            .any(|f| anchors.iter().any(|a| f == a || f.starts_with(a))),
    )
}
