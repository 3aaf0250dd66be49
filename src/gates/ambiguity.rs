//! Ambiguity handling: the pre-intent resolver and the post-retrieval gate.

use crate::concepts::ConceptMatch;
use crate::config::GateSettings;
use crate::retrieval::EvidencePack;
use crate::text::{content_tokens, QuestionHints};

/// Pre-intent resolver: very short questions with no repo expectation and no
/// strong concept match get a clarifying question instead of an answer.
pub fn resolve_pre_intent(
    question: &str,
    hints: &QuestionHints,
    concept: Option<&ConceptMatch>,
    settings: &GateSettings,
) -> Option<String> {
    let tokens = content_tokens(question);
    if tokens.len() > settings.ambiguity_short_tokens {
        return None;
    }
    if hints.has_repo_expectation {
        return None;
    }
    let strong_concept = concept.is_some_and(|m| {
        m.score >= settings.concept_min_score && m.margin >= settings.concept_margin_min
    });
    if strong_concept {
        return None;
    }
    Some(format!(
        "Could you say more about what you mean by \"{}\"? A file, module, or concept \
         name would let me ground the answer.",
        question.trim().trim_end_matches('?')
    ))
}

/// Post-retrieval ambiguity gate: question terms absent from the context.
///
/// With an obligation in force, unknown terms produce a clarify line citing
/// up to `max_terms` of them.
pub fn ambiguity_gate(
    question: &str,
    pack: &EvidencePack,
    obligation: bool,
    settings: &GateSettings,
) -> Option<String> {
    if !obligation {
        return None;
    }
    let haystack = pack.haystack();
    let unknown: Vec<String> = content_tokens(question)
        .into_iter()
        .filter(|t| !t.contains('/'))
        .filter(|t| !haystack.contains(t.as_str()))
        .take(settings.ambiguity_max_terms)
        .collect();
    if unknown.is_empty() {
        return None;
    }
    Some(format!(
        "I could not confirm {} against the repository evidence. Could you clarify \
         which part of the codebase you mean?",
        unknown
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concepts::ConceptStore;
    use crate::retrieval::{Candidate, Channel, RetrievalMetrics};
    use crate::text::detect_hints;

    #[test]
    fn short_vague_question_asks_to_clarify() {
        let settings = GateSettings::default();
        let q = "the thing?";
        let clarify = resolve_pre_intent(q, &detect_hints(q), None, &settings);
        assert!(clarify.is_some());
    }

    #[test]
    fn strong_concept_match_suppresses_clarify() {
        let settings = GateSettings::default();
        let store = ConceptStore::builtin();
        let q = "platonic gate?";
        let concept = store.lookup(q);
        let clarify = resolve_pre_intent(q, &detect_hints(q), concept.as_ref(), &settings);
        assert!(clarify.is_none());
    }

    #[test]
    fn repo_expectation_suppresses_clarify() {
        let settings = GateSettings::default();
        let q = "which file?";
        let clarify = resolve_pre_intent(q, &detect_hints(q), None, &settings);
        assert!(clarify.is_none());
    }

    #[test]
    fn unknown_terms_trigger_post_gate_under_obligation() {
        let settings = GateSettings::default();
        let pack = EvidencePack::from_candidates(
            &[Candidate::new("docs/a.md", 1.0, "retrieval pipeline", Channel::Lexical)],
            500,
            RetrievalMetrics::default(),
        );
        let clarify = ambiguity_gate("where is the flurbozine handler", &pack, true, &settings);
        assert!(clarify.is_some());
        assert!(clarify.unwrap().contains("flurbozine"));
        assert!(ambiguity_gate("where is the flurbozine handler", &pack, false, &settings).is_none());
    }
}
