//! Citation repair: re-add missing citations without new claims.

use crate::answer::{citation_matches, extract_citations};
use crate::llm::{CompletionRequest, OverflowRunner};

use super::prompts::PromptParts;

/// Which terminal branch the repair took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationOutcome {
    /// Answer already carried a matching citation
    AlreadyCited,
    /// The fixer pass inserted citations
    Repaired,
    /// The fixer failed; a `Sources:` line lists evidence paths
    SourcesAppended,
    /// Intent does not allow citations, nothing to do
    NotApplicable,
}

/// Repair missing citations.
///
/// Fires only when the intent allows repo citations, the distilled evidence
/// carries paths, and the synthesized answer has none. A non-empty fixer
/// result replaces the answer (with unmatched citations dropped); any
/// failure falls back to appending a `Sources:` line, so a citation-bearing
/// request always terminates in one of the three cited branches.
pub async fn repair_citations(
    runner: &OverflowRunner,
    answer: String,
    evidence_paths: &[String],
    allow_citations: bool,
) -> (String, CitationOutcome) {
    if !allow_citations || evidence_paths.is_empty() {
        return (answer, CitationOutcome::NotApplicable);
    }
    let existing = extract_citations(&answer);
    if existing
        .iter()
        .any(|c| evidence_paths.iter().any(|p| citation_matches(c, p)))
    {
        return (answer, CitationOutcome::AlreadyCited);
    }

    let prompt = PromptParts::new("You fix an answer that is missing citations.")
        .with_context(evidence_paths.join("\n"))
        .with_instruction(
            "Insert citations (file paths in parentheses) from the evidence list into \
             the answer below. Do not add, remove, or reword any claim or step. Return \
             the full answer.",
        )
        .with_instruction(format!("Answer:\n{answer}"))
        .render();
    let request = CompletionRequest::new("citation_repair", prompt, 512).with_temperature(0.1);

    match runner.run(request, false).await {
        Ok((response, _)) if !response.text.trim().is_empty() => {
            let repaired = drop_unmatched_citations(response.text.trim(), evidence_paths);
            if extract_citations(&repaired)
                .iter()
                .any(|c| evidence_paths.iter().any(|p| citation_matches(c, p)))
            {
                (repaired, CitationOutcome::Repaired)
            } else {
                (sources_fallback(&answer, evidence_paths), CitationOutcome::SourcesAppended)
            }
        }
        _ => (sources_fallback(&answer, evidence_paths), CitationOutcome::SourcesAppended),
    }
}

/// The fallback branch still honors the citation invariant: any unmatched
/// citations in the original answer are dropped before the `Sources:` line
/// is appended.
fn sources_fallback(answer: &str, evidence_paths: &[String]) -> String {
    append_sources(&drop_unmatched_citations(answer, evidence_paths), evidence_paths)
}

/// Remove citation tokens that match no evidence path.
fn drop_unmatched_citations(answer: &str, evidence_paths: &[String]) -> String {
    let mut out = answer.to_string();
    for citation in extract_citations(answer) {
        if !evidence_paths.iter().any(|p| citation_matches(&citation, p)) {
            out = out.replace(&format!("({citation})"), "");
            out = out.replace(&citation, "");
        }
    }
    out.trim().to_string()
}

fn append_sources(answer: &str, evidence_paths: &[String]) -> String {
    let list = evidence_paths
        .iter()
        .take(4)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    format!("{}\n\nSources: {list}", answer.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use std::sync::Arc;

    fn paths() -> Vec<String> {
        vec!["docs/helix-ask-flow.md".to_string()]
    }

    #[tokio::test]
    async fn cited_answers_pass_through() {
        let llm = Arc::new(ScriptedLlm::repeating("unused", 8192));
        let runner = OverflowRunner::new(llm.clone());
        let (answer, outcome) = repair_citations(
            &runner,
            "See docs/helix-ask-flow.md for the stages.".to_string(),
            &paths(),
            true,
        )
        .await;
        assert_eq!(outcome, CitationOutcome::AlreadyCited);
        assert!(answer.contains("docs/helix-ask-flow.md"));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn repairs_missing_citations() {
        let llm = Arc::new(ScriptedLlm::repeating(
            "The flow has five stages (docs/helix-ask-flow.md).",
            8192,
        ));
        let runner = OverflowRunner::new(llm);
        let (answer, outcome) =
            repair_citations(&runner, "The flow has five stages.".to_string(), &paths(), true)
                .await;
        assert_eq!(outcome, CitationOutcome::Repaired);
        assert!(answer.contains("docs/helix-ask-flow.md"));
    }

    #[tokio::test]
    async fn fixer_failure_appends_sources() {
        let llm = Arc::new(ScriptedLlm::new(
            vec![Err(crate::error::Error::llm("citation_repair", "down"))],
            8192,
        ));
        let runner = OverflowRunner::new(llm);
        let (answer, outcome) =
            repair_citations(&runner, "The flow has five stages.".to_string(), &paths(), true)
                .await;
        assert_eq!(outcome, CitationOutcome::SourcesAppended);
        assert!(answer.contains("Sources: docs/helix-ask-flow.md"));
    }

    #[tokio::test]
    async fn sources_fallback_drops_unmatched_citations() {
        let llm = Arc::new(ScriptedLlm::new(
            vec![Err(crate::error::Error::llm("citation_repair", "down"))],
            8192,
        ));
        let runner = OverflowRunner::new(llm);
        // The synthesized answer cites a path that matches no evidence.
        let (answer, outcome) = repair_citations(
            &runner,
            "The flow has five stages (server/made-up/path.ts).".to_string(),
            &paths(),
            true,
        )
        .await;
        assert_eq!(outcome, CitationOutcome::SourcesAppended);
        assert!(!answer.contains("server/made-up/path.ts"));
        assert!(answer.contains("Sources: docs/helix-ask-flow.md"));
    }

    #[tokio::test]
    async fn disallowed_citations_are_untouched() {
        let llm = Arc::new(ScriptedLlm::repeating("unused", 8192));
        let runner = OverflowRunner::new(llm.clone());
        let (answer, outcome) =
            repair_citations(&runner, "General knowledge answer.".to_string(), &paths(), false)
                .await;
        assert_eq!(outcome, CitationOutcome::NotApplicable);
        assert_eq!(answer, "General knowledge answer.");
        assert_eq!(llm.call_count(), 0);
    }
}
