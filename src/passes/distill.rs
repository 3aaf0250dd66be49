//! Evidence distillation: a citation-bearing bullet pass over the context.

use regex::Regex;
use std::sync::OnceLock;

use crate::answer::{extract_citations, FormatSpec};
use crate::error::Result;
use crate::llm::{CompletionRequest, OverflowDebug, OverflowRunner};
use crate::retrieval::EvidencePack;

use super::prompts::PromptParts;

fn item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:-|\d+[.)])\s+(.*)$").unwrap())
}

/// Distilled evidence: cited bullets plus the paths they cite.
#[derive(Debug, Clone, Default)]
pub struct EvidenceNotes {
    /// Cited bullet/step lines, in emission order
    pub items: Vec<String>,
    /// Distinct cited paths, in first-citation order
    pub paths: Vec<String>,
    pub overflow: OverflowDebug,
}

impl EvidenceNotes {
    /// Render the notes as a context section for synthesis.
    pub fn render(&self) -> String {
        self.items.join("\n")
    }
}

/// Run the evidence pass: 4–9 short items, each citing a file path or chunk
/// id found in the context. Items without a citation that matches the pack
/// are dropped; for non-UI questions, UI-path items are excluded from
/// composite synthesis.
pub async fn distill_evidence(
    runner: &OverflowRunner,
    question: &str,
    pack: &EvidencePack,
    spec: &FormatSpec,
    max_tokens: u32,
) -> Result<EvidenceNotes> {
    let stage_hint = if spec.stage_tags {
        "Prefix each item with a stage tag in square brackets, e.g. [retrieval]."
    } else {
        "Do not prefix items with stage tags."
    };
    let prompt = PromptParts::new(
        "You distill repository evidence into grounded notes for a question.",
    )
    .with_context(pack.render())
    .with_question(question)
    .with_instruction(
        "Emit 4-9 short bullets (`- ...`) or numbered items. Each item must cite one \
         file path or chunk id that appears in the context. No preamble, no closing \
         remarks.",
    )
    .with_instruction(stage_hint)
    .render();

    let request = CompletionRequest::new("repo_evidence", prompt, max_tokens).with_temperature(0.2);
    let (response, overflow) = runner.run(request, false).await?;

    let non_ui = !question.to_lowercase().contains("ui")
        && !question.to_lowercase().contains("component");

    let mut items = Vec::new();
    let mut paths: Vec<String> = Vec::new();
    for line in response.text.lines() {
        let Some(caps) = item_re().captures(line) else {
            continue;
        };
        let item = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if item.is_empty() {
            continue;
        }
        let citations: Vec<String> = extract_citations(item)
            .into_iter()
            .filter(|c| {
                pack.files
                    .iter()
                    .any(|f| crate::answer::citation_matches(c, f))
            })
            .collect();
        if citations.is_empty() {
            continue;
        }
        if non_ui && citations.iter().all(|c| is_ui_path(c)) {
            continue;
        }
        for citation in citations {
            if !paths.contains(&citation) {
                paths.push(citation);
            }
        }
        items.push(line.trim().to_string());
        if items.len() >= 9 {
            break;
        }
    }

    tracing::debug!(items = items.len(), paths = paths.len(), "evidence distilled");
    Ok(EvidenceNotes {
        items,
        paths,
        overflow,
    })
}

fn is_ui_path(path: &str) -> bool {
    path.starts_with("client/") || path.ends_with(".tsx") || path.ends_with(".jsx")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::AnswerFormat;
    use crate::llm::{CompletionResponse, ScriptedLlm};
    use crate::retrieval::{Candidate, Channel, EvidencePack, RetrievalMetrics};
    use std::sync::Arc;

    fn pack() -> EvidencePack {
        EvidencePack::from_candidates(
            &[
                Candidate::new("docs/helix-ask-flow.md", 1.0, "flow", Channel::Lexical),
                Candidate::new(
                    "client/src/components/helix/HelixAskPill.tsx",
                    0.5,
                    "pill",
                    Channel::Lexical,
                ),
            ],
            100,
            RetrievalMetrics::default(),
        )
    }

    fn spec() -> FormatSpec {
        FormatSpec {
            format: AnswerFormat::Brief,
            stage_tags: false,
        }
    }

    #[tokio::test]
    async fn keeps_only_cited_items() {
        let text = "\
- The flow has five stages (docs/helix-ask-flow.md)
- This one cites nothing
- Unmatched citation (server/other/file.ts)";
        let llm = Arc::new(ScriptedLlm::repeating(text, 8192));
        let runner = OverflowRunner::new(llm);
        let notes = distill_evidence(&runner, "how does the flow work", &pack(), &spec(), 256)
            .await
            .unwrap();
        assert_eq!(notes.items.len(), 1);
        assert_eq!(notes.paths, vec!["docs/helix-ask-flow.md"]);
    }

    #[tokio::test]
    async fn excludes_ui_paths_for_non_ui_questions() {
        let text = "\
- Pill renders the ask box (client/src/components/helix/HelixAskPill.tsx)
- The flow has five stages (docs/helix-ask-flow.md)";
        let llm = Arc::new(ScriptedLlm::repeating(text, 8192));
        let runner = OverflowRunner::new(llm);
        let notes = distill_evidence(&runner, "how does retrieval work", &pack(), &spec(), 256)
            .await
            .unwrap();
        assert_eq!(notes.items.len(), 1);
        assert!(notes.paths.iter().all(|p| !p.contains("client/")));
    }
}
