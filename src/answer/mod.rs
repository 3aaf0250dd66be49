//! Answer formatting contract and post-processing.

pub mod hygiene;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::intent::FormatPolicy;

/// Concrete answer format resolved from the intent and question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerFormat {
    Brief,
    Compare,
    Steps,
}

impl std::fmt::Display for AnswerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Brief => "brief",
            Self::Compare => "compare",
            Self::Steps => "steps",
        };
        write!(f, "{s}")
    }
}

/// Format contract handed to the synthesis pass and format gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSpec {
    pub format: AnswerFormat,
    /// Evidence items carry stage tags (`[retrieval]`, `[gates]`, ...)
    pub stage_tags: bool,
}

/// Resolve the format contract from the intent policy plus question
/// heuristics.
pub fn derive_format_spec(policy: FormatPolicy, question: &str) -> FormatSpec {
    let lower = question.to_lowercase();
    let format = match policy {
        FormatPolicy::Brief => AnswerFormat::Brief,
        FormatPolicy::Compare => AnswerFormat::Compare,
        FormatPolicy::Steps => AnswerFormat::Steps,
        FormatPolicy::Auto => {
            if lower.contains("step by step")
                || lower.contains("walk me through")
                || lower.contains("how does") && lower.contains("work")
            {
                AnswerFormat::Steps
            } else if lower.contains(" vs ")
                || lower.contains("compare")
                || lower.contains("difference between")
            {
                AnswerFormat::Compare
            } else {
                AnswerFormat::Brief
            }
        }
    };
    FormatSpec {
        format,
        stage_tags: format == AnswerFormat::Steps,
    }
}

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"[A-Za-z0-9_@-]+(?:/[A-Za-z0-9_.@-]+)+\.(?:rs|ts|tsx|js|jsx|py|md|toml|json|yaml|yml)",
        )
        .unwrap()
    })
}

/// Extract path-shaped citation tokens from an answer.
pub fn extract_citations(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    citation_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

/// True when a citation matches an evidence file by exact path or suffix.
pub fn citation_matches(citation: &str, evidence_file: &str) -> bool {
    citation == evidence_file
        || evidence_file.ends_with(citation)
        || citation.ends_with(evidence_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_policy_picks_steps_for_how_does_work() {
        let spec = derive_format_spec(FormatPolicy::Auto, "How does the pipeline work?");
        assert_eq!(spec.format, AnswerFormat::Steps);
        assert!(spec.stage_tags);
    }

    #[test]
    fn auto_policy_picks_compare_for_vs() {
        let spec = derive_format_spec(FormatPolicy::Auto, "lexical vs fuzzy retrieval?");
        assert_eq!(spec.format, AnswerFormat::Compare);
    }

    #[test]
    fn explicit_policy_wins() {
        let spec = derive_format_spec(FormatPolicy::Brief, "How does it work step by step?");
        assert_eq!(spec.format, AnswerFormat::Brief);
    }

    #[test]
    fn citations_extract_and_match_by_suffix() {
        let citations =
            extract_citations("See server/services/helix-ask/envelope.ts and docs/flow.md.");
        assert_eq!(citations.len(), 2);
        assert!(citation_matches(
            "helix-ask/envelope.ts",
            "server/services/helix-ask/envelope.ts"
        ));
        assert!(!citation_matches("docs/flow.md", "docs/other.md"));
    }
}
