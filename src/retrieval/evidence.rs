//! Candidates, context blocks, and the evidence pack.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Candidate generation channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Lexical,
    Symbol,
    Fuzzy,
    Path,
    Grep,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Lexical => "lexical",
            Self::Symbol => "symbol",
            Self::Fuzzy => "fuzzy",
            Self::Path => "path",
            Self::Grep => "grep",
        };
        write!(f, "{s}")
    }
}

/// One retrieval candidate, keyed by file path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub file_path: String,
    /// Raw channel score
    pub score: f64,
    /// Fused score after weighted RRF (and boosts)
    pub rrf_score: f64,
    /// Short preview shown in the context block
    pub preview: String,
    /// Channel that first produced the candidate
    pub channel: Channel,
}

impl Candidate {
    pub fn new(
        file_path: impl Into<String>,
        score: f64,
        preview: impl Into<String>,
        channel: Channel,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            score,
            rrf_score: 0.0,
            preview: preview.into(),
            channel,
        }
    }
}

/// One context block handed to the LLM passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    /// File path or chunk id
    pub header: String,
    /// Clipped preview text
    pub preview: String,
}

/// Metrics describing a retrieval result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    /// Label of the allowlist tier the selection came from
    pub topic_tier_used: Option<String>,
    /// Every must-include set was satisfied
    pub must_include_ok: bool,
    /// Queries that produced at least one candidate
    pub query_hit_count: usize,
    /// Best fused score
    pub top_score: f64,
    /// Gap between the best and second-best fused scores
    pub score_gap: f64,
    /// Candidates per channel (pre-fusion)
    pub channel_hits: HashMap<String, usize>,
    /// Best raw score per channel
    pub channel_top_scores: HashMap<String, f64>,
}

/// Ordered context blocks plus retrieval metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidencePack {
    pub blocks: Vec<ContextBlock>,
    /// Distinct file paths (or chunk ids), in block order
    pub files: Vec<String>,
    pub metrics: RetrievalMetrics,
}

impl EvidencePack {
    /// Build a pack from selected candidates, clipping previews.
    pub fn from_candidates(
        selected: &[Candidate],
        context_chars: usize,
        metrics: RetrievalMetrics,
    ) -> Self {
        let blocks: Vec<ContextBlock> = selected
            .iter()
            .map(|c| ContextBlock {
                header: c.file_path.clone(),
                preview: clip(&c.preview, context_chars),
            })
            .collect();
        let files = blocks.iter().map(|b| b.header.clone()).collect();
        Self {
            blocks,
            files,
            metrics,
        }
    }

    /// True when no context was assembled.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Render the pack as the `Context:` section body.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            out.push_str("### ");
            out.push_str(&block.header);
            out.push('\n');
            out.push_str(&block.preview);
            out.push_str("\n\n");
        }
        out.trim_end().to_string()
    }

    /// Concatenated searchable text (headers plus previews), lowercased.
    pub fn haystack(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            out.push_str(&block.header.to_lowercase());
            out.push('\n');
            out.push_str(&block.preview.to_lowercase());
            out.push('\n');
        }
        out
    }
}

/// Clip a preview on a char boundary.
pub fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let clipped: String = text.chars().take(max_chars).collect();
    format!("{clipped}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_preserves_order_and_clips() {
        let selected = vec![
            Candidate::new("docs/a.md", 1.0, "x".repeat(20), Channel::Lexical),
            Candidate::new("src/b.rs", 0.5, "short", Channel::Symbol),
        ];
        let pack = EvidencePack::from_candidates(&selected, 10, RetrievalMetrics::default());
        assert_eq!(pack.files, vec!["docs/a.md", "src/b.rs"]);
        assert!(pack.blocks[0].preview.ends_with('…'));
        assert_eq!(pack.blocks[1].preview, "short");
    }

    #[test]
    fn render_emits_headers() {
        let selected = vec![Candidate::new("docs/a.md", 1.0, "body", Channel::Lexical)];
        let pack = EvidencePack::from_candidates(&selected, 100, RetrievalMetrics::default());
        assert!(pack.render().starts_with("### docs/a.md"));
    }
}
