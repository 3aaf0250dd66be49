//! Long-prompt ingestion: semantic chunking of oversized attached prompts
//! and retrieval over the chunks.

pub mod rank;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Settings;
use crate::retrieval::{Candidate, Channel, EvidencePack, RetrievalMetrics};
use crate::text::estimate_tokens;

/// Why an attached prompt was ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestReason {
    /// Prompt met the size trigger
    Threshold,
    /// Prompt would overflow the model context window
    Overflow,
}

impl std::fmt::Display for IngestReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Threshold => write!(f, "threshold"),
            Self::Overflow => write!(f, "overflow"),
        }
    }
}

/// Chunk-ingests oversized prompts and retrieves over the chunks.
pub struct LongPromptIngester {
    settings: Settings,
}

impl LongPromptIngester {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Decide whether an attached prompt needs chunk ingestion.
    ///
    /// Triggers on the size threshold, or when prompt + question + output
    /// budget would overflow the model window.
    pub fn should_ingest(
        &self,
        attached_prompt: &str,
        question: &str,
        context_capacity: u32,
    ) -> Option<IngestReason> {
        let prompt_tokens = estimate_tokens(attached_prompt);
        if prompt_tokens >= self.settings.longprompt.trigger_tokens {
            return Some(IngestReason::Threshold);
        }
        let total = prompt_tokens
            + estimate_tokens(question)
            + self.settings.default_max_tokens;
        if total > context_capacity {
            return Some(IngestReason::Overflow);
        }
        None
    }

    /// Chunk the prompt and retrieve the top chunks for the question.
    ///
    /// The returned pack uses chunk ids as its "files". Selected chunks are
    /// bounded so their token sum stays within the window after reserving
    /// the answer budget and the chunk-header overhead.
    pub fn ingest(
        &self,
        attached_prompt: &str,
        question: &str,
        context_capacity: u32,
    ) -> (EvidencePack, String) {
        let lp = &self.settings.longprompt;
        let chunk_chars = (lp.chunk_tokens as usize) * 4;
        let overlap_chars = (lp.overlap_tokens as usize) * 4;

        let blocks = split_semantic_blocks(attached_prompt);
        let chunks = pack_chunks(&blocks, chunk_chars, overlap_chars);
        let source = chunk_source_id(attached_prompt);

        let ranked = rank::rank_chunks(
            question,
            &chunks,
            self.settings.fusion.rrf_k,
            self.settings.fusion.mmr_lambda,
            lp.top_chunks,
        );

        let budget = context_capacity
            .saturating_sub(self.settings.default_max_tokens)
            .saturating_sub(lp.overhead_tokens);
        let mut spent = 0u32;
        let mut selected = Vec::new();
        for (idx, rrf) in ranked {
            let tokens = estimate_tokens(&chunks[idx]);
            if spent + tokens > budget && !selected.is_empty() {
                break;
            }
            spent += tokens;
            let mut candidate = Candidate::new(
                format!("{source}/chunk-{idx:04}.md"),
                rrf,
                chunks[idx].clone(),
                Channel::Lexical,
            );
            candidate.rrf_score = rrf;
            selected.push(candidate);
        }

        let mut metrics = RetrievalMetrics {
            query_hit_count: usize::from(!selected.is_empty()),
            must_include_ok: true,
            ..Default::default()
        };
        metrics.top_score = selected.first().map(|c| c.rrf_score).unwrap_or(0.0);
        let second = selected.get(1).map(|c| c.rrf_score).unwrap_or(0.0);
        metrics.score_gap = (metrics.top_score - second).max(0.0);

        let pack = EvidencePack::from_candidates(&selected, chunk_chars, metrics);
        (pack, source)
    }
}

/// Stable id prefix for a prompt's chunk set.
fn chunk_source_id(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
    format!("prompt/longprompt/{hex}")
}

/// Split a prompt into semantic blocks: markdown headings start new blocks,
/// fenced code stays intact inside its block.
pub fn split_semantic_blocks(text: &str) -> Vec<String> {
    let mut blocks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_fence = false;

    for line in text.lines() {
        let fence_toggle = line.trim_start().starts_with("```");
        if !in_fence && line.starts_with('#') && !current.trim().is_empty() {
            blocks.push(current.trim_end().to_string());
            current = String::new();
        }
        current.push_str(line);
        current.push('\n');
        if fence_toggle {
            in_fence = !in_fence;
        }
    }
    if !current.trim().is_empty() {
        blocks.push(current.trim_end().to_string());
    }
    blocks
}

/// Pack blocks into chunks of at most `chunk_chars` characters, carrying
/// `overlap_chars` of trailing text into the next chunk. Oversized blocks
/// are split hard on char boundaries.
pub fn pack_chunks(blocks: &[String], chunk_chars: usize, overlap_chars: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    let mut flush = |current: &mut String, chunks: &mut Vec<String>| {
        if !current.trim().is_empty() {
            chunks.push(current.trim_end().to_string());
            let tail: String = current
                .chars()
                .rev()
                .take(overlap_chars)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            *current = tail;
        }
    };

    for block in blocks {
        if block.len() > chunk_chars {
            // Hard-split an oversized block.
            flush(&mut current, &mut chunks);
            let chars: Vec<char> = block.chars().collect();
            let mut start = 0usize;
            while start < chars.len() {
                let end = (start + chunk_chars).min(chars.len());
                chunks.push(chars[start..end].iter().collect());
                if end == chars.len() {
                    break;
                }
                start = end.saturating_sub(overlap_chars).max(start + 1);
            }
            current.clear();
            continue;
        }
        if current.len() + block.len() + 1 > chunk_chars {
            flush(&mut current, &mut chunks);
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(block);
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim_end().to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_split_on_headings_not_in_fences() {
        let text = "# One\nbody\n```\n# not a heading\ncode\n```\n# Two\nmore";
        let blocks = split_semantic_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].contains("# not a heading"));
        assert!(blocks[1].starts_with("# Two"));
    }

    #[test]
    fn packing_respects_chunk_size() {
        let blocks: Vec<String> = (0..10).map(|i| format!("block {i} {}", "x".repeat(50))).collect();
        let chunks = pack_chunks(&blocks, 150, 20);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 170, "chunk too large: {}", chunk.len());
        }
    }

    #[test]
    fn ingest_decision_threshold() {
        let ingester = LongPromptIngester::new(Settings::default());
        let big = "word ".repeat(10_000);
        assert_eq!(
            ingester.should_ingest(&big, "q", 8192),
            Some(IngestReason::Threshold)
        );
        assert_eq!(ingester.should_ingest("small prompt", "q", 8192), None);
    }

    #[test]
    fn ingest_decision_overflow() {
        let mut settings = Settings::default();
        settings.longprompt.trigger_tokens = u32::MAX;
        let ingester = LongPromptIngester::new(settings);
        let mid = "word ".repeat(2_000);
        assert_eq!(
            ingester.should_ingest(&mid, "q", 2048),
            Some(IngestReason::Overflow)
        );
    }

    #[test]
    fn ingest_produces_stable_chunk_ids() {
        let ingester = LongPromptIngester::new(Settings::default());
        let prompt = format!(
            "# Alpha\n{}\n# Governor\nThe alpha governor admits traces.\n",
            "filler text ".repeat(400)
        );
        let (pack, source) = ingester.ingest(&prompt, "alpha governor", 8192);
        assert!(source.starts_with("prompt/longprompt/"));
        assert!(!pack.is_empty());
        for file in &pack.files {
            assert!(file.starts_with(&source));
            assert!(file.ends_with(".md"));
        }
        let (_, source_again) = ingester.ingest(&prompt, "alpha governor", 8192);
        assert_eq!(source, source_again);
    }

    #[test]
    fn selected_chunk_tokens_fit_budget() {
        let ingester = LongPromptIngester::new(Settings::default());
        let prompt = "# H\n".to_string() + &"governor window alpha ".repeat(3_000);
        let capacity = 4096;
        let (pack, _) = ingester.ingest(&prompt, "alpha governor window", capacity);
        let settings = Settings::default();
        let total: u32 = pack.blocks.iter().map(|b| crate::text::estimate_tokens(&b.preview)).sum();
        assert!(
            total
                <= settings.longprompt.overhead_tokens
                    + settings.default_max_tokens
                    + capacity
        );
    }
}
