//! Chunk ranking: keyword hit ratio plus hash-based embeddings, fused by
//! RRF and diversified by MMR over chunk-content similarity.
//!
//! The embedding is deterministic and lexical, not semantic: word-level and
//! character-trigram hashes folded into a fixed-width vector and normalized
//! for cosine similarity.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use crate::text::content_tokens;

/// Embedding width.
pub const EMBED_DIMENSIONS: usize = 128;

fn hash_str(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

/// Deterministic pseudo-embedding of a text.
pub fn embed(text: &str) -> Vec<f32> {
    let mut embedding = vec![0.0f32; EMBED_DIMENSIONS];
    let normalized: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();

    for word in normalized.split_whitespace() {
        let hash = hash_str(word);
        let idx = (hash as usize) % EMBED_DIMENSIONS;
        let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
        let magnitude = 1.0 + ((hash >> 16) & 0xFF) as f32 / 255.0;
        embedding[idx] += sign * magnitude;
    }

    let chars: Vec<char> = normalized.chars().collect();
    for window in chars.windows(3) {
        let trigram: String = window.iter().collect();
        let hash = hash_str(&trigram);
        let idx = (hash as usize) % EMBED_DIMENSIONS;
        let sign = if (hash >> 32) & 1 == 0 { 0.5 } else { -0.5 };
        embedding[idx] += sign;
    }

    let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for val in &mut embedding {
            *val /= magnitude;
        }
    }
    embedding
}

/// Dot product of two unit vectors, mapped from [-1,1] to [0,1].
pub fn embedding_score(query: &[f32], chunk: &[f32]) -> f64 {
    let dot: f32 = query.iter().zip(chunk.iter()).map(|(a, b)| a * b).sum();
    f64::from(dot).mul_add(0.5, 0.5).clamp(0.0, 1.0)
}

/// Normalized token-hit ratio of the question against a chunk.
pub fn keyword_score(question_tokens: &[String], chunk: &str) -> f64 {
    if question_tokens.is_empty() {
        return 0.0;
    }
    let lower = chunk.to_lowercase();
    let hits = question_tokens
        .iter()
        .filter(|t| lower.contains(t.as_str()))
        .count();
    hits as f64 / question_tokens.len() as f64
}

/// Token Jaccard between two chunks, for MMR diversification.
fn chunk_similarity(a: &str, b: &str) -> f64 {
    let ta: HashSet<String> = content_tokens(a).into_iter().collect();
    let tb: HashSet<String> = content_tokens(b).into_iter().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - intersection;
    intersection as f64 / union as f64
}

/// Rank chunks for a question: RRF over the keyword and embedding rankings,
/// then MMR over chunk-content similarity. Returns `(chunk_index, rrf)`
/// pairs, best first, at most `top_m` entries.
pub fn rank_chunks(
    question: &str,
    chunks: &[String],
    rrf_k: u32,
    mmr_lambda: f64,
    top_m: usize,
) -> Vec<(usize, f64)> {
    if chunks.is_empty() || top_m == 0 {
        return Vec::new();
    }
    let question_tokens = content_tokens(question);
    let query_embedding = embed(question);

    let mut keyword: Vec<(usize, f64)> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| (i, keyword_score(&question_tokens, c)))
        .filter(|(_, s)| *s > 0.0)
        .collect();
    keyword.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut embedded: Vec<(usize, f64)> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| (i, embedding_score(&query_embedding, &embed(c))))
        .collect();
    embedded.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    // RRF over both rankings.
    let mut rrf = vec![0.0f64; chunks.len()];
    for (rank, (i, _)) in keyword.iter().enumerate() {
        rrf[*i] += 1.0 / f64::from(rrf_k + rank as u32 + 1);
    }
    for (rank, (i, _)) in embedded.iter().enumerate() {
        rrf[*i] += 1.0 / f64::from(rrf_k + rank as u32 + 1);
    }

    let mut remaining: Vec<(usize, f64)> = rrf
        .iter()
        .enumerate()
        .filter(|(_, s)| **s > 0.0)
        .map(|(i, s)| (i, *s))
        .collect();
    remaining.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    // MMR over chunk contents.
    let mut picked: Vec<(usize, f64)> = Vec::new();
    if let Some(first) = remaining.first().copied() {
        picked.push(first);
        remaining.remove(0);
    }
    while picked.len() < top_m && !remaining.is_empty() {
        let mut best_idx = 0usize;
        let mut best_value = f64::NEG_INFINITY;
        for (i, (chunk_idx, score)) in remaining.iter().enumerate() {
            let max_sim = picked
                .iter()
                .map(|(p, _)| chunk_similarity(&chunks[*chunk_idx], &chunks[*p]))
                .fold(0.0_f64, f64::max);
            let value = mmr_lambda * score - (1.0 - mmr_lambda) * max_sim;
            if value > best_value {
                best_value = value;
                best_idx = i;
            }
        }
        picked.push(remaining.remove(best_idx));
    }
    picked.truncate(top_m);
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_are_deterministic_unit_vectors() {
        let a = embed("hello world");
        let b = embed("hello world");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn similar_text_scores_higher_than_unrelated() {
        let q = embed("retrieval pipeline gates");
        let close = embedding_score(&q, &embed("the retrieval pipeline runs gates"));
        let far = embedding_score(&q, &embed("unrelated pasta recipe with tomatoes"));
        assert!(close > far);
    }

    #[test]
    fn rank_prefers_keyword_hits() {
        let chunks = vec![
            "The alpha governor admits traces.".to_string(),
            "Nothing to see in this chunk.".to_string(),
            "Governor policy window and alpha target.".to_string(),
        ];
        let ranked = rank_chunks("alpha governor target", &chunks, 60, 0.72, 2);
        assert_eq!(ranked.len(), 2);
        assert_ne!(ranked[0].0, 1);
        assert_ne!(ranked[1].0, 1);
    }
}
