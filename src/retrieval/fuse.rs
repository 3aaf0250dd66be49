//! Weighted Reciprocal-Rank-Fusion and MMR diversification.
//!
//! RRF follows Cormack, Clarke, Buettcher (2009): each ranked list
//! contributes `w / (K + rank + 1)` to the items it contains. MMR then picks
//! greedily by `λ·rrf − (1−λ)·max_sim(picked)` with a path-token Jaccard
//! similarity, so one directory cannot monopolize the selection.

use std::collections::{HashMap, HashSet};

use super::evidence::Candidate;

/// Fuse weighted ranked lists into a single candidate list ordered by fused
/// score. Candidates are keyed by file path; the first list to produce a
/// path supplies its preview and channel, every list contributes score.
pub fn weighted_rrf(lists: &[(Vec<Candidate>, f64)], k: u32) -> Vec<Candidate> {
    let mut fused: Vec<Candidate> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (list, weight) in lists {
        for (rank, candidate) in list.iter().enumerate() {
            let contribution = weight / f64::from(k + rank as u32 + 1);
            match index.get(candidate.file_path.as_str()) {
                Some(&i) => {
                    fused[i].rrf_score += contribution;
                    if candidate.score > fused[i].score {
                        fused[i].score = candidate.score;
                    }
                    if fused[i].preview.is_empty() && !candidate.preview.is_empty() {
                        fused[i].preview = candidate.preview.clone();
                    }
                }
                None => {
                    let mut c = candidate.clone();
                    c.rrf_score = contribution;
                    index.insert(c.file_path.clone(), fused.len());
                    fused.push(c);
                }
            }
        }
    }

    sort_by_rrf(&mut fused);
    fused
}

/// Multiply fused scores by a per-path factor (boost > 1, deboost < 1).
pub fn apply_path_factor(candidates: &mut [Candidate], patterns: &[String], factor: f64) {
    if patterns.is_empty() {
        return;
    }
    for candidate in candidates.iter_mut() {
        if patterns.iter().any(|p| candidate.file_path.contains(p.as_str())) {
            candidate.rrf_score *= factor;
        }
    }
    sort_by_rrf(candidates);
}

fn sort_by_rrf(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.file_path.cmp(&b.file_path))
    });
}

/// Tokens of a path, for the MMR similarity.
fn path_tokens(path: &str) -> HashSet<String> {
    path.split(|c: char| c == '/' || c == '.' || c == '-' || c == '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Jaccard similarity over path tokens.
pub fn path_similarity(a: &str, b: &str) -> f64 {
    let ta = path_tokens(a);
    let tb = path_tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - intersection;
    intersection as f64 / union as f64
}

/// Diversify fused candidates with Maximal Marginal Relevance.
///
/// The input must already be ordered by fused score; the head of the output
/// is always the head of the input, so the top fused score survives.
pub fn mmr_diversify(candidates: &[Candidate], lambda: f64, top_k: usize) -> Vec<Candidate> {
    if candidates.is_empty() || top_k == 0 {
        return Vec::new();
    }
    let mut remaining: Vec<&Candidate> = candidates.iter().collect();
    let mut picked: Vec<Candidate> = Vec::with_capacity(top_k.min(remaining.len()));

    // The best fused candidate is always picked first.
    picked.push(remaining.remove(0).clone());

    while picked.len() < top_k && !remaining.is_empty() {
        let mut best_idx = 0usize;
        let mut best_value = f64::NEG_INFINITY;
        for (i, candidate) in remaining.iter().enumerate() {
            let max_sim = picked
                .iter()
                .map(|p| path_similarity(&candidate.file_path, &p.file_path))
                .fold(0.0_f64, f64::max);
            let value = lambda * candidate.rrf_score - (1.0 - lambda) * max_sim;
            if value > best_value {
                best_value = value;
                best_idx = i;
            }
        }
        picked.push(remaining.remove(best_idx).clone());
    }
    picked
}
