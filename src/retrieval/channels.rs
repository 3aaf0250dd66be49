//! Per-query candidate generation channels over the lattice snapshot.

use std::collections::HashMap;

use crate::lattice::{LatticeNode, LatticeSnapshot};
use crate::text::{content_tokens, tokenize};

use super::evidence::{Candidate, Channel};

/// Field weights for the lexical channel.
const LEXICAL_WEIGHTS: FieldWeights = FieldWeights {
    symbol: 3.0,
    file_path: 2.0,
    signature: 1.5,
    doc: 1.0,
    snippet: 0.5,
};

/// Field weights for the symbol channel.
const SYMBOL_WEIGHTS: FieldWeights = FieldWeights {
    symbol: 4.0,
    file_path: 0.5,
    signature: 2.0,
    doc: 0.0,
    snippet: 0.0,
};

struct FieldWeights {
    symbol: f64,
    file_path: f64,
    signature: f64,
    doc: f64,
    snippet: f64,
}

fn score_node(node: &LatticeNode, tokens: &[String], weights: &FieldWeights) -> f64 {
    let mut score = 0.0;
    let symbol = node.symbol.to_lowercase();
    let path = node.file_path.to_lowercase();
    let signature = node.signature.to_lowercase();
    let doc = node.doc.to_lowercase();
    let snippet = node.snippet.to_lowercase();
    for token in tokens {
        if weights.symbol > 0.0 && symbol.contains(token.as_str()) {
            score += weights.symbol;
        }
        if weights.file_path > 0.0 && path.contains(token.as_str()) {
            score += weights.file_path;
        }
        if weights.signature > 0.0 && signature.contains(token.as_str()) {
            score += weights.signature;
        }
        if weights.doc > 0.0 && doc.contains(token.as_str()) {
            score += weights.doc;
        }
        if weights.snippet > 0.0 && snippet.contains(token.as_str()) {
            score += weights.snippet;
        }
    }
    score
}

fn preview_for(node: &LatticeNode) -> String {
    if !node.snippet.is_empty() {
        node.snippet.clone()
    } else if !node.doc.is_empty() {
        node.doc.clone()
    } else {
        node.signature.clone()
    }
}

/// Aggregate per-node scores into per-file candidates, sorted descending.
fn collect(
    snapshot: &LatticeSnapshot,
    channel: Channel,
    mut node_score: impl FnMut(&LatticeNode) -> f64,
) -> Vec<Candidate> {
    // Per file: (summed score, best node score, best node).
    let mut best: HashMap<&str, (f64, f64, &LatticeNode)> = HashMap::new();
    for node in snapshot.nodes() {
        let score = node_score(node);
        if score <= 0.0 {
            continue;
        }
        best.entry(node.file_path.as_str())
            .and_modify(|(sum, top, n)| {
                *sum += score;
                if score > *top {
                    *top = score;
                    *n = node;
                }
            })
            .or_insert((score, score, node));
    }
    let mut candidates: Vec<Candidate> = best
        .into_iter()
        .map(|(path, (score, _, node))| Candidate::new(path, score, preview_for(node), channel))
        .collect();
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.file_path.cmp(&b.file_path))
    });
    candidates
}

/// Lexical channel: weighted token matches across every indexed field.
pub fn lexical(snapshot: &LatticeSnapshot, query: &str) -> Vec<Candidate> {
    let tokens = content_tokens(query);
    if tokens.is_empty() {
        return Vec::new();
    }
    collect(snapshot, Channel::Lexical, |node| {
        score_node(node, &tokens, &LEXICAL_WEIGHTS)
    })
}

/// Symbol channel: heavier weight on symbol and signature matches.
pub fn symbol(snapshot: &LatticeSnapshot, query: &str) -> Vec<Candidate> {
    let tokens = content_tokens(query);
    if tokens.is_empty() {
        return Vec::new();
    }
    collect(snapshot, Channel::Symbol, |node| {
        score_node(node, &tokens, &SYMBOL_WEIGHTS)
    })
}

/// Character trigrams of a lowercase string.
fn trigrams(text: &str) -> std::collections::HashSet<[char; 3]> {
    let chars: Vec<char> = text.to_lowercase().chars().collect();
    chars
        .windows(3)
        .map(|w| [w[0], w[1], w[2]])
        .collect()
}

/// Trigram Jaccard similarity in [0,1].
pub fn trigram_jaccard(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - intersection;
    intersection as f64 / union as f64
}

/// Fuzzy channel: trigram Jaccard over file path, symbol, and signature.
pub fn fuzzy(snapshot: &LatticeSnapshot, query: &str, threshold: f64) -> Vec<Candidate> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    collect(snapshot, Channel::Fuzzy, |node| {
        let sim = trigram_jaccard(query, &node.file_path)
            .max(trigram_jaccard(query, &node.symbol))
            .max(trigram_jaccard(query, &node.signature));
        if sim >= threshold {
            sim
        } else {
            0.0
        }
    })
}

/// Path channel: explicit path hints in the query that resolve in the
/// snapshot or on disk.
pub fn path(snapshot: &LatticeSnapshot, repo_root: &str, query: &str) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for token in tokenize(query) {
        if !token.contains('/') {
            continue;
        }
        if snapshot.path_resolves(repo_root, &token) {
            let preview = snapshot
                .nodes()
                .iter()
                .find(|n| n.file_path.eq_ignore_ascii_case(&token))
                .map(preview_for)
                .unwrap_or_default();
            candidates.push(Candidate::new(token, 1.0, preview, Channel::Path));
        }
    }
    candidates.dedup_by(|a, b| a.file_path == b.file_path);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::LatticeNode;

    fn snapshot() -> LatticeSnapshot {
        LatticeSnapshot::from_nodes(vec![
            LatticeNode {
                symbol: "buildAskEnvelope".to_string(),
                file_path: "server/services/helix-ask/envelope.ts".to_string(),
                signature: "function buildAskEnvelope(answer: string)".to_string(),
                doc: "Builds the bounded answer envelope.".to_string(),
                snippet: "export function buildAskEnvelope(...)".to_string(),
            },
            LatticeNode {
                symbol: "askRoute".to_string(),
                file_path: "server/routes/agi.plan.ts".to_string(),
                signature: "router.post('/api/agi/ask', askRoute)".to_string(),
                doc: String::new(),
                snippet: String::new(),
            },
        ])
    }

    #[test]
    fn lexical_ranks_envelope_for_envelope_query() {
        let snap = snapshot();
        let candidates = lexical(&snap, "answer envelope");
        assert_eq!(candidates[0].file_path, "server/services/helix-ask/envelope.ts");
    }

    #[test]
    fn symbol_channel_prefers_symbol_hits() {
        let snap = snapshot();
        let candidates = symbol(&snap, "askRoute registration");
        assert_eq!(candidates[0].file_path, "server/routes/agi.plan.ts");
    }

    #[test]
    fn fuzzy_threshold_filters_weak_matches() {
        let snap = snapshot();
        let strong = fuzzy(&snap, "agi.plan.ts", 0.25);
        assert!(strong.iter().any(|c| c.file_path == "server/routes/agi.plan.ts"));
        let weak = fuzzy(&snap, "zzzz", 0.25);
        assert!(weak.is_empty());
    }

    #[test]
    fn path_channel_resolves_snapshot_paths() {
        let snap = snapshot();
        let candidates = path(&snap, ".", "see server/routes/agi.plan.ts for details");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].channel, Channel::Path);
    }

    #[test]
    fn trigram_jaccard_is_symmetric() {
        let a = trigram_jaccard("envelope", "envelop");
        let b = trigram_jaccard("envelop", "envelope");
        assert!((a - b).abs() < f64::EPSILON);
        assert!(a > 0.5);
    }
}
