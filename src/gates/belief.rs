//! Belief-graph gate: claims, definitions, conclusions, and their edges.
//!
//! The graph is rebuilt per request from the synthesized answer and the
//! distilled evidence. The gate fails when the unsupported rate exceeds its
//! ceiling or any contradiction edge exists.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::GateSettings;
use crate::text::content_tokens;

/// Node kinds in the belief graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeliefNodeKind {
    Claim,
    Definition,
    Conclusion,
}

/// One belief node: a sentence with its kind and support flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefNode {
    pub kind: BeliefNodeKind,
    pub text: String,
    pub supported: bool,
}

/// Edge kinds between belief nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeliefEdgeKind {
    Supports,
    Contradicts,
    DependsOn,
    MapsTo,
}

/// A directed edge between node indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefEdge {
    pub kind: BeliefEdgeKind,
    pub from: usize,
    pub to: usize,
}

/// The per-request belief graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeliefGraph {
    pub nodes: Vec<BeliefNode>,
    pub edges: Vec<BeliefEdge>,
}

impl BeliefGraph {
    /// Build the graph from an answer and the distilled evidence items.
    pub fn build(answer: &str, evidence_items: &[String]) -> Self {
        let sentences = split_sentences(answer);
        let evidence_tokens: Vec<HashSet<String>> = evidence_items
            .iter()
            .map(|e| content_tokens(e).into_iter().collect())
            .collect();

        let mut nodes = Vec::new();
        let mut edges = Vec::new();

        for sentence in &sentences {
            let kind = classify(sentence);
            let tokens: HashSet<String> = content_tokens(sentence).into_iter().collect();
            if tokens.is_empty() {
                continue;
            }
            // A claim is supported when some evidence item covers most of it.
            let supported = evidence_tokens.iter().any(|ev| {
                let overlap = tokens.intersection(ev).count();
                overlap as f64 / tokens.len() as f64 >= 0.5
            });
            let idx = nodes.len();
            nodes.push(BeliefNode {
                kind,
                text: sentence.clone(),
                supported,
            });
            if supported {
                edges.push(BeliefEdge {
                    kind: BeliefEdgeKind::Supports,
                    from: idx,
                    to: idx,
                });
            }
            if sentence.contains('/') {
                edges.push(BeliefEdge {
                    kind: BeliefEdgeKind::MapsTo,
                    from: idx,
                    to: idx,
                });
            }
        }

        // Conclusions depend on the claims before them.
        for (i, node) in nodes.iter().enumerate() {
            if node.kind == BeliefNodeKind::Conclusion {
                for j in 0..i {
                    if nodes[j].kind == BeliefNodeKind::Claim {
                        edges.push(BeliefEdge {
                            kind: BeliefEdgeKind::DependsOn,
                            from: i,
                            to: j,
                        });
                    }
                }
            }
        }

        // Contradiction: two sentences over the same token set where exactly
        // one carries a negation.
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                if contradicts(&nodes[i].text, &nodes[j].text) {
                    edges.push(BeliefEdge {
                        kind: BeliefEdgeKind::Contradicts,
                        from: i,
                        to: j,
                    });
                }
            }
        }

        Self { nodes, edges }
    }

    /// Unsupported claims / claim count.
    pub fn unsupported_rate(&self) -> f64 {
        let claims: Vec<&BeliefNode> = self
            .nodes
            .iter()
            .filter(|n| n.kind == BeliefNodeKind::Claim)
            .collect();
        if claims.is_empty() {
            return 0.0;
        }
        let unsupported = claims.iter().filter(|n| !n.supported).count();
        unsupported as f64 / claims.len() as f64
    }

    /// Number of contradiction edges.
    pub fn contradiction_count(&self) -> usize {
        self.edges
            .iter()
            .filter(|e| e.kind == BeliefEdgeKind::Contradicts)
            .count()
    }
}

/// Result of the belief gate.
#[derive(Debug, Clone, PartialEq)]
pub struct BeliefGateResult {
    pub pass: bool,
    pub unsupported_rate: f64,
    pub contradictions: usize,
    pub graph: BeliefGraph,
}

/// Run the belief gate over the answer and evidence.
pub fn belief_gate(
    answer: &str,
    evidence_items: &[String],
    settings: &GateSettings,
) -> BeliefGateResult {
    let graph = BeliefGraph::build(answer, evidence_items);
    let unsupported_rate = graph.unsupported_rate();
    let contradictions = graph.contradiction_count();
    BeliefGateResult {
        pass: unsupported_rate <= settings.belief_unsupported_max && contradictions == 0,
        unsupported_rate,
        contradictions,
        graph,
    }
}

fn classify(sentence: &str) -> BeliefNodeKind {
    let lower = sentence.to_lowercase();
    if lower.starts_with("so ")
        || lower.starts_with("thus")
        || lower.starts_with("therefore")
        || lower.starts_with("in practice")
    {
        BeliefNodeKind::Conclusion
    } else if lower.contains(" is a ") || lower.contains(" is the ") || lower.contains("defined as")
    {
        BeliefNodeKind::Definition
    } else {
        BeliefNodeKind::Claim
    }
}

const NEGATIONS: &[&str] = &["not", "never", "no"];

fn contradicts(a: &str, b: &str) -> bool {
    let ta: HashSet<String> = content_tokens(a)
        .into_iter()
        .filter(|t| !NEGATIONS.contains(&t.as_str()))
        .collect();
    let tb: HashSet<String> = content_tokens(b)
        .into_iter()
        .filter(|t| !NEGATIONS.contains(&t.as_str()))
        .collect();
    if ta.is_empty() || ta != tb {
        return false;
    }
    let neg_a = has_negation(a);
    let neg_b = has_negation(b);
    neg_a != neg_b
}

fn has_negation(text: &str) -> bool {
    content_tokens(text)
        .iter()
        .any(|t| NEGATIONS.contains(&t.as_str()))
}

fn split_sentences(text: &str) -> Vec<String> {
    crate::text::split_sentences(text)
        .into_iter()
        .filter(|s| s.len() >= 10)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_answer_passes() {
        let evidence = vec![
            "- The retriever fuses lexical and symbol channels (docs/a.md)".to_string(),
        ];
        let result = belief_gate(
            "The retriever fuses lexical and symbol channels.",
            &evidence,
            &GateSettings::default(),
        );
        assert!(result.pass);
        assert!(result.unsupported_rate < f64::EPSILON);
    }

    #[test]
    fn unsupported_claims_fail() {
        let evidence = vec!["- The retriever fuses channels (docs/a.md)".to_string()];
        let result = belief_gate(
            "The scheduler preempts kernel threads. Database shards rebalance nightly. \
             Replication uses quorum writes.",
            &evidence,
            &GateSettings::default(),
        );
        assert!(!result.pass);
        assert!(result.unsupported_rate > 0.4);
    }

    #[test]
    fn contradiction_fails_gate() {
        let evidence = vec![
            "- The gate will reject unsupported claims (docs/a.md)".to_string(),
            "- The gate will not reject unsupported claims (docs/a.md)".to_string(),
        ];
        let result = belief_gate(
            "The gate will reject unsupported claims. The gate will not reject unsupported claims.",
            &evidence,
            &GateSettings::default(),
        );
        assert!(result.contradictions > 0);
        assert!(!result.pass);
    }

    #[test]
    fn conclusions_depend_on_claims() {
        let evidence = vec![
            "- Channels are fused by rank (docs/a.md)".to_string(),
            "- In practice the order is stable across runs (docs/a.md)".to_string(),
        ];
        let graph = BeliefGraph::build(
            "Channels are fused by rank. In practice, the order is stable across runs.",
            &evidence,
        );
        assert!(graph
            .edges
            .iter()
            .any(|e| e.kind == BeliefEdgeKind::DependsOn));
    }
}
