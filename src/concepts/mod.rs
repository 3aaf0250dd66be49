//! Concept cards: named definitions with aliases, topic tags, and sources.
//!
//! Cards feed the concept fast-path in retrieval and the strong-match test
//! in the pre-intent ambiguity resolver.

use serde::{Deserialize, Serialize};

use crate::text::content_tokens;
use crate::topic::TopicTag;

/// A named concept with its definition and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptCard {
    /// Canonical concept name
    pub name: String,
    /// Alternative spellings and short forms
    pub aliases: Vec<String>,
    /// One-paragraph definition
    pub definition: String,
    /// Topic tags the concept belongs to
    pub topic_tags: Vec<TopicTag>,
    /// Repo paths documenting or implementing the concept
    pub source_paths: Vec<String>,
}

/// A scored concept lookup hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptMatch {
    pub card: ConceptCard,
    /// Token-overlap score in [0,1]
    pub score: f64,
    /// Margin over the runner-up card
    pub margin: f64,
}

/// In-memory store of concept cards, loaded at startup.
pub struct ConceptStore {
    cards: Vec<ConceptCard>,
}

impl ConceptStore {
    /// Build a store from explicit cards.
    pub fn new(cards: Vec<ConceptCard>) -> Self {
        Self { cards }
    }

    /// Load cards from a JSON array file.
    pub fn load(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| crate::error::Error::Config(format!("concept cards: {e}")))?;
        let cards: Vec<ConceptCard> = serde_json::from_str(&data)?;
        Ok(Self::new(cards))
    }

    /// The built-in directory used when no card file is configured.
    pub fn builtin() -> Self {
        Self::new(vec![
            ConceptCard {
                name: "Platonic reasoning gate".to_string(),
                aliases: vec!["platonic gate".to_string(), "platonic gates".to_string()],
                definition: "A post-synthesis battery of checks that verifies an answer \
                             against its evidence: claim support, belief-graph consistency, \
                             perturbation stability, and formatting discipline."
                    .to_string(),
                topic_tags: vec![TopicTag::Concepts, TopicTag::HelixAsk],
                source_paths: vec![
                    "docs/knowledge/platonic-reasoning.md".to_string(),
                    "server/services/helix-ask/platonic-gates.ts".to_string(),
                ],
            },
            ConceptCard {
                name: "retrieval confidence".to_string(),
                aliases: vec!["arbiter confidence".to_string()],
                definition: "A bounded combination of match ratio, must-include flags, doc \
                             share, file count, channel coverage, and score gap used to pick \
                             the final answer mode."
                    .to_string(),
                topic_tags: vec![TopicTag::HelixAsk],
                source_paths: vec!["docs/helix-ask-flow.md".to_string()],
            },
            ConceptCard {
                name: "warp viability".to_string(),
                aliases: vec!["viability".to_string(), "warp".to_string()],
                definition: "The physics-side viability signal consulted by plan execution \
                             when a goal touches warp kernels."
                    .to_string(),
                topic_tags: vec![TopicTag::Warp, TopicTag::Physics],
                source_paths: vec!["docs/knowledge/warp-viability.md".to_string()],
            },
            ConceptCard {
                name: "alpha governor".to_string(),
                aliases: vec!["governor".to_string(), "alpha policy".to_string()],
                definition: "An admission policy over variant trajectories that keeps the \
                             live share of accepted training traces at or above a target \
                             ratio over a sliding window."
                    .to_string(),
                topic_tags: vec![TopicTag::Ledger, TopicTag::HelixAsk],
                source_paths: vec!["docs/knowledge/alpha-governor.md".to_string()],
            },
        ])
    }

    /// All cards.
    pub fn cards(&self) -> &[ConceptCard] {
        &self.cards
    }

    /// Score every card against the question and return the best match with
    /// its margin over the runner-up. Returns `None` when nothing overlaps.
    pub fn lookup(&self, question: &str) -> Option<ConceptMatch> {
        let tokens = content_tokens(question);
        if tokens.is_empty() {
            return None;
        }
        let mut scored: Vec<(f64, &ConceptCard)> = self
            .cards
            .iter()
            .map(|card| (Self::score_card(card, &tokens), card))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let (top_score, top_card) = scored.first()?;
        let runner_up = scored.get(1).map(|(s, _)| *s).unwrap_or(0.0);
        Some(ConceptMatch {
            card: (*top_card).clone(),
            score: *top_score,
            margin: top_score - runner_up,
        })
    }

    /// Fraction of the card's name/alias tokens present in the question.
    fn score_card(card: &ConceptCard, question_tokens: &[String]) -> f64 {
        let mut best: f64 = 0.0;
        for label in std::iter::once(&card.name).chain(card.aliases.iter()) {
            let label_tokens = content_tokens(label);
            if label_tokens.is_empty() {
                continue;
            }
            let hits = label_tokens
                .iter()
                .filter(|t| question_tokens.contains(t))
                .count();
            best = best.max(hits as f64 / label_tokens.len() as f64);
        }
        best
    }
}
