//! Intent profiles: routing records selecting strategy and evidence policy.

mod directory;

pub use directory::{IntentDirectory, IntentMatch};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Answer domain an intent routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentDomain {
    /// Answer must be grounded in repo evidence
    Repo,
    /// Conceptual definition first, repo mapping second
    Hybrid,
    /// General knowledge, citations optional
    General,
    /// Claims must be falsifiable against evidence
    Falsifiable,
}

impl std::fmt::Display for IntentDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Repo => "repo",
            Self::Hybrid => "hybrid",
            Self::General => "general",
            Self::Falsifiable => "falsifiable",
        };
        write!(f, "{s}")
    }
}

/// Fidelity tier of an intent profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntentTier {
    F0,
    F1,
    F2,
    F3,
}

impl std::fmt::Display for IntentTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::F0 => "F0",
            Self::F1 => "F1",
            Self::F2 => "F2",
            Self::F3 => "F3",
        };
        write!(f, "{s}")
    }
}

/// Answering strategy attached to a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ConceptDefinition,
    HybridExplain,
    ConstraintReport,
    RepoExplain,
    Ideology,
    PipelineOverview,
    EndpointLookup,
}

/// Format the synthesis pass must honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatPolicy {
    Brief,
    Compare,
    Steps,
    /// Derive from question heuristics
    Auto,
}

/// Kinds of evidence a profile accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Code,
    Docs,
    Knowledge,
    Ethos,
    Tests,
}

/// Citation policy of an intent profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidencePolicy {
    /// Repo citations may appear in the answer
    pub allow_citations: bool,
    /// Repo citations must appear in the answer
    pub require_citations: bool,
    /// Acceptable evidence kinds
    pub allowed_kinds: Vec<EvidenceKind>,
}

impl EvidencePolicy {
    pub fn repo() -> Self {
        Self {
            allow_citations: true,
            require_citations: true,
            allowed_kinds: vec![EvidenceKind::Code, EvidenceKind::Docs, EvidenceKind::Tests],
        }
    }

    pub fn hybrid() -> Self {
        Self {
            allow_citations: true,
            require_citations: false,
            allowed_kinds: vec![
                EvidenceKind::Knowledge,
                EvidenceKind::Docs,
                EvidenceKind::Code,
            ],
        }
    }

    pub fn general() -> Self {
        Self {
            allow_citations: false,
            require_citations: false,
            allowed_kinds: vec![EvidenceKind::Knowledge],
        }
    }
}

/// Phrase and pattern matchers for a profile, scanned in declared order.
#[derive(Debug, Clone)]
pub struct IntentMatchers {
    /// Lowercase substrings
    pub phrases: Vec<String>,
    /// Compiled regex patterns
    pub patterns: Vec<Regex>,
}

impl IntentMatchers {
    pub fn phrases(phrases: &[&str]) -> Self {
        Self {
            phrases: phrases.iter().map(|p| p.to_lowercase()).collect(),
            patterns: Vec::new(),
        }
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        if let Ok(re) = Regex::new(pattern) {
            self.patterns.push(re);
        }
        self
    }

    /// The matcher that hit, if any, as an audit fragment.
    pub fn hit(&self, question_lower: &str) -> Option<String> {
        for phrase in &self.phrases {
            if question_lower.contains(phrase.as_str()) {
                return Some(format!("phrase:{phrase}"));
            }
        }
        for pattern in &self.patterns {
            if pattern.is_match(question_lower) {
                return Some(format!("pattern:{}", pattern.as_str()));
            }
        }
        None
    }
}

/// A routing record for one intent.
#[derive(Debug, Clone)]
pub struct IntentProfile {
    pub id: String,
    pub label: String,
    pub domain: IntentDomain,
    pub tier: IntentTier,
    pub secondary_tier: Option<IntentTier>,
    pub strategy: Strategy,
    pub format_policy: FormatPolicy,
    pub evidence: EvidencePolicy,
    pub matchers: IntentMatchers,
    /// Domain imposed instead when the caller reports repo expectation
    pub repo_expectation_fallback: Option<IntentDomain>,
}
