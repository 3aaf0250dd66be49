//! Topic profiling: tag the question and derive retrieval scopes.
//!
//! Tags form a closed enum. A topic profile enumerates allowlist tiers in
//! preference order; the retriever descends tiers until it finds enough
//! candidates and the must-include files are satisfied.

use serde::{Deserialize, Serialize};

/// Closed set of topic tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicTag {
    HelixAsk,
    Warp,
    Ideology,
    Ledger,
    Star,
    Concepts,
    Physics,
}

impl std::fmt::Display for TopicTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::HelixAsk => "helix_ask",
            Self::Warp => "warp",
            Self::Ideology => "ideology",
            Self::Ledger => "ledger",
            Self::Star => "star",
            Self::Concepts => "concepts",
            Self::Physics => "physics",
        };
        write!(f, "{s}")
    }
}

/// One allowlist tier: a named group of path patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowlistTier {
    /// Tier label, for debug output
    pub label: String,
    /// Substring patterns a candidate path must contain to stay in the tier
    pub path_patterns: Vec<String>,
}

impl AllowlistTier {
    pub fn new(label: impl Into<String>, patterns: &[&str]) -> Self {
        Self {
            label: label.into(),
            path_patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// True when a candidate path belongs to this tier.
    pub fn admits(&self, path: &str) -> bool {
        self.path_patterns.iter().any(|p| path.contains(p.as_str()))
    }
}

/// Retrieval scope derived from topic tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicProfile {
    pub tags: Vec<TopicTag>,
    /// Tiers in descending order of preference
    pub allowlist_tiers: Vec<AllowlistTier>,
    /// Files the evidence pack must contain at least one of
    pub must_include_files: Vec<String>,
    /// Substring patterns satisfying the must-include requirement
    pub must_include_patterns: Vec<String>,
    /// Paths boosted during fusion
    pub boost_paths: Vec<String>,
    /// Paths deboosted during fusion
    pub deboost_paths: Vec<String>,
    /// Minimum selection size before tier descent stops
    pub min_tier_candidates: usize,
}

/// Tag a question (plus the optional explicit search query) with topics.
pub fn tag_question(question: &str, search_query: Option<&str>) -> Vec<TopicTag> {
    let mut text = question.to_lowercase();
    if let Some(q) = search_query {
        text.push(' ');
        text.push_str(&q.to_lowercase());
    }
    let mut tags = Vec::new();
    let mut push = |tag: TopicTag| {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    };
    if text.contains("helix ask") || text.contains("ask pipeline") || text.contains("helix-ask") {
        push(TopicTag::HelixAsk);
    }
    if text.contains("warp") || text.contains("viability") {
        push(TopicTag::Warp);
    }
    if text.contains("ideology") || text.contains("ethos") {
        push(TopicTag::Ideology);
    }
    if text.contains("ledger") || text.contains("trace") || text.contains("trajectory") {
        push(TopicTag::Ledger);
    }
    if text.contains("star") {
        push(TopicTag::Star);
    }
    if text.contains("what is") || text.contains("define") || text.contains("definition")
        || text.contains("concept")
    {
        push(TopicTag::Concepts);
    }
    if text.contains("physics") || text.contains("metric") && text.contains("tensor") {
        push(TopicTag::Physics);
    }
    tags
}

/// Derive the retrieval profile for a tag set. Returns `None` when no tag
/// implies a scope beyond the whole lattice.
pub fn profile_for_tags(tags: &[TopicTag]) -> Option<TopicProfile> {
    if tags.is_empty() {
        return None;
    }
    let primary = tags[0];
    let profile = match primary {
        TopicTag::HelixAsk => TopicProfile {
            tags: tags.to_vec(),
            allowlist_tiers: vec![
                AllowlistTier::new("docs", &["docs/"]),
                AllowlistTier::new("ask-services", &["server/services/helix-ask/", "server/routes/"]),
                AllowlistTier::new("client", &["client/src/components/helix/"]),
            ],
            must_include_files: vec!["docs/helix-ask-flow.md".to_string()],
            must_include_patterns: vec!["helix-ask".to_string()],
            boost_paths: vec!["server/services/helix-ask/".to_string()],
            deboost_paths: vec!["client/src/".to_string()],
            min_tier_candidates: 3,
        },
        TopicTag::Warp | TopicTag::Physics => TopicProfile {
            tags: tags.to_vec(),
            allowlist_tiers: vec![
                AllowlistTier::new("knowledge", &["docs/knowledge/"]),
                AllowlistTier::new("physics", &["server/physics/", "server/services/warp/"]),
            ],
            must_include_files: Vec::new(),
            must_include_patterns: vec!["warp".to_string()],
            boost_paths: vec!["docs/knowledge/".to_string()],
            deboost_paths: vec!["client/src/".to_string()],
            min_tier_candidates: 2,
        },
        TopicTag::Ideology => TopicProfile {
            tags: tags.to_vec(),
            allowlist_tiers: vec![
                AllowlistTier::new("ethos", &["docs/ethos/"]),
                AllowlistTier::new("docs", &["docs/"]),
            ],
            must_include_files: Vec::new(),
            must_include_patterns: vec!["ethos".to_string()],
            boost_paths: vec!["docs/ethos/".to_string()],
            deboost_paths: Vec::new(),
            min_tier_candidates: 2,
        },
        TopicTag::Ledger => TopicProfile {
            tags: tags.to_vec(),
            allowlist_tiers: vec![
                AllowlistTier::new("knowledge", &["docs/knowledge/"]),
                AllowlistTier::new("trace-services", &["server/services/refinery/", "server/services/helix-ask/"]),
            ],
            must_include_files: Vec::new(),
            must_include_patterns: Vec::new(),
            boost_paths: vec!["server/services/refinery/".to_string()],
            deboost_paths: Vec::new(),
            min_tier_candidates: 2,
        },
        TopicTag::Star => TopicProfile {
            tags: tags.to_vec(),
            allowlist_tiers: vec![AllowlistTier::new("star", &["server/services/star/", "docs/star/"])],
            must_include_files: Vec::new(),
            must_include_patterns: Vec::new(),
            boost_paths: Vec::new(),
            deboost_paths: Vec::new(),
            min_tier_candidates: 2,
        },
        TopicTag::Concepts => TopicProfile {
            tags: tags.to_vec(),
            allowlist_tiers: vec![
                AllowlistTier::new("knowledge", &["docs/knowledge/", "docs/"]),
                AllowlistTier::new("services", &["server/services/"]),
            ],
            must_include_files: Vec::new(),
            must_include_patterns: Vec::new(),
            boost_paths: vec!["docs/knowledge/".to_string()],
            deboost_paths: vec!["client/src/".to_string()],
            min_tier_candidates: 2,
        },
    };
    Some(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_deduplicated_and_ordered() {
        let tags = tag_question("How does the Helix Ask pipeline trace warp viability?", None);
        assert_eq!(tags[0], TopicTag::HelixAsk);
        assert!(tags.contains(&TopicTag::Warp));
        assert!(tags.contains(&TopicTag::Ledger));
    }

    #[test]
    fn search_query_contributes_tags() {
        let tags = tag_question("Explain this.", Some("ethos ledger"));
        assert!(tags.contains(&TopicTag::Ideology));
        assert!(tags.contains(&TopicTag::Ledger));
    }

    #[test]
    fn profile_descends_from_docs() {
        let tags = vec![TopicTag::HelixAsk];
        let profile = profile_for_tags(&tags).unwrap();
        assert_eq!(profile.allowlist_tiers[0].label, "docs");
        assert!(profile.allowlist_tiers[0].admits("docs/helix-ask-flow.md"));
        assert!(!profile.allowlist_tiers[0].admits("server/routes/agi.plan.ts"));
    }

    #[test]
    fn empty_tags_have_no_profile() {
        assert!(profile_for_tags(&[]).is_none());
    }
}
