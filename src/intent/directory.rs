//! The intent directory: first-hit-wins profile matching.

use crate::text::QuestionHints;

use super::{
    EvidencePolicy, FormatPolicy, IntentDomain, IntentMatchers, IntentProfile, IntentTier,
    Strategy,
};

/// Result of matching a question against the directory.
#[derive(Debug, Clone)]
pub struct IntentMatch {
    pub profile: IntentProfile,
    /// Human-readable audit reason
    pub reason: String,
}

/// Directory of intent profiles, scanned in declared priority.
pub struct IntentDirectory {
    profiles: Vec<IntentProfile>,
    fallback: IntentProfile,
}

impl Default for IntentDirectory {
    fn default() -> Self {
        Self::builtin()
    }
}

impl IntentDirectory {
    /// Build a directory from explicit profiles plus a fallback.
    pub fn new(profiles: Vec<IntentProfile>, fallback: IntentProfile) -> Self {
        Self { profiles, fallback }
    }

    /// The built-in profile directory.
    pub fn builtin() -> Self {
        let profiles = vec![
            IntentProfile {
                id: "pipeline_overview".to_string(),
                label: "Pipeline overview".to_string(),
                domain: IntentDomain::Repo,
                tier: IntentTier::F1,
                secondary_tier: Some(IntentTier::F2),
                strategy: Strategy::PipelineOverview,
                format_policy: FormatPolicy::Steps,
                evidence: EvidencePolicy::repo(),
                matchers: IntentMatchers::phrases(&[
                    "how does the helix ask pipeline",
                    "ask pipeline work",
                    "pipeline end to end",
                ]),
                repo_expectation_fallback: None,
            },
            IntentProfile {
                id: "endpoint_lookup".to_string(),
                label: "Endpoint lookup".to_string(),
                domain: IntentDomain::Repo,
                tier: IntentTier::F0,
                secondary_tier: None,
                strategy: Strategy::EndpointLookup,
                format_policy: FormatPolicy::Brief,
                evidence: EvidencePolicy::repo(),
                matchers: IntentMatchers::phrases(&["which file", "what file", "where is the route"])
                    .with_pattern(r"/api/[a-z0-9/_-]+"),
                repo_expectation_fallback: None,
            },
            IntentProfile {
                id: "repo_explain".to_string(),
                label: "Repo explanation".to_string(),
                domain: IntentDomain::Repo,
                tier: IntentTier::F1,
                secondary_tier: None,
                strategy: Strategy::RepoExplain,
                format_policy: FormatPolicy::Auto,
                evidence: EvidencePolicy::repo(),
                matchers: IntentMatchers::phrases(&[
                    "how does the code",
                    "how is it implemented",
                    "walk through the implementation",
                    "in this repo",
                ]),
                repo_expectation_fallback: None,
            },
            IntentProfile {
                id: "constraint_report".to_string(),
                label: "Constraint report".to_string(),
                domain: IntentDomain::Falsifiable,
                tier: IntentTier::F2,
                secondary_tier: None,
                strategy: Strategy::ConstraintReport,
                format_policy: FormatPolicy::Compare,
                evidence: EvidencePolicy::repo(),
                matchers: IntentMatchers::phrases(&[
                    "what are the constraints",
                    "which invariants",
                    "what limits",
                ]),
                repo_expectation_fallback: None,
            },
            IntentProfile {
                id: "ideology".to_string(),
                label: "Ideology".to_string(),
                domain: IntentDomain::Hybrid,
                tier: IntentTier::F2,
                secondary_tier: None,
                strategy: Strategy::Ideology,
                format_policy: FormatPolicy::Brief,
                evidence: EvidencePolicy::hybrid(),
                matchers: IntentMatchers::phrases(&["ethos", "ideology", "why do we believe"]),
                repo_expectation_fallback: None,
            },
            IntentProfile {
                id: "concept_definition".to_string(),
                label: "Concept definition".to_string(),
                domain: IntentDomain::Hybrid,
                tier: IntentTier::F1,
                secondary_tier: Some(IntentTier::F2),
                strategy: Strategy::ConceptDefinition,
                format_policy: FormatPolicy::Brief,
                evidence: EvidencePolicy::hybrid(),
                matchers: IntentMatchers::phrases(&["what is", "define", "definition of", "explain the concept"]),
                repo_expectation_fallback: Some(IntentDomain::Repo),
            },
        ];

        let fallback = IntentProfile {
            id: "general".to_string(),
            label: "General".to_string(),
            domain: IntentDomain::General,
            tier: IntentTier::F3,
            secondary_tier: None,
            strategy: Strategy::HybridExplain,
            format_policy: FormatPolicy::Auto,
            evidence: EvidencePolicy::general(),
            matchers: IntentMatchers::phrases(&[]),
            // A general question that names repo structures is answered in
            // hybrid mode so citations stay available.
            repo_expectation_fallback: Some(IntentDomain::Hybrid),
        };

        Self::new(profiles, fallback)
    }

    /// All profiles in priority order (fallback excluded).
    pub fn profiles(&self) -> &[IntentProfile] {
        &self.profiles
    }

    /// Match a question to a profile. Deterministic, no I/O; the first
    /// matcher hit wins. Profiles may impose a domain fallback when the
    /// caller reports repo expectation.
    pub fn match_question(&self, question: &str, hints: &QuestionHints) -> IntentMatch {
        let lower = question.to_lowercase();

        for profile in &self.profiles {
            if let Some(hit) = profile.matchers.hit(&lower) {
                let mut profile = profile.clone();
                let mut reason = format!("intent:{} via {hit}", profile.id);
                if hints.has_repo_expectation {
                    if let Some(domain) = profile.repo_expectation_fallback {
                        reason.push_str(&format!(
                            "; domain {}->{domain} (explicit_repo_expectation)",
                            profile.domain
                        ));
                        profile.domain = domain;
                    }
                }
                return IntentMatch { profile, reason };
            }
        }

        let mut profile = self.fallback.clone();
        let mut reason = format!("intent:{} (fallback)", profile.id);
        if hints.has_repo_expectation {
            if let Some(domain) = profile.repo_expectation_fallback {
                reason.push_str(&format!(
                    "; domain {}->{domain} (explicit_repo_expectation)",
                    profile.domain
                ));
                profile.domain = domain;
            }
        }
        IntentMatch { profile, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::detect_hints;

    #[test]
    fn first_hit_wins_over_later_profiles() {
        let dir = IntentDirectory::builtin();
        // "how does the helix ask pipeline" also contains "how does", but the
        // pipeline profile is declared first.
        let q = "How does the Helix Ask pipeline work?";
        let m = dir.match_question(q, &detect_hints(q));
        assert_eq!(m.profile.id, "pipeline_overview");
        assert!(m.reason.contains("pipeline_overview"));
    }

    #[test]
    fn endpoint_questions_route_to_lookup() {
        let dir = IntentDirectory::builtin();
        let q = "Which file defines the HTTP route /api/agi/ask?";
        let m = dir.match_question(q, &detect_hints(q));
        assert_eq!(m.profile.id, "endpoint_lookup");
        assert_eq!(m.profile.domain, IntentDomain::Repo);
    }

    #[test]
    fn concept_question_upgrades_on_repo_expectation() {
        let dir = IntentDirectory::builtin();
        let q = "What is the retrieval confidence in server/services/helix-ask/arbiter.ts?";
        let m = dir.match_question(q, &detect_hints(q));
        assert_eq!(m.profile.id, "concept_definition");
        assert_eq!(m.profile.domain, IntentDomain::Repo);
        assert!(m.reason.contains("explicit_repo_expectation"));
    }

    #[test]
    fn unmatched_question_falls_back_to_general() {
        let dir = IntentDirectory::builtin();
        let q = "Tell me something interesting about compilers.";
        let m = dir.match_question(q, &detect_hints(q));
        assert_eq!(m.profile.id, "general");
        assert_eq!(m.profile.domain, IntentDomain::General);
    }
}
