//! Plan pass: a bounded micro-LLM call that constrains retrieval scope.

mod parse;

pub use parse::parse_plan;

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::Result;
use crate::llm::{CompletionRequest, OverflowDebug, OverflowRunner};
use crate::retrieval::PlanScope;
use crate::topic::AllowlistTier;

/// Closed set of retrieval surfaces the plan pass may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Docs,
    Ethos,
    Knowledge,
    Tests,
    Code,
}

impl Surface {
    /// Parse a lowercase surface value; `None` for anything outside the set.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "docs" => Some(Self::Docs),
            "ethos" => Some(Self::Ethos),
            "knowledge" => Some(Self::Knowledge),
            "tests" => Some(Self::Tests),
            "code" => Some(Self::Code),
            _ => None,
        }
    }

    /// Path substrings a surface maps onto.
    pub fn path_patterns(self) -> &'static [&'static str] {
        match self {
            Self::Docs => &["docs/"],
            Self::Ethos => &["docs/ethos/"],
            Self::Knowledge => &["docs/knowledge/"],
            Self::Tests => &["tests/", "__tests__"],
            Self::Code => &["server/", "src/"],
        }
    }
}

/// Slots the answer must cover, checked by the slot-coverage gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredSlot {
    Definition,
    RepoMapping,
    Verification,
    FailurePath,
    Flow,
}

impl RequiredSlot {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "definition" => Some(Self::Definition),
            "repo_mapping" => Some(Self::RepoMapping),
            "verification" => Some(Self::Verification),
            "failure_path" => Some(Self::FailurePath),
            "flow" => Some(Self::Flow),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Definition => "definition",
            Self::RepoMapping => "repo_mapping",
            Self::Verification => "verification",
            Self::FailurePath => "failure_path",
            Self::Flow => "flow",
        }
    }
}

/// Directives emitted by the plan pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanDirectives {
    pub preferred_surfaces: Vec<Surface>,
    pub avoid_surfaces: Vec<Surface>,
    pub must_include_globs: Vec<String>,
    pub required_slots: Vec<RequiredSlot>,
    pub clarify_question: Option<String>,
    /// Unknown surface values and non-path globs, kept as soft hints
    pub path_hints: Vec<String>,
    /// Query hints from the queries subsection
    pub query_hints: Vec<String>,
}

impl PlanDirectives {
    /// Remove duplicates while preserving first-seen order.
    pub fn dedup(&mut self) {
        dedup_in_place(&mut self.preferred_surfaces);
        dedup_in_place(&mut self.avoid_surfaces);
        dedup_in_place(&mut self.must_include_globs);
        dedup_in_place(&mut self.required_slots);
        dedup_in_place(&mut self.path_hints);
        dedup_in_place(&mut self.query_hints);
    }

    /// True when nothing was parsed.
    pub fn is_empty(&self) -> bool {
        self.preferred_surfaces.is_empty()
            && self.avoid_surfaces.is_empty()
            && self.must_include_globs.is_empty()
            && self.required_slots.is_empty()
            && self.clarify_question.is_none()
            && self.path_hints.is_empty()
            && self.query_hints.is_empty()
    }

    /// Convert the directives into a retrieval plan scope.
    pub fn to_plan_scope(&self) -> PlanScope {
        let docs_first = self
            .preferred_surfaces
            .first()
            .is_some_and(|s| matches!(s, Surface::Docs | Surface::Knowledge | Surface::Ethos));

        let mut docs_allowlist = Vec::new();
        let mut allowlist_tiers = Vec::new();
        for surface in &self.preferred_surfaces {
            let patterns: Vec<&str> = surface.path_patterns().to_vec();
            if docs_first && matches!(surface, Surface::Docs | Surface::Knowledge | Surface::Ethos)
            {
                docs_allowlist.extend(patterns.iter().map(|p| p.to_string()));
            }
            allowlist_tiers.push(AllowlistTier::new(
                format!("plan:{surface:?}").to_lowercase(),
                &patterns,
            ));
        }
        if !self.path_hints.is_empty() {
            let patterns: Vec<&str> = self.path_hints.iter().map(String::as_str).collect();
            allowlist_tiers.push(AllowlistTier::new("plan:hints", &patterns));
        }

        let avoidlist = self
            .avoid_surfaces
            .iter()
            .flat_map(|s| s.path_patterns().iter().map(|p| p.to_string()))
            .collect();

        PlanScope {
            allowlist_tiers,
            avoidlist,
            must_include_globs: self.must_include_globs.clone(),
            docs_first,
            docs_allowlist,
        }
    }
}

fn dedup_in_place<T: PartialEq + Clone>(values: &mut Vec<T>) {
    let mut seen: Vec<T> = Vec::with_capacity(values.len());
    values.retain(|v| {
        if seen.contains(v) {
            false
        } else {
            seen.push(v.clone());
            true
        }
    });
}

/// Merge plan query hints into the base queries: dedup, preserve order,
/// respect the cap.
pub fn merge_queries(base: &[String], hints: &[String], cap: usize) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for query in base.iter().chain(hints.iter()) {
        let normalized = query.trim().to_string();
        if normalized.is_empty() || merged.iter().any(|q| q.eq_ignore_ascii_case(&normalized)) {
            continue;
        }
        merged.push(normalized);
        if merged.len() >= cap {
            break;
        }
    }
    merged
}

/// Result of running the plan pass.
#[derive(Debug, Clone)]
pub struct PlanPassOutcome {
    pub directives: PlanDirectives,
    pub merged_queries: Vec<String>,
    pub overflow: OverflowDebug,
}

/// The micro plan pass.
pub struct PlanPass<'a> {
    runner: &'a OverflowRunner,
    settings: &'a Settings,
}

impl<'a> PlanPass<'a> {
    pub fn new(runner: &'a OverflowRunner, settings: &'a Settings) -> Self {
        Self { runner, settings }
    }

    /// Run the plan pass and merge its query hints with the base queries.
    pub async fn run(
        &self,
        question: &str,
        base_queries: &[String],
    ) -> Result<PlanPassOutcome> {
        let prompt = build_plan_prompt(question);
        let request = CompletionRequest::new("plan", prompt, 256).with_temperature(0.3);
        let (response, overflow) = self.runner.run(request, false).await?;

        let directives = parse_plan(&response.text);
        let merged_queries =
            merge_queries(base_queries, &directives.query_hints, self.settings.query_cap);
        tracing::debug!(
            surfaces = directives.preferred_surfaces.len(),
            slots = directives.required_slots.len(),
            queries = merged_queries.len(),
            "plan pass parsed"
        );
        Ok(PlanPassOutcome {
            directives,
            merged_queries,
            overflow,
        })
    }
}

fn build_plan_prompt(question: &str) -> String {
    format!(
        "You are the retrieval planner for a code-grounded answering engine.\n\
         Decide which surfaces to prefer or avoid and which files must appear.\n\
         Surfaces: docs, ethos, knowledge, tests, code.\n\
         Slots: definition, repo_mapping, verification, failure_path, flow.\n\
         Emit exactly this structure:\n\
         PLAN_START\n\
         QUERIES_START\n\
         - <search query hint>\n\
         QUERIES_END\n\
         preferred_surfaces: <comma list or none>\n\
         avoid_surfaces: <comma list or none>\n\
         must_include_globs: <comma list of repo globs or none>\n\
         required_slots: <comma list or none>\n\
         clarify: <question to ask the user, or none>\n\
         PLAN_END\n\n\
         Question: {question}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_queries_dedups_and_caps() {
        let base = vec!["alpha governor".to_string(), "governor window".to_string()];
        let hints = vec![
            "Alpha Governor".to_string(),
            "admission policy".to_string(),
            "extra one".to_string(),
        ];
        let merged = merge_queries(&base, &hints, 3);
        assert_eq!(
            merged,
            vec!["alpha governor", "governor window", "admission policy"]
        );
    }

    #[test]
    fn docs_first_scope_from_preferred_docs() {
        let mut d = PlanDirectives::default();
        d.preferred_surfaces = vec![Surface::Docs, Surface::Code];
        d.avoid_surfaces = vec![Surface::Tests];
        let scope = d.to_plan_scope();
        assert!(scope.docs_first);
        assert_eq!(scope.docs_allowlist, vec!["docs/"]);
        assert!(scope.avoidlist.contains(&"tests/".to_string()));
    }

    #[test]
    fn code_first_scope_is_not_docs_first() {
        let mut d = PlanDirectives::default();
        d.preferred_surfaces = vec![Surface::Code];
        assert!(!d.to_plan_scope().docs_first);
    }
}
