//! Hybrid retriever: multi-channel candidate generation, weighted RRF
//! fusion, MMR diversification, tier descent, and the docs-grep fallback.

pub mod channels;
mod docs_grep;
mod evidence;
pub mod fuse;

pub use docs_grep::docs_grep;
pub use evidence::{clip, Candidate, Channel, ContextBlock, EvidencePack, RetrievalMetrics};

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::config::Settings;
use crate::lattice::LatticeSnapshot;
use crate::topic::{AllowlistTier, TopicProfile};

/// Retrieval scope contributed by the plan pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanScope {
    /// Extra allowlist tiers, tried before the topic tiers
    pub allowlist_tiers: Vec<AllowlistTier>,
    /// Path substrings excluded outright
    pub avoidlist: Vec<String>,
    /// Glob patterns the selection must cover, one set each
    pub must_include_globs: Vec<String>,
    /// Restrict to the docs allowlist before anything else
    pub docs_first: bool,
    /// Path substrings defining the docs allowlist
    pub docs_allowlist: Vec<String>,
}

/// One retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub question: String,
    /// Search queries, base plus plan-pass hints
    pub queries: Vec<String>,
    pub top_k: usize,
    pub topic_profile: Option<TopicProfile>,
    pub plan_scope: Option<PlanScope>,
    /// The intent obliges repo evidence
    pub require_repo_evidence: bool,
    /// Source paths of a strong concept match, boosted as a fast path
    pub concept_paths: Vec<String>,
}

fn noise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(fixture|mock|generated|\.min\.|node_modules)").unwrap())
}

/// Multi-channel retriever over a lattice snapshot.
pub struct HybridRetriever {
    snapshot: Arc<LatticeSnapshot>,
    settings: Settings,
}

impl HybridRetriever {
    pub fn new(snapshot: Arc<LatticeSnapshot>, settings: Settings) -> Self {
        Self { snapshot, settings }
    }

    /// The backing snapshot.
    pub fn snapshot(&self) -> &Arc<LatticeSnapshot> {
        &self.snapshot
    }

    /// Run the full retrieval pipeline and assemble an evidence pack.
    pub fn retrieve(&self, request: &RetrievalRequest) -> EvidencePack {
        let fusion = &self.settings.fusion;

        // Candidate generation, one weighted list per channel per query.
        let mut lists: Vec<(Vec<Candidate>, f64)> = Vec::new();
        let mut query_hit_count = 0usize;
        let mut channel_hits: HashMap<String, usize> = HashMap::new();
        let mut channel_top_scores: HashMap<String, f64> = HashMap::new();

        for query in &request.queries {
            let generated = [
                (channels::lexical(&self.snapshot, query), fusion.rrf_weight_lexical),
                (channels::symbol(&self.snapshot, query), fusion.rrf_weight_symbol),
                (
                    channels::fuzzy(&self.snapshot, query, fusion.fuzzy_threshold),
                    fusion.rrf_weight_fuzzy,
                ),
                (
                    channels::path(&self.snapshot, &self.settings.repo_root, query),
                    fusion.rrf_weight_path,
                ),
            ];
            let mut any_hit = false;
            for (list, weight) in generated {
                if !list.is_empty() {
                    any_hit = true;
                    let name = list[0].channel.to_string();
                    *channel_hits.entry(name.clone()).or_insert(0) += list.len();
                    let top = channel_top_scores.entry(name).or_insert(0.0);
                    if list[0].score > *top {
                        *top = list[0].score;
                    }
                }
                lists.push((list, weight));
            }
            if any_hit {
                query_hit_count += 1;
            }
        }

        let mut fused = fuse::weighted_rrf(&lists, fusion.rrf_k);

        // Plan-scope avoidlist drops paths outright.
        if let Some(scope) = &request.plan_scope {
            if !scope.avoidlist.is_empty() {
                fused.retain(|c| !scope.avoidlist.iter().any(|a| c.file_path.contains(a.as_str())));
            }
        }

        // Topic and concept boosts, anti-noise deboost.
        if let Some(topic) = &request.topic_profile {
            fuse::apply_path_factor(&mut fused, &topic.boost_paths, 1.25);
            fuse::apply_path_factor(&mut fused, &topic.deboost_paths, 0.8);
        }
        if !request.concept_paths.is_empty() {
            fuse::apply_path_factor(&mut fused, &request.concept_paths, 1.3);
        }
        let noisy: Vec<String> = fused
            .iter()
            .filter(|c| noise_re().is_match(&c.file_path))
            .map(|c| c.file_path.clone())
            .collect();
        fuse::apply_path_factor(&mut fused, &noisy, 0.7);

        let mut metrics = RetrievalMetrics {
            query_hit_count,
            channel_hits,
            channel_top_scores,
            ..Default::default()
        };

        // Docs-first scope: restrict to the docs allowlist, with a grep
        // fallback when the restriction comes back empty.
        if let Some(scope) = &request.plan_scope {
            if scope.docs_first {
                let allow = if scope.docs_allowlist.is_empty() {
                    vec!["docs/".to_string()]
                } else {
                    scope.docs_allowlist.clone()
                };
                let docs_only: Vec<Candidate> = fused
                    .iter()
                    .filter(|c| allow.iter().any(|a| c.file_path.contains(a.as_str())))
                    .cloned()
                    .collect();
                if !docs_only.is_empty() {
                    fused = docs_only;
                } else if request.require_repo_evidence {
                    let grepped = docs_grep(&self.settings.repo_root, &request.question);
                    if !grepped.is_empty() {
                        let fallback =
                            fuse::weighted_rrf(&[(grepped, fusion.rrf_weight_lexical)], fusion.rrf_k);
                        Self::fill_metrics(&mut metrics, &fallback);
                        let selected =
                            fuse::mmr_diversify(&fallback, fusion.mmr_lambda, request.top_k);
                        metrics.must_include_ok = true;
                        metrics.topic_tier_used = Some("docs-grep".to_string());
                        return EvidencePack::from_candidates(
                            &selected,
                            self.settings.context_chars,
                            metrics,
                        );
                    }
                }
            }
        }

        // Tier descent: plan tiers first, then topic tiers, then open scope.
        let mut tiers: Vec<AllowlistTier> = Vec::new();
        if let Some(scope) = &request.plan_scope {
            tiers.extend(scope.allowlist_tiers.iter().cloned());
        }
        if let Some(topic) = &request.topic_profile {
            tiers.extend(topic.allowlist_tiers.iter().cloned());
        }
        let min_candidates = request
            .topic_profile
            .as_ref()
            .map(|t| t.min_tier_candidates)
            .unwrap_or(2);

        let must_sets = self.must_include_sets(request);

        let mut last_selection: Vec<Candidate> = Vec::new();
        let mut last_tier: Option<String> = None;
        let mut last_must_ok = false;

        for tier in &tiers {
            let restricted: Vec<Candidate> = fused
                .iter()
                .filter(|c| tier.admits(&c.file_path))
                .cloned()
                .collect();
            if restricted.is_empty() {
                continue;
            }
            let mut selected =
                fuse::mmr_diversify(&restricted, fusion.mmr_lambda, request.top_k);
            let must_ok = Self::ensure_must_include(&mut selected, &fused, &must_sets, request.top_k);
            if selected.len() >= min_candidates && must_ok {
                Self::fill_metrics(&mut metrics, &restricted);
                metrics.topic_tier_used = Some(tier.label.clone());
                metrics.must_include_ok = true;
                return EvidencePack::from_candidates(
                    &selected,
                    self.settings.context_chars,
                    metrics,
                );
            }
            last_selection = selected;
            last_tier = Some(tier.label.clone());
            last_must_ok = must_ok;
        }

        if tiers.is_empty() {
            // Open scope: single pass over the fused list.
            let mut selected = fuse::mmr_diversify(&fused, fusion.mmr_lambda, request.top_k);
            let must_ok = Self::ensure_must_include(&mut selected, &fused, &must_sets, request.top_k);
            Self::fill_metrics(&mut metrics, &fused);
            metrics.must_include_ok = must_ok;
            return EvidencePack::from_candidates(&selected, self.settings.context_chars, metrics);
        }

        // No tier satisfied both conditions: ship the last tier's selection
        // and let downstream gates decide.
        Self::fill_metrics(&mut metrics, &fused);
        metrics.topic_tier_used = last_tier;
        metrics.must_include_ok = last_must_ok;
        EvidencePack::from_candidates(&last_selection, self.settings.context_chars, metrics)
    }

    /// Must-include sets: the topic files/patterns form one set, each plan
    /// glob its own set.
    fn must_include_sets(&self, request: &RetrievalRequest) -> Vec<MustSet> {
        let mut sets = Vec::new();
        if let Some(topic) = &request.topic_profile {
            if !topic.must_include_files.is_empty() || !topic.must_include_patterns.is_empty() {
                sets.push(MustSet {
                    files: topic.must_include_files.clone(),
                    patterns: topic.must_include_patterns.clone(),
                    glob: None,
                });
            }
        }
        if let Some(scope) = &request.plan_scope {
            for raw in &scope.must_include_globs {
                sets.push(MustSet {
                    files: Vec::new(),
                    patterns: Vec::new(),
                    glob: glob::Pattern::new(raw).ok(),
                });
            }
        }
        sets
    }

    /// Verify every must-include set is covered; when a covering candidate
    /// exists in the fused list but missed selection, swap it in for the
    /// weakest pick. Returns overall satisfaction.
    fn ensure_must_include(
        selected: &mut Vec<Candidate>,
        fused: &[Candidate],
        sets: &[MustSet],
        top_k: usize,
    ) -> bool {
        let mut all_ok = true;
        for set in sets {
            if selected.iter().any(|c| set.covers(&c.file_path)) {
                continue;
            }
            match fused.iter().find(|c| set.covers(&c.file_path)) {
                Some(candidate) => {
                    selected.push(candidate.clone());
                    if selected.len() > top_k {
                        // Drop the weakest non-mandatory pick.
                        if let Some((idx, _)) = selected
                            .iter()
                            .enumerate()
                            .filter(|(_, c)| !sets.iter().any(|s| s.covers(&c.file_path)))
                            .min_by(|a, b| {
                                a.1.rrf_score
                                    .partial_cmp(&b.1.rrf_score)
                                    .unwrap_or(std::cmp::Ordering::Equal)
                            })
                        {
                            selected.remove(idx);
                        }
                    }
                }
                None => all_ok = false,
            }
        }
        all_ok
    }

    fn fill_metrics(metrics: &mut RetrievalMetrics, ordered: &[Candidate]) {
        metrics.top_score = ordered.first().map(|c| c.rrf_score).unwrap_or(0.0);
        let second = ordered.get(1).map(|c| c.rrf_score).unwrap_or(0.0);
        metrics.score_gap = (metrics.top_score - second).max(0.0);
    }
}

struct MustSet {
    files: Vec<String>,
    patterns: Vec<String>,
    glob: Option<glob::Pattern>,
}

impl MustSet {
    fn covers(&self, path: &str) -> bool {
        self.files.iter().any(|f| path == f)
            || self.patterns.iter().any(|p| path.contains(p.as_str()))
            || self.glob.as_ref().is_some_and(|g| g.matches(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::LatticeNode;
    use crate::topic::{profile_for_tags, TopicTag};

    fn node(symbol: &str, file: &str, doc: &str) -> LatticeNode {
        LatticeNode {
            symbol: symbol.to_string(),
            file_path: file.to_string(),
            signature: format!("fn {symbol}()"),
            doc: doc.to_string(),
            snippet: doc.to_string(),
        }
    }

    fn retriever() -> HybridRetriever {
        let snapshot = LatticeSnapshot::from_nodes(vec![
            node(
                "helixAskFlow",
                "docs/helix-ask-flow.md",
                "Overview of the Helix Ask pipeline stages.",
            ),
            node(
                "intentDirectory",
                "server/services/helix-ask/intent-directory.ts",
                "Intent directory matching for Helix Ask.",
            ),
            node(
                "askPill",
                "client/src/components/helix/HelixAskPill.tsx",
                "Ask pill UI component.",
            ),
            node(
                "askRoute",
                "server/routes/agi.plan.ts",
                "Registers the /api/agi/ask route for the pipeline.",
            ),
        ]);
        HybridRetriever::new(Arc::new(snapshot), Settings::default())
    }

    fn request(queries: &[&str]) -> RetrievalRequest {
        RetrievalRequest {
            question: queries.join(" "),
            queries: queries.iter().map(|q| q.to_string()).collect(),
            top_k: 4,
            topic_profile: None,
            plan_scope: None,
            require_repo_evidence: false,
            concept_paths: Vec::new(),
        }
    }

    #[test]
    fn open_scope_retrieval_finds_pipeline_docs() {
        let r = retriever();
        let pack = r.retrieve(&request(&["helix ask pipeline"]));
        assert!(!pack.is_empty());
        assert_eq!(pack.metrics.query_hit_count, 1);
        assert!(pack.files.contains(&"docs/helix-ask-flow.md".to_string()));
    }

    #[test]
    fn tier_descent_uses_docs_tier_first() {
        let r = retriever();
        let mut req = request(&["helix ask pipeline intent"]);
        req.topic_profile = profile_for_tags(&[TopicTag::HelixAsk]);
        let pack = r.retrieve(&req);
        // The docs tier alone can't satisfy min_tier_candidates=3, so the
        // retriever descends; metrics report the tier finally used.
        assert!(pack.metrics.topic_tier_used.is_some());
    }

    #[test]
    fn must_include_swaps_in_covering_candidate() {
        let r = retriever();
        let mut req = request(&["intent directory"]);
        req.top_k = 1;
        req.topic_profile = profile_for_tags(&[TopicTag::HelixAsk]);
        let pack = r.retrieve(&req);
        // The topic requires docs/helix-ask-flow.md or a helix-ask path.
        assert!(pack
            .files
            .iter()
            .any(|f| f == "docs/helix-ask-flow.md" || f.contains("helix-ask")));
    }

    #[test]
    fn avoidlist_excludes_paths() {
        let r = retriever();
        let mut req = request(&["helix ask pipeline"]);
        req.plan_scope = Some(PlanScope {
            avoidlist: vec!["client/src/".to_string()],
            ..Default::default()
        });
        let pack = r.retrieve(&req);
        assert!(!pack.files.iter().any(|f| f.starts_with("client/src/")));
    }

    #[test]
    fn fused_scores_are_monotone_in_pack_order() {
        let r = retriever();
        let pack = r.retrieve(&request(&["helix ask pipeline intent route"]));
        assert!(pack.metrics.top_score > 0.0);
    }
}
