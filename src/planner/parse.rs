//! Parser for the plan-pass emission format.
//!
//! The micro pass must emit between `PLAN_START` and `PLAN_END`, with an
//! optional `QUERIES_START`/`QUERIES_END` subsection of query hints and
//! directive lines after it. Unknown surface values and non-path globs are
//! demoted to hints rather than rejected.

use super::{PlanDirectives, RequiredSlot, Surface};

const PLAN_START: &str = "PLAN_START";
const PLAN_END: &str = "PLAN_END";
const QUERIES_START: &str = "QUERIES_START";
const QUERIES_END: &str = "QUERIES_END";

/// Parse a plan emission. Returns the default (empty) directives when no
/// plan block is present at all.
pub fn parse_plan(text: &str) -> PlanDirectives {
    let mut directives = PlanDirectives::default();

    let Some(block) = extract_block(text, PLAN_START, PLAN_END) else {
        return directives;
    };

    let mut in_queries = false;
    for raw in block.lines() {
        let line = raw.trim().trim_start_matches('-').trim();
        if line.is_empty() {
            continue;
        }
        if line == QUERIES_START {
            in_queries = true;
            continue;
        }
        if line == QUERIES_END {
            in_queries = false;
            continue;
        }
        if in_queries {
            if !line.is_empty() {
                directives.query_hints.push(line.to_string());
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("preferred_surfaces:") {
            for value in split_values(rest) {
                match Surface::parse(&value) {
                    Some(surface) => directives.preferred_surfaces.push(surface),
                    // Unknown surfaces are interpreted as repo path hints.
                    None => directives.path_hints.push(value),
                }
            }
        } else if let Some(rest) = line.strip_prefix("avoid_surfaces:") {
            for value in split_values(rest) {
                if let Some(surface) = Surface::parse(&value) {
                    directives.avoid_surfaces.push(surface);
                }
            }
        } else if let Some(rest) = line.strip_prefix("must_include_globs:") {
            for value in split_values(rest) {
                if looks_like_repo_path(&value) {
                    directives.must_include_globs.push(value);
                } else {
                    directives.path_hints.push(value);
                }
            }
        } else if let Some(rest) = line.strip_prefix("required_slots:") {
            for value in split_values(rest) {
                if let Some(slot) = RequiredSlot::parse(&value) {
                    directives.required_slots.push(slot);
                }
            }
        } else if let Some(rest) = line.strip_prefix("clarify:") {
            let clarify = rest.trim();
            if !clarify.is_empty() && clarify != "none" {
                directives.clarify_question = Some(clarify.to_string());
            }
        } else {
            // Trailing bare lines are query hints too.
            directives.query_hints.push(line.to_string());
        }
    }

    directives.dedup();
    directives
}

fn extract_block<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let s = text.find(start)? + start.len();
    let e = text[s..].find(end)? + s;
    Some(&text[s..e])
}

fn split_values(rest: &str) -> Vec<String> {
    rest.split(',')
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty() && v != "none")
        .collect()
}

/// A glob must look like a repo path: contains a separator, no whitespace.
fn looks_like_repo_path(value: &str) -> bool {
    value.contains('/') && !value.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_full_emission() {
        let text = "\
preamble noise
PLAN_START
QUERIES_START
- intent directory matching
- evidence gate thresholds
QUERIES_END
preferred_surfaces: docs, knowledge
avoid_surfaces: tests
must_include_globs: docs/knowledge/*.md
required_slots: definition, repo_mapping
clarify: none
PLAN_END
trailing noise";
        let d = parse_plan(text);
        assert_eq!(d.query_hints.len(), 2);
        assert_eq!(d.preferred_surfaces, vec![Surface::Docs, Surface::Knowledge]);
        assert_eq!(d.avoid_surfaces, vec![Surface::Tests]);
        assert_eq!(d.must_include_globs, vec!["docs/knowledge/*.md"]);
        assert_eq!(
            d.required_slots,
            vec![RequiredSlot::Definition, RequiredSlot::RepoMapping]
        );
        assert!(d.clarify_question.is_none());
    }

    #[test]
    fn unknown_surfaces_become_path_hints() {
        let text = "PLAN_START\npreferred_surfaces: docs, server/services/helix-ask\nPLAN_END";
        let d = parse_plan(text);
        assert_eq!(d.preferred_surfaces, vec![Surface::Docs]);
        assert_eq!(d.path_hints, vec!["server/services/helix-ask"]);
    }

    #[test]
    fn non_path_globs_demote_to_hints() {
        let text = "PLAN_START\nmust_include_globs: the flow document, docs/*.md\nPLAN_END";
        let d = parse_plan(text);
        assert_eq!(d.must_include_globs, vec!["docs/*.md"]);
        assert_eq!(d.path_hints, vec!["the flow document"]);
    }

    #[test]
    fn clarify_line_is_captured() {
        let text = "PLAN_START\nclarify: Which pipeline do you mean?\nPLAN_END";
        let d = parse_plan(text);
        assert_eq!(
            d.clarify_question.as_deref(),
            Some("Which pipeline do you mean?")
        );
    }

    #[test]
    fn missing_block_yields_empty_directives() {
        let d = parse_plan("no plan markers here");
        assert!(d.is_empty());
    }
}
