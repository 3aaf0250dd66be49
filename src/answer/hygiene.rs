//! Answer hygiene: a pipeline of pure, idempotent text transforms.
//!
//! Each stage is testable in isolation and safe to re-run; `format_answer`
//! composes them in a fixed order.

use regex::Regex;
use std::sync::OnceLock;

use super::{citation_matches, FormatSpec};

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*ANSWER_(START|END)\s*$").unwrap())
}

fn drawer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<details>.*?</details>").unwrap())
}

fn drawer_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(?:▸|Drawer:).*$").unwrap())
}

fn numbered_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\s*)(\d+)([.)])\s+").unwrap())
}

/// Strip answer markers and any echo of the prompt scaffolding
/// (`Context:` / `Question:` preambles) that leaked into the output.
pub fn strip_prompt_echo(answer: &str) -> String {
    let without_markers = marker_re().replace_all(answer, "");
    let mut lines: Vec<&str> = without_markers.lines().collect();

    // Drop leading scaffold lines until real content appears.
    while let Some(first) = lines.first() {
        let t = first.trim();
        if t.is_empty()
            || t.starts_with("Context:")
            || t.starts_with("Question:")
            || t.starts_with("### ")
            || t.starts_with("You are ")
            || t.starts_with("Answer the question")
        {
            lines.remove(0);
        } else {
            break;
        }
    }
    // Drop an echoed question repeated verbatim anywhere near the top.
    lines.join("\n").trim().to_string()
}

/// Remove cosmetic drawer sections.
pub fn strip_drawer_sections(answer: &str) -> String {
    let no_details = drawer_re().replace_all(answer, "");
    let no_drawers = drawer_line_re().replace_all(&no_details, "");
    collapse_blank_lines(&no_drawers)
}

/// Normalize list shapes: `*` bullets become `-`, numbered items renumber
/// sequentially, duplicate blank lines collapse.
pub fn normalize_lists(answer: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut counter = 0usize;
    let mut in_numbered = false;

    for line in answer.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("* ") {
            out.push(format!("- {rest}"));
            in_numbered = false;
            continue;
        }
        if let Some(caps) = numbered_re().captures(line) {
            if !in_numbered {
                counter = 0;
                in_numbered = true;
            }
            counter += 1;
            let indent = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let body = numbered_re().replace(line, "");
            out.push(format!("{indent}{counter}. {body}"));
            continue;
        }
        if !trimmed.is_empty() {
            in_numbered = false;
        }
        out.push(line.to_string());
    }
    collapse_blank_lines(&out.join("\n"))
}

/// Repair partial citation paths against the known evidence files: a
/// suffix-matching citation is replaced by the full repo path.
pub fn repair_file_paths(answer: &str, known_files: &[String]) -> String {
    let citations = super::extract_citations(answer);
    let mut repaired = answer.to_string();
    for citation in citations {
        if known_files.iter().any(|f| f == &citation) {
            continue;
        }
        if let Some(full) = known_files
            .iter()
            .find(|f| citation_matches(&citation, f) && f.len() > citation.len())
        {
            repaired = repaired.replace(&citation, full);
        }
    }
    repaired
}

/// When the question demands two short paragraphs, keep exactly the first
/// two paragraphs.
pub fn enforce_paragraph_contract(answer: &str, question: &str) -> String {
    if !question.to_lowercase().contains("in two short paragraphs") {
        return answer.to_string();
    }
    let paragraphs: Vec<&str> = answer
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .collect();
    paragraphs
        .into_iter()
        .take(2)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(line);
            out.push('\n');
        }
    }
    out.trim().to_string()
}

/// Compose the hygiene pipeline. Idempotent: applying it twice yields the
/// same text as applying it once.
pub fn format_answer(
    answer: &str,
    question: &str,
    known_files: &[String],
    _spec: &FormatSpec,
) -> String {
    let step1 = strip_drawer_sections(answer);
    let step2 = strip_prompt_echo(&step1);
    let step3 = normalize_lists(&step2);
    let step4 = repair_file_paths(&step3, known_files);
    enforce_paragraph_contract(&step4, question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::AnswerFormat;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn spec() -> FormatSpec {
        FormatSpec {
            format: AnswerFormat::Brief,
            stage_tags: false,
        }
    }

    #[test]
    fn strips_markers_and_scaffold() {
        let raw = "ANSWER_START\nContext:\nThe retriever fuses channels.\nANSWER_END";
        assert_eq!(strip_prompt_echo(raw), "The retriever fuses channels.");
    }

    #[test]
    fn strips_drawers() {
        let raw = "Real content.\n<details>hidden</details>\n▸ drawer line\nMore.";
        let cleaned = strip_drawer_sections(raw);
        assert!(!cleaned.contains("hidden"));
        assert!(!cleaned.contains("drawer line"));
        assert!(cleaned.contains("Real content."));
    }

    #[test]
    fn renumbers_lists() {
        let raw = "1. first\n3. second\n7) third";
        assert_eq!(normalize_lists(raw), "1. first\n2. second\n3. third");
    }

    #[test]
    fn repairs_suffix_paths() {
        let known = vec!["server/services/helix-ask/envelope.ts".to_string()];
        let repaired = repair_file_paths("See helix-ask/envelope.ts.", &known);
        assert!(repaired.contains("server/services/helix-ask/envelope.ts"));
    }

    #[test]
    fn two_paragraph_contract() {
        let answer = "one\n\ntwo\n\nthree";
        let out = enforce_paragraph_contract(answer, "Explain X in two short paragraphs.");
        assert_eq!(out, "one\n\ntwo");
    }

    #[test]
    fn format_answer_is_idempotent_on_fixture() {
        let raw = "ANSWER_START\n* bullet\n1. a\n5. b\n\n\n\ntail\nANSWER_END";
        let once = format_answer(raw, "q", &[], &spec());
        let twice = format_answer(&once, "q", &[], &spec());
        assert_eq!(once, twice);
    }

    proptest! {
        #[test]
        fn format_answer_is_idempotent(raw in "[ -~\n]{0,400}") {
            let once = format_answer(&raw, "q", &[], &spec());
            let twice = format_answer(&once, "q", &[], &spec());
            prop_assert_eq!(once, twice);
        }
    }
}
