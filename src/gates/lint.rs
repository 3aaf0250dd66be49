//! Concept/physics lint: regex cleanup of junk scaffolding and naming
//! errors. Annotates reasons; never fails the request on its own.

use regex::Regex;
use std::sync::OnceLock;

/// Result of the lint pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LintResult {
    pub answer: String,
    /// Reasons recorded for debug output
    pub reasons: Vec<String>,
}

fn scaffold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?mi)^(?:As an AI[^\n]*|Based on the (?:provided )?context[^,\n]*,\s*|Sure[,!][^\n]*\n)",
        )
        .unwrap()
    })
}

fn leading_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^([A-Za-z0-9_@-]+(?:/[A-Za-z0-9_.@-]+)+\.[a-z]{2,4}):?\s+(is|does|handles|defines|contains)\b",
        )
        .unwrap()
    })
}

/// Physics naming corrections applied verbatim.
const PHYSICS_RENAMES: &[(&str, &str)] = &[
    ("casimir affect", "Casimir effect"),
    ("alcubierre-white metric", "Alcubierre metric"),
    ("nulls energy condition", "null energy condition"),
    ("warp viability factor", "warp viability score"),
];

/// Lint the answer: strip junk scaffolding, rewrite prose that starts with a
/// bare file path, and fix physics naming errors.
pub fn lint_answer(answer: &str) -> LintResult {
    let mut reasons = Vec::new();
    let mut text = answer.to_string();

    if scaffold_re().is_match(&text) {
        text = scaffold_re().replace_all(&text, "").to_string();
        reasons.push("scaffold_removed".to_string());
    }

    if leading_path_re().is_match(&text) {
        // `server/x.ts is ...` reads as prose about a path; move the path
        // into a citation instead.
        text = leading_path_re()
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                format!("The file ({}) {}", &caps[1], &caps[2])
            })
            .to_string();
        reasons.push("leading_path_rewritten".to_string());
    }

    let lower = text.to_lowercase();
    for (wrong, right) in PHYSICS_RENAMES {
        if lower.contains(wrong) {
            text = replace_case_insensitive(&text, wrong, right);
            reasons.push(format!("physics_rename:{right}"));
        }
    }

    let text = text.trim().to_string();
    LintResult {
        answer: text,
        reasons,
    }
}

fn replace_case_insensitive(text: &str, needle: &str, replacement: &str) -> String {
    let re = Regex::new(&format!("(?i){}", regex::escape(needle)));
    match re {
        Ok(re) => re.replace_all(text, replacement).to_string(),
        Err(_) => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scaffolding() {
        let result = lint_answer("As an AI language model, I note this.\nThe gate runs last.");
        assert!(!result.answer.contains("As an AI"));
        assert!(result.reasons.contains(&"scaffold_removed".to_string()));
    }

    #[test]
    fn rewrites_leading_path_prose() {
        let result = lint_answer("server/services/helix-ask/arbiter.ts is the mode selector.");
        assert!(result.answer.starts_with("The file (server/services/helix-ask/arbiter.ts) is"));
    }

    #[test]
    fn fixes_physics_names() {
        let result = lint_answer("The Casimir affect drives the estimate.");
        assert!(result.answer.contains("Casimir effect"));
        assert!(result.reasons.iter().any(|r| r.starts_with("physics_rename")));
    }

    #[test]
    fn clean_answers_are_untouched() {
        let result = lint_answer("The gate runs last.");
        assert_eq!(result.answer, "The gate runs last.");
        assert!(result.reasons.is_empty());
    }
}
