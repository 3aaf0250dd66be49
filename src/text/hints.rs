//! Detection of file, endpoint, and repo-expectation hints in a question.

use regex::Regex;
use std::sync::OnceLock;

/// Hints extracted from the raw question before intent routing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionHints {
    /// Explicit file paths mentioned in the question
    pub file_paths: Vec<String>,
    /// HTTP endpoint paths mentioned in the question (`/api/...`)
    pub endpoints: Vec<String>,
    /// The question names files, endpoints, or repo structures
    pub has_file_path_hints: bool,
    /// The question phrasing demands repo evidence (obligation source)
    pub has_repo_expectation: bool,
}

fn file_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9_@-]+(?:/[A-Za-z0-9_.@-]+)+\.(?:rs|ts|tsx|js|jsx|py|md|toml|json|yaml|yml)")
            .unwrap()
    })
}

fn endpoint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|\s|`)(/(?:api|ask|plan|execute|tools|telemetry)(?:/[A-Za-z0-9_:.-]+)*)").unwrap())
}

/// Phrases whose presence obliges the answer to cite repo evidence.
const REPO_EXPECTATION_PHRASES: &[&str] = &[
    "which file",
    "what file",
    "where is",
    "where does",
    "in this repo",
    "in the repo",
    "in the codebase",
    "which module",
    "which function",
    "defines the",
    "implemented in",
];

/// Detect file/endpoint/path hints and the repo-expectation obligation.
pub fn detect_hints(question: &str) -> QuestionHints {
    let lower = question.to_lowercase();

    let file_paths: Vec<String> = file_path_re()
        .find_iter(question)
        .map(|m| m.as_str().to_string())
        .collect();

    let endpoints: Vec<String> = endpoint_re()
        .captures_iter(question)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect();

    let has_repo_expectation = REPO_EXPECTATION_PHRASES
        .iter()
        .any(|p| lower.contains(p))
        || !file_paths.is_empty()
        || !endpoints.is_empty();

    QuestionHints {
        has_file_path_hints: !file_paths.is_empty() || !endpoints.is_empty(),
        has_repo_expectation,
        file_paths,
        endpoints,
    }
}
