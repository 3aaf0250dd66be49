//! Docs-grep fallback: regex scan over docs/knowledge/ethos trees.
//!
//! Used when a docs-first scope yields nothing but repo evidence is still
//! required. Scores files by question-token and short-phrase hit counts.

use std::fs;
use std::path::{Path, PathBuf};

use crate::text::content_tokens;

use super::evidence::{Candidate, Channel};

/// Directories scanned by the fallback, relative to the repo root.
const DOC_DIRS: &[&str] = &["docs", "docs/knowledge", "docs/ethos"];

/// Maximum files visited per scan; keeps the walk bounded on large repos.
const MAX_FILES: usize = 400;

/// Scan doc trees for question tokens and short phrases.
pub fn docs_grep(repo_root: &str, question: &str) -> Vec<Candidate> {
    let tokens = content_tokens(question);
    if tokens.is_empty() {
        return Vec::new();
    }
    let phrases = short_phrases(&tokens);

    let mut files = Vec::new();
    for dir in DOC_DIRS {
        collect_markdown(&Path::new(repo_root).join(dir), &mut files);
        if files.len() >= MAX_FILES {
            break;
        }
    }
    // The doc dirs nest, so the walks overlap.
    files.sort();
    files.dedup();

    let mut candidates = Vec::new();
    for path in files {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let lower = content.to_lowercase();
        let mut hits = 0usize;
        for token in &tokens {
            hits += lower.matches(token.as_str()).count().min(5);
        }
        for phrase in &phrases {
            hits += 3 * lower.matches(phrase.as_str()).count().min(3);
        }
        if hits == 0 {
            continue;
        }
        let rel = path
            .strip_prefix(repo_root)
            .unwrap_or(&path)
            .to_string_lossy()
            .trim_start_matches('/')
            .to_string();
        let preview = preview_around_hit(&content, &tokens);
        candidates.push(Candidate::new(rel, hits as f64, preview, Channel::Grep));
    }

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.file_path.cmp(&b.file_path))
    });
    candidates
}

/// Adjacent token bigrams, used as phrase signals.
fn short_phrases(tokens: &[String]) -> Vec<String> {
    tokens
        .windows(2)
        .map(|w| format!("{} {}", w[0], w[1]))
        .collect()
}

fn collect_markdown(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        if out.len() >= MAX_FILES {
            return;
        }
        let path = entry.path();
        if path.is_dir() {
            collect_markdown(&path, out);
        } else if path.extension().is_some_and(|e| e == "md") {
            out.push(path);
        }
    }
}

/// A few lines around the first token hit.
fn preview_around_hit(content: &str, tokens: &[String]) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let hit = lines.iter().position(|line| {
        let lower = line.to_lowercase();
        tokens.iter().any(|t| lower.contains(t.as_str()))
    });
    match hit {
        Some(i) => {
            let start = i.saturating_sub(1);
            let end = (i + 3).min(lines.len());
            lines[start..end].join("\n")
        }
        None => lines.iter().take(3).cloned().collect::<Vec<_>>().join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greps_markdown_under_docs() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs/knowledge");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(
            docs.join("platonic-reasoning.md"),
            "# Platonic reasoning\nThe platonic reasoning gate verifies answers.\n",
        )
        .unwrap();
        std::fs::write(docs.join("other.md"), "Nothing relevant here.\n").unwrap();

        let root = dir.path().to_string_lossy().to_string();
        let candidates = docs_grep(&root, "What is the platonic reasoning gate?");
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].file_path.ends_with("platonic-reasoning.md"));
        assert!(candidates[0].preview.contains("platonic"));
    }

    #[test]
    fn missing_dirs_yield_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        assert!(docs_grep(&root, "anything at all").is_empty());
    }
}
