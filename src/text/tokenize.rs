//! Text cleanup and query tokenization.

/// Stopwords filtered out of question tokens before matching.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "does",
    "for", "from", "how", "i", "in", "into", "is", "it", "its", "me", "my", "of",
    "on", "or", "our", "so", "that", "the", "their", "then", "there", "these",
    "this", "to", "us", "was", "we", "what", "when", "where", "which", "who",
    "why", "will", "with", "would", "you", "your",
];

/// True when a lowercase token is a stopword.
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

/// Clean an attached prompt: normalize line endings, strip control characters
/// (keeping tabs and newlines), and collapse runs of blank lines.
pub fn normalize_prompt(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.replace("\r\n", "\n").replace('\r', "\n").lines() {
        let cleaned: String = line
            .chars()
            .filter(|c| !c.is_control() || *c == '\t')
            .collect();
        if cleaned.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(cleaned.trim_end());
            out.push('\n');
        }
    }
    out.trim_end().to_string()
}

/// Tokenize a query into lowercase alphanumeric tokens.
///
/// Path-like tokens (`server/routes/agi.plan.ts`) are kept whole in addition
/// to their parts so that path channels can match them directly.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in text.split_whitespace() {
        let trimmed = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '/' && c != '.');
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.contains('/') {
            tokens.push(trimmed.trim_end_matches('.').to_lowercase());
        }
        for part in trimmed.split(|c: char| !c.is_alphanumeric()) {
            if part.len() > 1 {
                tokens.push(part.to_lowercase());
            }
        }
    }
    tokens
}

/// Tokenize and drop stopwords, deduplicating while preserving order.
pub fn content_tokens(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| !is_stopword(t))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stopword_table_is_sorted() {
        let mut sorted = STOPWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOPWORDS);
    }

    #[test]
    fn normalize_collapses_blank_runs() {
        let input = "first\r\n\r\n\r\n\r\nsecond  \n";
        assert_eq!(normalize_prompt(input), "first\n\nsecond");
    }

    #[test]
    fn tokenize_keeps_path_tokens_whole() {
        let tokens = tokenize("Which file defines server/routes/agi.plan.ts?");
        assert!(tokens.contains(&"server/routes/agi.plan.ts".to_string()));
        assert!(tokens.contains(&"routes".to_string()));
    }

    #[test]
    fn content_tokens_filters_stopwords_and_dedups() {
        let tokens = content_tokens("what is the Platonic platonic gate");
        assert_eq!(tokens, vec!["platonic".to_string(), "gate".to_string()]);
    }
}
