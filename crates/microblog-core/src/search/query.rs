//! FTS5 query building utilities.

use regex::Regex;
use std::sync::LazyLock;

/// Anything other than letters and digits must be quoted to stay a plain term.
static FTS5_SPECIAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]").expect("static regex"));

/// Escape a term for FTS5 queries.
///
/// Terms containing anything besides letters and digits (hyphens, dots,
/// colons, quotes, parentheses...) are wrapped in quotes so FTS5 never reads
/// them as operators or column filters.
pub fn escape_fts5_term(term: &str) -> String {
    if FTS5_SPECIAL_CHARS.is_match(term) {
        // Double any existing quotes and wrap in quotes
        let escaped = term.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    } else {
        term.to_string()
    }
}

/// Build an FTS5 query string from free text.
///
/// Every whitespace-separated word becomes a prefix term and the terms are
/// OR-ed, so a document matching any word is a hit and bm25 ranks documents
/// matching more words first:
/// - "rust async" → `rust* OR async*`
/// - "v1.5" → `"v1.5"*`
/// - "body:evil" → `"body:evil"*`
///
/// Lowercasing keeps user input from forming `AND`/`OR`/`NOT` operators.
pub fn build_fts5_query(search_term: &str) -> String {
    let search_term = search_term.to_lowercase();

    search_term
        .split_whitespace()
        .map(escape_fts5_term)
        .filter(|escaped| !escaped.is_empty())
        .map(|escaped| format!("{}*", escaped))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_simple_term() {
        assert_eq!(escape_fts5_term("hello"), "hello");
        assert_eq!(escape_fts5_term("café"), "café");
        assert_eq!(escape_fts5_term("2024"), "2024");
    }

    #[test]
    fn test_escape_punctuation() {
        assert_eq!(escape_fts5_term("gpt-2"), "\"gpt-2\"");
        assert_eq!(escape_fts5_term("v1.5"), "\"v1.5\"");
        assert_eq!(escape_fts5_term("body:x"), "\"body:x\"");
        assert_eq!(escape_fts5_term("(x)"), "\"(x)\"");
    }

    #[test]
    fn test_escape_quotes() {
        assert_eq!(escape_fts5_term("test\"quote"), "\"test\"\"quote\"");
    }

    #[test]
    fn test_build_query_terms() {
        assert_eq!(build_fts5_query("rust"), "rust*");
        assert_eq!(build_fts5_query("rust async"), "rust* OR async*");
        assert_eq!(build_fts5_query("gpt-2 base"), "\"gpt-2\"* OR base*");
    }

    #[test]
    fn test_build_query_empty() {
        assert_eq!(build_fts5_query(""), "");
        assert_eq!(build_fts5_query("   "), "");
    }

    #[test]
    fn test_operators_are_neutralized() {
        assert_eq!(build_fts5_query("cats AND dogs"), "cats* OR and* OR dogs*");
        assert_eq!(build_fts5_query("NOT"), "not*");
    }
}
