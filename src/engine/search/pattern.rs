//! Keyword → query form, LIKE patterns and regex compilation.

use anyhow::Result;
use regex::Regex;

use crate::engine::tools::escape_like;
use crate::error::IndexError;

/// How a keyword is matched, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryForm {
    /// Several whitespace-separated terms (or one term containing `/`). Terms with `/` match the
    /// path, the rest match the name; all ANDed.
    MultiTerm(Vec<String>),
    Regex(String),
    /// `*` / `?` wildcards, substring when neither is present.
    Wildcard(String),
}

impl QueryForm {
    /// `None` for a blank keyword.
    pub fn classify(keyword: &str, use_regex: bool) -> Option<QueryForm> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return None;
        }
        let terms: Vec<String> = keyword.split_whitespace().map(str::to_string).collect();
        Some(if terms.len() > 1 || (!use_regex && keyword.contains('/')) {
            QueryForm::MultiTerm(terms)
        } else if use_regex {
            QueryForm::Regex(keyword.to_string())
        } else {
            QueryForm::Wildcard(keyword.to_string())
        })
    }
}

fn has_wildcards(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}

/// Translate `*`/`?` to `%`/`_` (other LIKE metacharacters escaped). Without wildcards the
/// keyword becomes a substring pattern. Use with `ESCAPE '\'`.
pub fn wildcard_to_like(keyword: &str) -> String {
    let mut out = String::with_capacity(keyword.len() + 2);
    for c in keyword.chars() {
        match c {
            '*' => out.push('%'),
            '?' => out.push('_'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    if has_wildcards(keyword) {
        out
    } else {
        format!("%{out}%")
    }
}

/// Names starting with the keyword (wildcards still honoured).
pub fn starts_with_like(keyword: &str) -> String {
    if has_wildcards(keyword) {
        let mut p = wildcard_to_like(keyword);
        p.push('%');
        p
    } else {
        format!("{}%", escape_like(keyword))
    }
}

/// Plain substring pattern for one term.
pub fn contains_like(term: &str) -> String {
    format!("%{}%", escape_like(term))
}

/// Case-insensitive unless the pattern opens with an explicit `(?i)` or `(?-i)`.
pub fn compile_regex(pattern: &str) -> Result<Regex> {
    let source = if pattern.starts_with("(?i)") || pattern.starts_with("(?-i)") {
        pattern.to_string()
    } else {
        format!("(?i){pattern}")
    };
    Regex::new(&source).map_err(|e| {
        IndexError::InvalidQuery {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_precedence() {
        assert_eq!(QueryForm::classify("   ", false), None);
        assert_eq!(
            QueryForm::classify("src main.rs", true),
            Some(QueryForm::MultiTerm(vec!["src".into(), "main.rs".into()]))
        );
        assert_eq!(
            QueryForm::classify("docs/", false),
            Some(QueryForm::MultiTerm(vec!["docs/".into()]))
        );
        assert_eq!(
            QueryForm::classify("^a.*b$", true),
            Some(QueryForm::Regex("^a.*b$".into()))
        );
        assert_eq!(
            QueryForm::classify(" a*b ", false),
            Some(QueryForm::Wildcard("a*b".into()))
        );
    }

    #[test]
    fn wildcard_translation() {
        assert_eq!(wildcard_to_like("a*b"), "a%b");
        assert_eq!(wildcard_to_like("report?.txt"), "report_.txt");
        assert_eq!(wildcard_to_like("notes"), "%notes%");
        assert_eq!(wildcard_to_like("snake_case"), "%snake\\_case%");
        assert_eq!(starts_with_like("notes"), "notes%");
    }

    #[test]
    fn regex_case_markers() {
        assert!(compile_regex("README").unwrap().is_match("readme.md"));
        assert!(!compile_regex("(?-i)README").unwrap().is_match("readme.md"));
        assert!(compile_regex("(").is_err());
    }
}
