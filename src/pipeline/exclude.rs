//! Exclusion rules, checked on the path string before any stat call.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::engine::tools::is_same_or_under;
use crate::utils::config::DENY_LIST;

#[derive(Debug, Clone, Default)]
pub struct ExcludeRules {
    exact: HashSet<String>,
    /// Sorted, trailing slash stripped; a path matches when it equals one or lies under it.
    prefixes: Vec<String>,
}

impl ExcludeRules {
    /// Rules from user entries. Each entry contributes its text, its absolute form and its
    /// symlink-resolved form (when different), so `/tmp/x` also excludes `/private/tmp/x`.
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut rules = Self::default();
        for raw in entries {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            for form in expanded_forms(raw) {
                rules.insert(form);
            }
        }
        rules.prefixes.sort();
        rules.prefixes.dedup();
        rules
    }

    fn insert(&mut self, p: String) {
        let p = if p.len() > 1 {
            p.trim_end_matches('/').to_string()
        } else {
            p
        };
        self.exact.insert(p.clone());
        self.prefixes.push(p);
    }

    /// User rule or deny-list match.
    pub fn is_excluded(&self, path: &str) -> bool {
        is_denied(path)
            || self.exact.contains(path)
            || self.prefixes.iter().any(|p| is_same_or_under(path, p))
    }
}

/// Fixed pseudo-filesystem / virtual-memory locations.
pub fn is_denied(path: &str) -> bool {
    DENY_LIST.iter().any(|d| is_same_or_under(path, d))
}

fn expanded_forms(raw: &str) -> Vec<String> {
    let mut forms = vec![raw.to_string()];
    let p = Path::new(raw);
    let abs: PathBuf = if p.is_absolute() {
        p.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(p),
            Err(_) => p.to_path_buf(),
        }
    };
    forms.push(abs.to_string_lossy().into_owned());
    if let Ok(canon) = abs.canonicalize() {
        forms.push(canon.to_string_lossy().into_owned());
    }
    forms.dedup();
    forms
}
