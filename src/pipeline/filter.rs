//! Per-file filters for the scan helper: size bounds, extension lists and a name pattern.
//! Directories are never filtered; the walk always descends and emits them.

use anyhow::{Context, Result, bail};
use regex::Regex;

use crate::types::extension_of;

#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// 0 = no lower bound.
    pub min_size: u64,
    /// 0 = no upper bound.
    pub max_size: u64,
    /// Lowercased, dot-prefixed. Empty = every extension.
    pub include_ext: Vec<String>,
    pub exclude_ext: Vec<String>,
    pub name: Option<Regex>,
}

impl FileFilter {
    pub fn new(
        min_size: &str,
        max_size: &str,
        include_ext: &[String],
        exclude_ext: &[String],
        name: Option<&str>,
    ) -> Result<Self> {
        let name = match name.map(str::trim).filter(|s| !s.is_empty()) {
            Some(p) => Some(Regex::new(p).with_context(|| format!("invalid --name pattern {p:?}"))?),
            None => None,
        };
        Ok(Self {
            min_size: parse_size(min_size).context("--min-size")?,
            max_size: parse_size(max_size).context("--max-size")?,
            include_ext: normalize_exts(include_ext),
            exclude_ext: normalize_exts(exclude_ext),
            name,
        })
    }

    /// True when every configured bound lets the file through.
    pub fn accepts(&self, name: &str, size: u64) -> bool {
        if self.min_size > 0 && size < self.min_size {
            return false;
        }
        if self.max_size > 0 && size > self.max_size {
            return false;
        }
        if !self.include_ext.is_empty() || !self.exclude_ext.is_empty() {
            let ext = extension_of(name);
            if self.exclude_ext.contains(&ext) {
                return false;
            }
            if !self.include_ext.is_empty() && !self.include_ext.contains(&ext) {
                return false;
            }
        }
        self.name.as_ref().is_none_or(|re| re.is_match(name))
    }
}

/// Human size: plain bytes, or a number (fractions allowed) with a K/M/G/T suffix in powers of
/// 1024. Empty and "0" mean no bound.
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() || s == "0" {
        return Ok(0);
    }
    let upper = s.to_ascii_uppercase();
    let (num, mult) = match upper.char_indices().last() {
        Some((i, 'K')) => (&upper[..i], 1u64 << 10),
        Some((i, 'M')) => (&upper[..i], 1 << 20),
        Some((i, 'G')) => (&upper[..i], 1 << 30),
        Some((i, 'T')) => (&upper[..i], 1 << 40),
        _ => {
            return upper
                .parse::<u64>()
                .with_context(|| format!("invalid size {s:?} (use e.g. 100M, 1.5G, 1024)"));
        }
    };
    let n: f64 = num
        .trim()
        .parse()
        .with_context(|| format!("invalid size {s:?} (use e.g. 100M, 1.5G, 1024)"))?;
    if !n.is_finite() || n < 0.0 {
        bail!("invalid size {s:?}");
    }
    Ok((n * mult as f64) as u64)
}

/// ".TXT", "txt" and " .txt " all become ".txt"; blanks are dropped.
pub fn normalize_exts(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .map(|e| {
            let e = e.to_lowercase();
            if e.starts_with('.') { e } else { format!(".{e}") }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(parse_size("").unwrap(), 0);
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("100M").unwrap(), 100u64 << 20);
        assert_eq!(parse_size("1.5g").unwrap(), 1_610_612_736);
        assert_eq!(parse_size(" 2 K ").unwrap(), 2048);
        assert_eq!(parse_size("1T").unwrap(), 1u64 << 40);
        assert!(parse_size("abc").is_err());
        assert!(parse_size("12Q").is_err());
        assert!(parse_size("-1M").is_err());
    }

    #[test]
    fn extensions_are_normalized() {
        let raw = vec!["TXT".to_string(), " .Log ".to_string(), "".to_string()];
        assert_eq!(normalize_exts(&raw), vec![".txt", ".log"]);
    }
}
