//! # Exclusion Matching
//!
//! A list of literal substrings compiled into one case-insensitive
//! alternation. A result line is dropped when any term occurs anywhere in it.

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use std::path::Path;

/// Compiled size budget; large domain blacklists need more than the default.
const PATTERN_SIZE_LIMIT: usize = 64 * 1024 * 1024;

/// Immutable case-insensitive substring matcher
#[derive(Debug, Clone)]
pub struct ExclusionMatcher {
    pattern: Regex,
    terms: usize,
}

impl ExclusionMatcher {
    /// Compile terms into a matcher.
    ///
    /// Terms are trimmed and blank ones ignored; `None` when nothing is left,
    /// since an empty alternation would match every line.
    pub fn from_terms<I, S>(terms: I) -> Result<Option<Self>, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let escaped: Vec<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .map(|t| regex::escape(&t))
            .collect();

        if escaped.is_empty() {
            return Ok(None);
        }

        let pattern = RegexBuilder::new(&escaped.join("|"))
            .case_insensitive(true)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()?;

        Ok(Some(Self {
            pattern,
            terms: escaped.len(),
        }))
    }

    /// Load a newline-delimited exclusion file.
    ///
    /// A missing file is not an error.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Exclusion file not found, filtering disabled");
                return Ok(None);
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read exclusion file: {:?}", path))
            }
        };

        let matcher = Self::from_terms(text.lines())
            .with_context(|| format!("Failed to compile exclusion list: {:?}", path))?;
        if let Some(m) = &matcher {
            tracing::info!(path = %path.display(), terms = m.len(), "Exclusion list loaded");
        }
        Ok(matcher)
    }

    /// Number of non-blank terms
    pub fn len(&self) -> usize {
        self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms == 0
    }

    pub fn is_excluded(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }

    /// Keep only lines that mention no term; returns how many were dropped
    pub fn retain_allowed(&self, lines: &mut Vec<String>) -> usize {
        let before = lines.len();
        lines.retain(|line| !self.is_excluded(line));
        before - lines.len()
    }
}
