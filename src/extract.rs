// src/extract.rs

//! Metric extraction from fetched page content.

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::error::NoMatch;

/// Label that precedes the work count on a pixiv encyclopedia article.
pub const DEFAULT_LABEL: &str = "pixivに投稿された作品数: ";

static DEFAULT_PATTERN: Lazy<Regex> = Lazy::new(|| build_pattern(DEFAULT_LABEL));

fn build_pattern(label: &str) -> Regex {
    // the label is escaped, so the pattern is always valid
    Regex::new(&format!(r"{}([0-9]+)", regex::escape(label))).expect("escaped label must compile")
}

/// Finds `<label><digits>` in raw content and returns the digits verbatim.
#[derive(Debug, Clone)]
pub struct Extractor {
    pattern: Regex,
}

impl Extractor {
    /// The default label reuses the process-wide compiled pattern.
    pub fn new(label: &str) -> Self {
        if label == DEFAULT_LABEL {
            return Self::default();
        }
        Self {
            pattern: build_pattern(label),
        }
    }

    /// First occurrence wins. The digit run is returned as text, leading
    /// zeros included.
    pub fn extract(&self, entity: &str, content: &[u8]) -> Result<String, NoMatch> {
        let caps = self.pattern.captures(content).ok_or_else(|| NoMatch {
            entity: entity.to_string(),
        })?;
        // the capture holds ASCII digits only
        Ok(String::from_utf8_lossy(&caps[1]).into_owned())
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.clone(),
        }
    }
}
