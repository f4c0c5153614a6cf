// src/config.rs

use serde::Deserialize;
use std::{fs, path::Path};
use url::Url;

use crate::error::ConfigError;
use crate::extract::DEFAULT_LABEL;

/// pixiv encyclopedia articles live at `<base><tag name>`.
pub const DEFAULT_BASE_URL: &str = "https://dic.pixiv.net/a/";
pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings for one enrichment run.
///
/// Every field has a default, so a YAML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Prefix the entity name is appended to.
    pub base_url: String,
    /// Literal text immediately preceding the metric digits.
    pub label: String,
    /// Maximum number of rows being fetched or extracted at once.
    pub concurrency: usize,
    /// Fail the whole run on the first row error instead of leaving the row empty.
    pub abort_on_error: bool,
    /// Append entity names to the base URL without percent-encoding.
    pub raw_names: bool,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            label: DEFAULT_LABEL.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            abort_on_error: false,
            raw_names: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn from_yaml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text, path)
    }

    /// The base URL, parsed.
    pub fn base(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Invalid(format!("base_url {:?}: {}", self.base_url, e)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.label.is_empty() {
            return Err(ConfigError::Invalid("label must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be at least 1".into()));
        }
        let base = self.base()?;
        if base.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "base_url {:?} cannot take a path",
                self.base_url
            )));
        }
        Ok(())
    }
}
