// src/error.rs

//! Error types for every stage of a run.
//!
//! Per-row failures ([`FetchError`], [`NoMatch`]) are recoverable under the
//! partial-success policy; everything else ends the run.

use std::path::PathBuf;

/// Transport-level failure retrieving one entity's page.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid request URL for {entity:?}: {message}")]
    Url { entity: String, message: String },

    #[error("GET {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("reading body from {url} failed: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Used by non-HTTP fetchers (stubs, alternate transports).
    #[error("fetch for {entity:?} failed: {message}")]
    Other { entity: String, message: String },
}

/// The fetched content does not contain the metric pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no match: {entity}")]
pub struct NoMatch {
    pub entity: String,
}

/// Why a single row could not be enriched.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    NoMatch(#[from] NoMatch),
}

impl RowError {
    /// Short failure kind for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            RowError::Fetch(_) => "fetch",
            RowError::NoMatch(_) => "no-match",
        }
    }
}

/// Failure of the enrichment stage as a whole.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("row {row} ({entity:?}) failed, aborting run: {source}")]
    Aborted {
        row: usize,
        entity: String,
        #[source]
        source: RowError,
    },

    #[error("enrichment task panicked or was cancelled: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("admission gate closed: {0}")]
    Gate(#[from] tokio::sync::AcquireError),
}

/// The table file could not be read.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("opening {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path:?} contains no rows")]
    Empty { path: PathBuf },
}

/// The enriched table could not be written back.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("writing {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoding CSV for {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Invalid or unreadable configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
