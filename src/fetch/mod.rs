// src/fetch/mod.rs

pub mod http;

pub use http::HttpFetcher;

use std::future::Future;

use crate::error::FetchError;

/// Retrieves the raw page for one entity.
///
/// This is the only place an enrichment task waits; implementations must be
/// shareable across tasks.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, entity: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}
