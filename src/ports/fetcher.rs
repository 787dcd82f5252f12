//! Fetcher Port - HTTP Retrieval Interface
//!
//! Probing logic depends only on this trait. The production adapter
//! wraps reqwest; tests substitute mocks or local servers.

use async_trait::async_trait;

pub use crate::domain::target::{FetchError, FetchOutcome};

/// Retrieves one URL and reports what happened.
///
/// Implementors never return an error: every failure mode is encoded
/// in the [`FetchOutcome`] so the caller can keep the timing and any
/// status code received before the failure.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    /// Issue a GET request and read the full body.
    ///
    /// The reported elapsed time covers sending the request and
    /// receiving the response headers, not the body read.
    async fn fetch(&self, url: &str) -> FetchOutcome;
}
