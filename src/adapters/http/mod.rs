//! HTTP Adapters
//!
//! Outbound HTTP used to fetch probe targets.

pub mod client;

pub use client::{HttpFetcher, HttpFetcherConfig};
