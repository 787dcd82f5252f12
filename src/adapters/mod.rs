//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies. Each sub-module groups adapters by
//! infrastructure concern.
//!
//! Adapter categories:
//! - `http`: reqwest-based fetcher for probe targets
//! - `metrics`: Prometheus metric mapping and the scrape server

pub mod http;
pub mod metrics;
