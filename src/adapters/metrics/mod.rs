//! Metrics Adapters
//!
//! Maps probe observations onto Prometheus series and serves them
//! over HTTP via axum 0.7, alongside a liveness endpoint.

pub mod prometheus;
pub mod server;

pub use prometheus::{MetricSet, SeriesLayout, TargetSeries};
pub use server::MetricsServer;
