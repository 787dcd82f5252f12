//! hashcheck-exporter — Library Root
//!
//! Fetches HTTP(S) resources, digests their bodies and exposes the
//! results as Prometheus metrics. Re-exports all modules for
//! integration tests and benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
