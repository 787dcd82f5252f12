//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement
//! the exporter's workflows.
//!
//! Use cases:
//! - `probe`: fetch one target and record an observation
//! - `scheduler`: bounded worker pool running a probe batch
//! - `watcher`: persistent target set with permanent metric handles
//! - `scrape`: per-mode probe-then-render pipeline

pub mod probe;
pub mod scheduler;
pub mod scrape;
pub mod watcher;
