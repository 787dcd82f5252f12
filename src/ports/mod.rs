//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the use-case layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `Fetcher`: HTTP retrieval of probe targets

pub mod fetcher;

pub use fetcher::Fetcher;
