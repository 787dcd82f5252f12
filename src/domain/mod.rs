//! Domain layer - Digests, targets and observations.
//!
//! Pure logic with no I/O (hexagonal architecture inner ring).
//! Everything here is testable without a network or a runtime.

pub mod digest;
pub mod target;

// Re-export core types for convenience
pub use digest::{digest, digests_match, DIGEST_HEX_LEN};
pub use target::{FetchError, FetchOutcome, Observation, TargetSpec, TargetState};
