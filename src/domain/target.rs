//! Probe Targets and Observations.
//!
//! A target is a URL with an optional expected digest. Each probe
//! cycle turns a [`FetchOutcome`] into a fresh [`Observation`]; only
//! the last digest and the change counter carry over between cycles.

use std::fmt;
use std::time::Duration;

use super::digest::{digest, digests_match};

/// Identity and expectation of one probed resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetSpec {
    /// Resource URL; the target's identity.
    pub url: String,
    /// Expected digest as configured. `None` means observe only.
    pub expected: Option<String>,
}

impl TargetSpec {
    /// Build a spec, treating an empty or blank expected digest as absent.
    pub fn new(url: impl Into<String>, expected: Option<String>) -> Self {
        let expected = expected
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        Self {
            url: url.into(),
            expected,
        }
    }

    /// Spec without digest verification.
    pub fn observe(url: impl Into<String>) -> Self {
        Self::new(url, None)
    }

    /// Whether this target verifies its digest.
    pub fn is_verified(&self) -> bool {
        self.expected.is_some()
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Failure while fetching a target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// DNS, connect, TLS or protocol failure before a response arrived.
    #[error("request failed: {0}")]
    Transport(String),
    /// The client timeout elapsed.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The response started but the body could not be read to the end.
    #[error("failed to read body: {0}")]
    Body(String),
}

/// Raw result of one HTTP fetch, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// No response was received.
    Failed {
        /// Time spent until the failure surfaced.
        elapsed: Duration,
        /// Cause.
        error: FetchError,
    },
    /// Headers were received but the body read failed midway.
    Truncated {
        /// Time until response headers arrived.
        elapsed: Duration,
        /// HTTP status code.
        status: u16,
        /// Cause.
        error: FetchError,
    },
    /// Full response received.
    Complete {
        /// Time until response headers arrived.
        elapsed: Duration,
        /// HTTP status code.
        status: u16,
        /// Entire response body.
        body: Vec<u8>,
    },
}

impl FetchOutcome {
    /// Time spent on the request.
    pub const fn elapsed(&self) -> Duration {
        match self {
            Self::Failed { elapsed, .. }
            | Self::Truncated { elapsed, .. }
            | Self::Complete { elapsed, .. } => *elapsed,
        }
    }

    /// Error carried by the outcome, if any.
    pub const fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Failed { error, .. } | Self::Truncated { error, .. } => Some(error),
            Self::Complete { .. } => None,
        }
    }
}

/// Latest recorded outcome of probing one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// Fetch and body read both completed.
    pub success: bool,
    /// HTTP status, 0 when no response arrived.
    pub status_code: u16,
    /// Body length in bytes, 0 unless the body was fully read.
    pub response_bytes: u64,
    /// Request duration.
    pub duration: Duration,
    /// Digest computed this cycle.
    pub digest: Option<String>,
    /// Digest verdict; `None` when the target has no expected digest.
    pub correct: Option<bool>,
    /// Total digest changes seen for this target.
    pub change_count: u64,
    /// Whether this cycle incremented `change_count`.
    pub changed: bool,
}

/// Per-target memory carried across probe cycles.
#[derive(Debug, Clone)]
pub struct TargetState {
    spec: TargetSpec,
    last_digest: Option<String>,
    change_count: u64,
}

impl TargetState {
    /// Fresh state with no prior digest.
    pub const fn new(spec: TargetSpec) -> Self {
        Self {
            spec,
            last_digest: None,
            change_count: 0,
        }
    }

    /// Target definition.
    pub const fn spec(&self) -> &TargetSpec {
        &self.spec
    }

    /// Digest recorded by the last successful cycle.
    pub fn last_digest(&self) -> Option<&str> {
        self.last_digest.as_deref()
    }

    /// Total digest changes observed.
    pub const fn change_count(&self) -> u64 {
        self.change_count
    }

    /// Replace the expected digest, keeping digest history.
    pub fn set_expected(&mut self, expected: Option<String>) {
        self.spec = TargetSpec::new(std::mem::take(&mut self.spec.url), expected);
    }

    /// `obs` with its verdict recomputed against the current expected
    /// digest. Everything else is kept as observed.
    pub fn reverify(&self, obs: &Observation) -> Observation {
        let correct = self.spec.expected.as_deref().map(|expected| {
            obs.success
                && obs
                    .digest
                    .as_deref()
                    .is_some_and(|actual| digests_match(actual, expected))
        });
        Observation {
            correct,
            ..obs.clone()
        }
    }

    /// Failure-default observation published before a fetch starts.
    pub fn quiescent(&self) -> Observation {
        Observation {
            correct: self.spec.expected.as_ref().map(|_| false),
            change_count: self.change_count,
            ..Observation::default()
        }
    }

    /// Fold one fetch outcome into the state and return the new observation.
    pub fn record(&mut self, outcome: FetchOutcome) -> Observation {
        let mut obs = self.quiescent();
        obs.duration = outcome.elapsed();

        let (status, body) = match outcome {
            FetchOutcome::Failed { .. } => return obs,
            FetchOutcome::Truncated { status, .. } => {
                obs.status_code = status;
                return obs;
            }
            FetchOutcome::Complete { status, body, .. } => (status, body),
        };

        let actual = digest(&body);
        obs.status_code = status;
        obs.response_bytes = body.len() as u64;
        obs.success = true;

        if self.last_digest.as_deref().is_some_and(|prev| prev != actual) {
            self.change_count += 1;
            obs.changed = true;
        }
        obs.change_count = self.change_count;

        obs.correct = self
            .spec
            .expected
            .as_deref()
            .map(|expected| digests_match(&actual, expected));

        self.last_digest = Some(actual.clone());
        obs.digest = Some(actual);
        obs
    }
}
