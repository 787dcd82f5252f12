//! Target Probe - One Fetch, One Observation
//!
//! Fetches a target through the [`Fetcher`] port, folds the outcome
//! into the target's state and logs anything an operator should see.
//! Failures are logged, never returned: a probe always yields an
//! observation.

use tracing::{debug, error, info};

use crate::domain::{FetchOutcome, Observation, TargetState};
use crate::ports::Fetcher;

/// Fetch the target held by `state` and record the result.
pub async fn probe_target<F: Fetcher + ?Sized>(fetcher: &F, state: &mut TargetState) -> Observation {
    let outcome = fetcher.fetch(&state.spec().url).await;
    record_outcome(state, outcome)
}

/// Record an already fetched outcome into `state`, logging failures,
/// digest changes and verification mismatches.
pub fn record_outcome(state: &mut TargetState, outcome: FetchOutcome) -> Observation {
    let url = state.spec().url.clone();

    match &outcome {
        FetchOutcome::Failed { error, elapsed } => {
            error!(url = %url, error = %error, elapsed_ms = elapsed.as_millis() as u64, "Failed to fetch target");
        }
        FetchOutcome::Truncated { error, status, .. } => {
            error!(url = %url, status, error = %error, "Failed to read response body");
        }
        FetchOutcome::Complete { .. } => {}
    }

    let obs = state.record(outcome);

    if obs.changed {
        info!(
            url = %url,
            digest = obs.digest.as_deref().unwrap_or_default(),
            change_count = obs.change_count,
            "Target content changed"
        );
    }

    if obs.correct == Some(false) && obs.success {
        error!(
            url = %url,
            expected = state.spec().expected.as_deref().unwrap_or_default(),
            actual = obs.digest.as_deref().unwrap_or_default(),
            "Digest mismatch"
        );
    }

    debug!(
        url = %url,
        success = obs.success,
        status = obs.status_code,
        bytes = obs.response_bytes,
        duration_ms = obs.duration.as_millis() as u64,
        "Probe complete"
    );

    obs
}
