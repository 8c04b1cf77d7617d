//! Validator consensus tracking.

use crate::error::{CoreError, CoreResult};
use crate::sync::model::{ConsensusStatus, StateVersion};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Tracks validator confirmations per state version. Adding a validation is
/// idempotent per validator and serializes threshold-crossing per version,
/// so it is observed exactly once.
#[derive(Default)]
pub struct ConsensusTracker {
    trackers: Mutex<HashMap<StateVersion, ConsensusStatus>>,
}

impl ConsensusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tracker for `version` with the given `threshold`, used
    /// by [`crate::sync::Manager::update_state`] right after saving a new
    /// state.
    pub async fn init(&self, version: impl Into<String>, threshold: usize) {
        let version = version.into();
        let mut trackers = self.trackers.lock().await;
        trackers.entry(version.clone()).or_insert_with(|| ConsensusStatus::new(version, threshold));
    }

    /// Records a validator's confirmation for a version, idempotent per
    /// validator: `confirmations` only increments on first-time add, and
    /// `reached_at` is set at most once, the first time the threshold is met.
    pub async fn add_validation(&self, version: &str, validator: &str) -> CoreResult<ConsensusStatus> {
        let mut trackers = self.trackers.lock().await;
        let status = trackers
        .get_mut(version)
        .ok_or_else(|| CoreError::no_consensus_tracking("add_validation", version))?;

        if !status.validators.iter().any(|v| v == validator) {
            status.validators.push(validator.to_string());
            status.confirmations = status.validators.len();
            if status.confirmations >= status.threshold && status.reached_at.is_none() {
                status.reached_at = Some(chrono::Utc::now());
            }
        }
        Ok(status.clone())
    }

    /// Returns a snapshot of the current consensus status for a version.
    pub async fn get_consensus(&self, version: &str) -> CoreResult<ConsensusStatus> {
        self.trackers
        .lock()
        .await
        .get(version)
        .cloned()
        .ok_or_else(|| CoreError::no_consensus_tracking("get_consensus", version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn threshold_crossing_sets_reached_at_once() {
        let tracker = ConsensusTracker::new();
        tracker.init("v1", 3).await;
        tracker.add_validation("v1", "a").await.unwrap();
        tracker.add_validation("v1", "b").await.unwrap();
        tracker.add_validation("v1", "a").await.unwrap(); // duplicate, idempotent
        let status = tracker.add_validation("v1", "c").await.unwrap();

        assert_eq!(status.confirmations, 3);
        assert!(status.reached_at.is_some());
        assert_eq!(status.validators, vec!["a", "b", "c"]);

        let reached_at_first = status.reached_at;
        let status_again = tracker.add_validation("v1", "d").await.unwrap();
        assert_eq!(status_again.reached_at, reached_at_first);
    }

    #[tokio::test]
    async fn validating_unknown_version_is_no_consensus_tracking() {
        let tracker = ConsensusTracker::new();
        let err = tracker.add_validation("missing", "a").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NoConsensusTracking);
    }
}
