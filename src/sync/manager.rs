//! Sync Core orchestrator.

use crate::error::{CoreError, CoreResult};
use crate::sync::conflict::{diff, ConflictResolver, DefaultConflictResolver};
use crate::sync::consensus::ConsensusTracker;
use crate::sync::model::{ConsensusStatus, DeviceState, StateChange, SyncOperation, SyncOperationType, VersionedState};
use crate::sync::store::{InMemoryStateStore, StateStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default validator threshold a fresh version's consensus tracker starts
/// with.
const DEFAULT_CONSENSUS_THRESHOLD: usize = 3;

/// Orchestrates device state updates: conflict detection/resolution,
/// persistence, and consensus-tracker initialization.
pub struct Manager<S: StateStore = InMemoryStateStore, R: ConflictResolver = DefaultConflictResolver> {
    store: S,
    resolver: R,
    consensus: ConsensusTracker,
    /// Cached device-to-latest-version index, avoiding a full scan of known
    /// versions on every update.
    latest_by_device: RwLock<HashMap<Uuid, String>>,
}

impl Manager<InMemoryStateStore, DefaultConflictResolver> {
    pub fn new_in_memory() -> Self {
        Self::new(InMemoryStateStore::new(), DefaultConflictResolver::default())
    }
}

impl<S: StateStore, R: ConflictResolver> Manager<S, R> {
    pub fn new(store: S, resolver: R) -> Self {
        Self {
            store,
            resolver,
            consensus: ConsensusTracker::new(),
            latest_by_device: RwLock::new(HashMap::new()),
        }
    }

    /// Applies a new state report for a device: detects and resolves any
    /// conflict with the current latest state, persists the result, logs
    /// the change, and initializes consensus tracking for the new version.
    pub async fn update_state(&self, device_id: Uuid, new_state: VersionedState) -> CoreResult<VersionedState> {
        if new_state.device_state.id != device_id {
            return Err(CoreError::invalid_input(
                    "update_state",
                    format!("new_state.device_state.id {} does not match device_id {device_id}", new_state.device_state.id),
            ));
        }

        let current = self.latest_state(device_id).await?;

        let to_persist = match &current {
            Some(current) => {
                let conflicts = self.resolver.detect_conflicts(&[current.clone(), new_state.clone()]);
                if conflicts.is_empty() {
                    new_state
                } else {
                    log::warn!("detected {} conflict(s) for device {device_id}, resolving", conflicts.len());
                    let resolved = self
                    .resolver
                    .resolve_conflicts(&conflicts)
                    .map_err(|e| CoreError::resolution_failed("update_state", e.to_string()))?;
                    log::info!("resolved conflicting state for device {device_id} to version {}", resolved.version);
                    resolved
                }
            }
            None => new_state,
        };

        self.resolver
        .validate_resolution(&to_persist)
        .map_err(|e| CoreError::validation_failed("update_state", e.to_string()))?;

        let saved = self
        .store
        .save_state(to_persist)
        .await
        .map_err(|e| CoreError::storage_error("update_state", std::io::Error::other(e.to_string())))?;

        self.latest_by_device
        .write()
        .await
        .insert(device_id, saved.version.clone());

        let changes = current
        .as_ref()
        .map(|c| diff(&c.device_state, &saved.device_state))
        .unwrap_or_default();

        self.store
        .track_change(StateChange {
                device_id,
                prev_version: current.as_ref().map(|c| c.version.clone()),
                new_version: saved.version.clone(),
                old_state: current.map(|c| c.device_state),
                new_state: saved.device_state.clone(),
                changes,
                timestamp: chrono::Utc::now(),
                source: saved.source.clone(),
        })
        .await
        .map_err(|e| CoreError::storage_error("update_state", std::io::Error::other(e.to_string())))?;

        self.consensus.init(saved.version.clone(), DEFAULT_CONSENSUS_THRESHOLD).await;

        Ok(saved)
    }

    /// Scans known versions for the one whose `device_state.id` matches,
    /// preferring the cached device-to-latest-version index.
    async fn latest_state(&self, device_id: Uuid) -> CoreResult<Option<VersionedState>> {
        if let Some(version) = self.latest_by_device.read().await.get(&device_id).cloned() {
            if let Some(state) = self
            .store
            .get_state(&version)
            .await
            .map_err(|e| CoreError::storage_error("update_state", std::io::Error::other(e.to_string())))?
            {
                return Ok(Some(state));
            }
        }

        let versions = self
        .store
        .list_versions()
        .await
        .map_err(|e| CoreError::storage_error("update_state", std::io::Error::other(e.to_string())))?;
        let mut latest: Option<VersionedState> = None;
        for version in versions {
            let Some(state) = self
            .store
            .get_state(&version)
            .await
            .map_err(|e| CoreError::storage_error("update_state", std::io::Error::other(e.to_string())))?
            else {
                continue;
            };
            if state.device_state.id != device_id {
                continue;
            }
            match &latest {
                Some(current_latest) if current_latest.updated_at >= state.updated_at => {}
                _ => latest = Some(state),
            }
        }
        Ok(latest)
    }

    /// Fetches the versioned state for a given version, or `state_not_found`.
    pub async fn get_state(&self, version: &str) -> CoreResult<VersionedState> {
        self.store
        .get_state(version)
        .await
        .map_err(|e| CoreError::storage_error("get_state", std::io::Error::other(e.to_string())))?
        .ok_or_else(|| CoreError::state_not_found("get_state", version))
    }

    /// Returns change-log entries with a timestamp at or after `since`.
    pub async fn get_changes(&self, since: chrono::DateTime<chrono::Utc>) -> CoreResult<Vec<StateChange>> {
        self.store
        .get_changes(since)
        .await
        .map_err(|e| CoreError::storage_error("get_changes", std::io::Error::other(e.to_string())))
    }

    /// Records a validator's confirmation for a version.
    pub async fn add_validation(&self, version: &str, validator: &str) -> CoreResult<ConsensusStatus> {
        self.consensus.add_validation(version, validator).await
    }

    /// Returns the current consensus status for a version.
    pub async fn get_consensus(&self, version: &str) -> CoreResult<ConsensusStatus> {
        self.consensus.get_consensus(version).await
    }

    /// Builds a new tracked sync operation, rejecting an empty id.
    pub fn create_operation(
        &self,
        id: &str,
        op_type: SyncOperationType,
        device_ids: Vec<Uuid>,
        payload: serde_json::Value,
        priority: i32,
    ) -> CoreResult<SyncOperation> {
        if id.is_empty() {
            return Err(CoreError::invalid_operation("create_operation", "operation id must not be empty"));
        }
        Ok(SyncOperation::new(id, op_type, device_ids, payload, priority))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::model::DeviceMetrics;

    fn state(device_id: Uuid, status: &str, at: chrono::DateTime<chrono::Utc>) -> VersionedState {
        VersionedState {
            version: format!("v-{}", at.timestamp_nanos_opt().unwrap()),
            device_state: DeviceState {
                id: device_id,
                status: status.to_string(),
                metrics: DeviceMetrics {
                    temperature: 40.0,
                    power_usage: 5.0,
                    cpu_load: 20.0,
                    memory_usage: 30.0,
                },
                tags: Default::default(),
            },
            updated_at: at,
            updated_by: "agent".to_string(),
            source: "agent_report".to_string(),
            validated_by: Vec::new(),
        }
    }

    #[tokio::test]
    async fn update_state_rejects_mismatched_device_id() {
        let manager = Manager::new_in_memory();
        let device_id = Uuid::new_v4();
        let other_id = Uuid::new_v4();
        let err = manager.update_state(device_id, state(other_id, "active", chrono::Utc::now())).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn concurrent_updates_resolve_last_writer_wins() {
        let manager = Manager::new_in_memory();
        let device_id = Uuid::new_v4();
        let t0 = chrono::Utc::now();
        let t1 = t0 + chrono::Duration::seconds(1);

        manager.update_state(device_id, state(device_id, "active", t0)).await.unwrap();
        let resolved = manager.update_state(device_id, state(device_id, "standby", t1)).await.unwrap();

        assert_eq!(resolved.device_state.status, "standby");
        assert_ne!(resolved.updated_by, "agent"); // came through the resolver
    }

    #[tokio::test]
    async fn update_state_initializes_consensus_tracker() {
        let manager = Manager::new_in_memory();
        let device_id = Uuid::new_v4();
        let saved = manager.update_state(device_id, state(device_id, "active", chrono::Utc::now())).await.unwrap();
        let consensus = manager.get_consensus(&saved.version).await.unwrap();
        assert_eq!(consensus.threshold, DEFAULT_CONSENSUS_THRESHOLD);
        assert_eq!(consensus.confirmations, 0);
    }

    #[test]
    fn create_operation_rejects_empty_id() {
        let manager = Manager::new_in_memory();
        let err = manager
        .create_operation("", SyncOperationType::StateSync, vec![], serde_json::json!({}), 0)
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidOperation);
    }
}
