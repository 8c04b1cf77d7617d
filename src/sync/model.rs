//! Sync Core data model: versioned device state snapshots, the change log,
//! and consensus tracking.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Opaque version identifier. Ordered by the carrying [`VersionedState`]'s
/// `updated_at` as tiebreaker for "latest".
pub type StateVersion = String;

/// Device-observable metrics tracked at sync granularity. These are the
/// scalar fields the conflict resolver compares field-by-field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetrics {
    pub temperature: f64,
    pub power_usage: f64,
    pub cpu_load: f64,
    pub memory_usage: f64,
}

/// A device-like snapshot carried inside a [`VersionedState`] (/// "device_state: Device-like snapshot"). Slimmer than
/// [`crate::device::Device`] — sync only needs the fields the conflict
/// resolver and consensus machinery reason about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub id: Uuid,
    pub status: String,
    #[serde(default)]
    pub metrics: DeviceMetrics,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl DeviceState {
    pub fn new(id: Uuid, status: impl Into<String>) -> Self {
        Self {
            id,
            status: status.into(),
            metrics: DeviceMetrics::default(),
            tags: HashMap::new(),
        }
    }
}

/// An immutable snapshot of a device's observable state at a given sync
/// version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedState {
    pub version: StateVersion,
    pub device_state: DeviceState,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub updated_by: String,
    pub source: String,
    #[serde(default)]
    pub validated_by: Vec<String>,
}

impl VersionedState {
    pub fn device_id(&self) -> Uuid {
        self.device_state.id
    }
}

/// A single recorded transition in the append-only change log (/// "StateChange").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub device_id: Uuid,
    pub prev_version: Option<StateVersion>,
    pub new_version: StateVersion,
    pub old_state: Option<DeviceState>,
    pub new_state: DeviceState,
    #[serde(default)]
    pub changes: HashMap<String, serde_json::Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source: String,
}

/// Validator-set vote tracking for a single version (/// "ConsensusStatus").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusStatus {
    pub version: StateVersion,
    pub validators: Vec<String>,
    pub confirmations: usize,
    pub threshold: usize,
    pub reached_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ConsensusStatus {
    pub fn new(version: impl Into<String>, threshold: usize) -> Self {
        Self {
            version: version.into(),
            validators: Vec::new(),
            confirmations: 0,
            threshold,
            reached_at: None,
        }
    }
}

/// Sync-level configuration data distributed to devices (/// "ConfigData (sync-level)"), distinct from [`crate::config`]'s
/// template/version/deployment pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigData {
    pub version: StateVersion,
    #[serde(default)]
    pub config_map: HashMap<String, String>,
    pub valid_from: chrono::DateTime<chrono::Utc>,
    pub valid_to: Option<chrono::DateTime<chrono::Utc>>,
}

/// The kind of work a [`SyncOperation`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperationType {
    StateSync,
    ConfigSync,
    PolicySync,
    ResourceSync,
}

/// Lifecycle status of a [`SyncOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A unit of sync work fanned out to one or more devices (/// "Operation tracking").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: String,
    pub op_type: SyncOperationType,
    pub device_ids: Vec<Uuid>,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub status: SyncOperationStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
}

impl SyncOperation {
    /// `CreateOperation`: rejects empty id or type is structural here since
    /// `op_type` is a closed enum; callers validate `id` before calling
    /// [`Self::new`].
    pub fn new(id: impl Into<String>, op_type: SyncOperationType, device_ids: Vec<Uuid>, payload: serde_json::Value, priority: i32) -> Self {
        Self {
            id: id.into(),
            op_type,
            device_ids,
            payload,
            priority,
            status: SyncOperationStatus::Pending,
            created_at: chrono::Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn complete(&mut self) {
        self.status = SyncOperationStatus::Completed;
        self.completed_at = Some(chrono::Utc::now());
    }

    pub fn fail(&mut self, err: impl Into<String>) {
        self.status = SyncOperationStatus::Failed;
        self.error = Some(err.into());
        self.completed_at = Some(chrono::Utc::now());
    }
}

/// Deterministic opaque version string derived from content: a
/// hash-then-encode pattern producing a compact, collision-resistant
/// opaque identifier.
pub fn content_version(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("v-{}", STANDARD.encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_version_is_deterministic() {
        assert_eq!(content_version(b"abc"), content_version(b"abc"));
        assert_ne!(content_version(b"abc"), content_version(b"abd"));
    }

    #[test]
    fn consensus_status_starts_unreached() {
        let status = ConsensusStatus::new("v1", 3);
        assert_eq!(status.confirmations, 0);
        assert!(status.reached_at.is_none());
    }
}
