//! Sync state storage.
//!
//! Two implementations: an in-memory store for tests and embedding, and a
//! file-backed store that persists each state and change as its own JSON
//! file under a root directory, written atomically (temp file + rename).

use crate::sync::model::{StateChange, StateVersion, VersionedState};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug)]
pub enum SyncStoreError {
    NotFound { version: StateVersion },
    Backend(String),
}

impl fmt::Display for SyncStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStoreError::NotFound { version } => write!(f, "state version {version} not found"),
            SyncStoreError::Backend(message) => write!(f, "sync store backend error: {message}"),
        }
    }
}

impl std::error::Error for SyncStoreError {}

/// Store capability set for versioned device state and its change log.
pub trait StateStore: Send + Sync {
    fn get_state(&self, version: &str) -> impl Future<Output = Result<Option<VersionedState>, SyncStoreError>> + Send;
    fn save_state(&self, state: VersionedState) -> impl Future<Output = Result<VersionedState, SyncStoreError>> + Send;
    fn list_versions(&self) -> impl Future<Output = Result<Vec<StateVersion>, SyncStoreError>> + Send;
    fn track_change(&self, change: StateChange) -> impl Future<Output = Result<(), SyncStoreError>> + Send;
    /// Changes with `timestamp >= since`, sorted ascending.
    fn get_changes(&self, since: chrono::DateTime<chrono::Utc>) -> impl Future<Output = Result<Vec<StateChange>, SyncStoreError>> + Send;
}

#[derive(Default)]
struct Inner {
    states: HashMap<StateVersion, VersionedState>,
    changes: Vec<StateChange>,
}

/// In-memory implementation; the default for tests and embedders that don't
/// need durability.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    async fn get_state(&self, version: &str) -> Result<Option<VersionedState>, SyncStoreError> {
        Ok(self.inner.read().await.states.get(version).cloned())
    }

    async fn save_state(&self, state: VersionedState) -> Result<VersionedState, SyncStoreError> {
        let mut inner = self.inner.write().await;
        inner.states.insert(state.version.clone(), state.clone());
        Ok(state)
    }

    async fn list_versions(&self) -> Result<Vec<StateVersion>, SyncStoreError> {
        Ok(self.inner.read().await.states.keys().cloned().collect())
    }

    async fn track_change(&self, change: StateChange) -> Result<(), SyncStoreError> {
        let mut inner = self.inner.write().await;
        inner.changes.push(change);
        // Change log is append-ordered by timestamp ; concurrent
        // writers may tie, in which case relative order is unspecified.
        inner.changes.sort_by_key(|c| c.timestamp);
        Ok(())
    }

    async fn get_changes(&self, since: chrono::DateTime<chrono::Utc>) -> Result<Vec<StateChange>, SyncStoreError> {
        let inner = self.inner.read().await;
        Ok(inner.changes.iter().filter(|c| c.timestamp >= since).cloned().collect())
    }
}

/// File-backed implementation: one JSON file per state under
/// `<root>/states/<version>.json`, one JSON file per change under
/// `<root>/changes/<unix_nanos>-<new_version>.json`. An in-memory cache
/// mirrors both and is populated by loading every file on open.
#[derive(Clone)]
pub struct FileStateStore {
    root: PathBuf,
    cache: Arc<RwLock<Inner>>,
}

impl FileStateStore {
    /// Open (or create) the on-disk layout rooted at `root`, loading any
    /// existing `states/` and `changes/` files into the in-memory cache.
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        let states_dir = root.join("states");
        let changes_dir = root.join("changes");
        tokio::fs::create_dir_all(&states_dir).await?;
        tokio::fs::create_dir_all(&changes_dir).await?;

        let mut inner = Inner::default();

        let mut state_entries = tokio::fs::read_dir(&states_dir).await?;
        while let Some(entry) = state_entries.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(entry.path()).await?;
            let state: VersionedState = serde_json::from_slice(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            inner.states.insert(state.version.clone(), state);
        }

        let mut change_entries = tokio::fs::read_dir(&changes_dir).await?;
        while let Some(entry) = change_entries.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(entry.path()).await?;
            let change: StateChange = serde_json::from_slice(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            inner.changes.push(change);
        }
        inner.changes.sort_by_key(|c| c.timestamp);

        Ok(Self {
                root,
                cache: Arc::new(RwLock::new(inner)),
        })
    }

    fn states_dir(&self) -> PathBuf {
        self.root.join("states")
    }

    fn changes_dir(&self) -> PathBuf {
        self.root.join("changes")
    }

    /// Write `bytes` to `path` atomically via a temp file in the same
    /// directory followed by a rename.
    async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let dir = path.parent().ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
        let tmp_path = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    async fn get_state(&self, version: &str) -> Result<Option<VersionedState>, SyncStoreError> {
        Ok(self.cache.read().await.states.get(version).cloned())
    }

    async fn save_state(&self, state: VersionedState) -> Result<VersionedState, SyncStoreError> {
        let path = self.states_dir().join(format!("{}.json", state.version));
        let bytes = serde_json::to_vec_pretty(&state)
        .map_err(|e| SyncStoreError::Backend(e.to_string()))?;
        Self::write_atomic(&path, &bytes)
        .await
        .map_err(|e| SyncStoreError::Backend(e.to_string()))?;
        self.cache.write().await.states.insert(state.version.clone(), state.clone());
        Ok(state)
    }

    async fn list_versions(&self) -> Result<Vec<StateVersion>, SyncStoreError> {
        Ok(self.cache.read().await.states.keys().cloned().collect())
    }

    async fn track_change(&self, change: StateChange) -> Result<(), SyncStoreError> {
        let nanos = change
        .timestamp
        .timestamp_nanos_opt()
        .unwrap_or_else(|| change.timestamp.timestamp() * 1_000_000_000);
        let path = self.changes_dir().join(format!("{nanos}-{}.json", change.new_version));
        let bytes = serde_json::to_vec_pretty(&change)
        .map_err(|e| SyncStoreError::Backend(e.to_string()))?;
        Self::write_atomic(&path, &bytes)
        .await
        .map_err(|e| SyncStoreError::Backend(e.to_string()))?;
        let mut cache = self.cache.write().await;
        cache.changes.push(change);
        cache.changes.sort_by_key(|c| c.timestamp);
        Ok(())
    }

    async fn get_changes(&self, since: chrono::DateTime<chrono::Utc>) -> Result<Vec<StateChange>, SyncStoreError> {
        let cache = self.cache.read().await;
        Ok(cache.changes.iter().filter(|c| c.timestamp >= since).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::model::DeviceState;
    use uuid::Uuid;

    fn sample_state(version: &str) -> VersionedState {
        VersionedState {
            version: version.to_string(),
            device_state: DeviceState::new(Uuid::new_v4(), "online"),
            updated_at: chrono::Utc::now(),
            updated_by: "agent".to_string(),
            source: "test".to_string(),
            validated_by: Vec::new(),
        }
    }

    #[tokio::test]
    async fn in_memory_save_then_get_round_trips() {
        let store = InMemoryStateStore::new();
        let state = sample_state("v1");
        store.save_state(state.clone()).await.unwrap();
        let fetched = store.get_state("v1").await.unwrap().unwrap();
        assert_eq!(fetched, state);
    }

    #[tokio::test]
    async fn file_store_round_trips_through_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();
        let state = sample_state("v1");
        store.save_state(state.clone()).await.unwrap();

        let reopened = FileStateStore::open(dir.path()).await.unwrap();
        let fetched = reopened.get_state("v1").await.unwrap().unwrap();
        assert_eq!(fetched, state);
    }

    #[tokio::test]
    async fn file_store_change_log_sorted_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();
        let device_id = Uuid::new_v4();
        let later = StateChange {
            device_id,
            prev_version: None,
            new_version: "v2".to_string(),
            old_state: None,
            new_state: DeviceState::new(device_id, "online"),
            changes: HashMap::new(),
            timestamp: chrono::Utc::now(),
            source: "test".to_string(),
        };
        let earlier = StateChange {
            timestamp: later.timestamp - chrono::Duration::seconds(5),
            new_version: "v1".to_string(),
            ..later.clone()
        };
        store.track_change(later.clone()).await.unwrap();
        store.track_change(earlier.clone()).await.unwrap();

        let since = later.timestamp - chrono::Duration::seconds(10);
        let changes = store.get_changes(since).await.unwrap();
        assert_eq!(changes[0].new_version, "v1");
        assert_eq!(changes[1].new_version, "v2");
    }
}
