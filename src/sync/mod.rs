//! Sync Core component: versioned device state, conflict
//! detection/resolution, validator consensus, and sync-level config
//! distribution tracking.

pub mod conflict;
pub mod config_manager;
pub mod consensus;
pub mod manager;
pub mod model;
pub mod store;

pub use conflict::{ConflictResolver, DefaultConflictResolver};
pub use config_manager::ConfigManager;
pub use consensus::ConsensusTracker;
pub use manager::Manager;
pub use model::{
    content_version, ConfigData, ConsensusStatus, DeviceMetrics, DeviceState, StateChange, StateVersion,
    SyncOperation, SyncOperationStatus, SyncOperationType, VersionedState,
};
pub use store::{FileStateStore, InMemoryStateStore, StateStore, SyncStoreError};
