//! Device Registry component: authoritative per-tenant device
//! store, lifecycle, tags, status, and config-hash history.

pub mod model;
pub mod registry;
pub mod store;

pub use model::{
    ComplianceStatus, ConfigVersionEntry, Device, DeviceListOptions, DeviceStatus,
    DiscoveryMethod, NetworkInfo, OfflineCapabilities,
};
pub use registry::DeviceRegistry;
pub use store::{DeviceStore, DeviceStoreError, InMemoryDeviceStore};
