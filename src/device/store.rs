//! Device storage abstraction.
//!
//! A small, protocol-agnostic capability set with an in-memory default and
//! room for a durable drop-in replacement, typed directly over [`Device`]
//! instead of an untyped blob, since this crate's entities have a fixed
//! shape.

use crate::device::model::{Device, DeviceListOptions};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Errors from the storage layer, separate from [`crate::error::CoreError`]
/// so that a durable backend's I/O failures are distinguishable from
/// registry-level business errors before being wrapped as `storage_error`.
#[derive(Debug)]
pub enum DeviceStoreError {
    NotFound { tenant_id: String, id: Uuid },
    AlreadyExists { tenant_id: String, id: Uuid },
    Backend(String),
}

impl fmt::Display for DeviceStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStoreError::NotFound { tenant_id, id } => {
                write!(f, "device {id} not found in tenant {tenant_id}")
            }
            DeviceStoreError::AlreadyExists { tenant_id, id } => {
                write!(f, "device {id} already exists in tenant {tenant_id}")
            }
            DeviceStoreError::Backend(message) => write!(f, "device store backend error: {message}"),
        }
    }
}

impl std::error::Error for DeviceStoreError {}

/// Store capability set for devices. All reads/writes deep-copy the entity,
/// so callers never observe or mutate the store's internal state directly.
pub trait DeviceStore: Send + Sync {
    fn create(&self, device: Device) -> impl Future<Output = Result<Device, DeviceStoreError>> + Send;
    fn get(&self, tenant_id: &str, id: Uuid) -> impl Future<Output = Result<Option<Device>, DeviceStoreError>> + Send;
    fn update(&self, device: Device) -> impl Future<Output = Result<Device, DeviceStoreError>> + Send;
    fn delete(&self, tenant_id: &str, id: Uuid) -> impl Future<Output = Result<bool, DeviceStoreError>> + Send;
    fn list(&self, opts: &DeviceListOptions) -> impl Future<Output = Result<Vec<Device>, DeviceStoreError>> + Send;
}

/// Thread-safe in-memory implementation keyed by `(tenant_id, id)`.
#[derive(Clone, Default)]
pub struct InMemoryDeviceStore {
    data: Arc<RwLock<HashMap<(String, Uuid), Device>>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }
}

impl DeviceStore for InMemoryDeviceStore {
    async fn create(&self, device: Device) -> Result<Device, DeviceStoreError> {
        let key = (device.tenant_id.clone(), device.id);
        let mut data = self.data.write().await;
        if data.contains_key(&key) {
            return Err(DeviceStoreError::AlreadyExists {
                    tenant_id: device.tenant_id,
                    id: device.id,
            });
        }
        data.insert(key, device.clone());
        Ok(device)
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Device>, DeviceStoreError> {
        let data = self.data.read().await;
        Ok(data.get(&(tenant_id.to_string(), id)).cloned())
    }

    async fn update(&self, device: Device) -> Result<Device, DeviceStoreError> {
        let key = (device.tenant_id.clone(), device.id);
        let mut data = self.data.write().await;
        if !data.contains_key(&key) {
            return Err(DeviceStoreError::NotFound {
                    tenant_id: device.tenant_id,
                    id: device.id,
            });
        }
        data.insert(key, device.clone());
        Ok(device)
    }

    async fn delete(&self, tenant_id: &str, id: Uuid) -> Result<bool, DeviceStoreError> {
        let mut data = self.data.write().await;
        Ok(data.remove(&(tenant_id.to_string(), id)).is_some())
    }

    async fn list(&self, opts: &DeviceListOptions) -> Result<Vec<Device>, DeviceStoreError> {
        let data = self.data.read().await;
        let mut matches: Vec<Device> = data
        .values()
        .filter(|d| {
                if let Some(tenant) = &opts.tenant_id {
                    if &d.tenant_id != tenant {
                        return false;
                    }
                }
                if let Some(status) = opts.status {
                    if d.status != status {
                        return false;
                    }
                }
                opts.tags.iter().all(|(k, v)| d.tags.get(k) == Some(v))
        })
        .cloned()
        .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));

        if opts.offset >= matches.len() {
            return Ok(Vec::new());
        }
        let rest = &matches[opts.offset..];
        if opts.limit <= 0 {
            Ok(rest.to_vec())
        } else {
            Ok(rest.iter().take(opts.limit as usize).cloned().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryDeviceStore::new();
        let device = Device::new("tenant-a", "edge-01");
        let id = device.id;
        store.create(device.clone()).await.unwrap();
        let fetched = store.get("tenant-a", id).await.unwrap().unwrap();
        assert_eq!(fetched, device);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let store = InMemoryDeviceStore::new();
        let device = Device::new("tenant-a", "edge-01");
        store.create(device.clone()).await.unwrap();
        let err = store.create(device).await.unwrap_err();
        assert!(matches!(err, DeviceStoreError::AlreadyExists {.. }));
    }

    #[tokio::test]
    async fn pagination_offset_beyond_count_is_empty() {
        let store = InMemoryDeviceStore::new();
        store.create(Device::new("tenant-a", "d1")).await.unwrap();
        let opts = DeviceListOptions::new().with_tenant("tenant-a").with_offset(5);
        let page = store.list(&opts).await.unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn limit_zero_or_negative_returns_all_remaining() {
        let store = InMemoryDeviceStore::new();
        for i in 0..3 {
            store
            .create(Device::new("tenant-a", format!("d{i}")))
            .await
            .unwrap();
        }
        let opts = DeviceListOptions::new().with_tenant("tenant-a").with_limit(0);
        let page = store.list(&opts).await.unwrap();
        assert_eq!(page.len(), 3);
    }
}
