//! Device Registry service.

use crate::audit::{AuditEvent, AuditEventType, AuditSink, CompositeAuditSink, InMemoryAuditSink, LoggingAuditSink};
use crate::context::{validate_tenant_access, validate_tenant_match, RequestContext};
use crate::device::model::{Device, DeviceListOptions, DeviceStatus, NetworkInfo};
use crate::device::store::{DeviceStore, DeviceStoreError, InMemoryDeviceStore};
use crate::error::{CoreError, CoreResult};
use std::sync::Arc;
use uuid::Uuid;

/// Authoritative per-tenant device store and lifecycle service.
pub struct DeviceRegistry<S: DeviceStore = InMemoryDeviceStore> {
    store: S,
    audit: Arc<dyn AuditSink>,
}

impl DeviceRegistry<InMemoryDeviceStore> {
    /// Construct a registry backed by the in-memory store with the default
    /// logging + bounded-ring-buffer audit sink.
    pub fn new_in_memory() -> Self {
        Self::new(
            InMemoryDeviceStore::new(),
            Arc::new(CompositeAuditSink::new(vec![
                        Box::new(LoggingAuditSink),
                        Box::new(InMemoryAuditSink::new(1024)),
            ])),
        )
    }
}

impl<S: DeviceStore> DeviceRegistry<S> {
    pub fn new(store: S, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    fn emit(&self, event: AuditEvent) {
        self.audit.record(event);
    }

    fn store_err(operation: &'static str, err: DeviceStoreError) -> CoreError {
        match err {
            DeviceStoreError::NotFound { tenant_id, id } => {
                CoreError::device_not_found(operation, &tenant_id, &id.to_string())
            }
            DeviceStoreError::AlreadyExists { tenant_id, id } => {
                CoreError::device_exists(operation, &tenant_id, &id.to_string())
            }
            other => CoreError::store_operation(operation, std::io::Error::other(other.to_string())),
        }
    }

    /// Registers a new device under the context tenant with a fresh id,
    /// `unknown` status, and empty tags, then emits a register audit event.
    pub async fn register(&self, ctx: &RequestContext, name: &str) -> CoreResult<Device> {
        let device = Device::new(ctx.tenant_id(), name);
        device
        .validate()
        .map_err(|msg| CoreError::invalid_device("register", msg))?;
        let created = self
        .store
        .create(device)
        .await
        .map_err(|e| Self::store_err("register", e))?;
        log::info!("registered device {} in tenant {}", created.id, created.tenant_id);
        self.emit(AuditEvent::new(
                AuditEventType::Register,
                created.id.to_string(),
                created.tenant_id.clone(),
                true,
        ));
        Ok(created)
    }

    /// Fetches a single device by id, verifying it belongs to the context
    /// tenant, and records an access audit event on success.
    pub async fn get(&self, ctx: &RequestContext, id: Uuid) -> CoreResult<Device> {
        let device = self
        .store
        .get(ctx.tenant_id(), id)
        .await
        .map_err(|e| Self::store_err("get", e))?
        .ok_or_else(|| CoreError::device_not_found("get", ctx.tenant_id(), &id.to_string()))?;
        validate_tenant_access(ctx, &device.tenant_id, "get")?;
        self.emit(AuditEvent::new(
                AuditEventType::Access,
                device.id.to_string(),
                device.tenant_id.clone(),
                true,
        ));
        Ok(device)
    }

    /// Lists devices matching the given filters.
    ///
    /// An explicit `opts.tenant_id` that disagrees with the context is
    /// rejected as unauthorized; without one, results are still restricted
    /// to the context tenant.
    pub async fn list(&self, ctx: &RequestContext, mut opts: DeviceListOptions) -> CoreResult<Vec<Device>> {
        match &opts.tenant_id {
            Some(tenant) => validate_tenant_match(tenant, ctx.tenant_id(), "list")?,
            None => opts.tenant_id = Some(ctx.tenant_id().to_string()),
        }
        self.store.list(&opts).await.map_err(|e| Self::store_err("list", e))
    }

    /// Persists a caller-supplied device, diffing it against the previous
    /// copy to emit dedicated audit events for security-relevant changes.
    pub async fn update(&self, ctx: &RequestContext, mut device: Device) -> CoreResult<Device> {
        device
        .validate()
        .map_err(|msg| CoreError::invalid_device("update", msg))?;
        validate_tenant_access(ctx, &device.tenant_id, "update")?;

        let previous = self
        .store
        .get(&device.tenant_id, device.id)
        .await
        .map_err(|e| Self::store_err("update", e))?
        .ok_or_else(|| CoreError::device_not_found("update", &device.tenant_id, &device.id.to_string()))?;

        device.touch();
        let updated = self
        .store
        .update(device)
        .await
        .map_err(|e| Self::store_err("update", e))?;

        if previous.network_info != updated.network_info {
            self.emit(
                AuditEvent::new(
                    AuditEventType::NetworkChange,
                    updated.id.to_string(),
                    updated.tenant_id.clone(),
                    true,
                )
                .with_details(describe_network_change(&previous.network_info, &updated.network_info)),
            );
        }
        if previous.status != updated.status {
            self.emit(
                AuditEvent::new(
                    AuditEventType::StatusChange,
                    updated.id.to_string(),
                    updated.tenant_id.clone(),
                    true,
                )
                .with_details(format!("{:?} -> {:?}", previous.status, updated.status)),
            );
        }
        if previous.last_config_hash != updated.last_config_hash {
            self.emit(
                AuditEvent::new(
                    AuditEventType::ConfigChange,
                    updated.id.to_string(),
                    updated.tenant_id.clone(),
                    true,
                )
                .with_details(format!(
                        "{:?} -> {:?}",
                        previous.last_config_hash, updated.last_config_hash
                )),
            );
        }
        log::info!("updated device {} in tenant {}", updated.id, updated.tenant_id);
        Ok(updated)
    }

    /// Removes a device after verifying it belongs to the context tenant.
    pub async fn delete(&self, ctx: &RequestContext, id: Uuid) -> CoreResult<()> {
        let device = self
        .store
        .get(ctx.tenant_id(), id)
        .await
        .map_err(|e| Self::store_err("delete", e))?
        .ok_or_else(|| CoreError::device_not_found("delete", ctx.tenant_id(), &id.to_string()))?;
        validate_tenant_access(ctx, &device.tenant_id, "delete")?;
        self.store
        .delete(&device.tenant_id, id)
        .await
        .map_err(|e| Self::store_err("delete", e))?;
        log::info!("deleted device {} from tenant {}", id, device.tenant_id);
        Ok(())
    }

    /// Sets a device's status, requiring the explicit `tenant_id` argument
    /// to match the context tenant before touching the entity.
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        id: Uuid,
        status: DeviceStatus,
    ) -> CoreResult<Device> {
        validate_tenant_match(tenant_id, ctx.tenant_id(), "update_status")?;
        let mut device = self
        .store
        .get(tenant_id, id)
        .await
        .map_err(|e| Self::store_err("update_status", e))?
        .ok_or_else(|| CoreError::device_not_found("update_status", tenant_id, &id.to_string()))?;
        validate_tenant_access(ctx, &device.tenant_id, "update_status")?;

        let previous_status = device.status;
        device.status = status;
        device.touch();
        let updated = self
        .store
        .update(device)
        .await
        .map_err(|e| Self::store_err("update_status", e))?;

        self.emit(
            AuditEvent::new(
                AuditEventType::StatusChange,
                updated.id.to_string(),
                updated.tenant_id.clone(),
                true,
            )
            .with_details(format!("{:?} -> {:?}", previous_status, updated.status)),
        );
        Ok(updated)
    }

    /// Logical `SetConfig` operation: appends to
    /// `config_history` and bumps `last_config_hash`.
    pub async fn set_config(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        blob: Vec<u8>,
        applied_by: &str,
    ) -> CoreResult<Device> {
        let mut device = self.get(ctx, id).await?;
        let previous_hash = device.last_config_hash.clone();
        device
        .set_config(blob, applied_by)
        .map_err(|msg| CoreError::invalid_device("set_config", msg))?;
        let updated = self
        .store
        .update(device)
        .await
        .map_err(|e| Self::store_err("set_config", e))?;
        self.emit(
            AuditEvent::new(
                AuditEventType::ConfigChange,
                updated.id.to_string(),
                updated.tenant_id.clone(),
                true,
            )
            .with_details(format!(
                    "{:?} -> {:?}",
                    previous_hash, updated.last_config_hash
            )),
        );
        Ok(updated)
    }

    pub async fn add_tag(&self, ctx: &RequestContext, id: Uuid, key: &str, value: &str) -> CoreResult<Device> {
        let mut device = self.get(ctx, id).await?;
        device
        .add_tag(key, value)
        .map_err(|msg| CoreError::invalid_device("add_tag", msg))?;
        self.store.update(device).await.map_err(|e| Self::store_err("add_tag", e))
    }

    pub async fn remove_tag(&self, ctx: &RequestContext, id: Uuid, key: &str) -> CoreResult<Device> {
        let mut device = self.get(ctx, id).await?;
        device.remove_tag(key);
        self.store.update(device).await.map_err(|e| Self::store_err("remove_tag", e))
    }
}

fn describe_network_change(previous: &Option<NetworkInfo>, updated: &Option<NetworkInfo>) -> String {
    format!("{:?} -> {:?}", previous, updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DeviceRegistry<InMemoryDeviceStore> {
        DeviceRegistry::new_in_memory()
    }

    #[tokio::test]
    async fn register_then_get_returns_deep_equal_device() {
        let reg = registry();
        let ctx = RequestContext::with_tenant("tenant-a");
        let created = reg.register(&ctx, "edge-01").await.unwrap();
        let fetched = reg.get(&ctx, created.id).await.unwrap();
        assert_eq!(created, fetched);
    }

    #[tokio::test]
    async fn cross_tenant_update_status_is_unauthorized_and_leaves_state() {
        let reg = registry();
        let prod_ctx = RequestContext::with_tenant("tenant-production");
        let staging_ctx = RequestContext::with_tenant("tenant-staging");

        let d_prod = reg.register(&prod_ctx, "prod-edge").await.unwrap();
        reg.register(&staging_ctx, "staging-edge").await.unwrap();

        let err = reg
        .update_status(&staging_ctx, "tenant-production", d_prod.id, DeviceStatus::Online)
        .await
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unauthorized);

        let still_unknown = reg.get(&prod_ctx, d_prod.id).await.unwrap();
        assert_eq!(still_unknown.status, DeviceStatus::Unknown);
    }

    #[tokio::test]
    async fn list_without_explicit_tenant_is_scoped_to_context() {
        let reg = registry();
        let ctx_a = RequestContext::with_tenant("tenant-a");
        let ctx_b = RequestContext::with_tenant("tenant-b");
        reg.register(&ctx_a, "a1").await.unwrap();
        reg.register(&ctx_b, "b1").await.unwrap();

        let list_a = reg.list(&ctx_a, DeviceListOptions::new()).await.unwrap();
        assert_eq!(list_a.len(), 1);
        assert_eq!(list_a[0].tenant_id, "tenant-a");
    }

    #[tokio::test]
    async fn explicit_mismatched_tenant_filter_is_rejected() {
        let reg = registry();
        let ctx = RequestContext::with_tenant("tenant-a");
        let err = reg
        .list(&ctx, DeviceListOptions::new().with_tenant("tenant-b"))
        .await
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn set_config_emits_config_change_and_updates_hash() {
        let reg = registry();
        let ctx = RequestContext::with_tenant("tenant-a");
        let device = reg.register(&ctx, "edge-01").await.unwrap();
        let updated = reg
        .set_config(&ctx, device.id, b"blob-1".to_vec(), "admin")
        .await
        .unwrap();
        assert_eq!(updated.config_history.len(), 1);
        assert!(updated.last_config_hash.is_some());
    }
}
