//! Group Engine service: hierarchy-aware group lifecycle plus
//! static and dynamic membership evaluation.

use crate::audit::{AuditEvent, AuditEventType, AuditSink, CompositeAuditSink, InMemoryAuditSink, LoggingAuditSink};
use crate::context::{validate_tenant_access, RequestContext};
use crate::device::{Device, DeviceListOptions, DeviceRegistry, DeviceStore, InMemoryDeviceStore};
use crate::error::{CoreError, CoreResult};
use crate::group::hierarchy::HierarchyManager;
use crate::group::model::{Group, GroupListOptions, GroupProperties, GroupQuery, GroupType};
use crate::group::store::{GroupStore, GroupStoreError, InMemoryGroupStore};
use std::sync::Arc;
use uuid::Uuid;

/// Hierarchical group lifecycle and membership service.
///
/// Holds a reference to the [`DeviceRegistry`] so dynamic groups can be
/// evaluated against live device state on every `ListDevices` call, per
/// "dynamic groups are evaluated... not materialized".
pub struct GroupEngine<GS: GroupStore = InMemoryGroupStore, DS: DeviceStore = InMemoryDeviceStore> {
    store: GS,
    hierarchy: HierarchyManager<GS>,
    devices: Arc<DeviceRegistry<DS>>,
    audit: Arc<dyn AuditSink>,
}

impl GroupEngine<InMemoryGroupStore, InMemoryDeviceStore> {
    pub fn new_in_memory(devices: Arc<DeviceRegistry<InMemoryDeviceStore>>) -> Self {
        Self::new(
            InMemoryGroupStore::new(),
            devices,
            Arc::new(CompositeAuditSink::new(vec![
                        Box::new(LoggingAuditSink),
                        Box::new(InMemoryAuditSink::new(1024)),
            ])),
        )
    }
}

impl<GS: GroupStore + Clone, DS: DeviceStore> GroupEngine<GS, DS> {
    pub fn new(store: GS, devices: Arc<DeviceRegistry<DS>>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            hierarchy: HierarchyManager::new(store.clone()),
            store,
            devices,
            audit,
        }
    }

    fn emit(&self, event: AuditEvent) {
        self.audit.record(event);
    }

    fn store_err(operation: &'static str, err: GroupStoreError) -> CoreError {
        match err {
            GroupStoreError::NotFound { tenant_id, id } => {
                CoreError::group_not_found(operation, &tenant_id, &id.to_string())
            }
            GroupStoreError::AlreadyExists { tenant_id, id } => {
                CoreError::group_exists(operation, &tenant_id, &id.to_string())
            }
            other => CoreError::store_operation(operation, std::io::Error::other(other.to_string())),
        }
    }

    /// Creates a group under the context tenant, optionally attaching it to
    /// a parent in the same motion.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        name: &str,
        group_type: GroupType,
        parent_id: Option<Uuid>,
    ) -> CoreResult<Group> {
        let mut group = Group::new(ctx.tenant_id(), name, group_type);
        group
        .validate()
        .map_err(|msg| CoreError::invalid_group("create", msg))?;
        let created = self
        .store
        .create(group.clone())
        .await
        .map_err(|e| Self::store_err("create", e))?;

        if let Some(parent_id) = parent_id {
            // Move it into place via the same path the hierarchy manager
            // uses for any other reparenting, so ancestry stays consistent
            // with `update_hierarchy`'s invariants from the start.
            match self.hierarchy.update_hierarchy(ctx.tenant_id(), created.id, Some(parent_id)).await {
                Ok(moved) => {
                    group = moved;
                }
                Err(err) => {
                    // Roll back the bare create so a failed parent attach
                    // doesn't leave an orphan root group behind.
                    let _ = self.store.delete(ctx.tenant_id(), created.id).await;
                    return Err(err);
                }
            }
        } else {
            group = created;
        }

        log::info!("created group {} ({:?}) in tenant {}", group.id, group.group_type, group.tenant_id);
        self.emit(AuditEvent::new(
                AuditEventType::Register,
                group.id.to_string(),
                group.tenant_id.clone(),
                true,
        ));
        Ok(group)
    }

    pub async fn get(&self, ctx: &RequestContext, id: Uuid) -> CoreResult<Group> {
        let group = self
        .store
        .get(ctx.tenant_id(), id)
        .await
        .map_err(|e| Self::store_err("get", e))?
        .ok_or_else(|| CoreError::group_not_found("get", ctx.tenant_id(), &id.to_string()))?;
        validate_tenant_access(ctx, &group.tenant_id, "get")?;
        Ok(group)
    }

    pub async fn list(&self, ctx: &RequestContext, mut opts: GroupListOptions) -> CoreResult<Vec<Group>> {
        match &opts.tenant_id {
            Some(tenant) if tenant != ctx.tenant_id() => {
                return Err(CoreError::unauthorized("list", ctx.tenant_id(), tenant));
            }
            _ => opts.tenant_id = Some(ctx.tenant_id().to_string()),
        }
        self.store.list(&opts).await.map_err(|e| Self::store_err("list", e))
    }

    /// `Update`: name/properties/query, never `parent_id` — reparenting is
    /// exclusively [`Self::update_hierarchy`]'s responsibility.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        name: Option<&str>,
        properties: Option<GroupProperties>,
        query: Option<GroupQuery>,
    ) -> CoreResult<Group> {
        let mut group = self.get(ctx, id).await?;
        if let Some(name) = name {
            group.name = name.to_string();
        }
        if let Some(properties) = properties {
            group.properties = properties;
        }
        if let Some(query) = query {
            if group.group_type != GroupType::Dynamic {
                return Err(CoreError::invalid_group("update", "only dynamic groups carry a query"));
            }
            group.query = Some(query);
        }
        group
        .validate()
        .map_err(|msg| CoreError::invalid_group("update", msg))?;
        self.store.update(group).await.map_err(|e| Self::store_err("update", e))
    }

    /// Reparents a group, delegating to the hierarchy manager which owns
    /// the tenant-wide lock.
    pub async fn update_hierarchy(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        new_parent_id: Option<Uuid>,
    ) -> CoreResult<Group> {
        let group = self.get(ctx, id).await?;
        let updated = self
        .hierarchy
        .update_hierarchy(ctx.tenant_id(), group.id, new_parent_id)
        .await?;
        self.emit(AuditEvent::new(
                AuditEventType::StatusChange,
                updated.id.to_string(),
                updated.tenant_id.clone(),
                true,
        ));
        Ok(updated)
    }

    /// Deletes a group, refusing to delete one that still has children (a
    /// group with children must be reparented or have descendants removed
    /// first).
    pub async fn delete(&self, ctx: &RequestContext, id: Uuid) -> CoreResult<()> {
        let group = self.get(ctx, id).await?;
        if !group.ancestry.children.is_empty() {
            return Err(CoreError::invalid_operation(
                    "delete",
                    "group has children; reparent or delete them first",
            ));
        }
        if let Some(parent_id) = group.parent_id {
            if let Some(mut parent) = self
            .store
            .get(ctx.tenant_id(), parent_id)
            .await
            .map_err(|e| Self::store_err("delete", e))?
            {
                parent.ancestry.children.retain(|c| *c != id);
                self.store.update(parent).await.map_err(|e| Self::store_err("delete", e))?;
            }
        }
        self.store
        .delete(ctx.tenant_id(), id)
        .await
        .map_err(|e| Self::store_err("delete", e))?;
        log::info!("deleted group {} from tenant {}", id, ctx.tenant_id());
        Ok(())
    }

    /// Adds a device to a static group's explicit membership set.
    pub async fn add_device(&self, ctx: &RequestContext, group_id: Uuid, device_id: Uuid) -> CoreResult<Group> {
        let mut group = self.get(ctx, group_id).await?;
        if group.group_type != GroupType::Static {
            return Err(CoreError::invalid_operation("add_device", "only static groups accept explicit membership"));
        }
        let device = self.devices.get(ctx, device_id).await?;
        validate_tenant_access(ctx, &device.tenant_id, "add_device")?;
        if group.members.insert(device_id) {
            group.device_count = group.members.len();
            self.store.update(group).await.map_err(|e| Self::store_err("add_device", e))
        } else {
            Ok(group)
        }
    }

    /// Removes a device from a static group's membership set; calling this
    /// on an absent device is a no-op rather than an error.
    pub async fn remove_device(&self, ctx: &RequestContext, group_id: Uuid, device_id: Uuid) -> CoreResult<Group> {
        let mut group = self.get(ctx, group_id).await?;
        if group.group_type != GroupType::Static {
            return Err(CoreError::invalid_operation(
                    "remove_device",
                    "only static groups accept explicit membership",
            ));
        }
        if group.members.remove(&device_id) {
            group.device_count = group.members.len();
            self.store.update(group).await.map_err(|e| Self::store_err("remove_device", e))
        } else {
            Ok(group)
        }
    }

    /// Lists member devices: static membership is resolved directly from
    /// the stored set, dynamic membership is evaluated against the live
    /// device registry on every call.
    pub async fn list_devices(&self, ctx: &RequestContext, group_id: Uuid) -> CoreResult<Vec<Device>> {
        let group = self.get(ctx, group_id).await?;
        match group.group_type {
            GroupType::Static => {
                let mut devices = Vec::with_capacity(group.members.len());
                for device_id in &group.members {
                    if let Ok(device) = self.devices.get(ctx, *device_id).await {
                        devices.push(device);
                    }
                }
                Ok(devices)
            }
            GroupType::Dynamic => {
                let query = group
                .query
                .clone()
                .ok_or_else(|| CoreError::invalid_group("list_devices", "dynamic group missing query"))?;
                let matched = self.evaluate_dynamic_membership(ctx, &query).await?;

                // Refresh device_count to the match count on success.
                let mut refreshed = group;
                refreshed.device_count = matched.len();
                self.store
                .update(refreshed)
                .await
                .map_err(|e| Self::store_err("list_devices", e))?;
                Ok(matched)
            }
        }
    }

    /// Regions are matched against the device tag `region`; a `custom_blob`
    /// is an opaque out-of-scope matcher and is rejected unless
    /// wired, since no matcher is part of this core.
    async fn evaluate_dynamic_membership(&self, ctx: &RequestContext, query: &GroupQuery) -> CoreResult<Vec<Device>> {
        if query.custom_blob.is_some() {
            return Err(CoreError::invalid_operation(
                    "list_devices",
                    "unsupported: custom_blob query matcher is not wired",
            ));
        }
        let mut opts = DeviceListOptions::new().with_limit(-1);
        if let Some(status) = query.status {
            opts = opts.with_status(status);
        }
        for (k, v) in &query.tags {
            opts = opts.with_tag(k.clone(), v.clone());
        }
        let candidates = self.devices.list(ctx, opts).await?;
        Ok(candidates
            .into_iter()
            .filter(|d| {
                    query.regions.is_empty()
                    || d.tags
                    .get("region")
                    .is_some_and(|region| query.regions.contains(region))
            })
            .collect())
    }

    /// Walks every group in the tenant and checks the hierarchy invariants
    /// hold (parent/child back-references, path/depth consistency).
    pub async fn validate_hierarchy_integrity(&self, tenant_id: &str) -> CoreResult<()> {
        self.hierarchy.validate_hierarchy_integrity(tenant_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceStatus;

    async fn engine() -> (GroupEngine<InMemoryGroupStore, InMemoryDeviceStore>, Arc<DeviceRegistry<InMemoryDeviceStore>>) {
        let devices = Arc::new(DeviceRegistry::new_in_memory());
        (GroupEngine::new_in_memory(devices.clone()), devices)
    }

    #[tokio::test]
    async fn create_with_parent_attaches_under_it() {
        let (engine, _devices) = engine().await;
        let ctx = RequestContext::with_tenant("tenant-a");
        let root = engine.create(&ctx, "root", GroupType::Static, None).await.unwrap();
        let child = engine
        .create(&ctx, "child", GroupType::Static, Some(root.id))
        .await
        .unwrap();
        assert_eq!(child.parent_id, Some(root.id));
        assert_eq!(child.ancestry.depth, 1);
        let refreshed_root = engine.get(&ctx, root.id).await.unwrap();
        assert!(refreshed_root.ancestry.children.contains(&child.id));
    }

    #[tokio::test]
    async fn delete_with_children_is_rejected() {
        let (engine, _devices) = engine().await;
        let ctx = RequestContext::with_tenant("tenant-a");
        let root = engine.create(&ctx, "root", GroupType::Static, None).await.unwrap();
        engine.create(&ctx, "child", GroupType::Static, Some(root.id)).await.unwrap();
        let err = engine.delete(&ctx, root.id).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidOperation);
    }

    #[tokio::test]
    async fn static_group_membership_add_and_remove() {
        let (engine, devices) = engine().await;
        let ctx = RequestContext::with_tenant("tenant-a");
        let group = engine.create(&ctx, "fleet", GroupType::Static, None).await.unwrap();
        let device = devices.register(&ctx, "edge-01").await.unwrap();

        let updated = engine.add_device(&ctx, group.id, device.id).await.unwrap();
        assert_eq!(updated.device_count, 1);
        let listed = engine.list_devices(&ctx, group.id).await.unwrap();
        assert_eq!(listed.len(), 1);

        let updated = engine.remove_device(&ctx, group.id, device.id).await.unwrap();
        assert_eq!(updated.device_count, 0);
    }

    #[tokio::test]
    async fn dynamic_group_evaluates_against_live_tags() {
        let (engine, devices) = engine().await;
        let ctx = RequestContext::with_tenant("tenant-a");
        let mut d1 = devices.register(&ctx, "edge-01").await.unwrap();
        d1 = devices.add_tag(&ctx, d1.id, "env", "prod").await.unwrap();
        devices.register(&ctx, "edge-02").await.unwrap();
        devices.update_status(&ctx, "tenant-a", d1.id, DeviceStatus::Online).await.unwrap();

        let mut query = GroupQuery::default();
        query.tags.insert("env".to_string(), "prod".to_string());
        let group = engine.create(&ctx, "prod-fleet", GroupType::Dynamic, None).await.unwrap();
        let group = engine
        .update(&ctx, group.id, None, None, Some(query))
        .await
        .unwrap();

        let listed = engine.list_devices(&ctx, group.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, d1.id);
    }
}
