//! Hierarchy manager: parent/child graph mutation and integrity checks.
//! Group hierarchy mutations are serialized across the whole tenant by a
//! hierarchy-manager lock.

use crate::error::CoreError;
use crate::group::model::{Ancestry, Group};
use crate::group::store::{GroupStore, GroupStoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Serializes hierarchy mutations per tenant. One lock per tenant, acquired
/// only for the duration of a single reparent operation's critical section;
/// the manager never calls back into the service layer while holding it.
pub struct HierarchyManager<S: GroupStore> {
    store: S,
    tenant_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: GroupStore> HierarchyManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            tenant_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn tenant_lock(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.tenant_locks.lock().await;
        locks
        .entry(tenant_id.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
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

    /// `GetChildren`: direct children of `id`.
    pub async fn get_children(&self, tenant_id: &str, id: Uuid) -> Result<Vec<Group>, CoreError> {
        let group = self
        .store
        .get(tenant_id, id)
        .await
        .map_err(|e| Self::store_err("get_children", e))?
        .ok_or_else(|| CoreError::group_not_found("get_children", tenant_id, &id.to_string()))?;
        let mut children = Vec::new();
        for child_id in &group.ancestry.children {
            if let Some(child) = self
            .store
            .get(tenant_id, *child_id)
            .await
            .map_err(|e| Self::store_err("get_children", e))?
            {
                children.push(child);
            }
        }
        Ok(children)
    }

    /// `GetAncestors`: walk `parent_id` upward from `id`, nearest first.
    pub async fn get_ancestors(&self, tenant_id: &str, id: Uuid) -> Result<Vec<Group>, CoreError> {
        let mut ancestors = Vec::new();
        let mut current = self
        .store
        .get(tenant_id, id)
        .await
        .map_err(|e| Self::store_err("get_ancestors", e))?
        .ok_or_else(|| CoreError::group_not_found("get_ancestors", tenant_id, &id.to_string()))?;
        while let Some(parent_id) = current.parent_id {
            let parent = self
            .store
            .get(tenant_id, parent_id)
            .await
            .map_err(|e| Self::store_err("get_ancestors", e))?
            .ok_or_else(|| CoreError::group_not_found("get_ancestors", tenant_id, &parent_id.to_string()))?;
            ancestors.push(parent.clone());
            current = parent;
        }
        Ok(ancestors)
    }

    /// `GetDescendants`: pre-order traversal (parents before children),
    /// relied on by [`Self::update_hierarchy`] to rebuild ancestry in a
    /// single deterministic pass.
    pub async fn get_descendants(&self, tenant_id: &str, id: Uuid) -> Result<Vec<Group>, CoreError> {
        let mut out = Vec::new();
        let mut stack = self.get_children(tenant_id, id).await?;
        stack.reverse(); // pop takes from the back; keep pre-order stable
        while let Some(node) = stack.pop() {
            let mut children = self.get_children(tenant_id, node.id).await?;
            out.push(node);
            children.reverse();
            for c in children {
                stack.push(c);
            }
        }
        Ok(out)
    }

    /// Reparents a group under a tenant-wide lock: validates the move,
    /// rewrites the moved subtree's ancestry deterministically, applies the
    /// parent-side edits, and rolls back the parent-side edits on failure.
    pub async fn update_hierarchy(
        &self,
        tenant_id: &str,
        group_id: Uuid,
        new_parent_id: Option<Uuid>,
    ) -> Result<Group, CoreError> {
        let lock = self.tenant_lock(tenant_id).await;
        let _guard = lock.lock().await;

        // Step 1: re-read current group, validate the change.
        let current = self
        .store
        .get(tenant_id, group_id)
        .await
        .map_err(|e| Self::store_err("update_hierarchy", e))?
        .ok_or_else(|| CoreError::group_not_found("update_hierarchy", tenant_id, &group_id.to_string()))?;

        if let Some(new_parent_id) = new_parent_id {
            if new_parent_id == group_id {
                return Err(CoreError::invalid_group(
                        "update_hierarchy",
                        "a group cannot be its own parent",
                ));
            }
        }

        let new_parent = match new_parent_id {
            None => None,
            Some(pid) => Some(
                self.store
                .get(tenant_id, pid)
                .await
                .map_err(|e| Self::store_err("update_hierarchy", e))?
                .ok_or_else(|| CoreError::group_not_found("update_hierarchy", tenant_id, &pid.to_string()))?,
            ),
        };

        // Step 2: collect descendants before mutation (used for the cycle
        // check and the subtree rewrite below).
        let descendants = self.get_descendants(tenant_id, group_id).await?;

        if let Some(new_parent) = &new_parent {
            if descendants.iter().any(|d| d.id == new_parent.id) {
                return Err(CoreError::cyclic_dependency(
                        "update_hierarchy",
                        format!("{new_parent_id:?} is a descendant of {group_id}"),
                    )
                    .with_field("group_id", group_id.to_string())
                    .with_field("new_parent_id", new_parent.id.to_string()));
            }
        }

        // No-op: moving to the same parent leaves ancestry unchanged.
        if current.parent_id == new_parent_id {
            return Ok(current);
        }

        // Step 3: read old parent (if any) and plan its RemoveChild update.
        let old_parent = match current.parent_id {
            Some(pid) => self
            .store
            .get(tenant_id, pid)
            .await
            .map_err(|e| Self::store_err("update_hierarchy", e))?,
            None => None,
        };

        // Step 4: build new ancestry for the moved group and its subtree.
        let new_ancestry = match &new_parent {
            Some(parent) => Ancestry {
                path: format!("{}/{}", parent.ancestry.path, group_id),
                path_parts: {
                    let mut parts = parent.ancestry.path_parts.clone();
                    parts.push(group_id);
                    parts
                },
                depth: parent.ancestry.depth + 1,
                children: current.ancestry.children.clone(),
            },
            None => Ancestry {
                path: format!("/{group_id}"),
                path_parts: vec![group_id],
                depth: 0,
                children: current.ancestry.children.clone(),
            },
        };

        let mut rewritten_descendants = Vec::with_capacity(descendants.len());
        let mut ancestry_by_id: HashMap<Uuid, Ancestry> = HashMap::new();
        ancestry_by_id.insert(group_id, new_ancestry.clone());
        for descendant in &descendants {
            let parent_id = descendant
            .parent_id
            .expect("descendant always has a parent within the subtree");
            let parent_ancestry = ancestry_by_id
            .get(&parent_id)
            .cloned()
            .expect("pre-order traversal guarantees the parent was rewritten first");
            let rewritten = Ancestry {
                path: format!("{}/{}", parent_ancestry.path, descendant.id),
                path_parts: {
                    let mut parts = parent_ancestry.path_parts.clone();
                    parts.push(descendant.id);
                    parts
                },
                depth: parent_ancestry.depth + 1,
                children: descendant.ancestry.children.clone(),
            };
            ancestry_by_id.insert(descendant.id, rewritten.clone());
            let mut updated = descendant.clone();
            updated.ancestry = rewritten;
            rewritten_descendants.push(updated);
        }

        // Step 5: apply. On failure, attempt to roll back parent-side edits.
        let mut applied_old_parent_edit = false;
        let mut applied_new_parent_edit = false;

        let result: Result<(), CoreError> = async {
            if let Some(mut old_parent) = old_parent.clone() {
                old_parent.ancestry.children.retain(|c| *c != group_id);
                self.store
                .update(old_parent)
                .await
                .map_err(|e| Self::store_err("update_hierarchy", e))?;
                applied_old_parent_edit = true;
            }

            if let Some(mut new_parent) = new_parent.clone() {
                if !new_parent.ancestry.children.contains(&group_id) {
                    new_parent.ancestry.children.push(group_id);
                }
                self.store
                .update(new_parent)
                .await
                .map_err(|e| Self::store_err("update_hierarchy", e))?;
                applied_new_parent_edit = true;
            }

            let mut moved = current.clone();
            moved.parent_id = new_parent_id;
            moved.ancestry = new_ancestry.clone();
            self.store
            .update(moved)
            .await
            .map_err(|e| Self::store_err("update_hierarchy", e))?;

            for descendant in rewritten_descendants.clone() {
                self.store
                .update(descendant)
                .await
                .map_err(|e| Self::store_err("update_hierarchy", e))?;
            }
            Ok(())
        }
        .await;

        if let Err(original_err) = result {
            log::warn!(
                "update_hierarchy failed for group {group_id} in tenant {tenant_id}, rolling back: {original_err}"
            );
            if applied_old_parent_edit {
                if let Some(mut old_parent) = old_parent.clone() {
                    if !old_parent.ancestry.children.contains(&group_id) {
                        old_parent.ancestry.children.push(group_id);
                    }
                    if let Err(rollback_err) = self.store.update(old_parent).await {
                        log::warn!("rollback of old parent failed: {rollback_err}");
                        return Err(CoreError::store_operation(
                                "update_hierarchy",
                                std::io::Error::other(format!(
                                        "original error: {original_err}; rollback also failed: {rollback_err}"
                                )),
                        ));
                    }
                }
            }
            if applied_new_parent_edit {
                if let Some(mut new_parent) = new_parent.clone() {
                    new_parent.ancestry.children.retain(|c| *c != group_id);
                    if let Err(rollback_err) = self.store.update(new_parent).await {
                        log::warn!("rollback of new parent failed: {rollback_err}");
                        return Err(CoreError::store_operation(
                                "update_hierarchy",
                                std::io::Error::other(format!(
                                        "original error: {original_err}; rollback also failed: {rollback_err}"
                                )),
                        ));
                    }
                }
            }
            return Err(original_err);
        }

        log::info!("moved group {group_id} to parent {new_parent_id:?} in tenant {tenant_id}");
        self.store
        .get(tenant_id, group_id)
        .await
        .map_err(|e| Self::store_err("update_hierarchy", e))?
        .ok_or_else(|| CoreError::group_not_found("update_hierarchy", tenant_id, &group_id.to_string()))
    }

    /// Checks every group in the tenant for a consistent parent/child graph:
    /// path/path_parts/depth agreement and bidirectional parent-child links.
    pub async fn validate_hierarchy_integrity(&self, tenant_id: &str) -> Result<(), CoreError> {
        let groups = self
        .store
        .list_tenant(tenant_id)
        .await
        .map_err(|e| Self::store_err("validate_hierarchy_integrity", e))?;
        let by_id: HashMap<Uuid, &Group> = groups.iter().map(|g| (g.id, g)).collect();

        for g in &groups {
            if g.ancestry.path_parts.last() != Some(&g.id) {
                return Err(CoreError::invalid_hierarchy(
                        "validate_hierarchy_integrity",
                        format!("group {} path_parts does not end with its own id", g.id),
                ));
            }
            if g.ancestry.depth != g.ancestry.path_parts.len().saturating_sub(1) {
                return Err(CoreError::invalid_hierarchy(
                        "validate_hierarchy_integrity",
                        format!("group {} depth does not match path_parts length", g.id),
                ));
            }
            match g.parent_id {
                None => {
                    if g.ancestry.path != format!("/{}", g.id) {
                        return Err(CoreError::invalid_hierarchy(
                                "validate_hierarchy_integrity",
                                format!("root group {} has malformed path", g.id),
                        ));
                    }
                }
                Some(parent_id) => {
                    let parent = by_id.get(&parent_id).ok_or_else(|| {
                            CoreError::invalid_hierarchy(
                                "validate_hierarchy_integrity",
                                format!("group {} references missing parent {}", g.id, parent_id),
                            )
                    })?;
                    if !parent.ancestry.children.contains(&g.id) {
                        return Err(CoreError::invalid_hierarchy(
                                "validate_hierarchy_integrity",
                                format!("parent {} does not list child {}", parent_id, g.id),
                        ));
                    }
                    if g.ancestry.path != format!("{}/{}", parent.ancestry.path, g.id) {
                        return Err(CoreError::invalid_hierarchy(
                                "validate_hierarchy_integrity",
                                format!("group {} path inconsistent with parent path", g.id),
                        ));
                    }
                }
            }
            for child_id in &g.ancestry.children {
                let child = by_id.get(child_id).ok_or_else(|| {
                        CoreError::invalid_hierarchy(
                            "validate_hierarchy_integrity",
                            format!("group {} lists missing child {}", g.id, child_id),
                        )
                })?;
                if child.parent_id != Some(g.id) {
                    return Err(CoreError::invalid_hierarchy(
                            "validate_hierarchy_integrity",
                            format!("child {} does not point back to parent {}", child_id, g.id),
                    ));
                }
            }

            // Reconstruct path_parts by walking parent_id upward.
            let mut walked = vec![g.id];
            let mut cursor = g.parent_id;
            while let Some(pid) = cursor {
                walked.push(pid);
                cursor = by_id.get(&pid).and_then(|p| p.parent_id);
            }
            walked.reverse();
            if walked != g.ancestry.path_parts {
                return Err(CoreError::invalid_hierarchy(
                        "validate_hierarchy_integrity",
                        format!("group {} path_parts does not match parent_id chain", g.id),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::model::GroupType;
    use crate::group::store::InMemoryGroupStore;

    async fn setup_chain() -> (HierarchyManager<InMemoryGroupStore>, Group, Group, Group) {
        let store = InMemoryGroupStore::new();
        let hm = HierarchyManager::new(store.clone());
        let a = store.create(Group::new("tenant-a", "a", GroupType::Static)).await.unwrap();
        let mut b = Group::new("tenant-a", "b", GroupType::Static);
        b.parent_id = Some(a.id);
        let b = store.create(b).await.unwrap();
        let mut c = Group::new("tenant-a", "c", GroupType::Static);
        c.parent_id = Some(b.id);
        let c = store.create(c).await.unwrap();

        // Wire up children lists the way `update_hierarchy` would have.
        let mut a2 = a.clone();
        a2.ancestry.children = vec![b.id];
        store.update(a2).await.unwrap();
        let mut b2 = b.clone();
        b2.ancestry.children = vec![c.id];
        b2.ancestry.path = format!("{}/{}", a.ancestry.path, b.id);
        b2.ancestry.path_parts = vec![a.id, b.id];
        b2.ancestry.depth = 1;
        store.update(b2.clone()).await.unwrap();
        let mut c2 = c.clone();
        c2.ancestry.path = format!("{}/{}", b2.ancestry.path, c.id);
        c2.ancestry.path_parts = vec![a.id, b.id, c.id];
        c2.ancestry.depth = 2;
        store.update(c2.clone()).await.unwrap();

        (hm, a, b2, c2)
    }

    #[tokio::test]
    async fn cycle_is_rejected_and_graph_unchanged() {
        let (hm, a, _b, c) = setup_chain().await;
        let err = hm
        .update_hierarchy("tenant-a", a.id, Some(c.id))
        .await
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CyclicDependency);
        hm.validate_hierarchy_integrity("tenant-a").await.unwrap();
    }

    #[tokio::test]
    async fn move_to_same_parent_is_a_noop() {
        let (hm, _a, b, c) = setup_chain().await;
        let before = hm.get_children("tenant-a", b.id).await.unwrap();
        let updated = hm.update_hierarchy("tenant-a", c.id, Some(b.id)).await.unwrap();
        assert_eq!(updated.ancestry, c.ancestry);
        let after = hm.get_children("tenant-a", b.id).await.unwrap();
        assert_eq!(before.len(), after.len());
    }

    #[tokio::test]
    async fn moving_subtree_rewrites_descendant_ancestry() {
        let (hm, a, _b, c) = setup_chain().await;
        let moved = hm.update_hierarchy("tenant-a", c.id, None).await.unwrap();
        assert_eq!(moved.ancestry.depth, 0);
        assert_eq!(moved.ancestry.path, format!("/{}", c.id));
        hm.validate_hierarchy_integrity("tenant-a").await.unwrap();
        let _ = a;
    }
}
