//! Group storage abstraction, mirroring [`crate::device::store`].

use crate::group::model::{Group, GroupListOptions};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug)]
pub enum GroupStoreError {
    NotFound { tenant_id: String, id: Uuid },
    AlreadyExists { tenant_id: String, id: Uuid },
    Backend(String),
}

impl fmt::Display for GroupStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupStoreError::NotFound { tenant_id, id } => {
                write!(f, "group {id} not found in tenant {tenant_id}")
            }
            GroupStoreError::AlreadyExists { tenant_id, id } => {
                write!(f, "group {id} already exists in tenant {tenant_id}")
            }
            GroupStoreError::Backend(message) => write!(f, "group store backend error: {message}"),
        }
    }
}

impl std::error::Error for GroupStoreError {}

pub trait GroupStore: Send + Sync {
    fn create(&self, group: Group) -> impl Future<Output = Result<Group, GroupStoreError>> + Send;
    fn get(&self, tenant_id: &str, id: Uuid) -> impl Future<Output = Result<Option<Group>, GroupStoreError>> + Send;
    fn update(&self, group: Group) -> impl Future<Output = Result<Group, GroupStoreError>> + Send;
    fn delete(&self, tenant_id: &str, id: Uuid) -> impl Future<Output = Result<bool, GroupStoreError>> + Send;
    fn list(&self, opts: &GroupListOptions) -> impl Future<Output = Result<Vec<Group>, GroupStoreError>> + Send;
    /// All groups in a tenant, used by hierarchy integrity checks and
    /// descendant/ancestor walks which need the full forest in view.
    fn list_tenant(&self, tenant_id: &str) -> impl Future<Output = Result<Vec<Group>, GroupStoreError>> + Send;
}

#[derive(Clone, Default)]
pub struct InMemoryGroupStore {
    data: Arc<RwLock<HashMap<(String, Uuid), Group>>>,
}

impl InMemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }
}

impl GroupStore for InMemoryGroupStore {
    async fn create(&self, group: Group) -> Result<Group, GroupStoreError> {
        let key = (group.tenant_id.clone(), group.id);
        let mut data = self.data.write().await;
        if data.contains_key(&key) {
            return Err(GroupStoreError::AlreadyExists {
                    tenant_id: group.tenant_id,
                    id: group.id,
            });
        }
        data.insert(key, group.clone());
        Ok(group)
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Group>, GroupStoreError> {
        let data = self.data.read().await;
        Ok(data.get(&(tenant_id.to_string(), id)).cloned())
    }

    async fn update(&self, group: Group) -> Result<Group, GroupStoreError> {
        let key = (group.tenant_id.clone(), group.id);
        let mut data = self.data.write().await;
        if !data.contains_key(&key) {
            return Err(GroupStoreError::NotFound {
                    tenant_id: group.tenant_id,
                    id: group.id,
            });
        }
        data.insert(key, group.clone());
        Ok(group)
    }

    async fn delete(&self, tenant_id: &str, id: Uuid) -> Result<bool, GroupStoreError> {
        let mut data = self.data.write().await;
        Ok(data.remove(&(tenant_id.to_string(), id)).is_some())
    }

    async fn list(&self, opts: &GroupListOptions) -> Result<Vec<Group>, GroupStoreError> {
        let data = self.data.read().await;
        let mut matches: Vec<Group> = data
        .values()
        .filter(|g| {
                if let Some(tenant) = &opts.tenant_id {
                    if &g.tenant_id != tenant {
                        return false;
                    }
                }
                if let Some(parent) = opts.parent_id {
                    if g.parent_id != Some(parent) {
                        return false;
                    }
                }
                if let Some(group_type) = opts.group_type {
                    if g.group_type != group_type {
                        return false;
                    }
                }
                if opts.depth >= 0 && g.ancestry.depth as i64 != opts.depth {
                    return false;
                }
                if !opts.include_empty && g.device_count == 0 {
                    return false;
                }
                opts.tags.iter().all(|(k, v)| {
                        g.properties.metadata.get(k) == Some(v)
                })
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

    async fn list_tenant(&self, tenant_id: &str) -> Result<Vec<Group>, GroupStoreError> {
        let data = self.data.read().await;
        Ok(data
            .values()
            .filter(|g| g.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::model::GroupType;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryGroupStore::new();
        let group = Group::new("tenant-a", "fleet", GroupType::Static);
        let id = group.id;
        store.create(group.clone()).await.unwrap();
        let fetched = store.get("tenant-a", id).await.unwrap().unwrap();
        assert_eq!(fetched, group);
    }

    #[tokio::test]
    async fn depth_filter_minus_one_does_not_filter() {
        let store = InMemoryGroupStore::new();
        store
        .create(Group::new("tenant-a", "fleet", GroupType::Static))
        .await
        .unwrap();
        let opts = GroupListOptions::new().with_tenant("tenant-a");
        assert_eq!(store.list(&opts).await.unwrap().len(), 1);
    }
}
