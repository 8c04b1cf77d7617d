//! Config Pipeline storage abstractions, mirroring [`crate::device::store`].

use crate::config::model::{ConfigTemplate, Deployment, DeploymentListOptions, TemplateListOptions};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug)]
pub enum TemplateStoreError {
    NotFound { tenant_id: String, id: Uuid },
    AlreadyExists { tenant_id: String, id: Uuid },
    Backend(String),
}

impl fmt::Display for TemplateStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateStoreError::NotFound { tenant_id, id } => {
                write!(f, "template {id} not found in tenant {tenant_id}")
            }
            TemplateStoreError::AlreadyExists { tenant_id, id } => {
                write!(f, "template {id} already exists in tenant {tenant_id}")
            }
            TemplateStoreError::Backend(message) => write!(f, "template store backend error: {message}"),
        }
    }
}

impl std::error::Error for TemplateStoreError {}

/// Templates own their versions, so `update` is the single mutation point
/// version creation and updates go through, serializing number assignment
/// under the whole-template critical section.
pub trait TemplateStore: Send + Sync {
    fn create(&self, template: ConfigTemplate) -> impl Future<Output = Result<ConfigTemplate, TemplateStoreError>> + Send;
    fn get(&self, tenant_id: &str, id: Uuid) -> impl Future<Output = Result<Option<ConfigTemplate>, TemplateStoreError>> + Send;
    fn update(&self, template: ConfigTemplate) -> impl Future<Output = Result<ConfigTemplate, TemplateStoreError>> + Send;
    fn delete(&self, tenant_id: &str, id: Uuid) -> impl Future<Output = Result<bool, TemplateStoreError>> + Send;
    fn list(&self, opts: &TemplateListOptions) -> impl Future<Output = Result<Vec<ConfigTemplate>, TemplateStoreError>> + Send;
}

#[derive(Clone, Default)]
pub struct InMemoryTemplateStore {
    data: Arc<RwLock<HashMap<(String, Uuid), ConfigTemplate>>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TemplateStore for InMemoryTemplateStore {
    async fn create(&self, template: ConfigTemplate) -> Result<ConfigTemplate, TemplateStoreError> {
        let key = (template.tenant_id.clone(), template.id);
        let mut data = self.data.write().await;
        if data.contains_key(&key) {
            return Err(TemplateStoreError::AlreadyExists {
                    tenant_id: template.tenant_id,
                    id: template.id,
            });
        }
        data.insert(key, template.clone());
        Ok(template)
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<ConfigTemplate>, TemplateStoreError> {
        let data = self.data.read().await;
        Ok(data.get(&(tenant_id.to_string(), id)).cloned())
    }

    async fn update(&self, template: ConfigTemplate) -> Result<ConfigTemplate, TemplateStoreError> {
        let key = (template.tenant_id.clone(), template.id);
        let mut data = self.data.write().await;
        if !data.contains_key(&key) {
            return Err(TemplateStoreError::NotFound {
                    tenant_id: template.tenant_id,
                    id: template.id,
            });
        }
        data.insert(key, template.clone());
        Ok(template)
    }

    async fn delete(&self, tenant_id: &str, id: Uuid) -> Result<bool, TemplateStoreError> {
        let mut data = self.data.write().await;
        Ok(data.remove(&(tenant_id.to_string(), id)).is_some())
    }

    async fn list(&self, opts: &TemplateListOptions) -> Result<Vec<ConfigTemplate>, TemplateStoreError> {
        let data = self.data.read().await;
        let mut matches: Vec<ConfigTemplate> = data
        .values()
        .filter(|t| match &opts.tenant_id {
                Some(tenant) => &t.tenant_id == tenant,
                None => true,
        })
        .cloned()
        .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        paginate(matches, opts.offset, opts.limit)
    }
}

#[derive(Debug)]
pub enum DeploymentStoreError {
    NotFound { tenant_id: String, id: Uuid },
    AlreadyExists { tenant_id: String, id: Uuid },
    Backend(String),
}

impl fmt::Display for DeploymentStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentStoreError::NotFound { tenant_id, id } => {
                write!(f, "deployment {id} not found in tenant {tenant_id}")
            }
            DeploymentStoreError::AlreadyExists { tenant_id, id } => {
                write!(f, "deployment {id} already exists in tenant {tenant_id}")
            }
            DeploymentStoreError::Backend(message) => write!(f, "deployment store backend error: {message}"),
        }
    }
}

impl std::error::Error for DeploymentStoreError {}

pub trait DeploymentStore: Send + Sync {
    fn create(&self, deployment: Deployment) -> impl Future<Output = Result<Deployment, DeploymentStoreError>> + Send;
    fn get(&self, tenant_id: &str, id: Uuid) -> impl Future<Output = Result<Option<Deployment>, DeploymentStoreError>> + Send;
    fn update(&self, deployment: Deployment) -> impl Future<Output = Result<Deployment, DeploymentStoreError>> + Send;
    fn list(&self, opts: &DeploymentListOptions) -> impl Future<Output = Result<Vec<Deployment>, DeploymentStoreError>> + Send;
}

#[derive(Clone, Default)]
pub struct InMemoryDeploymentStore {
    data: Arc<RwLock<HashMap<(String, Uuid), Deployment>>>,
}

impl InMemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeploymentStore for InMemoryDeploymentStore {
    async fn create(&self, deployment: Deployment) -> Result<Deployment, DeploymentStoreError> {
        let key = (deployment.tenant_id.clone(), deployment.id);
        let mut data = self.data.write().await;
        if data.contains_key(&key) {
            return Err(DeploymentStoreError::AlreadyExists {
                    tenant_id: deployment.tenant_id,
                    id: deployment.id,
            });
        }
        data.insert(key, deployment.clone());
        Ok(deployment)
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Deployment>, DeploymentStoreError> {
        let data = self.data.read().await;
        Ok(data.get(&(tenant_id.to_string(), id)).cloned())
    }

    async fn update(&self, deployment: Deployment) -> Result<Deployment, DeploymentStoreError> {
        let key = (deployment.tenant_id.clone(), deployment.id);
        let mut data = self.data.write().await;
        if !data.contains_key(&key) {
            return Err(DeploymentStoreError::NotFound {
                    tenant_id: deployment.tenant_id,
                    id: deployment.id,
            });
        }
        data.insert(key, deployment.clone());
        Ok(deployment)
    }

    async fn list(&self, opts: &DeploymentListOptions) -> Result<Vec<Deployment>, DeploymentStoreError> {
        let data = self.data.read().await;
        let mut matches: Vec<Deployment> = data
        .values()
        .filter(|d| {
                if let Some(tenant) = &opts.tenant_id {
                    if &d.tenant_id != tenant {
                        return false;
                    }
                }
                if let Some(device_id) = opts.device_id {
                    if d.device_id != device_id {
                        return false;
                    }
                }
                if let Some(status) = opts.status {
                    if d.status != status {
                        return false;
                    }
                }
                true
        })
        .cloned()
        .collect();
        // `ListDeployments` ordering: (deployed_at ASC, id ASC).
        matches.sort_by(|a, b| a.deployed_at.cmp(&b.deployed_at).then(a.id.cmp(&b.id)));
        paginate(matches, opts.offset, opts.limit)
    }
}

fn paginate<T: Clone, E>(items: Vec<T>, offset: usize, limit: i64) -> Result<Vec<T>, E> {
    if offset >= items.len() {
        return Ok(Vec::new());
    }
    let rest = &items[offset..];
    if limit <= 0 {
        Ok(rest.to_vec())
    } else {
        Ok(rest.iter().take(limit as usize).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn template_create_then_get_round_trips() {
        let store = InMemoryTemplateStore::new();
        let template = ConfigTemplate::new("tenant-a", "base", b"schema".to_vec());
        let id = template.id;
        store.create(template.clone()).await.unwrap();
        let fetched = store.get("tenant-a", id).await.unwrap().unwrap();
        assert_eq!(fetched, template);
    }

    #[tokio::test]
    async fn deployment_list_orders_by_deployed_at_then_id() {
        let store = InMemoryDeploymentStore::new();
        let template_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        let mut first = Deployment::new("tenant-a", device_id, template_id, 1);
        first.deployed_at = chrono::Utc::now() - chrono::Duration::seconds(10);
        let mut second = Deployment::new("tenant-a", device_id, template_id, 2);
        second.deployed_at = chrono::Utc::now();
        store.create(second.clone()).await.unwrap();
        store.create(first.clone()).await.unwrap();

        let listed = store.list(&DeploymentListOptions::new().with_tenant("tenant-a")).await.unwrap();
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
    }
}
