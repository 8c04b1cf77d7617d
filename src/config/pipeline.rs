//! Config Pipeline service: templates to numbered versions to
//! deployments.

use crate::config::model::{
    ConfigTemplate, Deployment, DeploymentListOptions, DeploymentStatus, TemplateListOptions, Version, VersionStatus,
};
use crate::config::store::{
    DeploymentStore, DeploymentStoreError, InMemoryDeploymentStore, InMemoryTemplateStore, TemplateStore,
    TemplateStoreError,
};
use crate::context::{validate_tenant_access, RequestContext};
use crate::error::{CoreError, CoreResult};
use uuid::Uuid;

/// Templates/versions/deployments lifecycle.
pub struct ConfigPipeline<TS: TemplateStore = InMemoryTemplateStore, DPS: DeploymentStore = InMemoryDeploymentStore> {
    templates: TS,
    deployments: DPS,
}

impl ConfigPipeline<InMemoryTemplateStore, InMemoryDeploymentStore> {
    pub fn new_in_memory() -> Self {
        Self::new(InMemoryTemplateStore::new(), InMemoryDeploymentStore::new())
    }
}

impl<TS: TemplateStore, DPS: DeploymentStore> ConfigPipeline<TS, DPS> {
    pub fn new(templates: TS, deployments: DPS) -> Self {
        Self { templates, deployments }
    }

    fn template_store_err(operation: &'static str, err: TemplateStoreError) -> CoreError {
        match err {
            TemplateStoreError::NotFound { tenant_id, id } => {
                CoreError::template_not_found(operation, &tenant_id, &id.to_string())
            }
            other => CoreError::store_operation(operation, std::io::Error::other(other.to_string())),
        }
    }

    fn deployment_store_err(operation: &'static str, err: DeploymentStoreError) -> CoreError {
        match err {
            DeploymentStoreError::NotFound { tenant_id, id } => {
                CoreError::deployment_not_found(operation, &tenant_id, &id.to_string())
            }
            other => CoreError::store_operation(operation, std::io::Error::other(other.to_string())),
        }
    }

    async fn get_owned_template(&self, ctx: &RequestContext, id: Uuid, op: &'static str) -> CoreResult<ConfigTemplate> {
        let template = self
        .templates
        .get(ctx.tenant_id(), id)
        .await
        .map_err(|e| Self::template_store_err(op, e))?
        .ok_or_else(|| CoreError::template_not_found(op, ctx.tenant_id(), &id.to_string()))?;
        validate_tenant_access(ctx, &template.tenant_id, op)?;
        Ok(template)
    }

    /// `CreateTemplate`.
    pub async fn create_template(&self, ctx: &RequestContext, name: &str, schema_blob: Vec<u8>) -> CoreResult<ConfigTemplate> {
        let template = ConfigTemplate::new(ctx.tenant_id(), name, schema_blob);
        template
        .validate()
        .map_err(|msg| CoreError::invalid_template("create_template", msg))?;
        self.templates
        .create(template)
        .await
        .map_err(|e| Self::template_store_err("create_template", e))
    }

    pub async fn get_template(&self, ctx: &RequestContext, id: Uuid) -> CoreResult<ConfigTemplate> {
        self.get_owned_template(ctx, id, "get_template").await
    }

    pub async fn list_templates(&self, ctx: &RequestContext, mut opts: TemplateListOptions) -> CoreResult<Vec<ConfigTemplate>> {
        match &opts.tenant_id {
            Some(tenant) if tenant != ctx.tenant_id() => {
                return Err(CoreError::unauthorized("list_templates", ctx.tenant_id(), tenant));
            }
            _ => opts.tenant_id = Some(ctx.tenant_id().to_string()),
        }
        self.templates.list(&opts).await.map_err(|e| Self::template_store_err("list_templates", e))
    }

    /// `UpdateTemplate`: name/schema only, never the version sequence.
    pub async fn update_template(&self, ctx: &RequestContext, id: Uuid, name: Option<&str>, schema_blob: Option<Vec<u8>>) -> CoreResult<ConfigTemplate> {
        let mut template = self.get_owned_template(ctx, id, "update_template").await?;
        if let Some(name) = name {
            template.name = name.to_string();
        }
        if let Some(schema_blob) = schema_blob {
            template.schema_blob = schema_blob;
        }
        template
        .validate()
        .map_err(|msg| CoreError::invalid_template("update_template", msg))?;
        self.templates.update(template).await.map_err(|e| Self::template_store_err("update_template", e))
    }

    /// Deletes a template, cascading the delete to its versions.
    pub async fn delete_template(&self, ctx: &RequestContext, id: Uuid) -> CoreResult<()> {
        let template = self.get_owned_template(ctx, id, "delete_template").await?;
        self.templates
        .delete(ctx.tenant_id(), template.id)
        .await
        .map_err(|e| Self::template_store_err("delete_template", e))?;
        Ok(())
    }

    /// Appends a new version to a template, assigning it the next dense
    /// number. The template update path is the whole-entity write that
    /// serializes numbering.
    pub async fn create_version(&self, ctx: &RequestContext, template_id: Uuid, blob: Vec<u8>, created_by: &str) -> CoreResult<Version> {
        if blob.is_empty() {
            return Err(CoreError::invalid_input("create_version", "config blob must not be empty"));
        }
        let mut template = self.get_owned_template(ctx, template_id, "create_version").await?;
        let number = template.versions.len() as u64 + 1;
        let version = Version {
            number,
            config_blob: blob,
            template_id,
            created_by: created_by.to_string(),
            status: VersionStatus::Pending,
            created_at: chrono::Utc::now(),
        };
        template.versions.push(version.clone());
        self.templates
        .update(template)
        .await
        .map_err(|e| Self::template_store_err("create_version", e))?;
        Ok(version)
    }

    pub async fn get_version(&self, ctx: &RequestContext, template_id: Uuid, number: u64) -> CoreResult<Version> {
        let template = self.get_owned_template(ctx, template_id, "get_version").await?;
        template
        .version(number)
        .cloned()
        .ok_or_else(|| CoreError::version_not_found("get_version", &template_id.to_string(), number))
    }

    pub async fn list_versions(&self, ctx: &RequestContext, template_id: Uuid) -> CoreResult<Vec<Version>> {
        let template = self.get_owned_template(ctx, template_id, "list_versions").await?;
        Ok(template.versions)
    }

    /// Replaces a version's blob/status in place; the version number is
    /// immutable and is never reassigned by an update.
    pub async fn update_version(
        &self,
        ctx: &RequestContext,
        template_id: Uuid,
        number: u64,
        config_blob: Option<Vec<u8>>,
        status: Option<VersionStatus>,
    ) -> CoreResult<Version> {
        let mut template = self.get_owned_template(ctx, template_id, "update_version").await?;
        let index = template
        .versions
        .iter()
        .position(|v| v.number == number)
        .ok_or_else(|| CoreError::version_not_found("update_version", &template_id.to_string(), number))?;
        if let Some(blob) = config_blob {
            if blob.is_empty() {
                return Err(CoreError::invalid_version("update_version", "config blob must not be empty"));
            }
            template.versions[index].config_blob = blob;
        }
        if let Some(status) = status {
            template.versions[index].status = status;
        }
        let updated = template.versions[index].clone();
        self.templates
        .update(template)
        .await
        .map_err(|e| Self::template_store_err("update_version", e))?;
        Ok(updated)
    }

    /// `ValidateVersion`: a version is valid only once marked so.
    pub async fn validate_version(&self, ctx: &RequestContext, template_id: Uuid, number: u64) -> CoreResult<bool> {
        let version = self.get_version(ctx, template_id, number).await?;
        Ok(version.status == VersionStatus::Valid)
    }

    /// `RollbackVersion`: marks the version `rollback`.
    pub async fn rollback_version(&self, ctx: &RequestContext, template_id: Uuid, number: u64) -> CoreResult<Version> {
        self.update_version(ctx, template_id, number, None, Some(VersionStatus::Rollback)).await
    }

    /// Creates a pending deployment of a version to a device.
    pub async fn deploy_configuration(&self, ctx: &RequestContext, template_id: Uuid, version: u64, device_id: Uuid) -> CoreResult<Deployment> {
        self.get_version(ctx, template_id, version).await?;
        let deployment = Deployment::new(ctx.tenant_id(), device_id, template_id, version);
        self.deployments
        .create(deployment)
        .await
        .map_err(|e| Self::deployment_store_err("deploy_configuration", e))
    }

    async fn get_owned_deployment(&self, ctx: &RequestContext, id: Uuid, op: &'static str) -> CoreResult<Deployment> {
        let deployment = self
        .deployments
        .get(ctx.tenant_id(), id)
        .await
        .map_err(|e| Self::deployment_store_err(op, e))?
        .ok_or_else(|| CoreError::deployment_not_found(op, ctx.tenant_id(), &id.to_string()))?;
        validate_tenant_access(ctx, &deployment.tenant_id, op)?;
        Ok(deployment)
    }

    /// `CompleteDeployment`.
    pub async fn complete_deployment(&self, ctx: &RequestContext, id: Uuid) -> CoreResult<Deployment> {
        let mut deployment = self.get_owned_deployment(ctx, id, "complete_deployment").await?;
        deployment.complete();
        self.deployments
        .update(deployment)
        .await
        .map_err(|e| Self::deployment_store_err("complete_deployment", e))
    }

    /// Transitions a deployment to `Failed`, recording the given error.
    pub async fn fail_deployment(&self, ctx: &RequestContext, id: Uuid, err: &str) -> CoreResult<Deployment> {
        let mut deployment = self.get_owned_deployment(ctx, id, "fail_deployment").await?;
        deployment.fail(err);
        self.deployments
        .update(deployment)
        .await
        .map_err(|e| Self::deployment_store_err("fail_deployment", e))
    }

    pub async fn start_deployment(&self, ctx: &RequestContext, id: Uuid) -> CoreResult<Deployment> {
        let mut deployment = self.get_owned_deployment(ctx, id, "start_deployment").await?;
        deployment.start();
        self.deployments
        .update(deployment)
        .await
        .map_err(|e| Self::deployment_store_err("start_deployment", e))
    }

    /// Lists deployments ordered by `(deployed_at ASC, id ASC)`, filtered by
    /// tenant/device/status, then paginated.
    pub async fn list_deployments(&self, ctx: &RequestContext, mut opts: DeploymentListOptions) -> CoreResult<Vec<Deployment>> {
        match &opts.tenant_id {
            Some(tenant) if tenant != ctx.tenant_id() => {
                return Err(CoreError::unauthorized("list_deployments", ctx.tenant_id(), tenant));
            }
            _ => opts.tenant_id = Some(ctx.tenant_id().to_string()),
        }
        self.deployments
        .list(&opts)
        .await
        .map_err(|e| Self::deployment_store_err("list_deployments", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> ConfigPipeline<InMemoryTemplateStore, InMemoryDeploymentStore> {
        ConfigPipeline::new_in_memory()
    }

    #[tokio::test]
    async fn create_version_three_times_yields_dense_sequence() {
        let p = pipeline();
        let ctx = RequestContext::with_tenant("tenant-a");
        let t = p.create_template(&ctx, "base", b"schema".to_vec()).await.unwrap();
        p.create_version(&ctx, t.id, b"v1".to_vec(), "admin").await.unwrap();
        p.create_version(&ctx, t.id, b"v2".to_vec(), "admin").await.unwrap();
        p.create_version(&ctx, t.id, b"v3".to_vec(), "admin").await.unwrap();

        let versions = p.list_versions(&ctx, t.id).await.unwrap();
        let numbers: Vec<u64> = versions.iter().map(|v| v.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn update_version_preserves_number() {
        let p = pipeline();
        let ctx = RequestContext::with_tenant("tenant-a");
        let t = p.create_template(&ctx, "base", b"schema".to_vec()).await.unwrap();
        p.create_version(&ctx, t.id, b"v1".to_vec(), "admin").await.unwrap();
        let updated = p
        .update_version(&ctx, t.id, 1, Some(b"v1-fixed".to_vec()), Some(VersionStatus::Valid))
        .await
        .unwrap();
        assert_eq!(updated.number, 1);
        assert_eq!(updated.config_blob, b"v1-fixed".to_vec());
    }

    #[tokio::test]
    async fn deploy_then_complete_is_monotone() {
        let p = pipeline();
        let ctx = RequestContext::with_tenant("tenant-a");
        let t = p.create_template(&ctx, "base", b"schema".to_vec()).await.unwrap();
        p.create_version(&ctx, t.id, b"v1".to_vec(), "admin").await.unwrap();
        let deployment = p.deploy_configuration(&ctx, t.id, 1, Uuid::new_v4()).await.unwrap();
        assert_eq!(deployment.status, DeploymentStatus::Pending);
        let completed = p.complete_deployment(&ctx, deployment.id).await.unwrap();
        assert_eq!(completed.status, DeploymentStatus::Completed);
        assert!(completed.updated_at > completed.deployed_at);
    }

    #[tokio::test]
    async fn delete_template_cascades_versions() {
        let p = pipeline();
        let ctx = RequestContext::with_tenant("tenant-a");
        let t = p.create_template(&ctx, "base", b"schema".to_vec()).await.unwrap();
        p.create_version(&ctx, t.id, b"v1".to_vec(), "admin").await.unwrap();
        p.delete_template(&ctx, t.id).await.unwrap();
        let err = p.get_template(&ctx, t.id).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TemplateNotFound);
    }
}
