//! Config Pipeline data model: templates, their numbered versions, and
//! deployments of a version to a device.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a single template Version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Pending,
    Valid,
    Rollback,
}

/// A numbered revision of a template's config blob. Versions are
/// append-only and owned by their template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub number: u64,
    pub config_blob: Vec<u8>,
    pub template_id: Uuid,
    pub created_by: String,
    pub status: VersionStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A configuration template, holding its own dense version sequence.
/// Versions are owned by their template; deleting the template cascades
/// to its versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigTemplate {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub schema_blob: Vec<u8>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub versions: Vec<Version>,
}

impl ConfigTemplate {
    pub fn new(tenant_id: impl Into<String>, name: impl Into<String>, schema_blob: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            schema_blob,
            created_at: chrono::Utc::now(),
            versions: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tenant_id.is_empty() {
            return Err("tenant_id must not be empty".to_string());
        }
        if self.name.is_empty() {
            return Err("name must not be empty".to_string());
        }
        for (i, version) in self.versions.iter().enumerate() {
            if version.number != (i as u64) + 1 {
                return Err("versions must be a dense 1..n sequence".to_string());
            }
        }
        Ok(())
    }

    /// `GetVersion`.
    pub fn version(&self, number: u64) -> Option<&Version> {
        self.versions.iter().find(|v| v.number == number)
    }
}

/// Status of applying a Version to a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A single instance of applying a template version to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub tenant_id: String,
    pub device_id: Uuid,
    pub template_id: Uuid,
    pub version_ref: u64,
    pub status: DeploymentStatus,
    pub error: Option<String>,
    pub deployed_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Deployment {
    pub fn new(tenant_id: impl Into<String>, device_id: Uuid, template_id: Uuid, version_ref: u64) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            device_id,
            template_id,
            version_ref,
            status: DeploymentStatus::Pending,
            error: None,
            deployed_at: now,
            updated_at: now,
        }
    }

    /// Transitions to a terminal `Completed` state. `updated_at` is forced
    /// strictly past `deployed_at` even if both land in the same clock tick.
    pub fn complete(&mut self) {
        self.status = DeploymentStatus::Completed;
        self.updated_at = self.next_updated_at();
    }

    /// Transitions to a terminal `Failed` state, recording `err`.
    pub fn fail(&mut self, err: impl Into<String>) {
        self.status = DeploymentStatus::Failed;
        self.error = Some(err.into());
        self.updated_at = self.next_updated_at();
    }

    pub fn start(&mut self) {
        self.status = DeploymentStatus::InProgress;
        self.updated_at = self.next_updated_at();
    }

    /// `max(now, deployed_at + 1ns)`, guaranteeing the strict ordering
    /// terminal statuses require (`updated_at > deployed_at`).
    fn next_updated_at(&self) -> chrono::DateTime<chrono::Utc> {
        let now = chrono::Utc::now();
        let floor = self.deployed_at + chrono::Duration::nanoseconds(1);
        now.max(floor)
    }
}

/// Recognized template list/filter options.
#[derive(Debug, Clone, Default)]
pub struct TemplateListOptions {
    pub tenant_id: Option<String>,
    pub offset: usize,
    pub limit: i64,
}

impl TemplateListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Recognized deployment list/filter options.
#[derive(Debug, Clone, Default)]
pub struct DeploymentListOptions {
    pub tenant_id: Option<String>,
    pub device_id: Option<Uuid>,
    pub status: Option<DeploymentStatus>,
    pub offset: usize,
    pub limit: i64,
}

impl DeploymentListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_device(mut self, device_id: Uuid) -> Self {
        self.device_id = Some(device_id);
        self
    }

    pub fn with_status(mut self, status: DeploymentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_template_has_no_versions() {
        let t = ConfigTemplate::new("tenant-a", "base", b"schema".to_vec());
        assert!(t.versions.is_empty());
        assert!(t.validate().is_ok());
    }

    #[test]
    fn gap_in_version_numbers_fails_validation() {
        let mut t = ConfigTemplate::new("tenant-a", "base", b"schema".to_vec());
        t.versions.push(Version {
                number: 2,
                config_blob: vec![1],
                template_id: t.id,
                created_by: "admin".to_string(),
                status: VersionStatus::Pending,
                created_at: chrono::Utc::now(),
        });
        assert!(t.validate().is_err());
    }

    #[test]
    fn deployment_transitions_are_monotone_past_deployed_at() {
        let mut d = Deployment::new("tenant-a", Uuid::new_v4(), Uuid::new_v4(), 1);
        let deployed_at = d.deployed_at;
        std::thread::sleep(std::time::Duration::from_millis(1));
        d.complete();
        assert!(d.updated_at > deployed_at);
    }
}
