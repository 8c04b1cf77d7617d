//! Error types for fleet control-plane operations.
//!
//! This module provides the single error type returned by every registry,
//! group, config-pipeline, and sync operation: one struct carrying a
//! machine-readable [`ErrorKind`] plus contextual fields for logging and API
//! responses, rather than a fixed-shape enum per call site.

use std::collections::BTreeMap;
use std::fmt;

/// Machine-readable error kind, matching the error taxonomy every operation
/// in this crate surfaces verbatim (never recovered from silently).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorKind {
    InvalidInput,
    InvalidDevice,
    InvalidGroup,
    InvalidTemplate,
    InvalidVersion,
    InvalidDeployment,
    InvalidOperation,
    InvalidHierarchy,
    CyclicDependency,
    DeviceNotFound,
    GroupNotFound,
    TemplateNotFound,
    VersionNotFound,
    DeploymentNotFound,
    StateNotFound,
    NoConsensusTracking,
    DeviceExists,
    GroupExists,
    Unauthorized,
    StoreOperation,
    StorageError,
    ValidationFailed,
    ResolutionFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidDevice => "invalid_device",
            ErrorKind::InvalidGroup => "invalid_group",
            ErrorKind::InvalidTemplate => "invalid_template",
            ErrorKind::InvalidVersion => "invalid_version",
            ErrorKind::InvalidDeployment => "invalid_deployment",
            ErrorKind::InvalidOperation => "invalid_operation",
            ErrorKind::InvalidHierarchy => "invalid_hierarchy",
            ErrorKind::CyclicDependency => "cyclic_dependency",
            ErrorKind::DeviceNotFound => "device_not_found",
            ErrorKind::GroupNotFound => "group_not_found",
            ErrorKind::TemplateNotFound => "template_not_found",
            ErrorKind::VersionNotFound => "version_not_found",
            ErrorKind::DeploymentNotFound => "deployment_not_found",
            ErrorKind::StateNotFound => "state_not_found",
            ErrorKind::NoConsensusTracking => "no_consensus_tracking",
            ErrorKind::DeviceExists => "device_exists",
            ErrorKind::GroupExists => "group_exists",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::StoreOperation => "store_operation",
            ErrorKind::StorageError => "storage_error",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::ResolutionFailed => "resolution_failed",
        };
        f.write_str(s)
    }
}

/// The error type returned by every public operation in this crate.
///
/// Carries the failing operation's name, a human-readable message, optional
/// contextual fields (`tenant_id`, `group_id`, `device_tenant`, ...), and an
/// optional wrapped cause for `store_operation`/`storage_error` kinds.
#[derive(Debug)]
pub struct CoreError {
    kind: ErrorKind,
    operation: &'static str,
    message: String,
    fields: BTreeMap<String, String>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation,
            message: message.into(),
            fields: BTreeMap::new(),
            source: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }

    // --- convenience constructors, one per ErrorKind ---

    pub fn invalid_input(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, operation, message)
    }

    pub fn invalid_device(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidDevice, operation, message)
    }

    pub fn invalid_group(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidGroup, operation, message)
    }

    pub fn invalid_template(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidTemplate, operation, message)
    }

    pub fn invalid_version(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidVersion, operation, message)
    }

    pub fn invalid_deployment(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidDeployment, operation, message)
    }

    pub fn invalid_operation(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOperation, operation, message)
    }

    pub fn invalid_hierarchy(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidHierarchy, operation, message)
    }

    pub fn cyclic_dependency(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CyclicDependency, operation, message)
    }

    pub fn device_not_found(operation: &'static str, tenant_id: &str, id: &str) -> Self {
        Self::new(
            ErrorKind::DeviceNotFound,
            operation,
            format!("device {id} not found in tenant {tenant_id}"),
        )
        .with_field("tenant_id", tenant_id)
        .with_field("device_id", id)
    }

    pub fn group_not_found(operation: &'static str, tenant_id: &str, id: &str) -> Self {
        Self::new(
            ErrorKind::GroupNotFound,
            operation,
            format!("group {id} not found in tenant {tenant_id}"),
        )
        .with_field("tenant_id", tenant_id)
        .with_field("group_id", id)
    }

    pub fn template_not_found(operation: &'static str, tenant_id: &str, id: &str) -> Self {
        Self::new(
            ErrorKind::TemplateNotFound,
            operation,
            format!("template {id} not found in tenant {tenant_id}"),
        )
        .with_field("tenant_id", tenant_id)
        .with_field("template_id", id)
    }

    pub fn version_not_found(operation: &'static str, template_id: &str, number: u64) -> Self {
        Self::new(
            ErrorKind::VersionNotFound,
            operation,
            format!("version {number} not found for template {template_id}"),
        )
        .with_field("template_id", template_id)
        .with_field("version", number.to_string())
    }

    pub fn deployment_not_found(operation: &'static str, tenant_id: &str, id: &str) -> Self {
        Self::new(
            ErrorKind::DeploymentNotFound,
            operation,
            format!("deployment {id} not found in tenant {tenant_id}"),
        )
        .with_field("tenant_id", tenant_id)
        .with_field("deployment_id", id)
    }

    pub fn state_not_found(operation: &'static str, version: impl Into<String>) -> Self {
        let version = version.into();
        Self::new(
            ErrorKind::StateNotFound,
            operation,
            format!("state version {version} not found"),
        )
        .with_field("version", version)
    }

    pub fn no_consensus_tracking(operation: &'static str, version: impl Into<String>) -> Self {
        let version = version.into();
        Self::new(
            ErrorKind::NoConsensusTracking,
            operation,
            format!("no consensus tracker for version {version}"),
        )
        .with_field("version", version)
    }

    pub fn device_exists(operation: &'static str, tenant_id: &str, id: &str) -> Self {
        Self::new(
            ErrorKind::DeviceExists,
            operation,
            format!("device {id} already exists in tenant {tenant_id}"),
        )
        .with_field("tenant_id", tenant_id)
        .with_field("device_id", id)
    }

    pub fn group_exists(operation: &'static str, tenant_id: &str, id: &str) -> Self {
        Self::new(
            ErrorKind::GroupExists,
            operation,
            format!("group {id} already exists in tenant {tenant_id}"),
        )
        .with_field("tenant_id", tenant_id)
        .with_field("group_id", id)
    }

    pub fn unauthorized(
        operation: &'static str,
        context_tenant: &str,
        entity_tenant: &str,
    ) -> Self {
        Self::new(
            ErrorKind::Unauthorized,
            operation,
            format!(
                "context tenant {context_tenant} is not authorized for entity tenant {entity_tenant}"
            ),
        )
        .with_field("context_tenant", context_tenant)
        .with_field("device_tenant", entity_tenant)
    }

    pub fn store_operation(
        operation: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::new(ErrorKind::StoreOperation, operation, source.to_string()).with_source(source)
    }

    pub fn storage_error(
        operation: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::new(ErrorKind::StorageError, operation, source.to_string()).with_source(source)
    }

    pub fn validation_failed(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed, operation, message)
    }

    pub fn resolution_failed(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResolutionFailed, operation, message)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind, self.operation, self.message)?;
        if !self.fields.is_empty() {
            write!(f, " [")?;
            for (i, (k, v)) in self.fields.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}={v}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
        .as_ref()
        .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Convenience result alias used by every service operation in this crate.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_carries_both_tenants() {
        let err = CoreError::unauthorized("update_status", "tenant-staging", "tenant-production");
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.field("context_tenant"), Some("tenant-staging"));
        assert_eq!(err.field("device_tenant"), Some("tenant-production"));
    }

    #[test]
    fn display_includes_kind_and_operation() {
        let err = CoreError::invalid_device("register", "name must not be empty");
        let rendered = err.to_string();
        assert!(rendered.contains("invalid_device"));
        assert!(rendered.contains("register"));
    }
}
