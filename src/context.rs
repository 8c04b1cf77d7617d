//! Tenant security envelope: context-carried tenant identity,
//! uniformly validated on every registry/group/config/sync operation.
//!
//! Rust has no ambient request context analogous to Go's `context.Context`,
//! so this threads an explicit [`RequestContext`] through every service
//! call instead of an opaque context value. The constructor and accessor
//! below give callers the thin "with tenant" / "tenant from context"
//! operations that pattern implies.

use crate::error::CoreError;
use uuid::Uuid;

/// A request-scoped context carrying the caller's tenant identity.
///
/// Every public operation on [`crate::device::DeviceRegistry`],
/// [`crate::group::GroupEngine`], [`crate::config::ConfigPipeline`], and
/// [`crate::sync::Manager`] takes a `&RequestContext` as its first argument.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique identifier for this request, used for audit correlation.
    pub request_id: String,
    tenant_id: String,
}

impl RequestContext {
    /// Builds a fresh context carrying the given tenant identity.
    pub fn with_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
        }
    }

    /// Same as [`Self::with_tenant`] but with a caller-supplied request id,
    /// useful when correlating with an inbound transport-level request id.
    pub fn with_tenant_and_request_id(
        tenant_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            tenant_id: tenant_id.into(),
        }
    }

    /// Returns the tenant identity carried by this context.
    ///
    /// Since tenancy is required to construct a `RequestContext` at all in
    /// this explicit-parameter redesign, this never fails; the fallible form
    /// from the original contract is preserved as [`Self::tenant_id_checked`]
    /// for callers that built a context from an untrusted transport layer.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Fallible accessor mirroring the source contract's `unauthorized` on a
    /// missing tenant identity, for callers constructing contexts from
    /// external (e.g. HTTP header) input where an empty tenant is possible.
    pub fn tenant_id_checked(&self, operation: &'static str) -> Result<&str, CoreError> {
        if self.tenant_id.is_empty() {
            Err(CoreError::unauthorized(operation, "", ""))
        } else {
            Ok(&self.tenant_id)
        }
    }
}

/// Fails with `unauthorized` if the entity's tenant differs from the
/// context's tenant.
pub fn validate_tenant_access(
    ctx: &RequestContext,
    entity_tenant_id: &str,
    operation: &'static str,
) -> Result<(), CoreError> {
    if ctx.tenant_id() != entity_tenant_id {
        return Err(CoreError::unauthorized(
                operation,
                ctx.tenant_id(),
                entity_tenant_id,
        ));
    }
    Ok(())
}

/// Fails with `unauthorized` if two tenant ids differ.
///
/// Used when a caller passes an explicit tenant argument alongside `ctx`
/// (e.g. the device registry's `update_status`).
pub fn validate_tenant_match(
    a: &str,
    b: &str,
    operation: &'static str,
) -> Result<(), CoreError> {
    if a != b {
        return Err(CoreError::unauthorized(operation, a, b));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_tenants_pass() {
        let ctx = RequestContext::with_tenant("tenant-a");
        assert!(validate_tenant_access(&ctx, "tenant-a", "get").is_ok());
    }

    #[test]
    fn mismatched_tenants_are_unauthorized() {
        let ctx = RequestContext::with_tenant("tenant-staging");
        let err = validate_tenant_access(&ctx, "tenant-production", "update_status").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unauthorized);
        assert_eq!(err.field("context_tenant"), Some("tenant-staging"));
        assert_eq!(err.field("device_tenant"), Some("tenant-production"));
    }

    #[test]
    fn explicit_tenant_argument_must_match_context() {
        assert!(validate_tenant_match("tenant-a", "tenant-a", "list").is_ok());
        assert!(validate_tenant_match("tenant-a", "tenant-b", "list").is_err());
    }
}
