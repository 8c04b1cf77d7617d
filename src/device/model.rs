//! Device data model.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

/// Device lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Unknown,
    Online,
    Offline,
    Error,
    Maintenance,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        DeviceStatus::Unknown
    }
}

/// How a device entered the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Manual,
    Automatic,
    Mdns,
    NetworkScan,
}

impl Default for DiscoveryMethod {
    fn default() -> Self {
        DiscoveryMethod::Manual
    }
}

/// Network identity reported for a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub ip: String,
    pub mac: String,
    pub hostname: String,
    pub port: u16,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A single entry in a device's append-only configuration history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigVersionEntry {
    pub number: u64,
    pub blob: Vec<u8>,
    pub hash: String,
    pub applied_at: chrono::DateTime<chrono::Utc>,
    pub applied_by: String,
    pub validated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Offline/air-gapped operation capabilities reported by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineCapabilities {
    pub supports_airgap: bool,
    pub last_sync: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub offline_operations: Vec<String>,
    pub sync_interval: u64,
    pub local_buffer_size: u64,
}

/// Compliance check outcome for a device, opaque beyond pass/fail + detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceStatus {
    pub compliant: bool,
    pub checked_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub details: HashMap<String, String>,
}

/// A single managed device.
///
/// Every mutation goes through [`crate::device::DeviceRegistry`], which
/// enforces tenancy, bumps `updated_at`, and returns/stores deep copies
/// rather than internal references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub status: DeviceStatus,
    pub config: Option<Vec<u8>>,
    pub config_history: Vec<ConfigVersionEntry>,
    pub last_config_hash: Option<String>,
    pub tags: HashMap<String, String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub network_info: Option<NetworkInfo>,
    pub discovery_method: DiscoveryMethod,
    pub last_discovered: Option<chrono::DateTime<chrono::Utc>>,
    pub compliance_status: Option<ComplianceStatus>,
    pub offline_capabilities: Option<OfflineCapabilities>,
    pub secure_boot_enabled: bool,
}

impl Device {
    /// Builds a freshly registered device.
    pub fn new(tenant_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            status: DeviceStatus::Unknown,
            config: None,
            config_history: Vec::new(),
            last_config_hash: None,
            tags: HashMap::new(),
            created_at: now,
            updated_at: now,
            network_info: None,
            discovery_method: DiscoveryMethod::Manual,
            last_discovered: None,
            compliance_status: None,
            offline_capabilities: None,
            secure_boot_enabled: false,
        }
    }

    /// Field validation invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_nil() {
            return Err("id must not be nil".to_string());
        }
        if self.tenant_id.is_empty() {
            return Err("tenant_id must not be empty".to_string());
        }
        if self.name.is_empty() {
            return Err("name must not be empty".to_string());
        }
        if let Some(caps) = &self.offline_capabilities {
            // sync_interval/local_buffer_size are u64 so non-negativity is
            // structural; nothing further to check here.
            let _ = caps;
        }
        if let Some(hash) = &self.last_config_hash {
            match self.config_history.last() {
                Some(entry) if &entry.hash == hash => {}
                _ => return Err("last_config_hash must match last config_history entry".to_string()),
            }
        }
        for (i, entry) in self.config_history.iter().enumerate() {
            if entry.number != (i as u64) + 1 {
                return Err("config_history numbers must be a dense 1..n sequence".to_string());
            }
        }
        Ok(())
    }

    /// Appends a new config version. This is a logical operation on the
    /// device itself rather than a separate store call.
    pub fn set_config(
        &mut self,
        blob: Vec<u8>,
        applied_by: impl Into<String>,
    ) -> Result<(), String> {
        if blob.is_empty() {
            return Err("config blob must not be empty".to_string());
        }
        let hash = hex_sha256(&blob);
        let entry = ConfigVersionEntry {
            number: self.config_history.len() as u64 + 1,
            blob: blob.clone(),
            hash: hash.clone(),
            applied_at: chrono::Utc::now(),
            applied_by: applied_by.into(),
            validated_at: None,
        };
        self.config_history.push(entry);
        self.config = Some(blob);
        self.last_config_hash = Some(hash);
        self.touch();
        Ok(())
    }

    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), String> {
        let key = key.into();
        if key.is_empty() {
            return Err("tag key must not be empty".to_string());
        }
        self.tags.insert(key, value.into());
        self.touch();
        Ok(())
    }

    /// Idempotent: removing an absent tag is not an error.
    pub fn remove_tag(&mut self, key: &str) {
        self.tags.remove(key);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

pub fn hex_sha256(blob: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(blob);
    hasher
    .finalize()
    .iter()
    .map(|b| format!("{:02x}", b))
    .collect()
}

/// Recognized device list/filter options.
#[derive(Debug, Clone, Default)]
pub struct DeviceListOptions {
    pub tenant_id: Option<String>,
    pub tags: HashMap<String, String>,
    pub status: Option<DeviceStatus>,
    pub offset: usize,
    pub limit: i64,
}

impl DeviceListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_status(mut self, status: DeviceStatus) -> Self {
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
    fn new_device_has_unknown_status_and_empty_tags() {
        let d = Device::new("tenant-a", "edge-01");
        assert_eq!(d.status, DeviceStatus::Unknown);
        assert!(d.tags.is_empty());
        assert!(d.validate().is_ok());
    }

    #[test]
    fn set_config_rejects_empty_blob() {
        let mut d = Device::new("tenant-a", "edge-01");
        assert!(d.set_config(vec![], "admin").is_err());
    }

    #[test]
    fn set_config_appends_dense_history() {
        let mut d = Device::new("tenant-a", "edge-01");
        d.set_config(b"cfg-v1".to_vec(), "admin").unwrap();
        d.set_config(b"cfg-v2".to_vec(), "admin").unwrap();
        assert_eq!(d.config_history.len(), 2);
        assert_eq!(d.config_history[0].number, 1);
        assert_eq!(d.config_history[1].number, 2);
        assert_eq!(
            d.last_config_hash.as_ref(),
            Some(&d.config_history[1].hash)
        );
        assert!(d.validate().is_ok());
    }

    #[test]
    fn remove_tag_is_idempotent() {
        let mut d = Device::new("tenant-a", "edge-01");
        d.remove_tag("nonexistent");
        d.add_tag("env", "prod").unwrap();
        d.remove_tag("env");
        d.remove_tag("env");
        assert!(!d.tags.contains_key("env"));
    }
}
