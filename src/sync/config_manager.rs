//! Sync-level configuration distribution tracking.
//!
//! Distinct from [`crate::config::ConfigPipeline`]'s template/version/
//! deployment pipeline: this tracks, per device, which opaque config
//! version identifier is currently distributed, independent of any
//! template lineage.

use crate::error::{CoreError, CoreResult};
use crate::sync::model::{content_version, ConfigData, StateVersion};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    configs: HashMap<StateVersion, ConfigData>,
    device_config: HashMap<Uuid, StateVersion>,
    /// `distribution[version][device] = true` once distributed.
    distribution: HashMap<StateVersion, HashMap<Uuid, bool>>,
}

/// Tracks config distribution and validity windows at the sync layer.
#[derive(Default)]
pub struct ConfigManager {
    inner: RwLock<Inner>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a config generation, assigning a `config-<sha8(blob+now)>`
    /// identifier when `config.version` is empty.
    pub async fn register_config(&self, mut config: ConfigData, blob: &[u8]) -> ConfigData {
        if config.version.is_empty() {
            config.version = generate_config_id(blob);
        }
        let mut inner = self.inner.write().await;
        inner.configs.insert(config.version.clone(), config.clone());
        config
    }

    /// Distributes a config version to a set of devices, pointing each
    /// device at that version and marking it delivered.
    pub async fn distribute_config(&self, version: &str, devices: &[Uuid]) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.configs.contains_key(version) {
            return Err(CoreError::invalid_input("distribute_config", format!("unknown config version {version}")));
        }
        let entry = inner.distribution.entry(version.to_string()).or_default();
        for device in devices {
            entry.insert(*device, true);
            inner.device_config.insert(*device, version.to_string());
        }
        Ok(())
    }

    /// Returns the config version currently referenced by the device's
    /// distributed config.
    pub async fn get_device_config(&self, device_id: Uuid) -> CoreResult<ConfigData> {
        let inner = self.inner.read().await;
        let version = inner
        .device_config
        .get(&device_id)
        .ok_or_else(|| CoreError::state_not_found("get_device_config", "none"))?;
        inner
        .configs
        .get(version)
        .cloned()
        .ok_or_else(|| CoreError::state_not_found("get_device_config", version.clone()))
    }

    /// True iff `now` falls in `[valid_from, valid_to)` — an open interval
    /// on the right, with `valid_to` optional (open-ended when absent).
    pub async fn is_config_valid(&self, version: &str) -> CoreResult<bool> {
        let inner = self.inner.read().await;
        let config = inner
        .configs
        .get(version)
        .ok_or_else(|| CoreError::state_not_found("is_config_valid", version))?;
        let now = chrono::Utc::now();
        let after_start = now >= config.valid_from;
        let before_end = config.valid_to.map(|end| now < end).unwrap_or(true);
        Ok(after_start && before_end)
    }
}

fn generate_config_id(blob: &[u8]) -> String {
    let mut payload = blob.to_vec();
    payload.extend_from_slice(chrono::Utc::now().to_rfc3339().as_bytes());
    let full = content_version(&payload);
    format!("config-{}", &full[2..10.min(full.len())])
}
