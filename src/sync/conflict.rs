//! Conflict detection and resolution.

use crate::error::{CoreError, CoreResult};
use crate::sync::model::{DeviceState, StateChange, VersionedState};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// The scalar fields compared pairwise for conflicts (/// "DetectConflicts").
const SCALAR_FIELDS: &[&str] = &["status", "temperature", "power_usage", "cpu_load", "memory_usage"];

fn scalar_value(state: &DeviceState, field: &str) -> serde_json::Value {
    match field {
        "status" => serde_json::Value::String(state.status.clone()),
        "temperature" => serde_json::json!(state.metrics.temperature),
        "power_usage" => serde_json::json!(state.metrics.power_usage),
        "cpu_load" => serde_json::json!(state.metrics.cpu_load),
        "memory_usage" => serde_json::json!(state.metrics.memory_usage),
        _ => serde_json::Value::Null,
    }
}

pub(crate) fn diff(a: &DeviceState, b: &DeviceState) -> HashMap<String, serde_json::Value> {
    let mut changes = HashMap::new();
    for field in SCALAR_FIELDS {
        let value = scalar_value(b, field);
        if scalar_value(a, field) != value {
            changes.insert(field.to_string(), value);
        }
    }
    changes
}

/// Detects and resolves concurrent updates to the same device's state. A
/// single resolver instance keeps a bounded history of its own resolutions
/// for introspection.
pub trait ConflictResolver: Send + Sync {
    /// Every unordered pair with equal `updated_at` **or** any differing
    /// scalar field emits a [`StateChange`].
    fn detect_conflicts(&self, states: &[VersionedState]) -> Vec<StateChange>;

    /// Last-writer-wins by [`StateChange::timestamp`]; constructs a fresh
    /// [`VersionedState`] and records the resolution in bounded history.
    fn resolve_conflicts(&self, conflicts: &[StateChange]) -> CoreResult<VersionedState>;

    /// Structural/value soundness check a resolved state must satisfy.
    fn validate_resolution(&self, state: &VersionedState) -> CoreResult<()>;
}

/// Default last-writer-wins resolver.
pub struct DefaultConflictResolver {
    max_history: usize,
    history: Mutex<VecDeque<VersionedState>>,
}

impl DefaultConflictResolver {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history: max_history.max(1),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Recent resolutions, most recent last, bounded by `max_history`.
    pub fn history(&self) -> Vec<VersionedState> {
        self.history.lock().unwrap().iter().cloned().collect()
    }
}

impl Default for DefaultConflictResolver {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ConflictResolver for DefaultConflictResolver {
    fn detect_conflicts(&self, states: &[VersionedState]) -> Vec<StateChange> {
        let mut conflicts = Vec::new();
        let now = chrono::Utc::now();
        for i in 0..states.len() {
            for j in (i + 1)..states.len() {
                let (s1, s2) = (&states[i], &states[j]);
                let changes = diff(&s1.device_state, &s2.device_state);
                if s1.updated_at == s2.updated_at || !changes.is_empty() {
                    conflicts.push(StateChange {
                            device_id: s2.device_state.id,
                            prev_version: Some(s1.version.clone()),
                            new_version: s2.version.clone(),
                            old_state: Some(s1.device_state.clone()),
                            new_state: s2.device_state.clone(),
                            changes,
                            timestamp: now,
                            source: "conflict_detection".to_string(),
                    });
                }
            }
        }
        conflicts
    }

    fn resolve_conflicts(&self, conflicts: &[StateChange]) -> CoreResult<VersionedState> {
        let winner = conflicts
        .iter()
        .max_by_key(|c| c.timestamp)
        .ok_or_else(|| CoreError::resolution_failed("resolve_conflicts", "no conflicts to resolve"))?;

        let mut resolved_state = winner.old_state.clone().unwrap_or_else(|| winner.new_state.clone());
        for (field, value) in &winner.changes {
            apply_scalar(&mut resolved_state, field, value);
        }
        resolved_state.id = winner.device_id;

        let resolved = VersionedState {
            version: format!("v-{}", unix_nanos(chrono::Utc::now())),
            device_state: resolved_state,
            updated_at: chrono::Utc::now(),
            updated_by: "conflict_resolver".to_string(),
            source: "conflict_resolution".to_string(),
            validated_by: Vec::new(),
        };

        self.validate_resolution(&resolved)?;

        let mut history = self.history.lock().unwrap();
        if history.len() >= self.max_history {
            history.pop_front();
        }
        history.push_back(resolved.clone());

        Ok(resolved)
    }

    fn validate_resolution(&self, state: &VersionedState) -> CoreResult<()> {
        if state.version.is_empty() {
            return Err(CoreError::validation_failed("validate_resolution", "version must not be empty"));
        }
        if state.updated_at.timestamp() == 0 {
            return Err(CoreError::validation_failed("validate_resolution", "updated_at must not be zero"));
        }
        if state.updated_by.is_empty() {
            return Err(CoreError::validation_failed("validate_resolution", "updated_by must not be empty"));
        }
        if state.device_state.id.is_nil() {
            return Err(CoreError::validation_failed("validate_resolution", "device id must not be empty"));
        }
        if state.device_state.status.is_empty() {
            return Err(CoreError::validation_failed("validate_resolution", "status must not be empty"));
        }
        let temperature = state.device_state.metrics.temperature;
        if !(0.0..=100.0).contains(&temperature) {
            return Err(CoreError::validation_failed(
                    "validate_resolution",
                    format!("temperature {temperature} out of range [0,100]"),
            ));
        }
        let cpu_load = state.device_state.metrics.cpu_load;
        if !(0.0..=100.0).contains(&cpu_load) {
            return Err(CoreError::validation_failed(
                    "validate_resolution",
                    format!("cpu_load {cpu_load} out of range [0,100]"),
            ));
        }
        Ok(())
    }
}

fn unix_nanos(at: chrono::DateTime<chrono::Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or_else(|| at.timestamp * 1_000_000_000)
}

/// Applies one winning change to a device state's scalar fields via a typed
/// assertion on the JSON value; unknown keys are ignored.
fn apply_scalar(state: &mut DeviceState, field: &str, value: &serde_json::Value) {
    match field {
        "status" => {
            if let Some(s) = value.as_str() {
                state.status = s.to_string();
            }
        }
        "temperature" => {
            if let Some(n) = value.as_f64() {
                state.metrics.temperature = n;
            }
        }
        "power_usage" => {
            if let Some(n) = value.as_f64() {
                state.metrics.power_usage = n;
            }
        }
        "cpu_load" => {
            if let Some(n) = value.as_f64() {
                state.metrics.cpu_load = n;
            }
        }
        "memory_usage" => {
            if let Some(n) = value.as_f64() {
                state.metrics.memory_usage = n;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::model::DeviceMetrics;
    use uuid::Uuid;

    fn state(status: &str, updated_at: chrono::DateTime<chrono::Utc>) -> VersionedState {
        let id = Uuid::new_v4();
        VersionedState {
            version: format!("v-{}", updated_at.timestamp_nanos_opt().unwrap()),
            device_state: DeviceState {
                id,
                status: status.to_string(),
                metrics: DeviceMetrics {
                    temperature: 42.0,
                    power_usage: 10.0,
                    cpu_load: 30.0,
                    memory_usage: 55.0,
                },
                tags: Default::default(),
            },
            updated_at,
            updated_by: "agent".to_string(),
            source: "test".to_string(),
            validated_by: Vec::new(),
        }
    }

    #[test]
    fn differing_status_is_a_conflict() {
        let resolver = DefaultConflictResolver::default();
        let t0 = chrono::Utc::now();
        let t1 = t0 + chrono::Duration::seconds(1);
        let mut s2 = state("standby", t1);
        let s1 = state("active", t0);
        s2.device_state.id = s1.device_state.id;

        let conflicts = resolver.detect_conflicts(&[s1, s2]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].changes.get("status").unwrap(), "standby");
    }

    #[test]
    fn resolution_picks_latest_timestamp_last_writer_wins() {
        let resolver = DefaultConflictResolver::default();
        let t0 = chrono::Utc::now();
        let t1 = t0 + chrono::Duration::seconds(1);
        let s1 = state("active", t0);
        let mut s2 = state("standby", t1);
        s2.device_state.id = s1.device_state.id;

        let conflicts = resolver.detect_conflicts(&[s1.clone(), s2.clone()]);
        let resolved = resolver.resolve_conflicts(&conflicts).unwrap();
        assert_eq!(resolved.device_state.status, "standby");
        assert_ne!(resolved.version, s1.version);
        assert_ne!(resolved.version, s2.version);
        assert_eq!(resolver.history().len(), 1);
    }

    #[test]
    fn validate_resolution_rejects_out_of_range_temperature() {
        let resolver = DefaultConflictResolver::default();
        let mut s = state("active", chrono::Utc::now());
        s.device_state.metrics.temperature = 150.0;
        assert!(resolver.validate_resolution(&s).is_err());
    }
}
