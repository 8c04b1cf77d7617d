//! Sync Core walkthrough: push a device state update, simulate a
//! conflicting concurrent update, and drive a version's consensus to its
//! threshold.
//!
//! Run with: cargo run --example sync_core_demo

use wfdevice_core::sync::{content_version, DeviceState, Manager, VersionedState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manager = Manager::new_in_memory();
    let device_id = uuid::Uuid::new_v4();

    let mut state = DeviceState::new(device_id, "online");
    state.metrics.temperature = 41.2;
    let first = VersionedState {
        version: content_version(b"edge-01-snapshot-1"),
        device_state: state,
        updated_at: chrono::Utc::now(),
        updated_by: "edge-01".to_string(),
        source: "agent-report".to_string(),
        validated_by: Vec::new(),
    };
    let saved = manager.update_state(device_id, first).await?;
    println!("saved initial state at version {}", saved.version);

    let mut conflicting_state = DeviceState::new(device_id, "degraded");
    conflicting_state.metrics.temperature = 78.9;
    let conflicting = VersionedState {
        version: content_version(b"edge-01-snapshot-2"),
        device_state: conflicting_state,
        updated_at: chrono::Utc::now(),
        updated_by: "edge-01-backup-channel".to_string(),
        source: "agent-report".to_string(),
        validated_by: Vec::new(),
    };
    let resolved = manager.update_state(device_id, conflicting).await?;
    println!(
        "resolved conflicting update: status={} temperature={}",
        resolved.device_state.status, resolved.device_state.metrics.temperature
    );

    for validator in ["validator-a", "validator-b", "validator-c"] {
        let consensus = manager.add_validation(&resolved.version, validator).await?;
        println!(
            "{validator} confirmed version {} ({}/{})",
            consensus.version, consensus.confirmations, consensus.threshold
        );
        if consensus.reached_at.is_some() {
            println!("consensus threshold reached for version {}", consensus.version);
        }
    }

    Ok(())
}
