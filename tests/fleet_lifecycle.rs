//! End-to-end integration test covering the registry, group engine,
//! config pipeline, and sync core together against one tenant.

use std::sync::Arc;
use wfdevice_core::config::ConfigPipeline;
use wfdevice_core::context::RequestContext;
use wfdevice_core::device::{DeviceRegistry, DeviceStatus};
use wfdevice_core::group::{GroupEngine, GroupType};
use wfdevice_core::sync::{content_version, DeviceState, Manager, VersionedState};

#[tokio::test]
async fn device_joins_group_gets_config_and_reports_state() {
    let devices = Arc::new(DeviceRegistry::new_in_memory());
    let groups = GroupEngine::new_in_memory(devices.clone());
    let pipeline = ConfigPipeline::new_in_memory();
    let sync = Manager::new_in_memory();

    let ctx = RequestContext::with_tenant("tenant-fleet-test");

    let device = devices.register(&ctx, "edge-01").await.unwrap();
    devices
    .update_status(&ctx, "tenant-fleet-test", device.id, DeviceStatus::Online)
    .await
    .unwrap();

    let fleet = groups.create(&ctx, "fleet", GroupType::Static, None).await.unwrap();
    let fleet = groups.add_device(&ctx, fleet.id, device.id).await.unwrap();
    assert_eq!(fleet.device_count, 1);

    let members = groups.list_devices(&ctx, fleet.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, device.id);

    let template = pipeline
    .create_template(&ctx, "edge-baseline", b"schema-v1".to_vec())
    .await
    .unwrap();
    let version = pipeline
    .create_version(&ctx, template.id, b"cfg-blob-1".to_vec(), "release-bot")
    .await
    .unwrap();
    assert_eq!(version.number, 1);

    let deployment = pipeline
    .deploy_configuration(&ctx, template.id, version.number, device.id)
    .await
    .unwrap();
    let deployment = pipeline.complete_deployment(&ctx, deployment.id).await.unwrap();
    assert_eq!(deployment.status, wfdevice_core::config::DeploymentStatus::Completed);

    let device_state = DeviceState::new(device.id, "online");
    let state = VersionedState {
        version: content_version(b"edge-01-first-report"),
        device_state,
        updated_at: chrono::Utc::now(),
        updated_by: "edge-01".to_string(),
        source: "agent-report".to_string(),
        validated_by: Vec::new(),
    };
    let saved = sync.update_state(device.id, state).await.unwrap();

    for validator in ["validator-a", "validator-b", "validator-c"] {
        sync.add_validation(&saved.version, validator).await.unwrap();
    }
    let consensus = sync.get_consensus(&saved.version).await.unwrap();
    assert!(consensus.reached_at.is_some());
    assert_eq!(consensus.confirmations, 3);
}

#[tokio::test]
async fn cross_tenant_access_never_mutates_state() {
    let devices = Arc::new(DeviceRegistry::new_in_memory());
    let owner = RequestContext::with_tenant("tenant-owner");
    let intruder = RequestContext::with_tenant("tenant-intruder");

    let device = devices.register(&owner, "edge-01").await.unwrap();

    let result = devices
    .update_status(&intruder, "tenant-owner", device.id, DeviceStatus::Offline)
    .await;
    assert!(result.is_err());

    let unchanged = devices.get(&owner, device.id).await.unwrap();
    assert_eq!(unchanged.status, DeviceStatus::Unknown);
}
