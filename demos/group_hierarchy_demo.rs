//! Group Engine walkthrough: build a small region/site hierarchy, move a
//! site between regions, and evaluate a dynamic group against live
//! device tags.
//!
//! Run with: cargo run --example group_hierarchy_demo

use std::sync::Arc;
use wfdevice_core::context::RequestContext;
use wfdevice_core::device::{DeviceRegistry, DeviceStatus};
use wfdevice_core::group::{GroupEngine, GroupQuery, GroupType};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let devices = Arc::new(DeviceRegistry::new_in_memory());
    let groups = GroupEngine::new_in_memory(devices.clone());
    let ctx = RequestContext::with_tenant("tenant-acme");

    let west = groups.create(&ctx, "us-west", GroupType::Static, None).await?;
    let east = groups.create(&ctx, "us-east", GroupType::Static, None).await?;
    let site_a = groups
    .create(&ctx, "site-a", GroupType::Static, Some(west.id))
    .await?;
    println!("site-a created under us-west: {:?}", site_a.ancestry.path);

    println!("Moving site-a from us-west to us-east");
    let moved = groups.update_hierarchy(&ctx, site_a.id, Some(east.id)).await?;
    println!("site-a ancestry after move: {:?}", moved.ancestry.path);

    let edge01 = devices.register(&ctx, "edge-01").await?;
    devices.add_tag(&ctx, edge01.id, "region", "us-east").await?;
    devices
    .update_status(&ctx, "tenant-acme", edge01.id, DeviceStatus::Online)
    .await?;

    let mut query = GroupQuery::default();
    query.regions.push("us-east".to_string());
    query.status = Some(DeviceStatus::Online);
    let dynamic = groups.create(&ctx, "online-east", GroupType::Dynamic, None).await?;
    groups
    .update(&ctx, dynamic.id, None, None, Some(query))
    .await?;

    let matched = groups.list_devices(&ctx, dynamic.id).await?;
    println!("dynamic group online-east matched {} device(s)", matched.len());

    Ok(())
}
