//! Device Registry walkthrough: register, tag, update status, and list
//! devices scoped to a tenant.
//!
//! Run with: cargo run --example device_registry_demo

use wfdevice_core::context::RequestContext;
use wfdevice_core::device::{DeviceListOptions, DeviceRegistry, DeviceStatus};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = DeviceRegistry::new_in_memory();
    let ctx = RequestContext::with_tenant("tenant-acme");

    println!("Registering devices for tenant-acme");
    let edge01 = registry.register(&ctx, "edge-01").await?;
    let edge02 = registry.register(&ctx, "edge-02").await?;
    println!("  edge-01 -> {}", edge01.id);
    println!("  edge-02 -> {}", edge02.id);

    registry.add_tag(&ctx, edge01.id, "region", "us-west").await?;
    registry.add_tag(&ctx, edge02.id, "region", "us-east").await?;
    registry
    .update_status(&ctx, "tenant-acme", edge01.id, DeviceStatus::Online)
    .await?;

    let online = registry
    .list(&ctx, DeviceListOptions::new().with_status(DeviceStatus::Online))
    .await?;
    println!("Online devices: {}", online.len());

    let other_tenant = RequestContext::with_tenant("tenant-globex");
    match registry.get(&other_tenant, edge01.id).await {
        Ok(_) => println!("unexpected: cross-tenant read succeeded"),
        Err(err) => println!("cross-tenant read correctly rejected: {err}"),
    }

    Ok(())
}
