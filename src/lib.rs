//! # wfdevice-core
//!
//! A multi-tenant fleet-management control plane for large populations of
//! small compute devices (edge agents). Four tightly coupled subsystems
//! make up the core:
//!
//! - [`device`] — authoritative per-tenant device registry: lifecycle,
//! tags, status, discovery info, and config-hash history.
//! - [`group`] — hierarchical device grouping: static membership and
//! dynamic tag-based queries over a cycle-free parent/child forest.
//! - [`config`] — configuration templates, numbered versions, and
//! deployment tracking.
//! - [`sync`] — versioned device state with conflict detection/resolution,
//! an append-only change log, and validator-based consensus tracking.
//!
//! Tenancy is enforced uniformly by [`context`] across every operation in
//! the four subsystems above, with audit events emitted through
//! [`audit`]. [`agent`] is the in-process device-agent server (pid file,
//! health reporting, graceful shutdown) that peers with this plane.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use wfdevice_core::context::RequestContext;
//! use wfdevice_core::device::DeviceRegistry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = DeviceRegistry::new_in_memory();
//! let ctx = RequestContext::with_tenant("tenant-production");
//!
//! let device = registry.register(&ctx, "edge-01").await?;
//! let fetched = registry.get(&ctx, device.id).await?;
//! assert_eq!(device.id, fetched.id);
//! Ok(())
//! }
//! ```
//!
//! ## Tenant isolation
//!
//! Every operation takes a [`context::RequestContext`] carrying the
//! caller's tenant identity; cross-tenant access attempts fail with
//! [`error::ErrorKind::Unauthorized`] and never mutate state (S1).
//!
//! ## Non-goals
//!
//! This crate does not implement durable replicated storage (the `Store`
//! traits in each component are pluggable), authentication/identity
//! issuance (tenant IDs arrive via the caller's context), HTTP transport,
//! or a UI. See `SPEC_FULL.md` for the full scope discussion.

pub mod agent;
pub mod audit;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod group;
pub mod sync;

pub use error::{CoreError, CoreResult, ErrorKind};
