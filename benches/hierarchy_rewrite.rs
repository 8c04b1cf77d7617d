//! Group Hierarchy Rewrite Benchmarks
//!
//! Measures the cost of `UpdateHierarchy` as the moved subtree's
//! descendant count grows, since every descendant's ancestry is rewritten
//! under the tenant-wide hierarchy lock.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;
use uuid::Uuid;
use wfdevice_core::group::{GroupStore, GroupType, HierarchyManager, InMemoryGroupStore};
use wfdevice_core::group::model::Group;

const TENANT: &str = "bench-tenant";

fn runtime() -> Runtime {
    Runtime::new().expect("failed to build tokio runtime")
}

/// Builds a root group plus a chain of `depth` single-child descendants
/// hanging off a second, detached root (the "mover") and returns
/// `(manager, root_id, mover_root_id, deepest_descendant_id)`.
async fn seeded_hierarchy(depth: usize) -> (HierarchyManager<InMemoryGroupStore>, Uuid, Uuid) {
    let store = InMemoryGroupStore::new();
    let manager = HierarchyManager::new(store.clone());

    let root = Group::new(TENANT, "root", GroupType::Static);
    let root_id = root.id;
    store.create(root).await.expect("create root");

    let mover_root = Group::new(TENANT, "mover-root", GroupType::Static);
    let mover_root_id = mover_root.id;
    store.create(mover_root).await.expect("create mover root");

    let mut parent_id = mover_root_id;
    for i in 0..depth {
        let child = Group::new(TENANT, &format!("mover-child-{i}"), GroupType::Static);
        let child_id = child.id;
        store.create(child).await.expect("create child");
        manager
        .update_hierarchy(TENANT, child_id, Some(parent_id))
        .await
        .expect("attach child");
        parent_id = child_id;
    }

    (manager, root_id, mover_root_id)
}

fn bench_update_hierarchy_by_subtree_size(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("hierarchy_update_subtree_size");

    for depth in [1usize, 10, 50].iter() {
        group.throughput(Throughput::Elements(*depth as u64));
        group.bench_with_input(BenchmarkId::new("attach_then_detach_subtree", depth), depth, |b, &depth| {
                b.iter(|| {
                        rt.block_on(async {
                                let (manager, root_id, mover_root_id) = seeded_hierarchy(depth).await;

                                // Attach the whole mover subtree under root, rewriting
                                // every descendant's ancestry in one critical section.
                                let result = manager
                                .update_hierarchy(TENANT, mover_root_id, Some(root_id))
                                .await;
                                black_box(result.expect("attach mover under root"));

                                // Detach it again, exercising the same rewrite path for
                                // a move back to a tenant root.
                                let result = manager.update_hierarchy(TENANT, mover_root_id, None).await;
                                black_box(result.expect("detach mover back to root"));
                        });
                });
        });
    }

    group.finish();
}

fn bench_get_descendants(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("hierarchy_get_descendants");

    for depth in [1usize, 10, 50].iter() {
        let (manager, _root_id, mover_root_id) = rt.block_on(seeded_hierarchy(*depth));
        group.throughput(Throughput::Elements(*depth as u64));
        group.bench_with_input(BenchmarkId::new("walk_chain", depth), depth, |b, _depth| {
                b.iter(|| {
                        rt.block_on(async {
                                let result = manager.get_descendants(TENANT, mover_root_id).await;
                                black_box(result.expect("walk descendants"));
                        });
                });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_update_hierarchy_by_subtree_size, bench_get_descendants);
criterion_main!(benches);
