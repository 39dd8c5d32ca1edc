//! End-to-end ranking against a real state store.
//!
//! Nodes and allocations are written to an in-memory redb store, an
//! evaluation context is opened on a snapshot of it, and full chains are
//! pulled to exhaustion.

use std::sync::{Arc, Once};

use berth_core::{PackingMode, RankConfig, Resources};
use berth_rank::{
    BinPackIterator, EvalContext, FeasibleRankIterator, JobAntiAffinityIterator, MAX_FIT_SCORE,
    Plan, PlacementRequest, RankError, RankIterator, RankStack, RankedNode, StaticIterator,
    collect_ranked,
};
use berth_state::{AllocStatus, Allocation, Node, StateStore};

// ── Tracing setup ────────────────────────────────────────────────

static TRACING_INIT: Once = Once::new();

/// Controlled by `RUST_LOG` (e.g. `RUST_LOG=berth_rank=debug`).
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

// ── Fixtures ─────────────────────────────────────────────────────

fn node(id: &str, cpu: u64, mem: u64) -> Node {
    Node {
        id: id.to_string(),
        name: id.to_string(),
        datacenter: "dc1".to_string(),
        resources: Resources::new(cpu, mem),
        ..Default::default()
    }
}

fn alloc(id: &str, node_id: &str, job_id: &str, cpu: u64, mem: u64) -> Allocation {
    Allocation {
        id: id.to_string(),
        job_id: job_id.to_string(),
        eval_id: "eval-0".to_string(),
        node_id: node_id.to_string(),
        resources: Resources::new(cpu, mem),
        status: AllocStatus::Running,
        ..Default::default()
    }
}

/// Two 2048/2048 nodes: n1 fully used by `alloc1`, n2 half used by `alloc2`.
fn seeded_store() -> (StateStore, Vec<Arc<Node>>) {
    let store = StateStore::open_in_memory().unwrap();
    let nodes = vec![node("n1", 2048, 2048), node("n2", 2048, 2048)];
    for (i, n) in nodes.iter().enumerate() {
        store.upsert_node(i as u64 + 1, n).unwrap();
    }
    store
        .upsert_allocs(
            1000,
            &[
                alloc("alloc1", "n1", "batch", 2048, 2048),
                alloc("alloc2", "n2", "batch", 1024, 1024),
            ],
        )
        .unwrap();

    let snapshot_nodes = store.snapshot().unwrap().nodes().to_vec();
    (store, snapshot_nodes)
}

fn binpack_all(ctx: &EvalContext, nodes: Vec<Arc<Node>>) -> Result<Vec<RankedNode>, RankError> {
    let feasible = FeasibleRankIterator::new(ctx, StaticIterator::new(nodes));
    let mut binp = BinPackIterator::new(
        ctx,
        feasible,
        Resources::new(1024, 1024),
        PackingMode::BinPack,
        Resources::ZERO,
    );
    collect_ranked(&mut binp)
}

fn ids(out: &[RankedNode]) -> Vec<&str> {
    out.iter().map(|r| r.node_id()).collect()
}

// ── Tests ────────────────────────────────────────────────────────

#[test]
fn existing_allocs_consume_capacity() {
    init_tracing();
    let (store, nodes) = seeded_store();
    let ctx = EvalContext::from_store(&store, Plan::new("eval-1")).unwrap();

    let out = binpack_all(&ctx, nodes).unwrap();
    assert_eq!(ids(&out), vec!["n2"]);
    assert_eq!(out[0].score, MAX_FIT_SCORE);
    assert_eq!(ctx.state().index(), 1000);
}

#[test]
fn planned_eviction_frees_capacity() {
    init_tracing();
    let (store, nodes) = seeded_store();
    let mut plan = Plan::new("eval-1");
    plan.append_evict("n1", "alloc1");
    let ctx = EvalContext::from_store(&store, plan).unwrap();

    let out = binpack_all(&ctx, nodes).unwrap();
    assert_eq!(ids(&out), vec!["n1", "n2"]);
    assert!(out[0].score > 10.0 && out[0].score < 16.0);
    assert_eq!(out[1].score, MAX_FIT_SCORE);
}

#[test]
fn terminal_allocs_free_capacity() {
    init_tracing();
    let (store, nodes) = seeded_store();
    let mut done = alloc("alloc1", "n1", "batch", 2048, 2048);
    done.status = AllocStatus::Complete;
    store.upsert_allocs(1001, &[done]).unwrap();

    let ctx = EvalContext::from_store(&store, Plan::new("eval-1")).unwrap();
    let out = binpack_all(&ctx, nodes).unwrap();
    assert_eq!(ids(&out), vec!["n1", "n2"]);
}

#[test]
fn planned_allocation_fills_node_for_next_pass() {
    init_tracing();
    let (store, nodes) = seeded_store();
    let mut ctx = EvalContext::from_store(&store, Plan::new("eval-1")).unwrap();

    let first = binpack_all(&ctx, nodes.clone()).unwrap();
    assert_eq!(ids(&first), vec!["n2"]);

    // Place on n2; the next pass with the same context sees it full.
    ctx.plan_mut()
        .append_alloc(alloc("new1", "n2", "web", 1024, 1024));
    let second = binpack_all(&ctx, nodes).unwrap();
    assert!(second.is_empty());
}

#[test]
fn snapshot_ignores_writes_after_context_creation() {
    init_tracing();
    let (store, nodes) = seeded_store();
    let ctx = EvalContext::from_store(&store, Plan::new("eval-1")).unwrap();

    store
        .upsert_allocs(2000, &[alloc("late", "n2", "batch", 1024, 1024)])
        .unwrap();

    let out = binpack_all(&ctx, nodes).unwrap();
    assert_eq!(ids(&out), vec!["n2"]);
}

#[test]
fn eviction_of_allocation_on_other_node_aborts() {
    init_tracing();
    let (store, nodes) = seeded_store();
    let mut plan = Plan::new("eval-1");
    plan.append_evict("n2", "alloc1");
    let ctx = EvalContext::from_store(&store, plan).unwrap();

    let err = binpack_all(&ctx, nodes).unwrap_err();
    assert!(matches!(err, RankError::UnknownEviction { .. }));
}

#[test]
fn full_chain_is_idempotent_and_side_effect_free() {
    init_tracing();
    let (store, nodes) = seeded_store();
    let mut plan = Plan::new("eval-1");
    plan.append_evict("n1", "alloc1");
    plan.append_alloc(alloc("p1", "n1", "web", 256, 256));
    let ctx = EvalContext::from_store(&store, plan.clone()).unwrap();

    let build = || {
        let feasible = FeasibleRankIterator::new(&ctx, StaticIterator::new(nodes.clone()));
        let binp = BinPackIterator::new(
            &ctx,
            feasible,
            Resources::new(512, 512),
            PackingMode::BinPack,
            Resources::ZERO,
        );
        JobAntiAffinityIterator::new(&ctx, binp, 10.0, "web")
    };

    let first = collect_ranked(&mut build()).unwrap();
    let second = collect_ranked(&mut build()).unwrap();
    let summary = |out: &[RankedNode]| -> Vec<(String, f64)> {
        out.iter().map(|r| (r.node_id().to_string(), r.score)).collect()
    };
    assert_eq!(summary(&first), summary(&second));
    assert_eq!(ctx.plan(), &plan);
    assert_eq!(
        store.get_node("n1").unwrap().as_ref(),
        Some(nodes[0].as_ref())
    );

    // Sentinel stays put once reached.
    let mut chain = build();
    while chain.next().unwrap().is_some() {}
    for _ in 0..3 {
        assert!(chain.next().unwrap().is_none());
    }
}

#[test]
fn stack_selects_from_store_snapshot() {
    init_tracing();
    let (store, nodes) = seeded_store();
    let ctx = EvalContext::from_store(&store, Plan::new("eval-1")).unwrap();

    let mut stack = RankStack::new(&ctx, &RankConfig::default()).unwrap();
    stack.set_nodes(nodes);

    let request = PlacementRequest {
        job_id: "web".to_string(),
        resources: Resources::new(512, 512),
    };
    let chosen = stack.select(&request).unwrap().unwrap();
    assert_eq!(chosen.node_id(), "n2");
    assert!(ctx.metrics().nodes_exhausted >= 1);

    let oversized = PlacementRequest {
        job_id: "web".to_string(),
        resources: Resources::new(4096, 1),
    };
    assert!(stack.select(&oversized).unwrap().is_none());
}
