//! Per-evaluation context.
//!
//! An [`EvalContext`] bundles everything one scheduling attempt reads: a
//! point-in-time view of durable state, the speculative [`Plan`] built up so
//! far, and scratch [`AllocMetric`]s. It is created per evaluation and never
//! shared between evaluations.

use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::sync::Arc;

use berth_core::Dimension;
use berth_state::{AllocId, Allocation, NodeId, Snapshot, StateStore};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{RankError, RankResult};

/// Read-only access to durable cluster state at a fixed index.
pub trait StateView: Send + Sync {
    /// Modify index the view reflects.
    fn index(&self) -> u64;

    /// Every durable allocation bound to `node_id`, terminal ones included.
    fn allocs_by_node(&self, node_id: &str) -> &[Allocation];
}

impl StateView for Snapshot {
    fn index(&self) -> u64 {
        Snapshot::index(self)
    }

    fn allocs_by_node(&self, node_id: &str) -> &[Allocation] {
        Snapshot::allocs_by_node(self, node_id)
    }
}

/// Speculative changes proposed by an evaluation but not yet committed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    pub eval_id: String,
    /// Allocations proposed per node.
    pub node_allocation: BTreeMap<NodeId, Vec<Allocation>>,
    /// Durable allocations to remove, per node.
    pub node_evict: BTreeMap<NodeId, Vec<AllocId>>,
}

impl Plan {
    pub fn new(eval_id: impl Into<String>) -> Self {
        Self {
            eval_id: eval_id.into(),
            ..Default::default()
        }
    }

    /// Propose placing `alloc` on its `node_id`.
    pub fn append_alloc(&mut self, alloc: Allocation) {
        self.node_allocation
            .entry(alloc.node_id.clone())
            .or_default()
            .push(alloc);
    }

    /// Propose evicting a durable allocation from `node_id`.
    pub fn append_evict(&mut self, node_id: impl Into<NodeId>, alloc_id: impl Into<AllocId>) {
        let alloc_id = alloc_id.into();
        let evicts = self.node_evict.entry(node_id.into()).or_default();
        if !evicts.contains(&alloc_id) {
            evicts.push(alloc_id);
        }
    }

    /// True if the plan proposes no change at all.
    pub fn is_noop(&self) -> bool {
        self.node_allocation.values().all(Vec::is_empty)
            && self.node_evict.values().all(Vec::is_empty)
    }
}

/// Diagnostics gathered while ranking. Never feeds back into scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllocMetric {
    /// Nodes that entered the scoring stages.
    pub nodes_evaluated: usize,
    /// Nodes dropped because a resource dimension ran out.
    pub nodes_exhausted: usize,
    pub dimension_exhausted: BTreeMap<Dimension, usize>,
    /// Score contributions keyed `{node_id}.{stage}`.
    pub scores: BTreeMap<String, f64>,
}

/// Everything one evaluation reads while ranking nodes.
pub struct EvalContext {
    state: Arc<dyn StateView>,
    plan: Plan,
    metrics: RefCell<AllocMetric>,
}

impl EvalContext {
    pub fn new(state: Arc<dyn StateView>, plan: Plan) -> Self {
        Self {
            state,
            plan,
            metrics: RefCell::new(AllocMetric::default()),
        }
    }

    /// Snapshot `store` and start an evaluation against it.
    pub fn from_store(store: &StateStore, plan: Plan) -> RankResult<Self> {
        let snapshot = store.snapshot()?;
        debug!(index = snapshot.index(), eval = %plan.eval_id, "evaluation context created");
        Ok(Self::new(Arc::new(snapshot), plan))
    }

    pub fn state(&self) -> &dyn StateView {
        self.state.as_ref()
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Mutable access to the plan. Requires that no pipeline borrows the
    /// context.
    pub fn plan_mut(&mut self) -> &mut Plan {
        &mut self.plan
    }

    pub fn metrics(&self) -> Ref<'_, AllocMetric> {
        self.metrics.borrow()
    }

    pub fn reset_metrics(&self) {
        *self.metrics.borrow_mut() = AllocMetric::default();
    }

    /// Allocations that would occupy `node_id` if the plan were committed.
    ///
    /// Durable non-terminal allocations, minus planned evictions, plus
    /// planned allocations. A planned allocation sharing an ID with a
    /// durable one replaces it. Evicting an allocation the durable view does
    /// not hold on this node is an error.
    pub fn proposed_allocs(&self, node_id: &str) -> RankResult<Vec<Allocation>> {
        let existing = self.state.allocs_by_node(node_id);
        let evicts: &[AllocId] = self
            .plan
            .node_evict
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let planned: &[Allocation] = self
            .plan
            .node_allocation
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        if let Some(missing) = evicts
            .iter()
            .find(|id| !existing.iter().any(|a| &a.id == *id))
        {
            warn!(
                node = %node_id,
                alloc = %missing,
                index = self.state.index(),
                "plan evicts an allocation missing from state"
            );
            return Err(RankError::UnknownEviction {
                node_id: node_id.to_string(),
                alloc_id: missing.clone(),
            });
        }

        let replaced = |alloc: &Allocation| {
            !alloc.id.is_empty() && planned.iter().any(|p| p.id == alloc.id)
        };

        let mut proposed: Vec<Allocation> = existing
            .iter()
            .filter(|a| !a.is_terminal() && !evicts.contains(&a.id) && !replaced(a))
            .cloned()
            .collect();
        proposed.extend(planned.iter().filter(|a| !a.is_terminal()).cloned());
        Ok(proposed)
    }

    pub(crate) fn record_evaluated(&self) {
        self.metrics.borrow_mut().nodes_evaluated += 1;
    }

    pub(crate) fn record_exhausted(&self, dim: Dimension) {
        let mut metrics = self.metrics.borrow_mut();
        metrics.nodes_exhausted += 1;
        *metrics.dimension_exhausted.entry(dim).or_default() += 1;
    }

    pub(crate) fn record_score(&self, node_id: &str, stage: &str, score: f64) {
        self.metrics
            .borrow_mut()
            .scores
            .insert(format!("{node_id}.{stage}"), score);
    }
}
