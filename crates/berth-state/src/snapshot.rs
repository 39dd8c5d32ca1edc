//! Immutable point-in-time views of cluster state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{AllocId, Allocation, Node, NodeId};

/// Every node and allocation as of one modify index.
///
/// A snapshot is fully materialized in memory: reading it never touches the
/// database, and writes to the store after it was taken are not visible.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    index: u64,
    nodes: Vec<Arc<Node>>,
    allocs: HashMap<NodeId, Vec<Allocation>>,
}

impl Snapshot {
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    /// The modify index this snapshot reflects.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// All nodes, ordered by ID.
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Every allocation bound to `node_id`, terminal ones included.
    pub fn allocs_by_node(&self, node_id: &str) -> &[Allocation] {
        self.allocs.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of allocations across all nodes.
    pub fn alloc_count(&self) -> usize {
        self.allocs.values().map(Vec::len).sum()
    }
}

/// Assembles a [`Snapshot`] by hand, for fixtures and tests.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    index: u64,
    nodes: Vec<Arc<Node>>,
    allocs: HashMap<NodeId, Vec<Allocation>>,
    seen: HashMap<AllocId, NodeId>,
}

impl SnapshotBuilder {
    pub fn index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }

    /// Add a node, replacing any earlier node with the same ID.
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.retain(|n| n.id != node.id);
        self.nodes.push(Arc::new(node));
        self
    }

    /// Add an allocation under its `node_id`, replacing any earlier
    /// allocation with the same ID.
    pub fn alloc(mut self, alloc: Allocation) -> Self {
        if let Some(prev_node) = self.seen.insert(alloc.id.clone(), alloc.node_id.clone()) {
            if let Some(list) = self.allocs.get_mut(&prev_node) {
                list.retain(|a| a.id != alloc.id);
            }
        }
        self.allocs
            .entry(alloc.node_id.clone())
            .or_default()
            .push(alloc);
        self
    }

    pub fn allocs(self, allocs: impl IntoIterator<Item = Allocation>) -> Self {
        allocs.into_iter().fold(self, SnapshotBuilder::alloc)
    }

    pub fn build(mut self) -> Snapshot {
        self.nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Snapshot {
            index: self.index,
            nodes: self.nodes,
            allocs: self.allocs,
        }
    }
}
