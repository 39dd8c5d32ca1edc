//! Domain types for the Berth state store.

use std::collections::HashMap;

use berth_core::Resources;
use serde::{Deserialize, Serialize};

/// Unique identifier for a node in the cluster.
pub type NodeId = String;

/// Unique identifier for an allocation.
pub type AllocId = String;

/// Unique identifier for a job.
pub type JobId = String;

// ── Node ──────────────────────────────────────────────────────────

/// A machine that allocations can be placed on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub datacenter: String,
    /// Total capacity of the node.
    #[serde(default)]
    pub resources: Resources,
    /// Capacity withheld for the node's own overhead.
    #[serde(default)]
    pub reserved: Resources,
    /// Arbitrary attributes used by feasibility checks upstream of ranking.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

// ── Allocation ────────────────────────────────────────────────────

/// A unit of work bound to a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Allocation {
    pub id: AllocId,
    pub job_id: JobId,
    #[serde(default)]
    pub eval_id: String,
    pub node_id: NodeId,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub status: AllocStatus,
    /// Index of the write that first stored this allocation.
    #[serde(default)]
    pub create_index: u64,
    /// Index of the most recent write to this allocation.
    #[serde(default)]
    pub modify_index: u64,
}

impl Allocation {
    /// Build the composite key for the allocs table.
    pub fn table_key(&self) -> String {
        alloc_key(&self.node_id, &self.id)
    }

    /// Whether this allocation has stopped consuming node resources.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

pub(crate) fn alloc_key(node_id: &str, alloc_id: &str) -> String {
    format!("{node_id}:{alloc_id}")
}

/// Lifecycle status of an allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Failed,
    Lost,
}

impl AllocStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AllocStatus::Complete | AllocStatus::Failed | AllocStatus::Lost
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!AllocStatus::Pending.is_terminal());
        assert!(!AllocStatus::Running.is_terminal());
        assert!(AllocStatus::Complete.is_terminal());
        assert!(AllocStatus::Failed.is_terminal());
        assert!(AllocStatus::Lost.is_terminal());
    }

    #[test]
    fn alloc_key_is_node_scoped() {
        let alloc = Allocation {
            id: "a1".to_string(),
            job_id: "web".to_string(),
            node_id: "n1".to_string(),
            ..Default::default()
        };
        assert_eq!(alloc.table_key(), "n1:a1");
    }
}
