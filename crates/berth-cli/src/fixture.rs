//! Cluster fixture files.
//!
//! A fixture describes one evaluation in TOML:
//!
//! ```toml
//! [request]
//! job_id = "web"
//! resources = { cpu = 1024, memory_mb = 1024 }
//!
//! [[nodes]]
//! id = "node-a"
//! resources = { cpu = 2048, memory_mb = 2048 }
//! reserved = { cpu = 1024, memory_mb = 1024 }
//!
//! [[allocations]]
//! id = "alloc-1"
//! job_id = "batch"
//! node_id = "node-a"
//! status = "running"
//! resources = { cpu = 512, memory_mb = 512 }
//!
//! [plan]
//! eval_id = "eval-1"
//!
//! [[plan.allocations]]
//! id = "planned-1"
//! job_id = "web"
//! node_id = "node-a"
//!
//! [[plan.evictions]]
//! node_id = "node-a"
//! alloc_id = "alloc-1"
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use berth_rank::{EvalContext, Plan, PlacementRequest};
use berth_state::{AllocId, Allocation, Node, NodeId, StateStore};
use serde::Deserialize;

/// Modify index of the first fixture write. Each node gets its own write,
/// then all allocations share one.
const FIRST_INDEX: u64 = 1;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterFixture {
    pub request: PlacementRequest,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    #[serde(default)]
    pub plan: PlanFixture,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanFixture {
    pub eval_id: String,
    pub allocations: Vec<Allocation>,
    pub evictions: Vec<Eviction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Eviction {
    pub node_id: NodeId,
    pub alloc_id: AllocId,
}

impl ClusterFixture {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing fixture {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load nodes and allocations into a fresh in-memory store.
    pub fn load_store(&self) -> anyhow::Result<StateStore> {
        if self.nodes.iter().any(|n| n.id.is_empty()) {
            anyhow::bail!("fixture node without an id");
        }
        let store = StateStore::open_in_memory()?;
        for (offset, node) in self.nodes.iter().enumerate() {
            store.upsert_node(FIRST_INDEX + offset as u64, node)?;
        }
        if !self.allocations.is_empty() {
            store.upsert_allocs(FIRST_INDEX + self.nodes.len() as u64, &self.allocations)?;
        }
        Ok(store)
    }

    pub fn plan(&self) -> Plan {
        let mut plan = Plan::new(self.plan.eval_id.clone());
        for alloc in &self.plan.allocations {
            plan.append_alloc(alloc.clone());
        }
        for eviction in &self.plan.evictions {
            plan.append_evict(eviction.node_id.clone(), eviction.alloc_id.clone());
        }
        plan
    }

    /// Candidate nodes, in fixture order.
    pub fn candidates(&self) -> Vec<Arc<Node>> {
        self.nodes.iter().cloned().map(Arc::new).collect()
    }

    /// Build the store, snapshot it, and open an evaluation context.
    pub fn context(&self) -> anyhow::Result<EvalContext> {
        let store = self.load_store()?;
        Ok(EvalContext::from_store(&store, self.plan())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::Resources;
    use berth_state::AllocStatus;

    const FIXTURE: &str = r#"
[request]
job_id = "web"
resources = { cpu = 1024, memory_mb = 1024 }

[[nodes]]
id = "b"
resources = { cpu = 2048, memory_mb = 2048 }

[[nodes]]
id = "a"
resources = { cpu = 2048, memory_mb = 2048 }
reserved = { cpu = 1024, memory_mb = 1024 }

[[allocations]]
id = "alloc-1"
job_id = "batch"
node_id = "b"
status = "running"
resources = { cpu = 512, memory_mb = 512 }

[plan]
eval_id = "eval-1"

[[plan.allocations]]
id = "planned-1"
job_id = "web"
node_id = "a"

[[plan.evictions]]
node_id = "b"
alloc_id = "alloc-1"
"#;

    #[test]
    fn parses_full_fixture() {
        let fixture = ClusterFixture::parse(FIXTURE).unwrap();
        assert_eq!(fixture.request.job_id, "web");
        assert_eq!(fixture.request.resources, Resources::new(1024, 1024));
        assert_eq!(fixture.nodes.len(), 2);
        assert_eq!(fixture.nodes[1].reserved, Resources::new(1024, 1024));
        assert_eq!(fixture.allocations[0].status, AllocStatus::Running);
    }

    #[test]
    fn candidates_keep_fixture_order() {
        let fixture = ClusterFixture::parse(FIXTURE).unwrap();
        let ids: Vec<String> = fixture.candidates().iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn plan_and_store_are_populated() {
        let fixture = ClusterFixture::parse(FIXTURE).unwrap();

        let plan = fixture.plan();
        assert_eq!(plan.eval_id, "eval-1");
        assert_eq!(plan.node_allocation["a"].len(), 1);
        assert_eq!(plan.node_evict["b"], vec!["alloc-1".to_string()]);

        let store = fixture.load_store().unwrap();
        assert_eq!(store.list_nodes().unwrap().len(), 2);
        assert_eq!(store.allocs_by_node("b").unwrap().len(), 1);

        let ctx = fixture.context().unwrap();
        assert!(ctx.proposed_allocs("b").unwrap().is_empty());
        assert_eq!(ctx.proposed_allocs("a").unwrap().len(), 1);
    }

    #[test]
    fn rejects_unknown_sections() {
        let err = ClusterFixture::parse("[request]\njob_id = \"x\"\nresources = {}\n[bogus]\n");
        assert!(err.is_err());
    }

    #[test]
    fn rejects_nodes_without_id() {
        let fixture = ClusterFixture::parse(
            "[request]\njob_id = \"x\"\nresources = {}\n[[nodes]]\nid = \"\"\n",
        )
        .unwrap();
        assert!(fixture.load_store().is_err());
    }
}
