//! The standard ranking chain.
//!
//! ```text
//! StaticIterator → FeasibleRankIterator → BinPackIterator
//!     → JobAntiAffinityIterator → LimitIterator → MaxScoreIterator
//! ```

use std::sync::Arc;

use berth_core::{RankConfig, Resources};
use berth_state::{JobId, Node};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::EvalContext;
use crate::error::RankResult;
use crate::feasible::StaticIterator;
use crate::rank::{
    BinPackIterator, FeasibleRankIterator, JobAntiAffinityIterator, RankIterator, RankedNode,
    collect_ranked,
};
use crate::select::{LimitIterator, MaxScoreIterator};

/// What is being placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub job_id: JobId,
    pub resources: Resources,
}

type ScoredChain<'a> =
    JobAntiAffinityIterator<'a, BinPackIterator<'a, FeasibleRankIterator<'a, StaticIterator>>>;

/// Builds ranking chains for one evaluation from a [`RankConfig`].
pub struct RankStack<'a> {
    ctx: &'a EvalContext,
    config: RankConfig,
    nodes: Vec<Arc<Node>>,
}

impl<'a> RankStack<'a> {
    pub fn new(ctx: &'a EvalContext, config: &RankConfig) -> RankResult<Self> {
        config.validate()?;
        Ok(Self {
            ctx,
            config: config.clone(),
            nodes: Vec::new(),
        })
    }

    /// Set the feasible candidate nodes, in the order they should be tried.
    pub fn set_nodes(&mut self, nodes: Vec<Arc<Node>>) {
        self.nodes = nodes;
    }

    fn chain(&self, request: &PlacementRequest) -> ScoredChain<'a> {
        let source = StaticIterator::new(self.nodes.clone());
        let feasible = FeasibleRankIterator::new(self.ctx, source);
        let binpack = BinPackIterator::new(
            self.ctx,
            feasible,
            request.resources,
            self.config.mode,
            self.config.min_free,
        )
        .with_weights(self.config.fit_weights);
        JobAntiAffinityIterator::new(
            self.ctx,
            binpack,
            self.config.anti_affinity_penalty,
            request.job_id.clone(),
        )
    }

    /// Every node that fits the request, in candidate order, with scores.
    pub fn rank(&self, request: &PlacementRequest) -> RankResult<Vec<RankedNode>> {
        let out = collect_ranked(&mut self.chain(request))?;
        debug!(
            job = %request.job_id,
            candidates = self.nodes.len(),
            ranked = out.len(),
            "ranked candidate nodes"
        );
        Ok(out)
    }

    /// Pick the best node for the request among the first `limit` that fit.
    ///
    /// `Ok(None)` means no node can host the request.
    pub fn select(&self, request: &PlacementRequest) -> RankResult<Option<RankedNode>> {
        let limit = match self.config.limit {
            0 => usize::MAX,
            n => n,
        };
        let mut select = MaxScoreIterator::new(LimitIterator::new(self.chain(request), limit));
        let chosen = select.next()?;

        match &chosen {
            Some(option) => info!(
                job = %request.job_id,
                node = %option.node_id(),
                score = option.score,
                "selected node"
            ),
            None => info!(
                job = %request.job_id,
                cpu = request.resources.cpu(),
                memory_mb = request.resources.memory_mb(),
                candidates = self.nodes.len(),
                "no node fits the request"
            ),
        }
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Plan;
    use berth_core::PackingMode;
    use berth_state::{Allocation, Snapshot};

    fn node(id: &str, total: Resources, reserved: Resources) -> Arc<Node> {
        Arc::new(Node {
            id: id.to_string(),
            resources: total,
            reserved,
            ..Default::default()
        })
    }

    fn request(job: &str) -> PlacementRequest {
        PlacementRequest {
            job_id: job.to_string(),
            resources: Resources::new(1024, 1024),
        }
    }

    fn nodes() -> Vec<Arc<Node>> {
        vec![
            node("a", Resources::new(2048, 2048), Resources::new(1024, 1024)),
            node("b", Resources::new(1024, 1024), Resources::new(512, 512)),
            node("c", Resources::new(4096, 4096), Resources::new(1024, 1024)),
        ]
    }

    fn ctx() -> EvalContext {
        EvalContext::new(Arc::new(Snapshot::default()), Plan::new("eval-1"))
    }

    #[test]
    fn select_prefers_tightest_fit() {
        let ctx = ctx();
        let mut stack = RankStack::new(&ctx, &RankConfig::default()).unwrap();
        stack.set_nodes(nodes());

        let chosen = stack.select(&request("web")).unwrap().unwrap();
        assert_eq!(chosen.node_id(), "a");
    }

    #[test]
    fn select_with_spread_prefers_emptiest() {
        let ctx = ctx();
        let config = RankConfig {
            mode: PackingMode::Spread,
            ..RankConfig::default()
        };
        let mut stack = RankStack::new(&ctx, &config).unwrap();
        stack.set_nodes(nodes());

        let chosen = stack.select(&request("web")).unwrap().unwrap();
        assert_eq!(chosen.node_id(), "c");
    }

    #[test]
    fn limit_bounds_candidates() {
        let ctx = ctx();
        let config = RankConfig {
            mode: PackingMode::Spread,
            limit: 1,
            ..RankConfig::default()
        };
        let mut stack = RankStack::new(&ctx, &config).unwrap();
        stack.set_nodes(nodes());

        // Only "a" is considered, even though "c" would score higher.
        let chosen = stack.select(&request("web")).unwrap().unwrap();
        assert_eq!(chosen.node_id(), "a");
    }

    #[test]
    fn anti_affinity_can_outweigh_packing() {
        let mut ctx = ctx();
        ctx.plan_mut().append_alloc(Allocation {
            id: "p1".to_string(),
            job_id: "web".to_string(),
            node_id: "a".to_string(),
            ..Default::default()
        });
        let mut stack = RankStack::new(&ctx, &RankConfig::default()).unwrap();
        stack.set_nodes(nodes());

        assert_eq!(stack.select(&request("web")).unwrap().unwrap().node_id(), "c");
        // Other jobs are not penalized.
        assert_eq!(stack.select(&request("api")).unwrap().unwrap().node_id(), "a");
    }

    #[test]
    fn nothing_fits_is_not_an_error() {
        let ctx = ctx();
        let mut stack = RankStack::new(&ctx, &RankConfig::default()).unwrap();
        stack.set_nodes(vec![node("b", Resources::new(1024, 1024), Resources::new(512, 512))]);

        assert!(stack.select(&request("web")).unwrap().is_none());
        assert!(stack.rank(&request("web")).unwrap().is_empty());

        stack.set_nodes(Vec::new());
        assert!(stack.select(&request("web")).unwrap().is_none());
    }

    #[test]
    fn rank_is_repeatable() {
        let ctx = ctx();
        let mut stack = RankStack::new(&ctx, &RankConfig::default()).unwrap();
        stack.set_nodes(nodes());

        let first = stack.rank(&request("web")).unwrap();
        let second = stack.rank(&request("web")).unwrap();
        let summary = |out: &[RankedNode]| -> Vec<(String, f64)> {
            out.iter().map(|r| (r.node_id().to_string(), r.score)).collect()
        };
        assert_eq!(summary(&first), summary(&second));
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let ctx = ctx();
        let config = RankConfig {
            anti_affinity_penalty: -1.0,
            ..RankConfig::default()
        };
        assert!(RankStack::new(&ctx, &config).is_err());
    }
}
