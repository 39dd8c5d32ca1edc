//! Ranked node stages.
//!
//! Every stage implements [`RankIterator`] and owns its upstream stage, so a
//! pipeline is built by nesting constructors. Pulling from the outermost
//! stage pulls through the whole chain; a stage may pull its upstream any
//! number of times to skip nodes it filters out.

use std::sync::Arc;

use berth_core::{FitWeights, PackingMode, Resources};
use berth_state::{Allocation, JobId, Node};
use tracing::debug;

use crate::context::EvalContext;
use crate::error::RankResult;
use crate::feasible::FeasibleIterator;
use crate::fit::{Fit, allocs_fit, score_fit};

const BINPACK_STAGE: &str = "binpack";
const ANTI_AFFINITY_STAGE: &str = "job-anti-affinity";

/// A node plus the score accumulated by the stages it has passed through.
#[derive(Debug, Clone)]
pub struct RankedNode {
    pub node: Arc<Node>,
    pub score: f64,
    /// Contribution of each scoring stage, in the order they ran.
    pub scores: Vec<(&'static str, f64)>,
    proposed: Option<Vec<Allocation>>,
}

impl RankedNode {
    pub fn new(node: Arc<Node>) -> Self {
        Self {
            node,
            score: 0.0,
            scores: Vec::new(),
            proposed: None,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node.id
    }

    /// Add a stage's contribution to the running score.
    pub fn add_score(&mut self, stage: &'static str, delta: f64) {
        self.score += delta;
        self.scores.push((stage, delta));
    }

    /// Allocations that would occupy this node under the context's plan.
    /// Computed once per node and shared by later stages.
    pub fn proposed_allocs(&mut self, ctx: &EvalContext) -> RankResult<&[Allocation]> {
        if self.proposed.is_none() {
            self.proposed = Some(ctx.proposed_allocs(&self.node.id)?);
        }
        Ok(self.proposed.as_deref().unwrap_or_default())
    }
}

/// Pull-based stream of ranked nodes.
pub trait RankIterator {
    /// Next ranked node, `Ok(None)` once exhausted, or an error that aborts
    /// the evaluation.
    fn next(&mut self) -> RankResult<Option<RankedNode>>;

    /// Rewind the stage and everything upstream of it.
    fn reset(&mut self);
}

impl<T: RankIterator + ?Sized> RankIterator for Box<T> {
    fn next(&mut self) -> RankResult<Option<RankedNode>> {
        (**self).next()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Drain a stage into a vector.
pub fn collect_ranked<I: RankIterator + ?Sized>(iter: &mut I) -> RankResult<Vec<RankedNode>> {
    let mut out = Vec::new();
    while let Some(option) = iter.next()? {
        out.push(option);
    }
    Ok(out)
}

// ── Sources ───────────────────────────────────────────────────────

/// Replays a fixed list of ranked nodes in order.
///
/// Each pull yields a copy, so downstream scoring never alters the list and
/// a reset replays the original scores. Cached proposed allocations are
/// dropped from the copy; the plan may have changed since they were computed.
#[derive(Debug, Clone, Default)]
pub struct StaticRankIterator {
    nodes: Vec<RankedNode>,
    offset: usize,
}

impl StaticRankIterator {
    pub fn new(nodes: Vec<RankedNode>) -> Self {
        Self { nodes, offset: 0 }
    }
}

impl RankIterator for StaticRankIterator {
    fn next(&mut self) -> RankResult<Option<RankedNode>> {
        let Some(option) = self.nodes.get(self.offset) else {
            return Ok(None);
        };
        self.offset += 1;
        let mut option = option.clone();
        option.proposed = None;
        Ok(Some(option))
    }

    fn reset(&mut self) {
        self.offset = 0;
    }
}

// ── Adapter ───────────────────────────────────────────────────────

/// Lifts feasible nodes into the ranking domain with a score of zero.
pub struct FeasibleRankIterator<'a, S> {
    ctx: &'a EvalContext,
    source: S,
}

impl<'a, S: FeasibleIterator> FeasibleRankIterator<'a, S> {
    pub fn new(ctx: &'a EvalContext, source: S) -> Self {
        Self { ctx, source }
    }
}

impl<S: FeasibleIterator> RankIterator for FeasibleRankIterator<'_, S> {
    fn next(&mut self) -> RankResult<Option<RankedNode>> {
        let Some(node) = self.source.next() else {
            return Ok(None);
        };
        self.ctx.record_evaluated();
        Ok(Some(RankedNode::new(node)))
    }

    fn reset(&mut self) {
        self.source.reset();
    }
}

// ── Bin packing ───────────────────────────────────────────────────

/// Drops nodes that cannot fit the requested resources and scores the rest
/// by how tightly the placement would pack them.
pub struct BinPackIterator<'a, S> {
    ctx: &'a EvalContext,
    source: S,
    resources: Resources,
    mode: PackingMode,
    min_free: Resources,
    weights: FitWeights,
}

impl<'a, S: RankIterator> BinPackIterator<'a, S> {
    pub fn new(
        ctx: &'a EvalContext,
        source: S,
        resources: Resources,
        mode: PackingMode,
        min_free: Resources,
    ) -> Self {
        Self {
            ctx,
            source,
            resources,
            mode,
            min_free,
            weights: FitWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: FitWeights) -> Self {
        self.weights = weights;
        self
    }
}

impl<S: RankIterator> RankIterator for BinPackIterator<'_, S> {
    fn next(&mut self) -> RankResult<Option<RankedNode>> {
        loop {
            let Some(mut option) = self.source.next()? else {
                return Ok(None);
            };

            let node = Arc::clone(&option.node);
            let proposed = option.proposed_allocs(self.ctx)?;
            let used = match allocs_fit(&node, proposed, &self.resources, &self.min_free) {
                Fit::Fits { used } => used,
                Fit::Exhausted(dim) => {
                    debug!(node = %node.id, %dim, "node exhausted");
                    self.ctx.record_exhausted(dim);
                    continue;
                }
            };

            let score = score_fit(&node, &used, &self.weights, self.mode);
            debug!(node = %node.id, mode = %self.mode, score, "bin-pack scored node");
            option.add_score(BINPACK_STAGE, score);
            self.ctx.record_score(&node.id, BINPACK_STAGE, score);
            return Ok(Some(option));
        }
    }

    fn reset(&mut self) {
        self.source.reset();
    }
}

// ── Job anti-affinity ─────────────────────────────────────────────

/// Penalizes nodes already running allocations of the same job, spreading a
/// job across nodes. Never drops a node.
pub struct JobAntiAffinityIterator<'a, S> {
    ctx: &'a EvalContext,
    source: S,
    penalty: f64,
    job_id: JobId,
}

impl<'a, S: RankIterator> JobAntiAffinityIterator<'a, S> {
    pub fn new(ctx: &'a EvalContext, source: S, penalty: f64, job_id: impl Into<JobId>) -> Self {
        Self {
            ctx,
            source,
            penalty,
            job_id: job_id.into(),
        }
    }
}

impl<S: RankIterator> RankIterator for JobAntiAffinityIterator<'_, S> {
    fn next(&mut self) -> RankResult<Option<RankedNode>> {
        let Some(mut option) = self.source.next()? else {
            return Ok(None);
        };

        let collisions = option
            .proposed_allocs(self.ctx)?
            .iter()
            .filter(|a| a.job_id == self.job_id)
            .count();

        if collisions > 0 {
            let score = -self.penalty * collisions as f64;
            debug!(
                node = %option.node_id(),
                job = %self.job_id,
                collisions,
                score,
                "job anti-affinity penalty"
            );
            option.add_score(ANTI_AFFINITY_STAGE, score);
            self.ctx
                .record_score(&option.node.id, ANTI_AFFINITY_STAGE, score);
        }
        Ok(Some(option))
    }

    fn reset(&mut self) {
        self.source.reset();
    }
}
