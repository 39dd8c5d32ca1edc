//! berth-rank: the placement-ranking core of the Berth scheduler.
//!
//! Given the candidate nodes for a placement and the resources it asks for,
//! a chain of pull-based stages yields the nodes that can host it, each
//! annotated with a desirability score. Stages read durable state through a
//! point-in-time [`StateView`] and the speculative [`Plan`] of the running
//! evaluation, both bundled in an [`EvalContext`].
//!
//! # Components
//!
//! - **`context`**: per-evaluation state view, plan, and scratch metrics
//! - **`feasible`**: raw node sources
//! - **`rank`**: ranked node stages (adapter, bin-pack, job anti-affinity)
//! - **`fit`**: resource fit checks and the fit score
//! - **`select`**: consumers that pick from a ranked stream
//! - **`stack`**: the standard chain, assembled from a [`RankConfig`]
//!
//! # Pipeline
//!
//! ```text
//! StaticIterator ─► FeasibleRankIterator ─► BinPackIterator ─► JobAntiAffinityIterator
//!   (raw nodes)        (score = 0)            (filter + fit)       (same-job penalty)
//!                                                                        │
//!                                   MaxScoreIterator ◄─ LimitIterator ◄──┘
//! ```
//!
//! [`RankConfig`]: berth_core::RankConfig

pub mod context;
pub mod error;
pub mod feasible;
pub mod fit;
pub mod rank;
pub mod select;
pub mod stack;

pub use context::{AllocMetric, EvalContext, Plan, StateView};
pub use error::{RankError, RankResult};
pub use feasible::{FeasibleIterator, StaticIterator};
pub use fit::{Fit, MAX_FIT_SCORE, allocs_fit, score_fit};
pub use rank::{
    BinPackIterator, FeasibleRankIterator, JobAntiAffinityIterator, RankIterator, RankedNode,
    StaticRankIterator, collect_ranked,
};
pub use select::{LimitIterator, MaxScoreIterator};
pub use stack::{PlacementRequest, RankStack};
