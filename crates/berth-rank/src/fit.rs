//! Resource fit checks and the bin-packing fit score.
//!
//! Utilization is measured against a node's total capacity, with its
//! reservation counted as occupied. For each dimension the slack left after
//! a placement, `s = 1 − utilization`, is mapped through `10^s − 1`, which is
//! 0 for a perfectly packed dimension and 9 for an empty one, so a little
//! slack costs little and a mostly empty dimension costs a lot. The weighted
//! average of these terms, scaled to [`MAX_FIT_SCORE`], is the node's
//! distance from perfectly packed.

use berth_core::{Dimension, FitWeights, PackingMode, Resources};
use berth_state::{Allocation, Node};
use tracing::trace;

/// Score of a perfectly packed node under [`PackingMode::BinPack`].
pub const MAX_FIT_SCORE: f64 = 18.0;

/// Outcome of checking a request against a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    /// The first dimension that would overflow.
    Exhausted(Dimension),
    /// The request fits; `used` is reserved + proposed + requested.
    Fits { used: Resources },
}

/// Check whether `request` fits on `node` next to `proposed`, keeping
/// `min_free` unallocated in every dimension.
pub fn allocs_fit(
    node: &Node,
    proposed: &[Allocation],
    request: &Resources,
    min_free: &Resources,
) -> Fit {
    let occupied = node.reserved + proposed.iter().map(|a| &a.resources).sum::<Resources>();
    let used = occupied + *request;

    match node.resources.superset(&(used + *min_free)) {
        (false, Some(dim)) => Fit::Exhausted(dim),
        _ => Fit::Fits { used },
    }
}

/// Score how well `used` packs `node`.
///
/// Under [`PackingMode::BinPack`] a node left with no slack scores
/// [`MAX_FIT_SCORE`] and an empty node scores 0. [`PackingMode::Spread`]
/// inverts this. Dimensions with zero capacity count as fully packed.
pub fn score_fit(node: &Node, used: &Resources, weights: &FitWeights, mode: PackingMode) -> f64 {
    let total_weight = weights.total();
    if total_weight <= 0.0 {
        return 0.0;
    }

    let mut distance = 0.0;
    for dim in Dimension::ALL {
        let weight = weights.get(dim);
        if weight == 0.0 {
            continue;
        }
        let capacity = node.resources.get(dim);
        let utilization = if capacity == 0 {
            1.0
        } else {
            (used.get(dim) as f64 / capacity as f64).clamp(0.0, 1.0)
        };
        let slack = 1.0 - utilization;
        let term = (10f64.powf(slack) - 1.0) / 9.0;
        trace!(node = %node.id, %dim, utilization, slack, term, "fit dimension");
        distance += (weight / total_weight) * term;
    }
    distance *= MAX_FIT_SCORE;

    let score = match mode {
        PackingMode::BinPack => MAX_FIT_SCORE - distance,
        PackingMode::Spread => distance,
    };
    score.clamp(0.0, MAX_FIT_SCORE)
}
