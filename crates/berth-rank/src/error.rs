//! Ranking error types.

use berth_core::ConfigError;
use berth_state::StateError;
use thiserror::Error;

/// Conditions that abort an evaluation.
///
/// Running out of feasible nodes is not an error: the pipeline just ends.
#[derive(Debug, Error)]
pub enum RankError {
    #[error("plan evicts allocation {alloc_id} which is not on node {node_id}")]
    UnknownEviction { node_id: String, alloc_id: String },

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

pub type RankResult<T> = Result<T, RankError>;
