//! berth-core: shared types for the Berth placement ranker.
//!
//! - **`resources`**: fixed-shape resource vectors and their arithmetic
//! - **`config`**: `berth.toml` parsing and validation

pub mod config;
pub mod resources;

pub use config::{BerthConfig, ConfigError, FitWeights, RankConfig};
pub use resources::{Dimension, PackingMode, Resources};
