//! berth.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resources::{Dimension, PackingMode, Resources};

/// Errors raised while loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BerthConfig {
    pub rank: RankConfig,
}

/// Tuning knobs for one ranking pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    pub mode: PackingMode,
    /// Score subtracted per allocation of the same job already on a node.
    pub anti_affinity_penalty: f64,
    /// Number of ranked candidates the selector looks at (0 = all).
    pub limit: usize,
    /// Capacity the bin-pack filter keeps free on top of the request.
    pub min_free: Resources,
    pub fit_weights: FitWeights,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            mode: PackingMode::BinPack,
            anti_affinity_penalty: 10.0,
            limit: 2,
            min_free: Resources::ZERO,
            fit_weights: FitWeights::default(),
        }
    }
}

/// Relative weight of each dimension in the bin-pack fit distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitWeights {
    pub cpu: f64,
    pub memory_mb: f64,
    pub disk_mb: f64,
    pub iops: f64,
}

impl Default for FitWeights {
    fn default() -> Self {
        Self {
            cpu: 0.6,
            memory_mb: 0.4,
            disk_mb: 0.0,
            iops: 0.0,
        }
    }
}

impl FitWeights {
    pub fn get(&self, dim: Dimension) -> f64 {
        match dim {
            Dimension::Cpu => self.cpu,
            Dimension::MemoryMb => self.memory_mb,
            Dimension::DiskMb => self.disk_mb,
            Dimension::Iops => self.iops,
        }
    }

    pub fn total(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.get(*d)).sum()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for dim in Dimension::ALL {
            let w = self.get(dim);
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "fit weight for {dim} must be a non-negative number, got {w}"
                )));
            }
        }
        if self.total() <= 0.0 {
            return Err(ConfigError::Invalid(
                "fit weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl RankConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.anti_affinity_penalty.is_finite() || self.anti_affinity_penalty < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "anti_affinity_penalty must be >= 0, got {}",
                self.anti_affinity_penalty
            )));
        }
        self.fit_weights.validate()
    }
}

impl BerthConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate a config document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: BerthConfig = toml::from_str(content)?;
        config.rank.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
