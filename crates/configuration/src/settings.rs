use crate::optimizer_config::OptimizerConfig;
use core_types::{AlignmentPolicy, ReturnKind, SeriesBasis};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub alignment: AlignmentConfig,
    pub engine: EngineConfig,
    pub optimizer: OptimizerConfig,
    pub data_source: DataSourceConfig,
    pub logging: LoggingConfig,
}

/// Contains parameters for merging price histories onto one index.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    pub policy: AlignmentPolicy,
    /// The longest run of consecutive forward-filled rows tolerated per symbol.
    /// One more than this fails alignment for that symbol.
    pub max_fill_run: usize,
}

/// Contains parameters for the correlation and drift engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Series the correlation matrix is computed on.
    pub correlation_basis: SeriesBasis,
    /// Series composites and drift are computed on.
    pub drift_basis: SeriesBasis,
    pub return_kind: ReturnKind,
    /// Rebase each proxy to the target's first price before weighting.
    pub level_matching: bool,
    /// Sampling frequency used to annualize volatility and tracking error.
    pub periods_per_year: f64,
}

/// Routing table for the data source facade.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    /// The provider used for any symbol without an override.
    pub default_provider: String,
    /// Per-symbol provider overrides, e.g. `{ "BTC-USD" = "yahoo" }`.
    pub overrides: HashMap<String, String>,
    /// Serve synthetic data when the routed provider is unavailable.
    pub fallback_to_mock: bool,
}

/// Where the binary writes its rolling log file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            policy: AlignmentPolicy::Intersection,
            max_fill_run: 5,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            correlation_basis: SeriesBasis::Returns,
            drift_basis: SeriesBasis::Levels,
            return_kind: ReturnKind::Simple,
            level_matching: true,
            periods_per_year: 252.0,
        }
    }
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            default_provider: "mock".to_string(),
            overrides: HashMap::new(),
            fallback_to_mock: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_prefix: "parallax.log".to_string(),
        }
    }
}

impl Config {
    /// Checks cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.alignment.max_fill_run == 0 {
            return Err("alignment.max_fill_run must be at least 1".to_string());
        }
        if !(self.engine.periods_per_year > 0.0) {
            return Err("engine.periods_per_year must be positive".to_string());
        }
        if self.data_source.default_provider.trim().is_empty() {
            return Err("data_source.default_provider must not be empty".to_string());
        }
        self.optimizer.validate(None)
    }
}
