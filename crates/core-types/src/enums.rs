use serde::{Deserialize, Serialize};

/// Whether a statistic is computed on raw price levels or on period returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum SeriesBasis {
    #[default]
    Levels,
    Returns,
}

/// How consecutive prices are turned into a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    /// `p1 / p0 - 1`
    #[default]
    Simple,
    /// `ln(p1 / p0)`
    Log,
}

impl ReturnKind {
    /// Returns the change between two consecutive prices. May be non-finite
    /// when `previous` is zero; callers turn that into an undefined value.
    pub fn between(&self, previous: f64, current: f64) -> f64 {
        match self {
            ReturnKind::Simple => current / previous - 1.0,
            ReturnKind::Log => (current / previous).ln(),
        }
    }
}

/// Selects which timestamps make up the shared index of an aligned frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum AlignmentPolicy {
    /// Only the window every symbol has data for.
    #[default]
    Intersection,
    /// Every timestamp seen in any series; rows before a symbol starts are missing.
    Union,
}

/// The family of linear constraints placed on proxy weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// No bounds and no budget constraint (pure OLS).
    Unconstrained,
    /// Weights sum to one, any sign allowed.
    SumToOne,
    /// Each weight within `[lower, upper]`, optionally fully invested.
    #[default]
    Bounded,
}

/// The scalar the optimizer minimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    /// Sum of squared pointwise drift (least squares).
    #[default]
    SumSquaredDrift,
    /// One minus the correlation between composite and target.
    MaxCorrelation,
}

/// Lets a caller force the generic iterative path even for quadratic objectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    #[default]
    Auto,
    Iterative,
}
