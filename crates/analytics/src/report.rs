use core_types::Measure;
use serde::{Deserialize, Serialize};

/// How well one weighted basket tracked the target over the aligned window.
///
/// This struct is the output of `DriftEngine::report` and is what the UI layer
/// shows next to the drift chart. Every figure that can be undefined (too few
/// samples, zero variance) is a `Measure` rather than a silent zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingReport {
    // I. Relationship
    /// Correlation of target and composite returns.
    pub correlation: Measure,

    // II. Volatility (annualized, returns)
    pub target_volatility: Measure,
    pub composite_volatility: Measure,
    /// `composite_volatility - target_volatility`
    pub volatility_spread: Measure,

    // III. Tracking error
    /// Annualized standard deviation of `composite - target` returns.
    pub tracking_error: Measure,
    /// The same deviation scaled to the length of the sample instead of a year.
    pub period_tracking_error: Measure,

    // IV. Drift (in the engine's drift basis)
    pub final_drift: Measure,
    pub cumulative_drift: Measure,
    pub cumulative_squared_drift: Measure,
    pub max_abs_drift: Measure,

    /// Number of return pairs the statistics were computed on.
    pub observations: usize,
}
