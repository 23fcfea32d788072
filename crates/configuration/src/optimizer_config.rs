use core_types::{ConstraintKind, ObjectiveKind, SolverKind};
use serde::Deserialize;

/// Settings for the weight optimizer. Deserialized from the `[optimizer]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub constraint: ConstraintKind,
    /// Per-weight bounds, only used by the `bounded` constraint.
    pub bounds: WeightBounds,
    /// Whether `bounded` weights must also sum to one.
    pub fully_invested: bool,
    pub objective: ObjectiveKind,
    pub solver: SolverKind,
    /// Hard cap on solver iterations before the solve counts as diverged.
    pub max_iterations: usize,
    /// Step tolerance in weight space used as the convergence test.
    pub tolerance: f64,
    /// Stationarity tolerance for the iterative solver, measured on the
    /// objective scaled by its value at the starting point.
    pub gradient_tolerance: f64,
    /// Largest constraint violation a returned vector may carry.
    pub feasibility_tolerance: f64,
    /// Absolute proxy-to-proxy correlation at which a collinearity warning is raised.
    pub collinearity_threshold: f64,
}

/// Inclusive lower and upper bounds applied to every weight.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WeightBounds {
    pub lower: f64,
    pub upper: f64,
}

// --- Default Implementations ---
// Long-only, fully invested least squares, which is what a user building a
// proxy basket nearly always wants.

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            constraint: ConstraintKind::Bounded,
            bounds: WeightBounds::default(),
            fully_invested: true,
            objective: ObjectiveKind::SumSquaredDrift,
            solver: SolverKind::Auto,
            max_iterations: 5_000,
            tolerance: 1e-10,
            gradient_tolerance: 1e-8,
            feasibility_tolerance: 1e-9,
            collinearity_threshold: 0.999,
        }
    }
}

impl Default for WeightBounds {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 1.0,
        }
    }
}

impl OptimizerConfig {
    /// An unconstrained least-squares configuration.
    pub fn unconstrained() -> Self {
        Self {
            constraint: ConstraintKind::Unconstrained,
            ..Self::default()
        }
    }

    /// Weights of any sign that sum to one.
    pub fn sum_to_one() -> Self {
        Self {
            constraint: ConstraintKind::SumToOne,
            ..Self::default()
        }
    }

    /// Box-constrained weights, optionally fully invested.
    pub fn bounded(lower: f64, upper: f64, fully_invested: bool) -> Self {
        Self {
            constraint: ConstraintKind::Bounded,
            bounds: WeightBounds { lower, upper },
            fully_invested,
            ..Self::default()
        }
    }

    /// True when the configuration pins the weights to sum to one.
    pub fn requires_full_investment(&self) -> bool {
        match self.constraint {
            ConstraintKind::Unconstrained => false,
            ConstraintKind::SumToOne => true,
            ConstraintKind::Bounded => self.fully_invested,
        }
    }

    /// Checks that the settings describe a solvable problem for `n_proxies` weights.
    /// Pass `None` to validate everything that does not depend on the universe size.
    pub fn validate(&self, n_proxies: Option<usize>) -> Result<(), String> {
        if self.max_iterations == 0 {
            return Err("optimizer.max_iterations must be greater than 0".to_string());
        }
        if !(self.tolerance > 0.0)
            || !(self.gradient_tolerance > 0.0)
            || !(self.feasibility_tolerance > 0.0)
        {
            return Err("optimizer tolerances must be positive".to_string());
        }
        if !(self.collinearity_threshold > 0.0 && self.collinearity_threshold <= 1.0) {
            return Err(format!(
                "optimizer.collinearity_threshold must be in (0, 1], got {}",
                self.collinearity_threshold
            ));
        }
        if self.constraint != ConstraintKind::Bounded {
            return Ok(());
        }

        let WeightBounds { lower, upper } = self.bounds;
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            return Err(format!(
                "optimizer.bounds must satisfy lower <= upper, got [{}, {}]",
                lower, upper
            ));
        }
        if let (true, Some(n)) = (self.fully_invested, n_proxies) {
            let n = n as f64;
            if lower * n > 1.0 || upper * n < 1.0 {
                return Err(format!(
                    "bounds [{}, {}] cannot sum to one across {} proxies",
                    lower, upper, n
                ));
            }
        }
        Ok(())
    }
}
