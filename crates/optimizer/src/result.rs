use crate::budget::StopReason;
use core_types::WeightVector;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum SolveStatus {
    Converged,
    /// Stopped by the caller's budget; the weights are feasible but not optimal.
    Partial(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveMethod {
    ClosedForm,
    ActiveSet,
    ProjectedGradient,
}

impl fmt::Display for SolveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolveMethod::ClosedForm => "closed form",
            SolveMethod::ActiveSet => "active set",
            SolveMethod::ProjectedGradient => "projected gradient",
        };
        write!(f, "{}", name)
    }
}

/// Two proxies whose columns move together closely enough that their split
/// of weight is poorly determined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollinearityWarning {
    pub first: String,
    pub second: String,
    pub correlation: f64,
}

impl fmt::Display for CollinearityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} and {} are nearly collinear (correlation {:.4}); their weights are not unique",
            self.first, self.second, self.correlation
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub weights: WeightVector,
    pub status: SolveStatus,
    pub method: SolveMethod,
    pub objective: String,
    pub objective_value: f64,
    /// Zero for closed-form solves.
    pub iterations: usize,
    pub constraint_violation: f64,
    pub warnings: Vec<CollinearityWarning>,
}

impl OptimizationResult {
    pub fn is_converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}
