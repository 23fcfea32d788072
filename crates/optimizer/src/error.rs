use analytics::AnalyticsError;
use core_types::{CoreError, WeightVector};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    #[error("Invalid optimizer constraints: {0}")]
    InvalidConstraints(String),

    #[error("Invalid optimizer input: {0}")]
    InvalidInput(String),

    #[error("Could not build the tracking problem: {0}")]
    Analytics(#[from] AnalyticsError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Linear solve failed: {0}")]
    LinearAlgebra(String),

    /// The solver ran out of iterations, or the objective stopped being finite.
    /// `best` is the last feasible iterate, offered for diagnosis only.
    #[error(
        "Optimizer diverged after {iterations} iterations (constraint violation {violation:.3e}): {reason}"
    )]
    Diverged {
        best: WeightVector,
        violation: f64,
        iterations: usize,
        reason: String,
    },
}
