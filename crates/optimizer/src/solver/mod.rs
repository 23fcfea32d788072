//! The three solve paths. Each takes a `TrackingProblem` and a `FeasibleSet`
//! and returns raw weights in proxy order; `WeightOptimizer` picks the path
//! and turns the outcome into an `OptimizationResult`.

pub(crate) mod active_set;
pub(crate) mod closed_form;
pub(crate) mod projected_gradient;

use crate::result::SolveStatus;
use nalgebra::DVector;

#[derive(Debug)]
pub(crate) struct Solution {
    pub w: DVector<f64>,
    pub iterations: usize,
    pub status: SolveStatus,
}

#[derive(Debug)]
pub(crate) enum SolverFailure {
    Diverged {
        w: DVector<f64>,
        iterations: usize,
        reason: String,
    },
    LinearAlgebra(String),
}

/// Max-abs norm that is zero for an empty vector.
pub(crate) fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0, |m, x| m.max(x.abs()))
}
