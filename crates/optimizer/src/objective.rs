//! Objectives the optimizer can minimize.
//!
//! An objective maps a weight vector to a scalar over a `TrackingProblem`.
//! Quadratic objectives are solved exactly; anything else goes through the
//! projected-gradient path, which only needs `value` and `gradient`.

use crate::problem::TrackingProblem;
use analytics::stats::pearson;
use core_types::ObjectiveKind;
use nalgebra::DVector;

/// Relative step used by the central-difference gradient.
const FD_STEP: f64 = 1e-6;

pub trait Objective: Send + Sync {
    fn name(&self) -> &'static str;

    /// The objective at `w`. May return a non-finite value where it is undefined.
    fn value(&self, problem: &TrackingProblem, w: &DVector<f64>) -> f64;

    /// The gradient at `w`. Defaults to central differences.
    fn gradient(&self, problem: &TrackingProblem, w: &DVector<f64>) -> DVector<f64> {
        finite_difference_gradient(self, problem, w)
    }

    /// True when the objective is exactly `||X w - y||²`, which unlocks the
    /// closed-form and active-set solvers.
    fn is_least_squares(&self) -> bool {
        false
    }
}

/// Central-difference gradient of any objective.
pub fn finite_difference_gradient<O: Objective + ?Sized>(
    objective: &O,
    problem: &TrackingProblem,
    w: &DVector<f64>,
) -> DVector<f64> {
    let mut grad = DVector::zeros(w.len());
    let mut shifted = w.clone();
    for i in 0..w.len() {
        let h = FD_STEP * w[i].abs().max(1.0);
        shifted[i] = w[i] + h;
        let up = objective.value(problem, &shifted);
        shifted[i] = w[i] - h;
        let down = objective.value(problem, &shifted);
        shifted[i] = w[i];
        grad[i] = (up - down) / (2.0 * h);
    }
    grad
}

/// `Σ (composite - target)²` over the design rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumSquaredDrift;

impl Objective for SumSquaredDrift {
    fn name(&self) -> &'static str {
        "sum_squared_drift"
    }

    fn value(&self, problem: &TrackingProblem, w: &DVector<f64>) -> f64 {
        problem.residual(w).norm_squared()
    }

    fn gradient(&self, problem: &TrackingProblem, w: &DVector<f64>) -> DVector<f64> {
        problem.x().tr_mul(&problem.residual(w)) * 2.0
    }

    fn is_least_squares(&self) -> bool {
        true
    }
}

/// `1 - corr(composite, target)`. Infinite where the correlation is undefined,
/// e.g. when every weight is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxCorrelation;

impl Objective for MaxCorrelation {
    fn name(&self) -> &'static str {
        "max_correlation"
    }

    fn value(&self, problem: &TrackingProblem, w: &DVector<f64>) -> f64 {
        let composite = problem.composite(w);
        match pearson(composite.as_slice(), problem.y().as_slice()).value() {
            Some(rho) => 1.0 - rho,
            None => f64::INFINITY,
        }
    }
}

/// The built-in objective for a configured kind.
pub fn objective_for(kind: ObjectiveKind) -> Box<dyn Objective> {
    match kind {
        ObjectiveKind::SumSquaredDrift => Box::new(SumSquaredDrift),
        ObjectiveKind::MaxCorrelation => Box::new(MaxCorrelation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics::TrackingDesign;
    use approx::assert_abs_diff_eq;
    use chrono::{TimeZone, Utc};

    fn problem() -> TrackingProblem {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        TrackingProblem::from_design(&TrackingDesign {
            timestamps: vec![ts; 4],
            proxies: vec!["A".to_string(), "B".to_string()],
            columns: vec![vec![1.0, 2.0, 4.0, 3.0], vec![2.0, 1.0, 0.0, 5.0]],
            target: vec![1.2, 1.9, 3.1, 3.6],
        })
    }

    #[test]
    fn analytic_gradient_matches_finite_differences() {
        let p = problem();
        let w = DVector::from_vec(vec![0.3, 0.8]);
        let analytic = SumSquaredDrift.gradient(&p, &w);
        let numeric = finite_difference_gradient(&SumSquaredDrift, &p, &w);
        for i in 0..2 {
            assert_abs_diff_eq!(analytic[i], numeric[i], epsilon = 1e-5);
        }
    }

    #[test]
    fn correlation_objective_is_zero_on_a_perfect_fit() {
        let p = problem();
        let exact = TrackingProblem::from_design(&TrackingDesign {
            timestamps: vec![Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(); 4],
            proxies: p.proxies().to_vec(),
            columns: vec![p.column(0), p.column(1)],
            target: vec![1.5, 1.5, 2.0, 4.0],
        });
        let w = DVector::from_vec(vec![0.5, 0.5]);
        assert_abs_diff_eq!(MaxCorrelation.value(&exact, &w), 0.0, epsilon = 1e-12);
        assert!(MaxCorrelation.value(&exact, &DVector::zeros(2)).is_infinite());
    }

    #[test]
    fn only_squared_drift_is_least_squares() {
        assert!(objective_for(ObjectiveKind::SumSquaredDrift).is_least_squares());
        assert!(!objective_for(ObjectiveKind::MaxCorrelation).is_least_squares());
    }
}
