//! # Parallax Weight Optimizer
//!
//! Finds the proxy weights that make a composite track a target as closely
//! as possible over an aligned window.
//!
//! The default objective, the sum of squared drift, is a convex quadratic, so
//! under linear constraints the solve is a constrained least-squares problem:
//!
//! - `unconstrained` and `sum_to_one` are solved in closed form with an SVD.
//! - `bounded` is solved exactly by a primal active-set method.
//! - Any other objective, or `solver = "iterative"`, uses a spectral
//!   projected-gradient method that only needs a value and a gradient.
//!
//! Solves are synchronous and deterministic: every path starts from equal
//! weights and no randomness is involved. Slow solves are bounded by a
//! `SolveBudget` that the caller can use to cancel from another thread.

pub mod budget;
pub mod constraints;
pub mod error;
pub mod objective;
pub mod problem;
pub mod result;
mod solver;

pub use budget::{SolveBudget, StopReason};
pub use error::OptimizerError;
pub use objective::{MaxCorrelation, Objective, SumSquaredDrift};
pub use result::{CollinearityWarning, OptimizationResult, SolveMethod, SolveStatus};

use crate::constraints::FeasibleSet;
use crate::objective::objective_for;
use crate::problem::TrackingProblem;
use crate::solver::{Solution, SolverFailure, active_set, closed_form, projected_gradient};
use aligner::AlignedFrame;
use analytics::{DriftEngine, stats::pearson};
use configuration::{EngineConfig, OptimizerConfig};
use core_types::{ConstraintKind, SolverKind, WeightVector};
use itertools::Itertools;
use nalgebra::DVector;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Solves for proxy weights under one optimizer and engine configuration.
#[derive(Debug, Clone)]
pub struct WeightOptimizer {
    config: OptimizerConfig,
    engine: EngineConfig,
}

impl WeightOptimizer {
    pub fn new(config: OptimizerConfig, engine: EngineConfig) -> Result<Self, OptimizerError> {
        config.validate(None).map_err(OptimizerError::InvalidConstraints)?;
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Minimizes the configured objective with no time or cancellation limit.
    pub fn optimize(
        &self,
        frame: &AlignedFrame,
        target: &str,
        proxies: &[&str],
    ) -> Result<OptimizationResult, OptimizerError> {
        self.optimize_with_budget(frame, target, proxies, &SolveBudget::unlimited())
    }

    pub fn optimize_with_budget(
        &self,
        frame: &AlignedFrame,
        target: &str,
        proxies: &[&str],
        budget: &SolveBudget,
    ) -> Result<OptimizationResult, OptimizerError> {
        let objective = objective_for(self.config.objective);
        self.optimize_with(frame, target, proxies, objective.as_ref(), budget)
    }

    /// Minimizes a caller-supplied objective.
    ///
    /// The returned weights always satisfy the configured constraints within
    /// `feasibility_tolerance`. A solve stopped by `budget` comes back as
    /// `SolveStatus::Partial`; one that runs out of the configured iterations
    /// fails with `OptimizerError::Diverged`.
    pub fn optimize_with(
        &self,
        frame: &AlignedFrame,
        target: &str,
        proxies: &[&str],
        objective: &dyn Objective,
        budget: &SolveBudget,
    ) -> Result<OptimizationResult, OptimizerError> {
        check_universe(target, proxies)?;
        self.config
            .validate(Some(proxies.len()))
            .map_err(OptimizerError::InvalidConstraints)?;

        let design = DriftEngine::new(frame, self.engine.clone()).design(target, proxies)?;
        let problem = TrackingProblem::from_design(&design);
        let warnings = collinearity_warnings(&problem, self.config.collinearity_threshold);
        for warning in &warnings {
            warn!(
                first = %warning.first,
                second = %warning.second,
                correlation = warning.correlation,
                "Near-collinear proxies; weight split is not unique"
            );
        }

        let set = FeasibleSet::from_config(&self.config);
        let method = self.choose_method(objective);
        debug!(
            target_symbol = target,
            proxies = problem.dim(),
            rows = problem.rows(),
            objective = objective.name(),
            %method,
            "Starting weight solve"
        );

        let solution = match method {
            SolveMethod::ClosedForm => {
                if let Some(reason) = budget.check(0) {
                    Ok(Solution {
                        w: set.seed(problem.dim()),
                        iterations: 0,
                        status: SolveStatus::Partial(reason),
                    })
                } else {
                    let w = match self.config.constraint {
                        ConstraintKind::SumToOne => closed_form::sum_to_one(&problem),
                        _ => closed_form::unconstrained(&problem),
                    };
                    w.map(|w| Solution {
                        w,
                        iterations: 0,
                        status: SolveStatus::Converged,
                    })
                }
            }
            SolveMethod::ActiveSet => active_set::solve(&problem, &set, &self.config, budget),
            SolveMethod::ProjectedGradient => {
                projected_gradient::solve(&problem, objective, &set, &self.config, budget)
            }
        };

        let solution = match solution {
            Ok(solution) => solution,
            Err(SolverFailure::LinearAlgebra(reason)) => {
                return Err(OptimizerError::LinearAlgebra(reason));
            }
            Err(SolverFailure::Diverged { w, iterations, reason }) => {
                return Err(self.diverged(&problem, &set, w, iterations, reason));
            }
        };

        let violation = set.violation(&solution.w);
        if !solution.w.iter().all(|x| x.is_finite()) {
            return Err(self.diverged(
                &problem,
                &set,
                solution.w,
                solution.iterations,
                "solver produced non-finite weights".to_string(),
            ));
        }
        if violation > self.config.feasibility_tolerance {
            let reason = format!(
                "constraint violation {:.3e} exceeds tolerance {:.3e}",
                violation, self.config.feasibility_tolerance
            );
            return Err(self.diverged(&problem, &set, solution.w, solution.iterations, reason));
        }

        let objective_value = objective.value(&problem, &solution.w);
        let weights = to_weight_vector(&problem, &solution.w)?;
        info!(
            target_symbol = target,
            %method,
            iterations = solution.iterations,
            objective_value,
            violation,
            converged = solution.status == SolveStatus::Converged,
            "Weight solve finished"
        );

        Ok(OptimizationResult {
            weights,
            status: solution.status,
            method,
            objective: objective.name().to_string(),
            objective_value,
            iterations: solution.iterations,
            constraint_violation: violation,
            warnings,
        })
    }

    fn choose_method(&self, objective: &dyn Objective) -> SolveMethod {
        if self.config.solver == SolverKind::Iterative || !objective.is_least_squares() {
            return SolveMethod::ProjectedGradient;
        }
        match self.config.constraint {
            ConstraintKind::Unconstrained | ConstraintKind::SumToOne => SolveMethod::ClosedForm,
            ConstraintKind::Bounded => SolveMethod::ActiveSet,
        }
    }

    /// Builds the divergence error, projecting the iterate first so the
    /// reported best point is feasible when the iterate itself is not.
    fn diverged(
        &self,
        problem: &TrackingProblem,
        set: &FeasibleSet,
        w: DVector<f64>,
        iterations: usize,
        reason: String,
    ) -> OptimizerError {
        let best = if w.iter().all(|x| x.is_finite()) { set.project(&w) } else { set.seed(problem.dim()) };
        let violation = set.violation(&w);
        warn!(iterations, violation, %reason, "Weight solve diverged");
        match to_weight_vector(problem, &best) {
            Ok(best) => OptimizerError::Diverged {
                best,
                violation,
                iterations,
                reason,
            },
            Err(e) => e,
        }
    }
}

fn check_universe(target: &str, proxies: &[&str]) -> Result<(), OptimizerError> {
    if proxies.is_empty() {
        return Err(OptimizerError::InvalidInput("at least one proxy is required".to_string()));
    }
    let mut seen = HashSet::new();
    for proxy in proxies {
        if *proxy == target {
            return Err(OptimizerError::InvalidInput(format!(
                "target '{}' cannot also be a proxy",
                target
            )));
        }
        if !seen.insert(*proxy) {
            return Err(OptimizerError::InvalidInput(format!("proxy '{}' is listed twice", proxy)));
        }
    }
    Ok(())
}

/// Pairs of proxy columns whose absolute correlation reaches `threshold`.
/// Pairs with an undefined correlation (a constant column) are not reported.
pub fn collinearity_warnings(problem: &TrackingProblem, threshold: f64) -> Vec<CollinearityWarning> {
    let columns: Vec<Vec<f64>> = (0..problem.dim()).map(|j| problem.column(j)).collect();
    (0..problem.dim())
        .tuple_combinations()
        .filter_map(|(i, j)| {
            let rho = pearson(&columns[i], &columns[j]).value()?;
            (rho.abs() >= threshold).then(|| CollinearityWarning {
                first: problem.proxies()[i].clone(),
                second: problem.proxies()[j].clone(),
                correlation: rho,
            })
        })
        .collect()
}

fn to_weight_vector(problem: &TrackingProblem, w: &DVector<f64>) -> Result<WeightVector, OptimizerError> {
    Ok(WeightVector::new(
        problem.proxies().iter().cloned().zip(w.iter().copied()),
    )?)
}
