//! Spectral projected gradient for arbitrary objectives.
//!
//! Steps along `P(w - λ g) - w` with a Barzilai-Borwein `λ` and a
//! non-monotone Armijo backtrack against the worst of the last few objective
//! values. Every iterate is a projection or a convex combination of feasible
//! points, so it is feasible and can be returned on cancellation.

use super::{inf_norm, Solution, SolverFailure};
use crate::budget::SolveBudget;
use crate::constraints::FeasibleSet;
use crate::objective::Objective;
use crate::problem::TrackingProblem;
use crate::result::SolveStatus;
use configuration::OptimizerConfig;
use nalgebra::DVector;
use std::collections::VecDeque;
use tracing::debug;

const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 100;
const STEP_MIN: f64 = 1e-30;
/// Largest trial move `λ ||g||∞`, relative to `1 + ||w||∞`.
const MAX_MOVE: f64 = 1e3;
/// Objective values the line search compares against.
const MEMORY: usize = 10;

pub(crate) fn solve(
    problem: &TrackingProblem,
    objective: &dyn Objective,
    set: &FeasibleSet,
    config: &OptimizerConfig,
    budget: &SolveBudget,
) -> Result<Solution, SolverFailure> {
    let mut w = set.seed(problem.dim());
    let raw = objective.value(problem, &w);
    if !raw.is_finite() {
        return Err(diverged(w, 0, "objective is not finite at the equal-weight start"));
    }

    // Work on the objective divided by its starting value so the stationarity
    // test does not depend on the units of the prices.
    let scale = raw.abs().max(1.0);
    let value = |w: &DVector<f64>| objective.value(problem, w) / scale;
    let gradient = |w: &DVector<f64>| objective.gradient(problem, w) / scale;

    let mut f = raw / scale;
    let mut g = gradient(&w);
    let mut step = {
        let unit = inf_norm(&(set.project(&(&w - &g)) - &w));
        if unit > 0.0 { (1.0 / unit).clamp(STEP_MIN, step_cap(&w, &g)) } else { 1.0 }
    };
    let mut recent = VecDeque::from([f]);
    let mut best = (f, w.clone());
    let mut iteration = 0;

    loop {
        if !g.iter().all(|x| x.is_finite()) {
            return Err(diverged(best.1, iteration, "gradient is not finite"));
        }
        let stationarity = inf_norm(&(set.project(&(&w - &g)) - &w));
        if stationarity <= config.gradient_tolerance {
            return Ok(Solution {
                w,
                iterations: iteration,
                status: SolveStatus::Converged,
            });
        }
        if let Some(reason) = budget.check(iteration) {
            return Ok(Solution {
                w: best.1,
                iterations: iteration,
                status: SolveStatus::Partial(reason),
            });
        }
        if iteration >= config.max_iterations {
            let reason = format!(
                "projected gradient still at {:.3e} after the iteration limit",
                stationarity
            );
            return Err(diverged(best.1, iteration, &reason));
        }
        iteration += 1;

        let direction = set.project(&(&w - &g * step)) - &w;
        let slope = g.dot(&direction);
        let accepted = if slope < 0.0 {
            let reference = recent.iter().copied().fold(f, f64::max);
            line_search(&value, &w, f, reference, &direction, slope)
        } else {
            None
        };

        let Some((next, f_next)) = accepted else {
            // No descent left at machine precision; the current point is as
            // good as this objective can resolve.
            debug!(iteration, stationarity, "Line search stalled");
            return Ok(Solution {
                w: if best.0 < f { best.1 } else { w },
                iterations: iteration,
                status: SolveStatus::Converged,
            });
        };

        let g_next = gradient(&next);
        let s = &next - &w;
        let curvature = s.dot(&(&g_next - &g));
        let cap = step_cap(&next, &g_next);
        step = if curvature > 0.0 {
            (s.norm_squared() / curvature).clamp(STEP_MIN, cap.max(STEP_MIN))
        } else {
            cap
        };

        w = next;
        f = f_next;
        g = g_next;
        if recent.len() == MEMORY {
            recent.pop_front();
        }
        recent.push_back(f);
        if f < best.0 {
            best = (f, w.clone());
        }
    }
}

/// Backtracks from the full step along `direction` until the Armijo condition
/// holds against `reference`. Trial lengths come from a safeguarded quadratic
/// fit, falling back to halving.
fn line_search<F>(
    value: &F,
    w: &DVector<f64>,
    f: f64,
    reference: f64,
    direction: &DVector<f64>,
    slope: f64,
) -> Option<(DVector<f64>, f64)>
where
    F: Fn(&DVector<f64>) -> f64,
{
    let mut alpha = 1.0;
    for _ in 0..MAX_BACKTRACKS {
        let candidate = w + direction * alpha;
        let fc = value(&candidate);
        if fc.is_finite() && fc <= reference + ARMIJO * alpha * slope {
            return Some((candidate, fc));
        }
        let curvature = fc - f - alpha * slope;
        let fitted = if fc.is_finite() && curvature > 0.0 {
            -0.5 * alpha * alpha * slope / curvature
        } else {
            0.5 * alpha
        };
        alpha = fitted.clamp(0.1 * alpha, 0.5 * alpha);
    }
    None
}

/// Caps `λ` so one trial step moves no weight by more than `MAX_MOVE` times
/// the size of the iterate.
fn step_cap(w: &DVector<f64>, g: &DVector<f64>) -> f64 {
    let g_norm = inf_norm(g);
    if g_norm > 0.0 {
        MAX_MOVE * (1.0 + inf_norm(w)) / g_norm
    } else {
        1.0
    }
}

fn diverged(w: DVector<f64>, iterations: usize, reason: &str) -> SolverFailure {
    SolverFailure::Diverged {
        w,
        iterations,
        reason: reason.to_string(),
    }
}
