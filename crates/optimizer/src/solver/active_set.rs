//! Primal active-set method for `min ||X w - y||²` over a box, optionally
//! intersected with `Σ w = 1`.
//!
//! Each iteration solves the equality-constrained problem on the free
//! weights, walks towards its solution until a bound blocks, and pins the
//! blocking weight. Once no step is left the Lagrange multipliers of the
//! pinned weights are checked and the most negative one is released.
//!
//! After a zero-length step (a degenerate vertex) the release and blocking
//! choices both fall back to the lowest index, which rules out cycling.

use super::closed_form::equality_step;
use super::{inf_norm, Solution, SolverFailure};
use crate::budget::SolveBudget;
use crate::constraints::FeasibleSet;
use crate::problem::TrackingProblem;
use crate::result::SolveStatus;
use configuration::OptimizerConfig;
use nalgebra::DVector;
use tracing::trace;

/// Relative slack on the multiplier sign test.
const MULTIPLIER_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pin {
    Free,
    Lower,
    Upper,
}

pub(crate) fn solve(
    problem: &TrackingProblem,
    set: &FeasibleSet,
    config: &OptimizerConfig,
    budget: &SolveBudget,
) -> Result<Solution, SolverFailure> {
    let n = problem.dim();
    let mut w = set.seed(n);
    let mut pins: Vec<Pin> = w
        .iter()
        .map(|x| {
            if *x <= set.lower {
                Pin::Lower
            } else if *x >= set.upper {
                Pin::Upper
            } else {
                Pin::Free
            }
        })
        .collect();

    let multiplier_scale = 1.0 + inf_norm(&problem.x().tr_mul(problem.y()));
    let mut iteration = 0;
    // The last step pinned a weight without moving.
    let mut degenerate = false;

    loop {
        if let Some(reason) = budget.check(iteration) {
            return Ok(Solution {
                w,
                iterations: iteration,
                status: SolveStatus::Partial(reason),
            });
        }
        if iteration >= config.max_iterations {
            return Err(SolverFailure::Diverged {
                w,
                iterations: iteration,
                reason: "active set did not settle within the iteration limit".to_string(),
            });
        }
        iteration += 1;

        let free: Vec<usize> = (0..n).filter(|&i| pins[i] == Pin::Free).collect();
        let residual = problem.y() - problem.x() * &w;
        let step = if free.is_empty() {
            DVector::zeros(0)
        } else {
            equality_step(&problem.x().select_columns(&free), &residual, set.sum_to_one)?
        };

        if inf_norm(&step) <= config.tolerance {
            let gradient = problem.x().tr_mul(&residual) * -2.0;
            let candidates = multipliers(&gradient, &pins, &free, set.sum_to_one);
            match release(&candidates, -MULTIPLIER_TOLERANCE * multiplier_scale, degenerate) {
                Some((i, mu)) => {
                    trace!(weight = i, multiplier = mu, degenerate, "Releasing pinned weight");
                    pins[i] = Pin::Free;
                    continue;
                }
                None => {
                    return Ok(Solution {
                        w,
                        iterations: iteration,
                        status: SolveStatus::Converged,
                    });
                }
            }
        }

        // Longest step in [0, 1] that keeps every free weight inside the box.
        let mut alpha = 1.0;
        let mut blocking = None;
        for (&i, &p) in free.iter().zip(step.iter()) {
            let (limit, pin) = if p < 0.0 {
                ((set.lower - w[i]) / p, Pin::Lower)
            } else if p > 0.0 {
                ((set.upper - w[i]) / p, Pin::Upper)
            } else {
                continue;
            };
            if limit < alpha {
                alpha = limit.max(0.0);
                blocking = Some((i, pin));
            }
        }

        degenerate = blocking.is_some() && alpha <= 0.0;
        for (&i, &p) in free.iter().zip(step.iter()) {
            w[i] = (w[i] + alpha * p).clamp(set.lower, set.upper);
        }
        if let Some((i, pin)) = blocking {
            w[i] = if pin == Pin::Lower { set.lower } else { set.upper };
            pins[i] = pin;
        }
    }
}

/// Picks the pinned weight to release among multipliers below `threshold`:
/// the most negative one, or the lowest index when the last step was
/// degenerate.
fn release(candidates: &[(usize, f64)], threshold: f64, degenerate: bool) -> Option<(usize, f64)> {
    let mut eligible = candidates.iter().copied().filter(|(_, mu)| *mu < threshold);
    if degenerate {
        eligible.min_by_key(|(i, _)| *i)
    } else {
        eligible.min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
    }
}

/// Multipliers of the pinned weights from `g_i + ν` (lower) or `-(g_i + ν)`
/// (upper); `ν` is the budget multiplier, zero without the sum constraint.
fn multipliers(gradient: &DVector<f64>, pins: &[Pin], free: &[usize], sum_to_one: bool) -> Vec<(usize, f64)> {
    let nu = if !sum_to_one {
        0.0
    } else if !free.is_empty() {
        -free.iter().map(|&i| gradient[i]).sum::<f64>() / free.len() as f64
    } else {
        // Every weight is pinned: any ν between the two bracketing gradients
        // works, take the midpoint.
        let lowest_at_lower = pinned(gradient, pins, Pin::Lower).fold(f64::INFINITY, f64::min);
        let highest_at_upper = pinned(gradient, pins, Pin::Upper).fold(f64::NEG_INFINITY, f64::max);
        match (lowest_at_lower.is_finite(), highest_at_upper.is_finite()) {
            (true, true) => -0.5 * (lowest_at_lower + highest_at_upper),
            (true, false) => -lowest_at_lower,
            (false, true) => -highest_at_upper,
            (false, false) => 0.0,
        }
    };

    pins.iter()
        .enumerate()
        .filter_map(|(i, pin)| match pin {
            Pin::Free => None,
            Pin::Lower => Some((i, gradient[i] + nu)),
            Pin::Upper => Some((i, -(gradient[i] + nu))),
        })
        .collect()
}

fn pinned<'a>(gradient: &'a DVector<f64>, pins: &'a [Pin], which: Pin) -> impl Iterator<Item = f64> + 'a {
    pins.iter()
        .enumerate()
        .filter(move |(_, p)| **p == which)
        .map(move |(i, _)| gradient[i])
}
