use configuration::OptimizerConfig;
use core_types::ConstraintKind;
use nalgebra::DVector;

/// The feasible set of weight vectors for one solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeasibleSet {
    pub kind: ConstraintKind,
    pub lower: f64,
    pub upper: f64,
    pub sum_to_one: bool,
}

impl FeasibleSet {
    pub fn from_config(config: &OptimizerConfig) -> Self {
        let (lower, upper) = match config.constraint {
            ConstraintKind::Bounded => (config.bounds.lower, config.bounds.upper),
            _ => (f64::NEG_INFINITY, f64::INFINITY),
        };
        Self {
            kind: config.constraint,
            lower,
            upper,
            sum_to_one: config.requires_full_investment(),
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.kind == ConstraintKind::Bounded
    }

    /// The deterministic starting point: equal weights, clamped into the box
    /// when the weights need not sum to one.
    pub fn seed(&self, dim: usize) -> DVector<f64> {
        let equal = DVector::from_element(dim, 1.0 / dim as f64);
        if self.violation(&equal) <= f64::EPSILON * dim as f64 {
            equal
        } else {
            self.project(&equal)
        }
    }

    /// Euclidean projection of `v` onto the feasible set.
    pub fn project(&self, v: &DVector<f64>) -> DVector<f64> {
        match (self.is_bounded(), self.sum_to_one) {
            (false, false) => v.clone(),
            (false, true) => {
                let shift = (v.sum() - 1.0) / v.len() as f64;
                v.map(|x| x - shift)
            }
            (true, false) => v.map(|x| x.clamp(self.lower, self.upper)),
            (true, true) => self.project_box_simplex(v),
        }
    }

    /// Exact projection onto `{lower <= w_i <= upper, Σ w = 1}`.
    ///
    /// `s(tau) = Σ clamp(v_i - tau, lower, upper)` is piecewise linear and
    /// non-increasing, with breakpoints at `v_i - upper` and `v_i - lower`.
    /// The breakpoint segment where `s` crosses 1 fixes which weights are
    /// free, and `tau` follows from the free weights alone.
    fn project_box_simplex(&self, v: &DVector<f64>) -> DVector<f64> {
        let (lower, upper) = (self.lower, self.upper);
        let shifted_sum = |tau: f64| -> f64 { v.iter().map(|x| (x - tau).clamp(lower, upper)).sum() };

        let mut knots: Vec<f64> = v.iter().flat_map(|x| [x - upper, x - lower]).collect();
        knots.sort_by(f64::total_cmp);
        knots.dedup();

        let j = knots.partition_point(|&tau| shifted_sum(tau) > 1.0);
        let tau = match (j.checked_sub(1).and_then(|i| knots.get(i)), knots.get(j)) {
            (Some(&a), Some(&b)) => self.segment_shift(v, a, b),
            // Everything at the upper bound already sums to one.
            (None, Some(&b)) => b,
            // Only reachable when `n * lower > 1`, which validation rejects.
            (Some(&a), None) => a,
            (None, None) => return v.clone(),
        };

        let mut w = v.map(|x| (x - tau).clamp(lower, upper));
        // Spread the rounding residual over the free weights.
        let free: Vec<usize> = (0..w.len()).filter(|&i| w[i] > lower && w[i] < upper).collect();
        if !free.is_empty() {
            let share = (1.0 - w.sum()) / free.len() as f64;
            for i in free {
                w[i] = (w[i] + share).clamp(lower, upper);
            }
        }
        w
    }

    /// The shift inside the breakpoint segment `[a, b]` that makes the
    /// clamped weights sum to one.
    fn segment_shift(&self, v: &DVector<f64>, a: f64, b: f64) -> f64 {
        let mid = 0.5 * (a + b);
        let mut pinned = 0.0;
        let mut free_sum = 0.0;
        let mut free = 0usize;
        for &x in v.iter() {
            if x - self.upper >= mid {
                pinned += self.upper;
            } else if x - self.lower <= mid {
                pinned += self.lower;
            } else {
                free_sum += x;
                free += 1;
            }
        }
        if free == 0 {
            a
        } else {
            (free_sum + pinned - 1.0) / free as f64
        }
    }

    /// Total amount by which `w` breaks the bounds and the budget constraint.
    pub fn violation(&self, w: &DVector<f64>) -> f64 {
        let box_violation: f64 = if self.is_bounded() {
            w.iter()
                .map(|x| (self.lower - x).max(0.0) + (x - self.upper).max(0.0))
                .sum()
        } else {
            0.0
        };
        let budget_violation = if self.sum_to_one { (w.sum() - 1.0).abs() } else { 0.0 };
        box_violation + budget_violation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn set(config: OptimizerConfig) -> FeasibleSet {
        FeasibleSet::from_config(&config)
    }

    #[test]
    fn box_simplex_projection_is_feasible() {
        let s = set(OptimizerConfig::bounded(0.0, 1.0, true));
        let w = s.project(&DVector::from_vec(vec![2.0, -1.0, 0.5]));
        assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-12);
        assert!(w.iter().all(|x| (0.0..=1.0).contains(x)));
        // The largest input keeps the whole budget here.
        assert_abs_diff_eq!(w[0], 1.0, epsilon = 1e-12);
        assert!(s.violation(&w) < 1e-12);
    }

    #[test]
    fn box_simplex_projection_stays_exact_far_from_the_set() {
        // The kind of point a long gradient step proposes.
        let s = set(OptimizerConfig::default());
        let v = DVector::from_vec(vec![3.0e6 + 0.25, 3.0e6, -2.0e6, 3.0e6 + 0.5]);
        let w = s.project(&v);
        assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-15);
        assert!(s.violation(&w) < 1e-15);
        assert_eq!(w[2], 0.0);
        // The free weights keep their spacing from the input.
        assert_abs_diff_eq!(w[0] - w[1], 0.25, epsilon = 1e-8);
        assert_abs_diff_eq!(w[3] - w[0], 0.25, epsilon = 1e-8);
        assert_abs_diff_eq!(w[1], 1.0 / 12.0, epsilon = 1e-8);
    }

    #[test]
    fn box_simplex_projection_with_tight_caps() {
        let s = set(OptimizerConfig::bounded(0.1, 0.4, true));
        let w = s.project(&DVector::from_vec(vec![5.0, 4.0, -3.0, 0.0]));
        assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-15);
        for (got, want) in w.iter().zip([0.4, 0.4, 0.1, 0.1]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-15);
        }
    }

    #[test]
    fn projection_leaves_feasible_points_alone() {
        let s = set(OptimizerConfig::bounded(0.1, 0.6, true));
        let v = DVector::from_vec(vec![0.2, 0.3, 0.5]);
        let w = s.project(&v);
        for i in 0..3 {
            assert_abs_diff_eq!(w[i], v[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn hyperplane_projection_shifts_uniformly() {
        let s = set(OptimizerConfig::sum_to_one());
        let w = s.project(&DVector::from_vec(vec![1.0, 1.0]));
        assert_abs_diff_eq!(w[0], 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(w[1], 0.5, epsilon = 1e-15);
        assert_eq!(s.violation(&DVector::from_vec(vec![2.0, -0.5])), 0.5);
    }

    #[test]
    fn seed_is_equal_weight_and_feasible() {
        let s = set(OptimizerConfig::default());
        let w = s.seed(4);
        assert!(w.iter().all(|x| *x == 0.25));
        let capped = set(OptimizerConfig::bounded(0.0, 0.1, false)).seed(4);
        assert!(capped.iter().all(|x| *x == 0.1));
    }
}
