use super::SolverFailure;
use crate::problem::TrackingProblem;
use nalgebra::{DMatrix, DVector};

/// Minimum-norm least squares via SVD, with numpy's default cutoff for
/// singular values.
pub(crate) fn least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, SolverFailure> {
    if a.ncols() == 0 {
        return Ok(DVector::zeros(0));
    }
    let svd = a.clone().svd(true, true);
    let cutoff = svd.singular_values.max() * a.nrows().max(a.ncols()) as f64 * f64::EPSILON;
    svd.solve(b, cutoff)
        .map_err(|e| SolverFailure::LinearAlgebra(e.to_string()))
}

/// Orthonormal basis of `{p : Σ p = 0}` in `R^n`, one Helmert contrast per column.
pub(crate) fn zero_sum_basis(n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, n.saturating_sub(1), |i, j| {
        let k = (j + 1) as f64;
        let norm = (k * (k + 1.0)).sqrt();
        match i.cmp(&(j + 1)) {
            std::cmp::Ordering::Less => 1.0 / norm,
            std::cmp::Ordering::Equal => -k / norm,
            std::cmp::Ordering::Greater => 0.0,
        }
    })
}

/// Minimizes `||a p - rhs||²`, with `Σ p = 0` when `zero_sum` is set.
///
/// Under the sum constraint the problem is reduced to the null space of the
/// constraint, so the returned step is the minimum-norm one there too.
pub(crate) fn equality_step(
    a: &DMatrix<f64>,
    rhs: &DVector<f64>,
    zero_sum: bool,
) -> Result<DVector<f64>, SolverFailure> {
    if !zero_sum {
        return least_squares(a, rhs);
    }
    if a.ncols() <= 1 {
        return Ok(DVector::zeros(a.ncols()));
    }
    let basis = zero_sum_basis(a.ncols());
    let coefficients = least_squares(&(a * &basis), rhs)?;
    Ok(basis * coefficients)
}

/// Pure OLS of the target on the proxy columns.
pub(crate) fn unconstrained(problem: &TrackingProblem) -> Result<DVector<f64>, SolverFailure> {
    least_squares(problem.x(), problem.y())
}

/// OLS under `Σ w = 1`, solved as a step from the equal-weight point.
pub(crate) fn sum_to_one(problem: &TrackingProblem) -> Result<DVector<f64>, SolverFailure> {
    let n = problem.dim();
    let start = DVector::from_element(n, 1.0 / n as f64);
    let residual = problem.y() - problem.x() * &start;
    let step = equality_step(problem.x(), &residual, true)?;
    Ok(start + step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn zero_sum_basis_is_orthonormal_and_sums_to_zero() {
        let z = zero_sum_basis(4);
        assert_eq!(z.shape(), (4, 3));
        let gram = z.transpose() * &z;
        for i in 0..3 {
            assert_abs_diff_eq!(z.column(i).sum(), 0.0, epsilon = 1e-15);
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[(i, j)], expected, epsilon = 1e-15);
            }
        }
    }

    #[test]
    fn least_squares_splits_duplicate_columns_evenly() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        let b = DVector::from_vec(vec![2.0, 4.0, 6.0]);
        let x = least_squares(&a, &b).unwrap();
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(x[1], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn constrained_step_keeps_the_sum() {
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 2.0, 0.0, 1.0, 1.0, 3.0, 1.0, 0.0]);
        let rhs = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let p = equality_step(&a, &rhs, true).unwrap();
        assert_abs_diff_eq!(p.sum(), 0.0, epsilon = 1e-12);
    }
}
