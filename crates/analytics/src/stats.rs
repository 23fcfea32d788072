//! Scalar statistics over plain `f64` slices.

use core_types::Measure;

/// A sum of squared deviations at or below this fraction of the sum of squares
/// counts as zero variance. Absorbs the rounding left by the mean of a
/// constant series.
const RELATIVE_VARIANCE_EPSILON: f64 = 1e-20;

pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        None
    } else {
        Some(xs.iter().sum::<f64>() / xs.len() as f64)
    }
}

/// Sample standard deviation (`ddof = 1`). Undefined below two samples.
pub fn sample_std(xs: &[f64]) -> Measure {
    if xs.len() < 2 {
        return Measure::Undefined;
    }
    let Some(m) = mean(xs) else {
        return Measure::Undefined;
    };
    let ss: f64 = xs.iter().map(|x| (x - m) * (x - m)).sum();
    Measure::from_f64((ss / (xs.len() - 1) as f64).sqrt())
}

/// Pearson correlation of two equal-length samples.
///
/// Undefined when fewer than two pairs are given or either side has zero
/// variance; never reported as zero in that case.
pub fn pearson(x: &[f64], y: &[f64]) -> Measure {
    let n = x.len().min(y.len());
    if n < 2 {
        return Measure::Undefined;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let (Some(mx), Some(my)) = (mean(x), mean(y)) else {
        return Measure::Undefined;
    };

    let mut cov = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mx;
        let dy = yi - my;
        cov += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if is_degenerate(sxx, x) || is_degenerate(syy, y) {
        return Measure::Undefined;
    }
    Measure::from_f64(cov / (sxx * syy).sqrt()).map(|r| r.clamp(-1.0, 1.0))
}

/// True when the series behind `ss` is constant up to rounding.
pub fn is_degenerate(ss: f64, xs: &[f64]) -> bool {
    let scale: f64 = xs.iter().map(|x| x * x).sum();
    ss <= RELATIVE_VARIANCE_EPSILON * scale
}

/// Keeps only the positions where both inputs are defined.
pub fn paired(x: &[Measure], y: &[Measure]) -> (Vec<f64>, Vec<f64>) {
    x.iter()
        .zip(y)
        .filter_map(|(a, b)| Some((a.value()?, b.value()?)))
        .unzip()
}
