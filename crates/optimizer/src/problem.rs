use analytics::TrackingDesign;
use nalgebra::{DMatrix, DVector};

/// A tracking design lifted into dense matrices: `X` holds one column per
/// proxy and `y` the target, both over the complete rows of the frame.
#[derive(Debug, Clone)]
pub struct TrackingProblem {
    proxies: Vec<String>,
    x: DMatrix<f64>,
    y: DVector<f64>,
}

impl TrackingProblem {
    pub fn from_design(design: &TrackingDesign) -> Self {
        let rows = design.rows();
        let x = DMatrix::from_fn(rows, design.columns.len(), |i, j| design.columns[j][i]);
        let y = DVector::from_column_slice(&design.target);
        Self {
            proxies: design.proxies.clone(),
            x,
            y,
        }
    }

    pub fn proxies(&self) -> &[String] {
        &self.proxies
    }

    /// Number of weights being solved for.
    pub fn dim(&self) -> usize {
        self.x.ncols()
    }

    pub fn rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn x(&self) -> &DMatrix<f64> {
        &self.x
    }

    pub fn y(&self) -> &DVector<f64> {
        &self.y
    }

    /// The composite `X w` over the design rows.
    pub fn composite(&self, w: &DVector<f64>) -> DVector<f64> {
        &self.x * w
    }

    /// `X w - y`, the drift on every design row.
    pub fn residual(&self, w: &DVector<f64>) -> DVector<f64> {
        self.composite(w) - &self.y
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        self.x.column(j).iter().copied().collect()
    }
}
