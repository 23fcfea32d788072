use chrono::{DateTime, Utc};
use core_types::{Measure, SeriesBasis};
use serde::{Deserialize, Serialize};

/// One row of a derived series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Measure,
}

/// A weighted combination of proxy columns, in levels or returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeSeries {
    pub basis: SeriesBasis,
    pub points: Vec<SeriesPoint>,
}

/// Pointwise `composite - target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftSeries {
    pub basis: SeriesBasis,
    pub points: Vec<SeriesPoint>,
}

impl DriftSeries {
    /// The defined drift values, in row order.
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().filter_map(|p| p.value.value()).collect()
    }
}

/// Running totals of a drift series at one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConePoint {
    pub timestamp: DateTime<Utc>,
    /// Running signed sum; its sign shows a persistent over- or under-shoot.
    pub signed: Measure,
    /// Running sum of squares; never decreases.
    pub squared: Measure,
}

/// The "drift cone": cumulative drift over the aligned window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeDrift {
    pub points: Vec<ConePoint>,
}

impl CumulativeDrift {
    /// Accumulates a drift series.
    ///
    /// Rows before the first defined drift are undefined. Once accumulation has
    /// started, an undefined drift makes every later total undefined instead of
    /// being skipped.
    pub fn accumulate(drift: &DriftSeries) -> Self {
        let mut signed = 0.0;
        let mut squared = 0.0;
        let mut started = false;
        let mut poisoned = false;

        let points = drift
            .points
            .iter()
            .map(|p| {
                match (p.value, started) {
                    (Measure::Value(d), _) if !poisoned => {
                        started = true;
                        signed += d;
                        squared += d * d;
                    }
                    (Measure::Undefined, true) => poisoned = true,
                    _ => {}
                }
                let defined = started && !poisoned;
                ConePoint {
                    timestamp: p.timestamp,
                    signed: if defined { Measure::from_f64(signed) } else { Measure::Undefined },
                    squared: if defined { Measure::from_f64(squared) } else { Measure::Undefined },
                }
            })
            .collect();

        Self { points }
    }

    pub fn last(&self) -> Option<&ConePoint> {
        self.points.last()
    }
}

/// Target and composite rebuilt from returns as `base * cumprod(1 + r)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformancePaths {
    pub base: f64,
    pub target: Vec<SeriesPoint>,
    pub composite: Vec<SeriesPoint>,
}

/// Pairwise correlation coefficients, symmetric, in frame column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub basis: SeriesBasis,
    symbols: Vec<String>,
    values: Vec<Vec<Measure>>,
}

impl CorrelationMatrix {
    pub(crate) fn new(basis: SeriesBasis, symbols: Vec<String>, values: Vec<Vec<Measure>>) -> Self {
        Self {
            basis,
            symbols,
            values,
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Row-major coefficients matching `symbols()`.
    pub fn values(&self) -> &[Vec<Measure>] {
        &self.values
    }

    pub fn get(&self, a: &str, b: &str) -> Option<Measure> {
        let i = self.symbols.iter().position(|s| s == a)?;
        let j = self.symbols.iter().position(|s| s == b)?;
        Some(self.values[i][j])
    }
}
