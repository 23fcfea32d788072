use crate::error::AnalyticsError;
use crate::report::TrackingReport;
use crate::series::{
    CompositeSeries, CorrelationMatrix, CumulativeDrift, DriftSeries, PerformancePaths, SeriesPoint,
};
use crate::stats::{pearson, sample_std, paired};
use aligner::{AlignedFrame, Column};
use chrono::{DateTime, Utc};
use configuration::EngineConfig;
use core_types::{Measure, ReturnKind, SeriesBasis, WeightVector};
use tracing::debug;

/// The rows of a frame on which a target and every proxy are defined, in the
/// engine's drift basis, ready for a least-squares fit.
///
/// `composite(w)` restricted to these rows equals `Σ w_i * columns[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingDesign {
    pub timestamps: Vec<DateTime<Utc>>,
    pub proxies: Vec<String>,
    /// One column per proxy, rebased when level matching applies.
    pub columns: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

impl TrackingDesign {
    pub fn rows(&self) -> usize {
        self.target.len()
    }
}

/// A stateless calculator for correlation, composites and drift over one frame.
///
/// Nothing is cached between calls: every composite and drift is recomputed
/// from the frame and the weight vector passed in.
#[derive(Debug, Clone)]
pub struct DriftEngine<'a> {
    frame: &'a AlignedFrame,
    config: EngineConfig,
}

impl<'a> DriftEngine<'a> {
    pub fn new(frame: &'a AlignedFrame, config: EngineConfig) -> Self {
        Self { frame, config }
    }

    pub fn frame(&self) -> &AlignedFrame {
        self.frame
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The column for `symbol` as levels or returns. The first row of a
    /// return series, and any return touching a missing cell, is undefined.
    pub fn series(&self, symbol: &str, basis: SeriesBasis) -> Result<Vec<Measure>, AnalyticsError> {
        let column = self.column(symbol)?;
        Ok(to_basis(&column.prices(), basis, self.config.return_kind))
    }

    /// Pearson correlation between every pair of columns, over the rows where
    /// both are defined. Zero-variance columns yield undefined entries,
    /// including on the diagonal.
    pub fn correlation_matrix(&self) -> CorrelationMatrix {
        let basis = self.config.correlation_basis;
        let symbols: Vec<String> = self.frame.symbols().map(str::to_string).collect();
        let columns: Vec<Vec<Measure>> = self
            .frame
            .columns()
            .iter()
            .map(|c| to_basis(&c.prices(), basis, self.config.return_kind))
            .collect();

        let n = columns.len();
        let mut values = vec![vec![Measure::Undefined; n]; n];
        for i in 0..n {
            for j in i..n {
                let (x, y) = paired(&columns[i], &columns[j]);
                let r = if i == j {
                    // Exactly one unless the column is constant.
                    pearson(&x, &y).map(|_| 1.0)
                } else {
                    pearson(&x, &y)
                };
                values[i][j] = r;
                values[j][i] = r;
            }
        }
        CorrelationMatrix::new(basis, symbols, values)
    }

    /// The weighted proxy combination in the configured drift basis.
    ///
    /// With level matching on a levels basis, every proxy is first rebased to
    /// the target's price on the first row where all of them trade, so any
    /// weights summing to one start exactly at the target's level.
    pub fn composite(&self, target: &str, weights: &WeightVector) -> Result<CompositeSeries, AnalyticsError> {
        let basis = self.config.drift_basis;
        let values = self.weighted(target, weights, basis)?;
        Ok(CompositeSeries {
            basis,
            points: self.points(values),
        })
    }

    /// Pointwise `composite - target`, recomputed on every call.
    pub fn drift(&self, target: &str, weights: &WeightVector) -> Result<DriftSeries, AnalyticsError> {
        let basis = self.config.drift_basis;
        let composite = self.weighted(target, weights, basis)?;
        let target_values = self.series(target, basis)?;

        let values = composite
            .iter()
            .zip(&target_values)
            .map(|(c, t)| match (c, t) {
                (Measure::Value(c), Measure::Value(t)) => Measure::from_f64(c - t),
                _ => Measure::Undefined,
            })
            .collect();

        Ok(DriftSeries {
            basis,
            points: self.points(values),
        })
    }

    /// Running signed and squared drift (the drift cone).
    pub fn cumulative_drift(&self, target: &str, weights: &WeightVector) -> Result<CumulativeDrift, AnalyticsError> {
        Ok(CumulativeDrift::accumulate(&self.drift(target, weights)?))
    }

    /// Builds the least-squares design for fitting `proxies` to `target`.
    pub fn design(&self, target: &str, proxies: &[&str]) -> Result<TrackingDesign, AnalyticsError> {
        if proxies.is_empty() {
            return Err(AnalyticsError::InvalidWeights("no proxy symbols given".to_string()));
        }
        let basis = self.config.drift_basis;
        let target_values = self.series(target, basis)?;
        let factors = self.rebase_factors(target, proxies, basis)?;
        let proxy_values = proxies
            .iter()
            .map(|p| self.series(p, basis))
            .collect::<Result<Vec<_>, _>>()?;

        let mut design = TrackingDesign {
            timestamps: Vec::new(),
            proxies: proxies.iter().map(|p| p.to_string()).collect(),
            columns: vec![Vec::new(); proxies.len()],
            target: Vec::new(),
        };

        for (row, ts) in self.frame.index().iter().enumerate() {
            let Some(t) = target_values[row].value() else {
                continue;
            };
            let row_values: Option<Vec<f64>> = proxy_values
                .iter()
                .zip(&factors)
                .map(|(column, factor)| column[row].value().map(|v| v * factor))
                .collect();
            let Some(row_values) = row_values else {
                continue;
            };
            if row_values.iter().any(|v| !v.is_finite()) {
                continue;
            }
            design.timestamps.push(*ts);
            design.target.push(t);
            for (column, v) in design.columns.iter_mut().zip(row_values) {
                column.push(v);
            }
        }

        if design.rows() < 2 {
            return Err(AnalyticsError::NotEnoughData(format!(
                "{} complete rows for target '{}' and {} proxies",
                design.rows(),
                target,
                proxies.len()
            )));
        }
        Ok(design)
    }

    /// Correlation, volatility and tracking statistics for one weight vector.
    ///
    /// Volatility and tracking error are always computed on returns and
    /// annualized with `periods_per_year`; drift figures follow the drift basis.
    pub fn report(&self, target: &str, weights: &WeightVector) -> Result<TrackingReport, AnalyticsError> {
        let target_returns = self.series(target, SeriesBasis::Returns)?;
        let composite_returns = self.weighted(target, weights, SeriesBasis::Returns)?;
        let (t, c) = paired(&target_returns, &composite_returns);

        let annualize = self.config.periods_per_year.sqrt();
        let differences: Vec<f64> = c.iter().zip(&t).map(|(c, t)| c - t).collect();
        let diff_std = sample_std(&differences);

        let target_volatility = sample_std(&t).map(|s| s * annualize);
        let composite_volatility = sample_std(&c).map(|s| s * annualize);
        let volatility_spread = match (composite_volatility, target_volatility) {
            (Measure::Value(c), Measure::Value(t)) => Measure::from_f64(c - t),
            _ => Measure::Undefined,
        };

        let drift = self.drift(target, weights)?;
        let cone = CumulativeDrift::accumulate(&drift);
        let last = cone.last();
        let cumulative_squared_drift = last.map_or(Measure::Undefined, |p| p.squared);
        let max_abs_drift = if cumulative_squared_drift.is_undefined() {
            Measure::Undefined
        } else {
            drift.values().into_iter().map(f64::abs).reduce(f64::max).into()
        };

        let report = TrackingReport {
            correlation: pearson(&t, &c),
            target_volatility,
            composite_volatility,
            volatility_spread,
            tracking_error: diff_std.map(|s| s * annualize),
            period_tracking_error: diff_std.map(|s| s * (differences.len() as f64).sqrt()),
            final_drift: drift.points.last().map_or(Measure::Undefined, |p| p.value),
            cumulative_drift: last.map_or(Measure::Undefined, |p| p.signed),
            cumulative_squared_drift,
            max_abs_drift,
            observations: t.len(),
        };
        debug!(target_symbol = target, observations = report.observations, correlation = %report.correlation, "tracking report computed");
        Ok(report)
    }

    /// Target and composite compounded from their returns, both starting at `base`.
    pub fn performance_paths(
        &self,
        target: &str,
        weights: &WeightVector,
        base: f64,
    ) -> Result<PerformancePaths, AnalyticsError> {
        let kind = self.config.return_kind;
        let target_returns = self.series(target, SeriesBasis::Returns)?;
        let composite_returns = self.weighted(target, weights, SeriesBasis::Returns)?;
        Ok(PerformancePaths {
            base,
            target: self.points(compound(&target_returns, base, kind)),
            composite: self.points(compound(&composite_returns, base, kind)),
        })
    }

    fn column(&self, symbol: &str) -> Result<&'a Column, AnalyticsError> {
        self.frame
            .column(symbol)
            .ok_or_else(|| AnalyticsError::UnknownSymbol(symbol.to_string()))
    }

    fn points(&self, values: Vec<Measure>) -> Vec<SeriesPoint> {
        self.frame
            .index()
            .iter()
            .zip(values)
            .map(|(timestamp, value)| SeriesPoint {
                timestamp: *timestamp,
                value,
            })
            .collect()
    }

    /// `Σ w_i * proxy_i` per row in `basis`; undefined where any weighted proxy is.
    fn weighted(&self, target: &str, weights: &WeightVector, basis: SeriesBasis) -> Result<Vec<Measure>, AnalyticsError> {
        if weights.is_empty() {
            return Err(AnalyticsError::InvalidWeights("weight vector is empty".to_string()));
        }
        self.column(target)?;
        let symbols: Vec<&str> = weights.symbols().collect();
        let factors = self.rebase_factors(target, &symbols, basis)?;
        let columns = symbols
            .iter()
            .map(|s| self.series(s, basis))
            .collect::<Result<Vec<_>, _>>()?;

        let values = (0..self.frame.len())
            .map(|row| {
                let mut total = 0.0;
                for ((column, factor), (_, w)) in columns.iter().zip(&factors).zip(weights.iter()) {
                    match column[row] {
                        Measure::Value(v) => total += w * v * factor,
                        Measure::Undefined => return Measure::Undefined,
                    }
                }
                Measure::from_f64(total)
            })
            .collect();
        Ok(values)
    }

    /// Per-proxy multipliers that rebase levels onto the target's starting
    /// price. All ones unless level matching applies to `basis`.
    fn rebase_factors(&self, target: &str, proxies: &[&str], basis: SeriesBasis) -> Result<Vec<f64>, AnalyticsError> {
        let columns = proxies
            .iter()
            .map(|p| self.column(p).map(Column::prices))
            .collect::<Result<Vec<_>, _>>()?;
        if basis != SeriesBasis::Levels || !self.config.level_matching {
            return Ok(vec![1.0; proxies.len()]);
        }

        let target_prices = self.column(target)?.prices();
        let anchor = (0..self.frame.len()).find(|&row| {
            target_prices[row].is_some() && columns.iter().all(|c| c[row].is_some())
        });
        let Some(anchor) = anchor else {
            return Err(AnalyticsError::NotEnoughData(format!(
                "no row where '{}' and all proxies have prices",
                target
            )));
        };

        let base = target_prices[anchor].unwrap_or_default();
        // A zero starting price gives an infinite factor; the affected
        // composite cells come out undefined.
        Ok(columns
            .iter()
            .map(|c| base / c[anchor].unwrap_or_default())
            .collect())
    }
}

fn to_basis(prices: &[Option<f64>], basis: SeriesBasis, kind: ReturnKind) -> Vec<Measure> {
    match basis {
        SeriesBasis::Levels => prices.iter().map(|p| Measure::from(*p)).collect(),
        SeriesBasis::Returns => std::iter::once(Measure::Undefined)
            .chain(prices.windows(2).map(|w| match (w[0], w[1]) {
                (Some(previous), Some(current)) => Measure::from_f64(kind.between(previous, current)),
                _ => Measure::Undefined,
            }))
            .take(prices.len())
            .collect(),
    }
}

/// Compounds a return series from `base`, starting on the row before the
/// first defined return. An undefined return ends the path.
fn compound(returns: &[Measure], base: f64, kind: ReturnKind) -> Vec<Measure> {
    let start = returns
        .iter()
        .position(|r| !r.is_undefined())
        .map(|i| i.saturating_sub(1));
    let mut level: Option<f64> = None;

    returns
        .iter()
        .enumerate()
        .map(|(i, r)| {
            match start {
                Some(s) if i == s => level = Some(base),
                Some(s) if i > s => {
                    level = match (level, r) {
                        (Some(l), Measure::Value(r)) => Some(match kind {
                            ReturnKind::Simple => l * (1.0 + r),
                            ReturnKind::Log => l * r.exp(),
                        }),
                        _ => None,
                    }
                }
                _ => {}
            }
            Measure::from(level)
        })
        .collect()
}
