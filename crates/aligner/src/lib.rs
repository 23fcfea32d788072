//! # Parallax Aligner
//!
//! Merges the price histories of a target and its proxies onto one shared,
//! sorted timestamp index so that every downstream statistic compares prices
//! taken at the same instant.
//!
//! ## Policies
//!
//! - **Intersection** (default): the index is every timestamp seen in any series
//!   between the latest first observation and the earliest last observation. A
//!   composite is never evaluated on a date some symbol has not started trading.
//! - **Union**: every timestamp seen anywhere. Rows before a symbol's first
//!   observation are marked [`Cell::Missing`].
//!
//! In both cases a symbol without a price on an index row is forward-filled from
//! its last observation and the cell is flagged. A run longer than
//! `max_fill_run` is a hard [`AlignError::DataGap`].

pub mod error;
pub mod frame;

pub use error::AlignError;
pub use frame::{AlignedFrame, Cell, Column};

use chrono::{DateTime, Utc};
use configuration::AlignmentConfig;
use core_types::{AlignmentPolicy, DateRange, PriceSeries};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Correlation and optimization are undefined on fewer rows than this.
pub const MIN_ALIGNED_ROWS: usize = 2;

/// A stateless merger of price series, parameterized by `AlignmentConfig`.
#[derive(Debug, Clone, Default)]
pub struct Aligner {
    config: AlignmentConfig,
}

impl Aligner {
    pub fn new(config: AlignmentConfig) -> Self {
        Self { config }
    }

    /// Aligns `series` (conventionally the target first, then its proxies)
    /// onto a shared index, optionally restricted to `range`.
    pub fn align(
        &self,
        series: &[PriceSeries],
        range: Option<&DateRange>,
    ) -> Result<AlignedFrame, AlignError> {
        // --- 1. Schema checks, before anything else is derived ---
        let mut seen = HashSet::new();
        for s in series {
            validate_series(s)?;
            if !seen.insert(s.symbol.as_str()) {
                return Err(AlignError::Schema {
                    symbol: s.symbol.clone(),
                    reason: "symbol appears more than once in the request".to_string(),
                });
            }
        }

        // --- 2. Determine the window and the shared index ---
        let in_range = |ts: &DateTime<Utc>| range.is_none_or(|r| r.contains(ts));
        let mut bounds = Vec::with_capacity(series.len());
        for s in series {
            let mut stamps = s.timestamps().filter(|ts| in_range(ts));
            match stamps.next() {
                Some(first) => bounds.push((first, stamps.last().unwrap_or(first))),
                None => return Err(AlignError::InsufficientData { found: 0, required: MIN_ALIGNED_ROWS }),
            }
        }
        let Some((start, end)) = self.window(&bounds) else {
            return Err(AlignError::InsufficientData { found: 0, required: MIN_ALIGNED_ROWS });
        };

        let index: Vec<DateTime<Utc>> = series
            .iter()
            .flat_map(|s| s.timestamps())
            .filter(|ts| in_range(ts) && *ts >= start && *ts <= end)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if index.len() < MIN_ALIGNED_ROWS {
            return Err(AlignError::InsufficientData {
                found: index.len(),
                required: MIN_ALIGNED_ROWS,
            });
        }

        // --- 3. Lay every series over the index, forward-filling gaps ---
        let mut columns = Vec::with_capacity(series.len());
        for s in series {
            let cells = lay_over(s, &index);
            self.check_gaps(&s.symbol, &cells)?;
            columns.push(Column::new(s.symbol.clone(), cells));
        }

        let frame = AlignedFrame::new(index, columns);
        debug!(
            rows = frame.len(),
            symbols = frame.columns().len(),
            filled = frame.columns().iter().map(Column::filled_count).sum::<usize>(),
            policy = ?self.config.policy,
            "aligned price series"
        );
        Ok(frame)
    }

    /// Re-aligns the columns of an existing frame.
    ///
    /// For a frame without filled cells the result equals the input. Filled
    /// cells come back as observations, after which realigning is a fixed point.
    pub fn realign(&self, frame: &AlignedFrame) -> Result<AlignedFrame, AlignError> {
        self.align(&frame.to_series(), None)
    }

    fn window(&self, bounds: &[(DateTime<Utc>, DateTime<Utc>)]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let (start, end) = match self.config.policy {
            AlignmentPolicy::Intersection => (
                bounds.iter().map(|b| b.0).max()?,
                bounds.iter().map(|b| b.1).min()?,
            ),
            AlignmentPolicy::Union => (
                bounds.iter().map(|b| b.0).min()?,
                bounds.iter().map(|b| b.1).max()?,
            ),
        };
        (start <= end).then_some((start, end))
    }

    /// Fails on the first run of filled cells longer than the configured limit.
    fn check_gaps(&self, symbol: &str, cells: &[Cell]) -> Result<(), AlignError> {
        let limit = self.config.max_fill_run;
        let mut run = 0;
        // A trailing sentinel closes a run that reaches the last row.
        for cell in cells.iter().chain(std::iter::once(&Cell::Missing)) {
            if cell.is_filled() {
                run += 1;
                continue;
            }
            if run > limit {
                return Err(AlignError::DataGap {
                    symbol: symbol.to_string(),
                    gap: run,
                    limit,
                });
            }
            run = 0;
        }
        Ok(())
    }
}

fn validate_series(series: &PriceSeries) -> Result<(), AlignError> {
    let schema = |reason: String| AlignError::Schema {
        symbol: series.symbol.clone(),
        reason,
    };

    if series.symbol.trim().is_empty() {
        return Err(schema("symbol is empty".to_string()));
    }
    if series.is_empty() {
        return Err(schema("series has no prices".to_string()));
    }
    for (i, point) in series.points.iter().enumerate() {
        if !point.price.is_finite() || point.price < 0.0 {
            return Err(schema(format!(
                "price {} at {} is not a finite non-negative number",
                point.price, point.timestamp
            )));
        }
        if i > 0 {
            let previous = series.points[i - 1].timestamp;
            if point.timestamp == previous {
                return Err(schema(format!("duplicate timestamp {}", point.timestamp)));
            }
            if point.timestamp < previous {
                return Err(schema(format!(
                    "timestamp {} follows {} (not increasing)",
                    point.timestamp, previous
                )));
            }
        }
    }
    Ok(())
}

/// Walks the (sorted) series alongside the index. Observations before the
/// first index row seed the forward fill.
fn lay_over(series: &PriceSeries, index: &[DateTime<Utc>]) -> Vec<Cell> {
    let mut points = series.points.iter().peekable();
    let mut last: Option<f64> = None;

    index
        .iter()
        .map(|ts| {
            let mut exact = None;
            while let Some(point) = points.next_if(|p| p.timestamp <= *ts) {
                last = Some(point.price);
                if point.timestamp == *ts {
                    exact = Some(point.price);
                }
            }
            match (exact, last) {
                (Some(p), _) => Cell::Observed(p),
                (None, Some(p)) => Cell::Filled(p),
                (None, None) => Cell::Missing,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn series(symbol: &str, days: &[i64], prices: &[f64]) -> PriceSeries {
        PriceSeries::from_pairs(symbol, days.iter().map(|d| day(*d)).zip(prices.iter().copied()))
    }

    fn dense(symbol: &str, prices: &[f64]) -> PriceSeries {
        let days: Vec<i64> = (0..prices.len() as i64).collect();
        series(symbol, &days, prices)
    }

    #[test]
    fn identical_calendars_align_without_fills() {
        let frame = Aligner::default()
            .align(
                &[
                    dense("T", &[100.0, 101.0, 102.0]),
                    dense("A", &[50.0, 51.0, 52.0]),
                ],
                None,
            )
            .unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.column("A").unwrap().filled_count(), 0);
        assert_eq!(frame.column("T").unwrap().prices()[2], Some(102.0));
    }

    #[test]
    fn intersection_trims_to_common_window() {
        let frame = Aligner::default()
            .align(
                &[
                    series("T", &[0, 1, 2, 3, 4], &[1.0, 2.0, 3.0, 4.0, 5.0]),
                    series("A", &[2, 3, 4, 5], &[1.0, 1.0, 1.0, 1.0]),
                ],
                None,
            )
            .unwrap();
        assert_eq!(frame.index(), &[day(2), day(3), day(4)]);
    }

    #[test]
    fn holiday_is_forward_filled_and_flagged() {
        let frame = Aligner::default()
            .align(
                &[
                    series("T", &[0, 1, 2, 3], &[10.0, 11.0, 12.0, 13.0]),
                    series("A", &[0, 1, 3], &[5.0, 6.0, 8.0]),
                ],
                None,
            )
            .unwrap();
        let a = frame.column("A").unwrap();
        assert_eq!(a.cells()[2], Cell::Filled(6.0));
        assert_eq!(a.filled_count(), 1);
    }

    #[test]
    fn window_start_is_filled_from_earlier_observation() {
        let frame = Aligner::default()
            .align(
                &[
                    series("T", &[1, 2, 3], &[10.0, 11.0, 12.0]),
                    series("A", &[0, 2, 3], &[5.0, 6.0, 7.0]),
                ],
                None,
            )
            .unwrap();
        assert_eq!(frame.index()[0], day(1));
        assert_eq!(frame.column("A").unwrap().cells()[0], Cell::Filled(5.0));
    }

    #[test]
    fn six_point_gap_fails_naming_the_proxy() {
        let target_days: Vec<i64> = (0..10).collect();
        let target = series("T", &target_days, &[100.0; 10]);
        // Present on days 0, 1 and 8, 9: six consecutive missing days in between.
        let proxy = series("B", &[0, 1, 8, 9], &[1.0, 1.0, 1.0, 1.0]);

        let err = Aligner::default().align(&[target, proxy], None).unwrap_err();
        assert_eq!(
            err,
            AlignError::DataGap {
                symbol: "B".to_string(),
                gap: 6,
                limit: 5
            }
        );
    }

    #[test]
    fn five_point_gap_is_tolerated() {
        let target_days: Vec<i64> = (0..9).collect();
        let target = series("T", &target_days, &[100.0; 9]);
        let proxy = series("B", &[0, 1, 7, 8], &[1.0, 1.0, 1.0, 1.0]);
        let frame = Aligner::default().align(&[target, proxy], None).unwrap();
        assert_eq!(frame.column("B").unwrap().filled_count(), 5);
    }

    #[test]
    fn gap_limit_is_configurable() {
        let aligner = Aligner::new(AlignmentConfig {
            max_fill_run: 1,
            ..AlignmentConfig::default()
        });
        let err = aligner
            .align(
                &[
                    series("T", &[0, 1, 2, 3], &[1.0; 4]),
                    series("A", &[0, 3], &[1.0, 1.0]),
                ],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, AlignError::DataGap { gap: 2, limit: 1, .. }));
    }

    #[test]
    fn unsorted_series_is_a_schema_error() {
        let bad = series("A", &[0, 2, 1], &[1.0, 2.0, 3.0]);
        let err = Aligner::default().align(&[dense("T", &[1.0, 2.0, 3.0]), bad], None).unwrap_err();
        assert!(matches!(err, AlignError::Schema { ref symbol, .. } if symbol == "A"));
    }

    #[test]
    fn duplicate_timestamp_is_a_schema_error() {
        let bad = series("A", &[0, 1, 1], &[1.0, 2.0, 3.0]);
        let err = Aligner::default().align(&[bad], None).unwrap_err();
        assert!(matches!(err, AlignError::Schema { .. }));
    }

    #[test]
    fn negative_or_nan_prices_are_schema_errors() {
        for price in [-1.0, f64::NAN] {
            let bad = dense("A", &[1.0, price]);
            assert!(matches!(
                Aligner::default().align(&[bad], None),
                Err(AlignError::Schema { .. })
            ));
        }
    }

    #[test]
    fn duplicate_symbols_are_rejected() {
        let err = Aligner::default()
            .align(&[dense("A", &[1.0, 2.0]), dense("A", &[1.0, 2.0])], None)
            .unwrap_err();
        assert!(matches!(err, AlignError::Schema { .. }));
    }

    #[test]
    fn single_shared_row_is_insufficient() {
        let err = Aligner::default()
            .align(
                &[
                    series("T", &[0, 1, 2], &[1.0, 2.0, 3.0]),
                    series("A", &[2, 3, 4], &[1.0, 2.0, 3.0]),
                ],
                None,
            )
            .unwrap_err();
        assert_eq!(err, AlignError::InsufficientData { found: 1, required: 2 });
    }

    #[test]
    fn disjoint_series_are_insufficient() {
        let err = Aligner::default()
            .align(
                &[series("T", &[0, 1], &[1.0, 2.0]), series("A", &[5, 6], &[1.0, 2.0])],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, AlignError::InsufficientData { found: 0, .. }));
    }

    #[test]
    fn explicit_range_restricts_the_index() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
        )
        .unwrap();
        let frame = Aligner::default()
            .align(
                &[dense("T", &[1.0, 2.0, 3.0, 4.0, 5.0]), dense("A", &[1.0; 5])],
                Some(&range),
            )
            .unwrap();
        assert_eq!(frame.index(), &[day(1), day(2), day(3)]);
    }

    #[test]
    fn union_policy_marks_leading_rows_missing() {
        let aligner = Aligner::new(AlignmentConfig {
            policy: AlignmentPolicy::Union,
            ..AlignmentConfig::default()
        });
        let frame = aligner
            .align(
                &[
                    series("T", &[0, 1, 2, 3], &[1.0, 2.0, 3.0, 4.0]),
                    series("A", &[2, 3], &[7.0, 8.0]),
                ],
                None,
            )
            .unwrap();
        assert_eq!(frame.len(), 4);
        let a = frame.column("A").unwrap();
        assert_eq!(a.cells()[0], Cell::Missing);
        assert_eq!(a.cells()[2], Cell::Observed(7.0));
    }

    #[test]
    fn aligning_an_aligned_frame_is_idempotent() {
        let aligner = Aligner::default();
        let frame = aligner
            .align(
                &[
                    dense("T", &[100.0, 101.0, 102.0, 103.0]),
                    dense("A", &[100.0, 100.0, 100.0, 100.0]),
                    dense("B", &[100.0, 102.0, 104.0, 106.0]),
                ],
                None,
            )
            .unwrap();
        assert_eq!(aligner.realign(&frame).unwrap(), frame);
    }

    #[test]
    fn realigning_a_filled_frame_reaches_a_fixed_point() {
        let aligner = Aligner::default();
        let frame = aligner
            .align(
                &[
                    series("T", &[0, 1, 2, 3], &[10.0, 11.0, 12.0, 13.0]),
                    series("A", &[0, 1, 3], &[5.0, 6.0, 8.0]),
                ],
                None,
            )
            .unwrap();
        let once = aligner.realign(&frame).unwrap();
        assert_eq!(once.index(), frame.index());
        assert_eq!(once.column("A").unwrap().prices(), frame.column("A").unwrap().prices());
        assert_eq!(aligner.realign(&once).unwrap(), once);
    }
}
