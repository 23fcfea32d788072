//! # Parallax Correlation & Drift Engine
//!
//! Quantifies how closely a weighted basket of proxies follows a target over an
//! aligned window.
//!
//! ## Architectural Principles
//!
//! - **Pure logic:** this crate performs no I/O. It reads an `AlignedFrame`
//!   and a `WeightVector` and returns new values.
//! - **Stateless recomputation:** `DriftEngine` keeps no cache. Every slider
//!   move in a UI produces a fresh weight vector and a fresh drift series.
//! - **Explicit undefined values:** divisions by a zero variance and cells with
//!   no data surface as `Measure::Undefined`, never as zero.
//!
//! ## Public API
//!
//! - `DriftEngine`: correlation matrix, composite, drift, drift cone, report.
//! - `TrackingReport`: correlation, volatility and tracking-error figures.
//! - `TrackingDesign`: the least-squares inputs consumed by the optimizer.
//! - `AnalyticsError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod engine;
pub mod error;
pub mod report;
pub mod series;
pub mod stats;

// Re-export the key components to create a clean, public-facing API.
pub use engine::{DriftEngine, TrackingDesign};
pub use error::AnalyticsError;
pub use report::TrackingReport;
pub use series::{
    CompositeSeries, ConePoint, CorrelationMatrix, CumulativeDrift, DriftSeries, PerformancePaths,
    SeriesPoint,
};
