use serde::{Deserialize, Serialize};
use std::fmt;

/// A computed statistic that is either a finite number or explicitly undefined.
///
/// Divisions by a zero variance, returns off a zero price and cells with no
/// data all produce `Undefined`. It is never coerced to zero, so a consumer
/// rendering a heatmap or a chart can tell "no relationship" from "no answer".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    Value(f64),
    Undefined,
}

impl Measure {
    /// Wraps a raw float, mapping NaN and infinities to `Undefined`.
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            Measure::Value(value)
        } else {
            Measure::Undefined
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Measure::Value(v) => Some(*v),
            Measure::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Measure::Undefined)
    }

    /// Applies `f` to a defined value; the result is checked for finiteness again.
    pub fn map<F>(self, f: F) -> Self
    where
        F: FnOnce(f64) -> f64,
    {
        match self {
            Measure::Value(v) => Measure::from_f64(f(v)),
            Measure::Undefined => Measure::Undefined,
        }
    }
}

impl From<Option<f64>> for Measure {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Measure::Undefined, Measure::from_f64)
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Value(v) => match f.precision() {
                Some(p) => write!(f, "{:.*}", p, v),
                None => write!(f, "{}", v),
            },
            Measure::Undefined => f.write_str("undefined"),
        }
    }
}
