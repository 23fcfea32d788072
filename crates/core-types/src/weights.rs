use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Weights below this magnitude are treated as summing to zero.
const ZERO_SUM_EPSILON: f64 = 1e-12;

/// An immutable mapping from proxy symbol to portfolio weight.
///
/// Every edit produces a new vector, so a solve running on one vector is never
/// affected by a concurrent UI edit of another.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WeightVector {
    weights: BTreeMap<String, f64>,
}

impl WeightVector {
    /// Builds a vector from `(symbol, weight)` pairs. Weights must be finite.
    pub fn new<I, S>(pairs: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut weights = BTreeMap::new();
        for (symbol, weight) in pairs {
            let symbol = symbol.into();
            if !weight.is_finite() {
                return Err(CoreError::NonFiniteWeight { symbol, weight });
            }
            weights.insert(symbol, weight);
        }
        Ok(Self { weights })
    }

    /// The 1/N portfolio over `symbols`.
    pub fn equal<S: AsRef<str>>(symbols: &[S]) -> Result<Self, CoreError> {
        if symbols.is_empty() {
            return Err(CoreError::EmptyBasket);
        }
        let w = 1.0 / symbols.len() as f64;
        Self::new(symbols.iter().map(|s| (s.as_ref().to_string(), w)))
    }

    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.weights.get(symbol).copied()
    }

    /// Returns a copy of this vector with `symbol` set to `weight`.
    pub fn with_weight(&self, symbol: impl Into<String>, weight: f64) -> Result<Self, CoreError> {
        let mut next = self.clone();
        let symbol = symbol.into();
        if !weight.is_finite() {
            return Err(CoreError::NonFiniteWeight { symbol, weight });
        }
        next.weights.insert(symbol, weight);
        Ok(next)
    }

    /// Rescales the weights to sum to one. A vector whose weights sum to zero
    /// falls back to equal weights over the same symbols.
    pub fn normalized(&self) -> Result<Self, CoreError> {
        let total = self.sum();
        if total.abs() < ZERO_SUM_EPSILON {
            let symbols: Vec<&str> = self.symbols().collect();
            return Self::equal(&symbols);
        }
        Self::new(self.weights.iter().map(|(s, w)| (s.clone(), w / total)))
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(s, w)| (s.as_str(), *w))
    }
}
