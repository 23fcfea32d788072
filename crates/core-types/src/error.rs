use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Weight for {symbol} must be finite, got {weight}")]
    NonFiniteWeight { symbol: String, weight: f64 },

    #[error("A basket needs at least one proxy symbol")]
    EmptyBasket,
}
