use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignError {
    #[error("Series '{symbol}' is malformed: {reason}")]
    Schema { symbol: String, reason: String },

    #[error("Series '{symbol}' has a gap of {gap} consecutive missing points (limit {limit})")]
    DataGap {
        symbol: String,
        gap: usize,
        limit: usize,
    },

    #[error("Not enough data to align: {found} shared timestamps, at least {required} needed")]
    InsufficientData { found: usize, required: usize },
}
