use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("Symbol '{0}' is not present in the aligned frame")]
    UnknownSymbol(String),

    #[error("Not enough data to perform calculation: {0}")]
    NotEnoughData(String),

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),
}
