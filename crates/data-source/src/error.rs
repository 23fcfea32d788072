use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("Symbol '{symbol}' is not known to provider '{provider}'")]
    NotFound { symbol: String, provider: String },

    #[error("Provider '{provider}' is unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("Provider '{provider}' returned no prices for '{symbol}' in the requested range")]
    Empty { symbol: String, provider: String },

    #[error("Provider '{provider}' returned a malformed response: {reason}")]
    Malformed { provider: String, reason: String },

    #[error("Unknown data provider: '{0}'")]
    UnknownProvider(String),
}

impl RetrievalError {
    /// Errors the router may answer from the mock provider instead.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RetrievalError::ProviderUnavailable { .. })
    }
}
