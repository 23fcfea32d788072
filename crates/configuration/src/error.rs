use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file or an environment override could not be read or deserialized.
    #[error("Could not read configuration: {0}")]
    Read(#[from] config::ConfigError),

    /// The values parsed but break a cross-field rule.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
