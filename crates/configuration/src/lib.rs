use crate::error::ConfigError;
use crate::settings::Config;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod optimizer_config;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use optimizer_config::{OptimizerConfig, WeightBounds};
pub use settings::{AlignmentConfig, DataSourceConfig, EngineConfig, LoggingConfig};

/// The file `load_config` looks for in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "parallax.toml";

/// Loads the application configuration from `parallax.toml` (if present) with
/// `PARALLAX__SECTION__KEY` environment variables layered on top.
///
/// Every section has defaults, so an absent file yields the default configuration.
pub fn load_config() -> Result<Config, ConfigError> {
    build(config::File::with_name(DEFAULT_CONFIG_FILE).required(false))
}

/// Loads the configuration from an explicit file, which must exist.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    build(config::File::from(path.as_ref()).required(true))
}

fn build<S>(file: S) -> Result<Config, ConfigError>
where
    S: config::Source + Send + Sync + 'static,
{
    let builder = config::Config::builder()
        .add_source(file)
        .add_source(config::Environment::with_prefix("PARALLAX").separator("__"))
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate().map_err(ConfigError::Invalid)?;

    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{AlignmentPolicy, ConstraintKind, SeriesBasis};
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file = write_toml(
            r#"
            [alignment]
            policy = "union"

            [optimizer]
            constraint = "sum_to_one"
            "#,
        );
        let cfg = load_config_from(file.path()).unwrap();
        assert_eq!(cfg.alignment.policy, AlignmentPolicy::Union);
        assert_eq!(cfg.alignment.max_fill_run, 5);
        assert_eq!(cfg.optimizer.constraint, ConstraintKind::SumToOne);
        assert_eq!(cfg.engine.drift_basis, SeriesBasis::Levels);
        assert_eq!(cfg.data_source.default_provider, "mock");
    }

    #[test]
    fn overrides_are_read_as_a_table() {
        let file = write_toml(
            r#"
            [data_source]
            default_provider = "norgate"
            fallback_to_mock = false

            [data_source.overrides]
            "BTC-USD" = "yahoo"
            "#,
        );
        let cfg = load_config_from(file.path()).unwrap();
        assert_eq!(cfg.data_source.default_provider, "norgate");
        // Key case is not guaranteed to survive the config layer; the router
        // matches symbols case-insensitively.
        let routed = cfg
            .data_source
            .overrides
            .iter()
            .find(|(symbol, _)| symbol.eq_ignore_ascii_case("BTC-USD"))
            .map(|(_, provider)| provider.as_str());
        assert_eq!(routed, Some("yahoo"));
        assert!(!cfg.data_source.fallback_to_mock);
    }

    #[test]
    fn invalid_values_fail_validation() {
        let file = write_toml(
            r#"
            [alignment]
            max_fill_run = 0
            "#,
        );
        let err = load_config_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load_config_from("/definitely/not/here/parallax.toml").is_err());
    }
}
