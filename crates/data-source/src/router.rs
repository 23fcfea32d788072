use crate::DataSource;
use crate::error::RetrievalError;
use crate::mock::{MOCK_PROVIDER, MockSource};
use crate::yahoo::YahooSource;
use async_trait::async_trait;
use configuration::DataSourceConfig;
use core_types::{DateRange, PriceSeries};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// The facade the rest of the application fetches through.
///
/// Resolves each symbol to a provider (per-symbol override, else the default)
/// and, when enabled, answers from the mock provider if the routed one is
/// unavailable. Symbol lookups in the override table ignore case.
#[derive(Clone)]
pub struct DataRouter {
    providers: HashMap<String, Arc<dyn DataSource>>,
    default_provider: String,
    overrides: HashMap<String, String>,
    fallback_to_mock: bool,
}

impl std::fmt::Debug for DataRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<&String> = self.providers.keys().collect();
        providers.sort();
        f.debug_struct("DataRouter")
            .field("providers", &providers)
            .field("default_provider", &self.default_provider)
            .field("overrides", &self.overrides)
            .field("fallback_to_mock", &self.fallback_to_mock)
            .finish()
    }
}

impl DataRouter {
    /// A router with the built-in providers (`mock`, `yahoo`) registered.
    pub fn from_config(config: &DataSourceConfig) -> Result<Self, RetrievalError> {
        let yahoo: Arc<dyn DataSource> = Arc::new(YahooSource::new()?);
        Self::new(config, [yahoo])
    }

    /// A router over `providers`. The mock provider is always registered so
    /// the fallback has somewhere to go; a provider named `mock` replaces it.
    pub fn new<I>(config: &DataSourceConfig, providers: I) -> Result<Self, RetrievalError>
    where
        I: IntoIterator<Item = Arc<dyn DataSource>>,
    {
        let mut router = Self {
            providers: HashMap::new(),
            default_provider: config.default_provider.to_lowercase(),
            overrides: config
                .overrides
                .iter()
                .map(|(symbol, provider)| (symbol.to_uppercase(), provider.to_lowercase()))
                .collect(),
            fallback_to_mock: config.fallback_to_mock,
        };
        router.register(Arc::new(MockSource::default()));
        for source in providers {
            router.register(source);
        }
        router.check_routes()?;
        Ok(router)
    }

    /// Registers `source` under its own name, replacing any provider of that name.
    pub fn register(&mut self, source: Arc<dyn DataSource>) {
        self.providers.insert(source.name().to_lowercase(), source);
    }

    /// Fails if the default or any override names an unregistered provider.
    pub fn check_routes(&self) -> Result<(), RetrievalError> {
        std::iter::once(&self.default_provider)
            .chain(self.overrides.values())
            .find(|name| !self.providers.contains_key(name.as_str()))
            .map_or(Ok(()), |name| Err(RetrievalError::UnknownProvider(name.clone())))
    }

    /// The provider name `symbol` routes to.
    pub fn provider_for(&self, symbol: &str) -> &str {
        self.overrides
            .get(&symbol.to_uppercase())
            .unwrap_or(&self.default_provider)
    }

    /// Fetches every symbol concurrently. Results are in input order.
    pub async fn fetch_all(
        &self,
        symbols: &[String],
        range: &DateRange,
    ) -> Vec<Result<PriceSeries, RetrievalError>> {
        join_all(symbols.iter().map(|s| self.fetch(s, range))).await
    }

    fn source(&self, name: &str) -> Result<&Arc<dyn DataSource>, RetrievalError> {
        self.providers
            .get(name)
            .ok_or_else(|| RetrievalError::UnknownProvider(name.to_string()))
    }
}

#[async_trait]
impl DataSource for DataRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn fetch(&self, symbol: &str, range: &DateRange) -> Result<PriceSeries, RetrievalError> {
        let provider = self.provider_for(symbol);
        debug!(symbol, provider, "Routing fetch");
        let result = self.source(provider)?.fetch(symbol, range).await;

        match result {
            Err(err) if err.is_unavailable() && self.fallback_to_mock && provider != MOCK_PROVIDER => {
                warn!(symbol, provider, error = %err, "Provider unavailable; serving mock data");
                self.source(MOCK_PROVIDER)?.fetch(symbol, range).await
            }
            other => other,
        }
    }
}
