use crate::DataSource;
use crate::error::RetrievalError;
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use core_types::{DateRange, PricePoint, PriceSeries};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

pub const MOCK_PROVIDER: &str = "mock";

const DEFAULT_SEED: u64 = 42;
const START_PRICE: f64 = 100.0;
const DAILY_VOLATILITY: f64 = 0.01;

/// Synthetic prices for offline use and tests.
///
/// Each symbol gets its own geometric random walk, one close per calendar
/// day, starting at 100 with normally distributed daily log returns. The walk
/// depends only on the seed, the symbol and the range, so repeated fetches
/// return identical series.
#[derive(Debug, Clone)]
pub struct MockSource {
    seed: u64,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl MockSource {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Generates the walk synchronously; `fetch` is a thin wrapper.
    pub fn generate(&self, symbol: &str, range: &DateRange) -> Result<PriceSeries, RetrievalError> {
        if symbol.trim().is_empty() {
            return Err(RetrievalError::NotFound {
                symbol: symbol.to_string(),
                provider: MOCK_PROVIDER.to_string(),
            });
        }
        let normal = Normal::new(0.0, DAILY_VOLATILITY).map_err(|e| RetrievalError::ProviderUnavailable {
            provider: MOCK_PROVIDER.to_string(),
            reason: e.to_string(),
        })?;
        let mut rng = StdRng::seed_from_u64(self.seed ^ symbol_hash(symbol));

        let mut log_price = START_PRICE.ln();
        let points = dates(range)
            .enumerate()
            .map(|(i, date)| {
                if i > 0 {
                    log_price += normal.sample(&mut rng);
                }
                PricePoint {
                    timestamp: date.and_time(chrono::NaiveTime::MIN).and_utc(),
                    price: log_price.exp(),
                }
            })
            .collect();
        Ok(PriceSeries::new(symbol, points))
    }
}

#[async_trait]
impl DataSource for MockSource {
    fn name(&self) -> &str {
        MOCK_PROVIDER
    }

    async fn fetch(&self, symbol: &str, range: &DateRange) -> Result<PriceSeries, RetrievalError> {
        self.generate(symbol, range)
    }
}

fn dates(range: &DateRange) -> impl Iterator<Item = NaiveDate> + '_ {
    (0..range.days()).filter_map(|offset| range.start.checked_add_days(Days::new(offset as u64)))
}

/// FNV-1a over the symbol bytes; stable across builds, unlike `DefaultHasher`.
fn symbol_hash(symbol: &str) -> u64 {
    symbol
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325, |h, b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3))
}
