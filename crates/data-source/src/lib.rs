//! # Parallax Data Source Facade
//!
//! The one place price histories come from. Everything downstream sees a
//! `PriceSeries` or a `RetrievalError`; which provider produced it, and
//! whether a fallback was taken, stays inside this crate.
//!
//! ## Public API
//!
//! - `DataSource`: the async trait every provider implements.
//! - `DataRouter`: routes symbols to providers with per-symbol overrides and
//!   an optional fallback to `MockSource`.
//! - `MockSource`, `YahooSource`: the built-in providers.

use async_trait::async_trait;
use core_types::{DateRange, PriceSeries};

pub mod error;
pub mod mock;
pub mod router;
pub mod yahoo;

pub use error::RetrievalError;
pub use mock::MockSource;
pub use router::DataRouter;
pub use yahoo::YahooSource;

/// The generic interface for a price-history provider.
/// Implementations must return points in strictly increasing time order.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// The name routes and overrides refer to this provider by.
    fn name(&self) -> &str;

    /// Daily closes for `symbol` on the calendar dates in `range`.
    async fn fetch(&self, symbol: &str, range: &DateRange) -> Result<PriceSeries, RetrievalError>;
}
