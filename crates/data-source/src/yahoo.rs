use crate::DataSource;
use crate::error::RetrievalError;
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveTime, Utc};
use core_types::{DateRange, PricePoint, PriceSeries};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const YAHOO_PROVIDER: &str = "yahoo";

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Daily closes from the Yahoo Finance chart endpoint, split- and
/// dividend-adjusted when the response carries adjusted closes.
#[derive(Debug, Clone)]
pub struct YahooSource {
    client: reqwest::Client,
    base_url: String,
}

impl YahooSource {
    pub fn new() -> Result<Self, RetrievalError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("parallax/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl DataSource for YahooSource {
    fn name(&self) -> &str {
        YAHOO_PROVIDER
    }

    async fn fetch(&self, symbol: &str, range: &DateRange) -> Result<PriceSeries, RetrievalError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let period1 = range.start.and_time(NaiveTime::MIN).and_utc().timestamp();
        // The end date is inclusive, the endpoint's bound is not.
        let period2 = range
            .end
            .checked_add_days(Days::new(1))
            .unwrap_or(range.end)
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();

        debug!(symbol, period1, period2, "Requesting Yahoo chart");
        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "history".to_string()),
            ])
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| unavailable(e.to_string()))?;
        if status == StatusCode::NOT_FOUND {
            return Err(not_found(symbol));
        }
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {}", status)));
        }

        parse_chart(symbol, &text, range)
    }
}

// --- Response shapes ---

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<Meta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Meta {
    /// Seconds east of UTC for the listing exchange.
    #[serde(default)]
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Turns a chart payload into a series. Null closes (halted days) are
/// dropped, as are bars outside `range`.
///
/// Bars are stamped at 00:00 UTC of their exchange-local trading date, so an
/// equity bar opening at 09:30 New York time and a crypto bar opening at
/// midnight UTC on the same day share a timestamp. A second bar on the same
/// trading date replaces the first.
fn parse_chart(symbol: &str, body: &str, range: &DateRange) -> Result<PriceSeries, RetrievalError> {
    let envelope: ChartEnvelope = serde_json::from_str(body).map_err(|e| RetrievalError::Malformed {
        provider: YAHOO_PROVIDER.to_string(),
        reason: e.to_string(),
    })?;

    if let Some(error) = envelope.chart.error {
        return Err(if error.code.eq_ignore_ascii_case("not found") {
            not_found(symbol)
        } else {
            unavailable(format!(
                "{}: {}",
                error.code,
                error.description.unwrap_or_default()
            ))
        });
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Err(not_found(symbol));
    };

    let closes = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|a| a.adjclose)
        .filter(|c| !c.is_empty())
        .or_else(|| result.indicators.quote.into_iter().next().map(|q| q.close))
        .unwrap_or_default();

    let offset = result.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
    let mut points: Vec<PricePoint> = Vec::with_capacity(result.timestamp.len());
    for (ts, close) in result.timestamp.iter().zip(closes) {
        let Some(timestamp) = trading_day(*ts, offset) else {
            continue;
        };
        let Some(price) = close.filter(|p| p.is_finite()) else {
            continue;
        };
        if !range.contains(&timestamp) {
            continue;
        }
        match points.last_mut() {
            Some(last) if last.timestamp == timestamp => last.price = price,
            _ => points.push(PricePoint { timestamp, price }),
        }
    }

    if points.is_empty() {
        return Err(RetrievalError::Empty {
            symbol: symbol.to_string(),
            provider: YAHOO_PROVIDER.to_string(),
        });
    }
    Ok(PriceSeries::new(symbol, points))
}

/// Midnight UTC of the exchange-local date of a bar opening at `ts`.
fn trading_day(ts: i64, gmtoffset: i64) -> Option<DateTime<Utc>> {
    let local = DateTime::<Utc>::from_timestamp(ts.checked_add(gmtoffset)?, 0)?;
    Some(local.date_naive().and_time(NaiveTime::MIN).and_utc())
}

fn unavailable(reason: String) -> RetrievalError {
    RetrievalError::ProviderUnavailable {
        provider: YAHOO_PROVIDER.to_string(),
        reason,
    }
}

fn not_found(symbol: &str) -> RetrievalError {
    RetrievalError::NotFound {
        symbol: symbol.to_string(),
        provider: YAHOO_PROVIDER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn january() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn prefers_adjusted_closes_and_skips_nulls() {
        // 2024-01-02, 2024-01-03, 2024-01-04 at 14:30 UTC
        let body = r#"{"chart":{"result":[{
            "timestamp":[1704205800,1704292200,1704378600],
            "indicators":{
                "quote":[{"close":[101.0,102.0,103.0]}],
                "adjclose":[{"adjclose":[100.5,null,102.5]}]
            }}],"error":null}}"#;
        let series = parse_chart("SPY", body, &january()).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.points[1].timestamp, midnight(2024, 1, 4));
        assert_eq!(series.points[0].price, 100.5);
        assert_eq!(series.points[1].price, 102.5);
    }

    fn midnight(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_time(NaiveTime::MIN).and_utc()
    }

    #[test]
    fn equity_and_crypto_bars_share_the_trading_date() {
        // 2024-01-02 09:30 in New York (UTC-5)
        let equity = r#"{"chart":{"result":[{
            "meta":{"symbol":"SPY","gmtoffset":-18000,"exchangeTimezoneName":"America/New_York"},
            "timestamp":[1704205800],
            "indicators":{"quote":[{"close":[472.65]}]}}],"error":null}}"#;
        // 2024-01-02 00:00 UTC
        let crypto = r#"{"chart":{"result":[{
            "meta":{"symbol":"BTC-USD","gmtoffset":0,"exchangeTimezoneName":"UTC"},
            "timestamp":[1704153600],
            "indicators":{"quote":[{"close":[45897.57]}]}}],"error":null}}"#;

        let spy = parse_chart("SPY", equity, &january()).unwrap();
        let btc = parse_chart("BTC-USD", crypto, &january()).unwrap();
        assert_eq!(spy.points[0].timestamp, midnight(2024, 1, 2));
        assert_eq!(btc.points[0].timestamp, spy.points[0].timestamp);
    }

    #[test]
    fn late_evening_bars_stay_on_their_local_date() {
        // 2024-01-03 01:00 UTC is still 2024-01-02 in New York.
        let body = r#"{"chart":{"result":[{
            "meta":{"gmtoffset":-18000},
            "timestamp":[1704243600,1704247200],
            "indicators":{"quote":[{"close":[1.0,2.0]}]}}],"error":null}}"#;
        let series = parse_chart("X", body, &january()).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.points[0].timestamp, midnight(2024, 1, 2));
        assert_eq!(series.points[0].price, 2.0);
    }

    #[test]
    fn falls_back_to_raw_closes() {
        let body = r#"{"chart":{"result":[{
            "timestamp":[1704205800],
            "indicators":{"quote":[{"close":[99.0]}]}}],"error":null}}"#;
        let series = parse_chart("BTC-USD", body, &january()).unwrap();
        assert_eq!(series.points[0].price, 99.0);
    }

    #[test]
    fn maps_provider_errors() {
        let missing = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert!(matches!(
            parse_chart("NOPE", missing, &january()),
            Err(RetrievalError::NotFound { .. })
        ));

        let outside = r#"{"chart":{"result":[{
            "timestamp":[1706832000],
            "indicators":{"quote":[{"close":[1.0]}]}}],"error":null}}"#;
        assert!(matches!(
            parse_chart("SPY", outside, &january()),
            Err(RetrievalError::Empty { .. })
        ));

        assert!(matches!(
            parse_chart("SPY", "<html>", &january()),
            Err(RetrievalError::Malformed { .. })
        ));
    }
}
