use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::currency::CurrencyRateProvider;
use crate::core::error::DataUnavailable;
use crate::core::price::{HistorySource, PriceHistory, PriceProvider};
use crate::core::series::{DateRange, ExchangeRateSeries, Observation, RateQuote};
use crate::providers::util::with_retry;

const USER_AGENT: &str = "factorlens/0.1";
const DEFAULT_RETRIES: usize = 2;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    currency: Option<String>,
    #[serde(default, alias = "gmtoffset")]
    gmt_offset: i64,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize, Debug)]
struct AdjClose {
    adjclose: Option<Vec<Option<f64>>>,
}

impl ChartItem {
    /// Daily closes keyed by exchange-local date. Adjusted closes are
    /// preferred when `adjusted` is set and the series carries them.
    /// Null bars are skipped and repeated dates keep the later bar.
    fn daily_closes(&self, adjusted: bool) -> Vec<Observation> {
        let Some(timestamps) = self.timestamp.as_ref() else {
            return Vec::new();
        };
        let indicators = self.indicators.as_ref();
        let adjclose = indicators
            .filter(|_| adjusted)
            .and_then(|i| i.adjclose.first())
            .and_then(|a| a.adjclose.as_ref());
        let close = indicators
            .and_then(|i| i.quote.first())
            .and_then(|q| q.close.as_ref());
        let Some(values) = adjclose.or(close) else {
            return Vec::new();
        };

        let mut points: Vec<Observation> = Vec::with_capacity(timestamps.len());
        for (ts, value) in timestamps.iter().zip(values) {
            let (Some(value), Some(date)) = (value, to_local_date(*ts, self.meta.gmt_offset))
            else {
                continue;
            };
            match points.last_mut() {
                Some(last) if last.date == date => last.value = *value,
                _ => points.push(Observation::new(date, *value)),
            }
        }
        points
    }
}

fn to_local_date(timestamp: i64, gmt_offset: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp + gmt_offset, 0).map(|dt| dt.date_naive())
}

fn unix_start_of(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Shared HTTP access to the Yahoo chart endpoint.
#[derive(Debug, Clone)]
struct ChartClient {
    base_url: String,
    client: reqwest::Client,
    retries: usize,
    retry_delay_ms: u64,
}

impl ChartClient {
    fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retries: DEFAULT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        })
    }

    async fn fetch_chart(&self, symbol: &str, range: DateRange) -> Result<ChartItem> {
        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d",
            self.base_url,
            symbol,
            unix_start_of(range.start),
            unix_start_of(range.end + chrono::Days::new(1))
        );
        debug!("Requesting chart data from {}", url);

        let response = with_retry(
            || async { self.client.get(&url).send().await?.error_for_status() },
            self.retries,
            self.retry_delay_ms,
        )
        .await
        .with_context(|| format!("Request failed for symbol: {symbol}"))?;

        let text = response.text().await?;
        let data: YahooChartResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", symbol, e))?;

        if let Some(error) = data.chart.error {
            return Err(anyhow!(
                "Yahoo error for {}: {}",
                symbol,
                error.description.unwrap_or_else(|| "unknown".to_string())
            ));
        }
        data.chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| anyhow!("No chart data found for symbol: {}", symbol))
    }
}

/// Daily price histories from Yahoo Finance.
#[derive(Debug, Clone)]
pub struct YahooFinanceProvider {
    chart: ChartClient,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            chart: ChartClient::new(base_url)?,
        })
    }

    pub fn with_retries(mut self, retries: usize, delay_ms: u64) -> Self {
        self.chart.retries = retries;
        self.chart.retry_delay_ms = delay_ms;
        self
    }
}

#[async_trait]
impl PriceProvider for YahooFinanceProvider {
    #[instrument(name = "YahooPriceFetch", skip(self), fields(symbol = %symbol))]
    async fn fetch_history(&self, symbol: &str, range: DateRange) -> Result<PriceHistory> {
        let unavailable = |reason: String| DataUnavailable::Prices {
            symbol: symbol.to_string(),
            reason,
        };
        let item = self
            .chart
            .fetch_chart(symbol, range)
            .await
            .map_err(|e| unavailable(format!("{e:#}")))?;

        let points = item.daily_closes(true);
        if points.is_empty() {
            return Err(unavailable("no price bars in range".to_string()).into());
        }
        let currency = item
            .meta
            .currency
            .ok_or_else(|| unavailable("response has no currency".to_string()))?;

        debug!(bars = points.len(), %currency, "Received price history");
        Ok(PriceHistory {
            symbol: symbol.to_string(),
            currency,
            points,
            source: HistorySource::Market,
        })
    }
}

/// Daily exchange rates from Yahoo Finance currency pairs (`EURUSD=X`).
#[derive(Debug, Clone)]
pub struct YahooCurrencyProvider {
    chart: ChartClient,
}

impl YahooCurrencyProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            chart: ChartClient::new(base_url)?,
        })
    }

    pub fn with_retries(mut self, retries: usize, delay_ms: u64) -> Self {
        self.chart.retries = retries;
        self.chart.retry_delay_ms = delay_ms;
        self
    }

    /// The Yahoo pair whose quotes match `quote`.
    pub fn pair_symbol(foreign: &str, base: &str, quote: RateQuote) -> String {
        match quote {
            RateQuote::BasePerForeign => format!("{foreign}{base}=X"),
            RateQuote::ForeignPerBase => format!("{base}{foreign}=X"),
        }
    }
}

#[async_trait]
impl CurrencyRateProvider for YahooCurrencyProvider {
    #[instrument(name = "YahooRateFetch", skip(self, range))]
    async fn fetch_rates(
        &self,
        foreign: &str,
        base: &str,
        quote: RateQuote,
        range: DateRange,
    ) -> Result<ExchangeRateSeries> {
        let symbol = Self::pair_symbol(foreign, base, quote);
        let item = self
            .chart
            .fetch_chart(&symbol, range)
            .await
            .map_err(|e| DataUnavailable::Rates {
                foreign: foreign.to_string(),
                base: base.to_string(),
                reason: format!("{e:#}"),
            })?;
        let points = item.daily_closes(false);
        debug!(%symbol, rates = points.len(), "Received exchange rates");
        Ok(ExchangeRateSeries::new(foreign, base, quote, points))
    }
}
