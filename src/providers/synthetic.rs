//! Synthetic price histories used when a market source cannot deliver.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

use crate::core::config::SyntheticConfig;
use crate::core::error::DataUnavailable;
use crate::core::price::{HistorySource, PriceHistory, PriceProvider};
use crate::core::series::{DateRange, Observation};

/// Geometric Brownian motion over business days:
/// `p_t = p_0 * exp(r_1 + ... + r_t)` with `r ~ N(drift, volatility)`.
///
/// The generator is seeded from the symbol, so the same symbol and range
/// always produce the same history.
#[derive(Debug, Clone)]
pub struct SyntheticPriceProvider {
    params: SyntheticConfig,
    currencies: HashMap<String, String>,
    default_currency: String,
}

impl SyntheticPriceProvider {
    /// `currencies` maps a symbol to the currency its synthetic prices are
    /// labelled with; other symbols get `default_currency`.
    pub fn new(
        params: SyntheticConfig,
        currencies: HashMap<String, String>,
        default_currency: impl Into<String>,
    ) -> Self {
        Self {
            params,
            currencies,
            default_currency: default_currency.into(),
        }
    }

    pub fn generate(&self, symbol: &str, range: DateRange) -> Result<Vec<Observation>> {
        let normal = Normal::new(self.params.daily_drift, self.params.daily_volatility)
            .map_err(|e| anyhow!("Invalid synthetic parameters for {}: {}", symbol, e))?;
        let mut rng = StdRng::seed_from_u64(seed_for(symbol));

        let mut log_price = self.params.initial_price.ln();
        Ok(range
            .business_days()
            .map(|date| {
                log_price += normal.sample(&mut rng);
                Observation::new(date, log_price.exp())
            })
            .collect())
    }
}

/// FNV-1a; stable across runs and toolchains, unlike the std hasher.
fn seed_for(symbol: &str) -> u64 {
    symbol.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl PriceProvider for SyntheticPriceProvider {
    async fn fetch_history(&self, symbol: &str, range: DateRange) -> Result<PriceHistory> {
        let points = self.generate(symbol, range)?;
        let currency = self
            .currencies
            .get(symbol)
            .unwrap_or(&self.default_currency)
            .clone();
        debug!(%symbol, %currency, points = points.len(), "Generated synthetic prices");
        Ok(PriceHistory {
            symbol: symbol.to_string(),
            currency,
            points,
            source: HistorySource::Synthetic,
        })
    }
}

/// Tries `primary` first and substitutes `fallback` when the primary
/// reports [`DataUnavailable`]. Other errors are passed through.
#[derive(Debug, Clone)]
pub struct FallbackPriceProvider<P, S> {
    primary: P,
    fallback: S,
}

impl<P, S> FallbackPriceProvider<P, S> {
    pub fn new(primary: P, fallback: S) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P, S> PriceProvider for FallbackPriceProvider<P, S>
where
    P: PriceProvider,
    S: PriceProvider,
{
    #[instrument(name = "PriceFetch", skip(self), fields(symbol = %symbol))]
    async fn fetch_history(&self, symbol: &str, range: DateRange) -> Result<PriceHistory> {
        match self.primary.fetch_history(symbol, range).await {
            Ok(history) => Ok(history),
            Err(err) if err.downcast_ref::<DataUnavailable>().is_some() => {
                warn!(error = %err, "Using synthetic prices");
                let mut history = self.fallback.fetch_history(symbol, range).await?;
                history.source = HistorySource::Synthetic;
                Ok(history)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate, Weekday};

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
    }

    fn provider() -> SyntheticPriceProvider {
        SyntheticPriceProvider::new(
            SyntheticConfig::default(),
            HashMap::from([("SPY".to_string(), "USD".to_string())]),
            "EUR",
        )
    }

    struct FailingProvider;

    #[async_trait]
    impl PriceProvider for FailingProvider {
        async fn fetch_history(&self, symbol: &str, _range: DateRange) -> Result<PriceHistory> {
            Err(DataUnavailable::Prices {
                symbol: symbol.to_string(),
                reason: "offline".to_string(),
            }
            .into())
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl PriceProvider for BrokenProvider {
        async fn fetch_history(&self, _symbol: &str, _range: DateRange) -> Result<PriceHistory> {
            Err(anyhow!("unexpected failure"))
        }
    }

    #[tokio::test]
    async fn test_generates_business_days() {
        let history = provider().fetch_history("SPY", range()).await.unwrap();
        assert_eq!(history.currency, "USD");
        assert_eq!(history.source, HistorySource::Synthetic);
        // Q1 2024 has 65 weekdays
        assert_eq!(history.points.len(), 65);
        assert!(
            history
                .points
                .iter()
                .all(|p| !matches!(p.date.weekday(), Weekday::Sat | Weekday::Sun))
        );
        assert!(history.points.iter().all(|p| p.value > 0.0));
        assert!(history.into_series().is_ok());
    }

    #[test]
    fn test_same_symbol_is_reproducible() {
        let p = provider();
        assert_eq!(
            p.generate("EEM", range()).unwrap(),
            p.generate("EEM", range()).unwrap()
        );
        assert_ne!(
            p.generate("EEM", range()).unwrap(),
            p.generate("SPY", range()).unwrap()
        );
    }

    #[test]
    fn test_zero_volatility_is_pure_drift() {
        let p = SyntheticPriceProvider::new(
            SyntheticConfig {
                initial_price: 100.0,
                daily_drift: 0.001,
                daily_volatility: 0.0,
            },
            HashMap::new(),
            "EUR",
        );
        let points = p.generate("FLAT", range()).unwrap();
        assert!((points[0].value - 100.0 * 0.001f64.exp()).abs() < 1e-9);
        let n = points.len() as f64;
        assert!((points.last().unwrap().value - 100.0 * (0.001 * n).exp()).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_fallback_on_unavailable() {
        let provider = FallbackPriceProvider::new(FailingProvider, provider());
        let history = provider.fetch_history("QUAL", range()).await.unwrap();
        assert_eq!(history.source, HistorySource::Synthetic);
        assert_eq!(history.currency, "EUR");
        assert!(!history.points.is_empty());
    }

    #[tokio::test]
    async fn test_other_errors_are_not_masked() {
        let provider = FallbackPriceProvider::new(BrokenProvider, provider());
        let err = provider.fetch_history("QUAL", range()).await.unwrap_err();
        assert_eq!(err.to_string(), "unexpected failure");
    }
}
