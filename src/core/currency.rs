//! Currency conversion abstractions and base-currency normalization.

use crate::core::series::{DateRange, ExchangeRateSeries, Observation, PriceSeries, RateQuote};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, warn};

#[async_trait]
pub trait CurrencyRateProvider: Send + Sync {
    /// Daily rates between `foreign` and `base` over `range`, quoted as `quote`.
    async fn fetch_rates(
        &self,
        foreign: &str,
        base: &str,
        quote: RateQuote,
        range: DateRange,
    ) -> Result<ExchangeRateSeries>;
}

/// How each date of a converted series obtained its rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateResolution {
    pub exact: usize,
    pub forward_filled: usize,
    pub back_filled: usize,
    pub fallback: usize,
}

/// Converts native-currency price series into the base currency.
///
/// Rate lookup per price date: the exact date, else the most recent prior
/// rate, else (for dates before the first rate) the first rate, else the
/// configured fallback constant. Conversion never fails for lack of rates.
#[derive(Debug, Clone)]
pub struct CurrencyNormalizer {
    base_currency: String,
    fallback_rates: HashMap<String, f64>,
}

impl CurrencyNormalizer {
    /// `fallback_rates` maps a foreign currency to base units per foreign unit.
    pub fn new(base_currency: impl Into<String>, fallback_rates: HashMap<String, f64>) -> Self {
        Self {
            base_currency: base_currency.into(),
            fallback_rates,
        }
    }

    pub fn fallback_rate(&self, currency: &str) -> Option<f64> {
        self.fallback_rates.get(currency).copied()
    }

    /// Converts `prices` quoted in `currency` into the base currency,
    /// covering exactly the input dates.
    ///
    /// Returns `None` only when the currency differs from the base and no
    /// fallback rate is configured for it; configuration validation makes
    /// sure that cannot happen for configured assets.
    pub fn normalize(
        &self,
        prices: &PriceSeries,
        currency: &str,
        rates: Option<&ExchangeRateSeries>,
    ) -> Option<PriceSeries> {
        if currency == self.base_currency {
            debug!(symbol = %prices.symbol(), %currency, "No currency conversion needed");
            return Some(prices.clone());
        }

        let fallback = self.fallback_rate(currency)?;
        let rates = rates.filter(|r| r.foreign() == currency && r.base() == self.base_currency);

        let (points, resolution) = match rates {
            Some(rates) if !rates.is_empty() => convert_with_rates(prices, rates),
            _ => {
                warn!(
                    symbol = %prices.symbol(),
                    %currency,
                    base = %self.base_currency,
                    rate = fallback,
                    "No exchange rates available, using constant fallback rate"
                );
                let points = prices
                    .points()
                    .iter()
                    .map(|p| Observation::new(p.date, p.value * fallback))
                    .collect();
                let resolution = RateResolution {
                    fallback: prices.len(),
                    ..Default::default()
                };
                (points, resolution)
            }
        };

        debug!(
            symbol = %prices.symbol(),
            %currency,
            base = %self.base_currency,
            ?resolution,
            "Converted price series"
        );
        Some(PriceSeries::from_validated(
            prices.symbol().to_string(),
            points,
        ))
    }
}

/// Walks both date-ordered series once, carrying the last seen rate forward.
/// `rates` must be non-empty.
fn convert_with_rates(
    prices: &PriceSeries,
    rates: &ExchangeRateSeries,
) -> (Vec<Observation>, RateResolution) {
    let rate_points = rates.points();
    let mut resolution = RateResolution::default();
    let mut next = 0;
    let mut current: Option<usize> = None;

    let points = prices
        .points()
        .iter()
        .map(|p| {
            while next < rate_points.len() && rate_points[next].date <= p.date {
                current = Some(next);
                next += 1;
            }
            let index = match current {
                Some(i) if rate_points[i].date == p.date => {
                    resolution.exact += 1;
                    i
                }
                Some(i) => {
                    resolution.forward_filled += 1;
                    i
                }
                None => {
                    resolution.back_filled += 1;
                    0
                }
            };
            let rate = rates.base_per_foreign(rate_points[index].value);
            Observation::new(p.date, p.value * rate)
        })
        .collect();

    (points, resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn prices(points: &[(u32, f64)]) -> PriceSeries {
        PriceSeries::new(
            "SPY",
            points
                .iter()
                .map(|(d, p)| Observation::new(date(*d), *p))
                .collect(),
        )
        .unwrap()
    }

    fn normalizer() -> CurrencyNormalizer {
        CurrencyNormalizer::new("EUR", HashMap::from([("USD".to_string(), 0.91)]))
    }

    fn rates(quote: RateQuote, points: &[(u32, f64)]) -> ExchangeRateSeries {
        ExchangeRateSeries::new(
            "USD",
            "EUR",
            quote,
            points
                .iter()
                .map(|(d, r)| Observation::new(date(*d), *r))
                .collect(),
        )
    }

    #[test]
    fn test_identity_conversion_returns_input_unchanged() {
        let input = prices(&[(1, 100.0), (2, 101.5)]);
        let output = normalizer().normalize(&input, "EUR", None).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_missing_rate_series_uses_fallback() {
        let input = prices(&[(1, 100.0)]);
        let output = normalizer().normalize(&input, "USD", None).unwrap();
        assert_eq!(output.points()[0].value, 91.0);
    }

    #[test]
    fn test_empty_rate_series_uses_fallback() {
        let input = prices(&[(1, 100.0), (2, 200.0)]);
        let empty = rates(RateQuote::BasePerForeign, &[]);
        let output = normalizer()
            .normalize(&input, "USD", Some(&empty))
            .unwrap();
        assert_eq!(output.prices().collect::<Vec<_>>(), vec![91.0, 182.0]);
    }

    #[test]
    fn test_forward_fill_and_leading_back_fill() {
        let input = prices(&[(1, 100.0), (2, 100.0), (4, 100.0), (5, 100.0), (8, 100.0)]);
        let fx = rates(RateQuote::BasePerForeign, &[(2, 0.90), (5, 0.80), (6, 0.70)]);
        let output = normalizer().normalize(&input, "USD", Some(&fx)).unwrap();
        let values: Vec<f64> = output.prices().collect();
        // day 1 predates the first rate, day 4 carries day 2, day 8 carries day 6
        assert_eq!(values, vec![90.0, 90.0, 90.0, 80.0, 70.0]);
        assert_eq!(output.dates().collect::<Vec<_>>(), input.dates().collect::<Vec<_>>());
    }

    #[test]
    fn test_never_looks_ahead() {
        let input = prices(&[(3, 10.0), (4, 10.0)]);
        let fx = rates(RateQuote::BasePerForeign, &[(1, 0.5), (4, 2.0)]);
        let output = normalizer().normalize(&input, "USD", Some(&fx)).unwrap();
        assert_eq!(output.prices().collect::<Vec<_>>(), vec![5.0, 20.0]);
    }

    #[test]
    fn test_reciprocal_quote() {
        let input = prices(&[(1, 110.0)]);
        let fx = rates(RateQuote::ForeignPerBase, &[(1, 1.1)]);
        let output = normalizer().normalize(&input, "USD", Some(&fx)).unwrap();
        assert!((output.points()[0].value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_mismatched_rate_series_is_ignored() {
        let input = prices(&[(1, 100.0)]);
        let gbp = ExchangeRateSeries::new(
            "GBP",
            "EUR",
            RateQuote::BasePerForeign,
            vec![Observation::new(date(1), 1.2)],
        );
        let output = normalizer().normalize(&input, "USD", Some(&gbp)).unwrap();
        assert_eq!(output.points()[0].value, 91.0);
    }

    #[test]
    fn test_unknown_currency_without_fallback() {
        let input = prices(&[(1, 100.0)]);
        assert!(normalizer().normalize(&input, "JPY", None).is_none());
    }
}
