//! Time-indexed value types flowing through the pipeline.
//!
//! All series are immutable values: every stage produces a new series
//! rather than mutating its input.

use crate::core::error::DataQualityError;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// A single dated value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Inclusive calendar date range for a data request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Monday to Friday dates within the range.
    pub fn business_days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start
            .iter_days()
            .take_while(move |d| *d <= self.end)
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
    }
}

/// Ordered daily prices for one ticker. Dates are strictly increasing and
/// every price is finite and positive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    symbol: String,
    points: Vec<Observation>,
}

impl PriceSeries {
    pub fn new(
        symbol: impl Into<String>,
        points: Vec<Observation>,
    ) -> Result<Self, DataQualityError> {
        let symbol = symbol.into();
        for (i, obs) in points.iter().enumerate() {
            if !obs.value.is_finite() {
                return Err(DataQualityError::NonFinitePrice {
                    symbol,
                    date: obs.date,
                });
            }
            if obs.value <= 0.0 {
                return Err(DataQualityError::NonPositivePrice {
                    symbol,
                    date: obs.date,
                    price: obs.value,
                });
            }
            if i > 0 && points[i - 1].date >= obs.date {
                return Err(DataQualityError::UnorderedDates {
                    symbol,
                    previous: points[i - 1].date,
                    next: obs.date,
                });
            }
        }
        Ok(Self { symbol, points })
    }

    /// Builds a series from points already known to satisfy the invariants.
    pub(crate) fn from_validated(symbol: String, points: Vec<Observation>) -> Self {
        Self { symbol, points }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[Observation] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|p| p.date)
    }

    pub fn prices(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.value)
    }

    /// Keeps only the observations whose date is in `dates`.
    pub fn restrict_to(&self, dates: &BTreeSet<NaiveDate>) -> PriceSeries {
        let points: Vec<Observation> = self
            .points
            .iter()
            .filter(|p| dates.contains(&p.date))
            .copied()
            .collect();
        debug!(
            symbol = %self.symbol,
            kept = points.len(),
            dropped = self.points.len() - points.len(),
            "Aligned price series"
        );
        Self::from_validated(self.symbol.clone(), points)
    }

    /// Period-over-period simple returns `p_t / p_{t-1} - 1`, each dated at `t`.
    pub fn returns(&self) -> ReturnSeries {
        let points = self
            .points
            .windows(2)
            .map(|w| Observation::new(w[1].date, w[1].value / w[0].value - 1.0))
            .collect();
        ReturnSeries {
            symbol: self.symbol.clone(),
            points,
        }
    }
}

/// Simple daily returns derived from a [`PriceSeries`]; one fewer
/// observation than the prices it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnSeries {
    symbol: String,
    points: Vec<Observation>,
}

impl ReturnSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<Observation>) -> Self {
        Self {
            symbol: symbol.into(),
            points,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[Observation] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }
}

/// How the values of an [`ExchangeRateSeries`] are quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateQuote {
    /// Units of base currency per one unit of foreign currency.
    BasePerForeign,
    /// Units of foreign currency per one unit of base currency.
    ForeignPerBase,
}

/// Daily exchange rates between a foreign currency and the base currency.
///
/// Rate data is of variable quality, so construction is lenient: points are
/// sorted, same-day duplicates keep the last value, and unusable rates
/// (non-finite or non-positive) are dropped and later treated as gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRateSeries {
    foreign: String,
    base: String,
    quote: RateQuote,
    points: Vec<Observation>,
}

impl ExchangeRateSeries {
    pub fn new(
        foreign: impl Into<String>,
        base: impl Into<String>,
        quote: RateQuote,
        mut points: Vec<Observation>,
    ) -> Self {
        let foreign = foreign.into();
        let base = base.into();
        let before = points.len();
        points.retain(|p| p.value.is_finite() && p.value > 0.0);
        points.sort_by_key(|p| p.date);
        // keep the last observation reported for a date
        points.reverse();
        points.dedup_by_key(|p| p.date);
        points.reverse();
        if points.len() != before {
            debug!(
                %foreign,
                %base,
                discarded = before - points.len(),
                "Discarded unusable exchange rate observations"
            );
        }
        Self {
            foreign,
            base,
            quote,
            points,
        }
    }

    pub fn foreign(&self) -> &str {
        &self.foreign
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> RateQuote {
        self.quote
    }

    pub fn points(&self) -> &[Observation] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Expresses a quoted value of this series as base units per foreign unit.
    pub fn base_per_foreign(&self, quoted: f64) -> f64 {
        match self.quote {
            RateQuote::BasePerForeign => quoted,
            RateQuote::ForeignPerBase => 1.0 / quoted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn series(prices: &[f64]) -> PriceSeries {
        let points = prices
            .iter()
            .enumerate()
            .map(|(i, p)| Observation::new(date(i as u32 + 1), *p))
            .collect();
        PriceSeries::new("TEST", points).unwrap()
    }

    #[test]
    fn test_returns_have_one_fewer_observation() {
        for n in 0usize..6 {
            let prices: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
            let s = series(&prices);
            assert_eq!(s.returns().len(), n.saturating_sub(1));
        }
    }

    #[test]
    fn test_simple_returns() {
        let returns = series(&[100.0, 110.0, 99.0, 105.0]).returns();
        let values = returns.values();
        assert!((values[0] - 0.10).abs() < 1e-12);
        assert!((values[1] + 0.10).abs() < 1e-12);
        assert!((values[2] - 0.060606).abs() < 1e-6);
        assert_eq!(returns.points()[0].date, date(2));
    }

    #[test]
    fn test_rejects_non_positive_price() {
        let points = vec![
            Observation::new(date(1), 100.0),
            Observation::new(date(2), 0.0),
        ];
        let err = PriceSeries::new("BAD", points).unwrap_err();
        assert!(matches!(err, DataQualityError::NonPositivePrice { .. }));
    }

    #[test]
    fn test_rejects_non_finite_price() {
        let points = vec![Observation::new(date(1), f64::NAN)];
        let err = PriceSeries::new("BAD", points).unwrap_err();
        assert!(matches!(err, DataQualityError::NonFinitePrice { .. }));
    }

    #[test]
    fn test_rejects_duplicate_dates() {
        let points = vec![
            Observation::new(date(2), 100.0),
            Observation::new(date(2), 101.0),
        ];
        let err = PriceSeries::new("DUP", points).unwrap_err();
        assert!(matches!(err, DataQualityError::UnorderedDates { .. }));
    }

    #[test]
    fn test_rate_series_is_cleaned() {
        let rates = ExchangeRateSeries::new(
            "USD",
            "EUR",
            RateQuote::BasePerForeign,
            vec![
                Observation::new(date(3), 0.90),
                Observation::new(date(1), 0.92),
                Observation::new(date(2), f64::NAN),
                Observation::new(date(3), 0.91),
                Observation::new(date(4), -1.0),
            ],
        );
        assert_eq!(
            rates.points(),
            &[
                Observation::new(date(1), 0.92),
                Observation::new(date(3), 0.91)
            ]
        );
    }

    #[test]
    fn test_inverted_quote() {
        let rates = ExchangeRateSeries::new(
            "USD",
            "EUR",
            RateQuote::ForeignPerBase,
            vec![Observation::new(date(1), 1.25)],
        );
        assert_eq!(rates.base_per_foreign(rates.points()[0].value), 0.8);
    }

    #[test]
    fn test_business_days_skip_weekends() {
        // 2024-01-01 is a Monday
        let range = DateRange::new(date(1), date(14));
        let days: Vec<NaiveDate> = range.business_days().collect();
        assert_eq!(days.len(), 10);
        assert!(days.iter().all(|d| d.weekday().num_days_from_monday() < 5));
    }
}
