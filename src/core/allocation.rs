//! Buy-and-hold drift of a regional allocation.
//!
//! Weights move only with market returns, never through rebalancing:
//! `w_i(t) = w_i(0) * g_i(t) / sum_j w_j(0) * g_j(t)` where `g` is the
//! cumulative growth factor `1 + cumulative_return`.

use crate::core::error::{ConfigError, DataQualityError};
use crate::core::metrics::{Metric, UndefinedReason, sample_std};
use crate::core::series::ReturnSeries;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Region weights on one date. Weights are non-negative and sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationState {
    pub date: NaiveDate,
    pub weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationHistory {
    pub initial: BTreeMap<String, f64>,
    /// One state per return date.
    pub states: Vec<AllocationState>,
}

impl AllocationHistory {
    /// Weights after the last return date, or the initial weights when
    /// there were no returns to drift with.
    pub fn ending(&self) -> &BTreeMap<String, f64> {
        self.states
            .last()
            .map_or(&self.initial, |state| &state.weights)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeographyAllocationModel {
    initial: BTreeMap<String, f64>,
}

impl GeographyAllocationModel {
    pub fn equal_weight<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let regions: Vec<String> = regions.into_iter().map(Into::into).collect();
        let weight = 1.0 / regions.len().max(1) as f64;
        Self {
            initial: regions.into_iter().map(|r| (r, weight)).collect(),
        }
    }

    pub fn with_weights(weights: BTreeMap<String, f64>) -> Result<Self, ConfigError> {
        validate_weights(&weights)?;
        Ok(Self { initial: weights })
    }

    pub fn initial_weights(&self) -> &BTreeMap<String, f64> {
        &self.initial
    }

    /// Keeps only `regions`, scaling their weights back up to sum to 1.
    /// Falls back to equal weight if every remaining weight is zero.
    pub fn restricted_to<'a>(&self, regions: impl IntoIterator<Item = &'a str>) -> Self {
        let kept: BTreeMap<String, f64> = regions
            .into_iter()
            .filter_map(|r| self.initial.get(r).map(|w| (r.to_string(), *w)))
            .collect();
        let total: f64 = kept.values().sum();
        if total <= 0.0 {
            return Self::equal_weight(kept.into_keys());
        }
        Self {
            initial: kept.into_iter().map(|(r, w)| (r, w / total)).collect(),
        }
    }

    /// Lets the initial weights drift with each region's returns.
    /// Every region needs a return series, and all series must share dates.
    pub fn drift(
        &self,
        returns: &BTreeMap<String, ReturnSeries>,
    ) -> Result<AllocationHistory, DataQualityError> {
        let series = self.region_series(returns)?;

        let mut growth: Vec<f64> = vec![1.0; series.len()];
        let len = series.first().map_or(0, |(_, _, s)| s.len());
        let mut states = Vec::with_capacity(len);

        for t in 0..len {
            let mut values = Vec::with_capacity(series.len());
            for (i, (_, w0, s)) in series.iter().enumerate() {
                growth[i] *= 1.0 + s.points()[t].value;
                values.push(w0 * growth[i]);
            }
            let total: f64 = values.iter().sum();
            let weights = series
                .iter()
                .zip(&values)
                .map(|((region, _, _), v)| (region.to_string(), v / total))
                .collect();
            let date = series[0].2.points()[t].date;
            states.push(AllocationState { date, weights });
        }

        debug!(
            regions = series.len(),
            dates = states.len(),
            "Computed allocation drift"
        );
        Ok(AllocationHistory {
            initial: self.initial.clone(),
            states,
        })
    }

    /// Weighted average region volatility over the volatility of the
    /// fixed-weight basket; above 1 means the regions diversify each other.
    pub fn diversification_ratio(
        &self,
        returns: &BTreeMap<String, ReturnSeries>,
    ) -> Result<Metric, DataQualityError> {
        let series = self.region_series(returns)?;
        let len = series.first().map_or(0, |(_, _, s)| s.len());

        let mut weighted_vol = 0.0;
        for (_, w, s) in &series {
            match sample_std(&s.values()) {
                Some(sd) => weighted_vol += w * sd,
                None => return Ok(Metric::Undefined(UndefinedReason::InsufficientData)),
            }
        }

        let basket: Vec<f64> = (0..len)
            .map(|t| series.iter().map(|(_, w, s)| w * s.points()[t].value).sum())
            .collect();
        let Some(basket_vol) = sample_std(&basket) else {
            return Ok(Metric::Undefined(UndefinedReason::InsufficientData));
        };
        if basket_vol == 0.0 {
            return Ok(Metric::Undefined(UndefinedReason::ZeroVolatility));
        }
        Ok(Metric::Defined(weighted_vol / basket_vol))
    }

    /// Pairs every weighted region with its series after checking alignment.
    fn region_series<'a>(
        &'a self,
        returns: &'a BTreeMap<String, ReturnSeries>,
    ) -> Result<Vec<(&'a str, f64, &'a ReturnSeries)>, DataQualityError> {
        let mut series = Vec::with_capacity(self.initial.len());
        for (region, weight) in &self.initial {
            let s = returns
                .get(region)
                .ok_or_else(|| DataQualityError::MissingSeries(region.clone()))?;
            series.push((region.as_str(), *weight, s));
        }

        if let Some((_, _, first)) = series.first() {
            for (region, _, s) in &series[1..] {
                let aligned = s.len() == first.len()
                    && s
                        .points()
                        .iter()
                        .zip(first.points())
                        .all(|(a, b)| a.date == b.date);
                if !aligned {
                    return Err(DataQualityError::MisalignedSeries {
                        symbol: region.to_string(),
                        expected: first.len(),
                        actual: s.len(),
                    });
                }
            }
        }
        Ok(series)
    }
}

pub fn validate_weights(weights: &BTreeMap<String, f64>) -> Result<(), ConfigError> {
    for (region, weight) in weights {
        if !weight.is_finite() || *weight < 0.0 {
            return Err(ConfigError::InvalidWeight {
                region: region.clone(),
                weight: *weight,
            });
        }
    }
    let total: f64 = weights.values().sum();
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(ConfigError::WeightsDoNotSumToOne(total));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::series::Observation;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn returns(symbol: &str, values: &[f64]) -> ReturnSeries {
        ReturnSeries::new(
            symbol,
            values
                .iter()
                .enumerate()
                .map(|(i, r)| Observation::new(date(i as u32 + 2), *r))
                .collect(),
        )
    }

    #[test]
    fn test_two_region_drift() {
        let model = GeographyAllocationModel::equal_weight(["US", "Europe"]);
        let series = BTreeMap::from([
            ("US".to_string(), returns("SPY", &[0.10, 0.0, 0.0909090909090909])),
            ("Europe".to_string(), returns("EXSA", &[0.0, 0.0, 0.0])),
        ]);
        let history = model.drift(&series).unwrap();
        assert_eq!(history.states.len(), 3);
        let ending = history.ending();
        // 0.5 * 1.2 against 0.5 * 1.0
        assert!((ending["US"] - 0.6 / 1.1).abs() < 1e-9);
        assert!((ending["Europe"] - 0.5 / 1.1).abs() < 1e-9);
        assert!((ending["US"] - 0.5455).abs() < 1e-4);
    }

    #[test]
    fn test_weights_stay_normalized() {
        let model = GeographyAllocationModel::with_weights(BTreeMap::from([
            ("US".to_string(), 0.6),
            ("Europe".to_string(), 0.3),
            ("EM".to_string(), 0.1),
        ]))
        .unwrap();
        let series = BTreeMap::from([
            ("US".to_string(), returns("SPY", &[0.01, -0.02, 0.03, -0.01])),
            ("Europe".to_string(), returns("EXSA", &[-0.03, 0.02, 0.01, 0.0])),
            ("EM".to_string(), returns("EEM", &[0.05, -0.04, -0.02, 0.06])),
        ]);
        let history = model.drift(&series).unwrap();
        for state in &history.states {
            let total: f64 = state.weights.values().sum();
            assert!((total - 1.0).abs() < 1e-12);
            assert!(state.weights.values().all(|w| *w >= 0.0));
        }
        assert_eq!(history.states[0].date, date(2));
    }

    #[test]
    fn test_no_returns_keeps_initial_allocation() {
        let model = GeographyAllocationModel::equal_weight(["US", "EM"]);
        let series = BTreeMap::from([
            ("US".to_string(), returns("SPY", &[])),
            ("EM".to_string(), returns("EEM", &[])),
        ]);
        let history = model.drift(&series).unwrap();
        assert!(history.states.is_empty());
        assert_eq!(history.ending()["US"], 0.5);
    }

    #[test]
    fn test_missing_region_series() {
        let model = GeographyAllocationModel::equal_weight(["US", "EM"]);
        let series = BTreeMap::from([("US".to_string(), returns("SPY", &[0.01]))]);
        let err = model.drift(&series).unwrap_err();
        assert_eq!(err, DataQualityError::MissingSeries("EM".to_string()));
    }

    #[test]
    fn test_misaligned_series() {
        let model = GeographyAllocationModel::equal_weight(["US", "EM"]);
        let series = BTreeMap::from([
            ("US".to_string(), returns("SPY", &[0.01, 0.02])),
            ("EM".to_string(), returns("EEM", &[0.01])),
        ]);
        assert!(matches!(
            model.drift(&series),
            Err(DataQualityError::MisalignedSeries { .. })
        ));
    }

    #[test]
    fn test_invalid_weights_are_rejected() {
        let negative = BTreeMap::from([("US".to_string(), 1.5), ("EM".to_string(), -0.5)]);
        assert!(matches!(
            GeographyAllocationModel::with_weights(negative),
            Err(ConfigError::InvalidWeight { .. })
        ));
        let short = BTreeMap::from([("US".to_string(), 0.5), ("EM".to_string(), 0.4)]);
        assert!(matches!(
            GeographyAllocationModel::with_weights(short),
            Err(ConfigError::WeightsDoNotSumToOne(_))
        ));
    }

    #[test]
    fn test_restricted_to_renormalizes() {
        let model = GeographyAllocationModel::with_weights(BTreeMap::from([
            ("US".to_string(), 0.5),
            ("Europe".to_string(), 0.25),
            ("EM".to_string(), 0.25),
        ]))
        .unwrap();
        let restricted = model.restricted_to(["US", "EM"]);
        let weights = restricted.initial_weights();
        assert_eq!(weights.len(), 2);
        assert!((weights["US"] - 2.0 / 3.0).abs() < 1e-12);
        assert!((weights["EM"] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_diversification_ratio() {
        let model = GeographyAllocationModel::equal_weight(["A", "B"]);
        // perfectly offsetting regions leave a flat basket
        let hedged = BTreeMap::from([
            ("A".to_string(), returns("A", &[0.01, -0.01, 0.02])),
            ("B".to_string(), returns("B", &[-0.01, 0.01, -0.02])),
        ]);
        assert_eq!(
            model.diversification_ratio(&hedged).unwrap(),
            Metric::Undefined(UndefinedReason::ZeroVolatility)
        );

        // identical regions do not diversify
        let same = BTreeMap::from([
            ("A".to_string(), returns("A", &[0.01, -0.01, 0.02])),
            ("B".to_string(), returns("B", &[0.01, -0.01, 0.02])),
        ]);
        let ratio = model.diversification_ratio(&same).unwrap().value().unwrap();
        assert!((ratio - 1.0).abs() < 1e-9);
    }
}
