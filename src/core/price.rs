//! Pricing abstractions and core types

use crate::core::error::DataQualityError;
use crate::core::series::{DateRange, Observation, PriceSeries};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Display;

/// Where a price history came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    Market,
    Synthetic,
}

impl Display for HistorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                HistorySource::Market => "market",
                HistorySource::Synthetic => "synthetic",
            }
        )
    }
}

/// Daily closes as reported by a source, in the ticker's native currency.
/// Not yet validated; see [`PriceHistory::into_series`].
#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistory {
    pub symbol: String,
    pub currency: String,
    pub points: Vec<Observation>,
    pub source: HistorySource,
}

impl PriceHistory {
    pub fn into_series(self) -> Result<PriceSeries, DataQualityError> {
        PriceSeries::new(self.symbol, self.points)
    }
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_history(&self, symbol: &str, range: DateRange) -> Result<PriceHistory>;
}
