//! Error taxonomy shared by the analysis pipeline.

use chrono::NaiveDate;
use thiserror::Error;

/// A price series cannot be used for computation. Fatal for the affected
/// asset; the caller decides whether to drop it or abort the run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataQualityError {
    #[error("{symbol}: non-positive price {price} on {date}")]
    NonPositivePrice {
        symbol: String,
        date: NaiveDate,
        price: f64,
    },
    #[error("{symbol}: non-finite price on {date}")]
    NonFinitePrice { symbol: String, date: NaiveDate },
    #[error("{symbol}: dates must be strictly increasing ({previous} followed by {next})")]
    UnorderedDates {
        symbol: String,
        previous: NaiveDate,
        next: NaiveDate,
    },
    #[error("no overlapping dates across {}", .symbols.join(", "))]
    NoOverlap { symbols: Vec<String> },
    #[error("no return series for {0}")]
    MissingSeries(String),
    #[error("series for {symbol} has {actual} observations, expected {expected}")]
    MisalignedSeries {
        symbol: String,
        expected: usize,
        actual: usize,
    },
}

/// A source could not supply data. Always recovered locally: synthetic
/// prices for a missing price series, a constant for a missing rate series.
#[derive(Debug, Error)]
pub enum DataUnavailable {
    #[error("price history for {symbol} unavailable: {reason}")]
    Prices { symbol: String, reason: String },
    #[error("exchange rates {foreign}->{base} unavailable: {reason}")]
    Rates {
        foreign: String,
        base: String,
        reason: String,
    },
}

/// Malformed configuration, rejected at startup.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("base currency must be a 3-letter code: '{0}'")]
    InvalidCurrency(String),
    #[error("fallback rate for {currency} must be positive and finite, got {rate}")]
    InvalidFallbackRate { currency: String, rate: f64 },
    #[error("no fallback rate configured for currency {0}")]
    MissingFallbackRate(String),
    #[error("trading_days_per_year must be positive")]
    InvalidTradingDays,
    #[error("risk_free_rate must be finite")]
    InvalidRiskFreeRate,
    #[error("rolling_window must be at least 2")]
    InvalidRollingWindow,
    #[error("start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("weight for region '{region}' must be non-negative and finite, got {weight}")]
    InvalidWeight { region: String, weight: f64 },
    #[error("region weights must sum to 1, got {0}")]
    WeightsDoNotSumToOne(f64),
    #[error("weights must be given for every region or none")]
    PartialWeights,
    #[error("asset name '{0}' is used more than once in a group")]
    DuplicateAsset(String),
    #[error("synthetic price parameters are invalid: {0}")]
    InvalidSynthetic(&'static str),
}
