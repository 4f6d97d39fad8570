//! Core business logic abstractions

pub mod allocation;
pub mod config;
pub mod currency;
pub mod error;
pub mod log;
pub mod metrics;
pub mod price;
pub mod series;

// Re-export main types for cleaner imports
pub use allocation::{AllocationHistory, GeographyAllocationModel};
pub use config::AppConfig;
pub use currency::{CurrencyNormalizer, CurrencyRateProvider};
pub use error::{ConfigError, DataQualityError, DataUnavailable};
pub use metrics::{Analysis, Metric, MetricsConfig, MetricsEngine};
pub use price::{HistorySource, PriceHistory, PriceProvider};
pub use series::{DateRange, ExchangeRateSeries, Observation, PriceSeries, RateQuote, ReturnSeries};
