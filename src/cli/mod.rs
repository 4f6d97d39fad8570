pub mod factors;
pub mod geography;
pub mod group;
pub mod report;
pub mod setup;
pub mod ui;

use crate::core::config::AppConfig;
use crate::core::{CurrencyRateProvider, PriceProvider};
use std::path::Path;

/// What every analysis command runs against.
pub struct RunContext<'a> {
    pub config: &'a AppConfig,
    pub prices: &'a dyn PriceProvider,
    pub rates: &'a dyn CurrencyRateProvider,
    pub output_dir: Option<&'a Path>,
}
