pub mod synthetic;
pub mod util;
pub mod yahoo_finance;

pub use synthetic::{FallbackPriceProvider, SyntheticPriceProvider};
pub use yahoo_finance::{YahooCurrencyProvider, YahooFinanceProvider};
