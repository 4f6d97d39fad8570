use crate::core::allocation::{GeographyAllocationModel, validate_weights};
use crate::core::currency::CurrencyNormalizer;
use crate::core::error::ConfigError;
use crate::core::metrics::{DEFAULT_RISK_FREE_RATE, DEFAULT_TRADING_DAYS_PER_YEAR, MetricsConfig};
use crate::core::series::{DateRange, RateQuote};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::{fs, path::PathBuf};
use tracing::{debug, info};

/// One ETF in a factor or region group.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AssetConfig {
    pub name: String,
    pub symbol: String,
    pub currency: String,
    /// Initial allocation weight; only meaningful for regions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl AssetConfig {
    fn new(name: &str, symbol: &str, currency: &str) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            currency: currency.to_string(),
            weight: None,
        }
    }
}

/// How to obtain rates for one foreign currency.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CurrencyConfig {
    /// Base units per foreign unit used when no rate is available.
    pub fallback_rate: f64,
    /// Quoting of the pair to fetch, e.g. `foreign_per_base` reads EURUSD=X
    /// for USD assets in a EUR base and inverts it.
    #[serde(default = "default_quote")]
    pub quote: RateQuote,
}

fn default_quote() -> RateQuote {
    RateQuote::BasePerForeign
}

/// Drift and volatility of the synthetic fallback prices, per trading day.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub initial_price: f64,
    pub daily_drift: f64,
    pub daily_volatility: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            initial_price: 100.0,
            daily_drift: 0.0002,
            daily_volatility: 0.01,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    pub yahoo: Option<YahooProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(YahooProviderConfig {
                base_url: "https://query1.finance.yahoo.com".to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    #[serde(default = "default_currencies")]
    pub currencies: HashMap<String, CurrencyConfig>,
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,
    /// Defaults to today.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_trading_days")]
    pub trading_days_per_year: u32,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,
    #[serde(default)]
    pub factors: Vec<AssetConfig>,
    #[serde(default)]
    pub regions: Vec<AssetConfig>,
    #[serde(default)]
    pub synthetic: SyntheticConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    pub output_dir: Option<String>,
}

fn default_base_currency() -> String {
    "EUR".to_string()
}

fn default_currencies() -> HashMap<String, CurrencyConfig> {
    HashMap::from([(
        "USD".to_string(),
        CurrencyConfig {
            fallback_rate: 0.91,
            quote: RateQuote::ForeignPerBase,
        },
    )])
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or_default()
}

fn default_trading_days() -> u32 {
    DEFAULT_TRADING_DAYS_PER_YEAR
}

fn default_risk_free_rate() -> f64 {
    DEFAULT_RISK_FREE_RATE
}

fn default_rolling_window() -> usize {
    252
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_currency: default_base_currency(),
            currencies: default_currencies(),
            start_date: default_start_date(),
            end_date: None,
            trading_days_per_year: default_trading_days(),
            risk_free_rate: default_risk_free_rate(),
            rolling_window: default_rolling_window(),
            factors: vec![
                AssetConfig::new("Value", "VLUE", "USD"),
                AssetConfig::new("Momentum", "MTUM", "USD"),
                AssetConfig::new("Quality", "QUAL", "USD"),
                AssetConfig::new("Low Volatility", "USMV", "USD"),
            ],
            regions: vec![
                AssetConfig::new("US Market", "SPY", "USD"),
                AssetConfig::new("Europe", "EXSA.DE", "EUR"),
                AssetConfig::new("Emerging Markets", "EEM", "USD"),
            ],
            synthetic: SyntheticConfig::default(),
            providers: ProvidersConfig::default(),
            output_dir: None,
        }
    }
}

impl AppConfig {
    /// Loads the config from the default location, or the built-in
    /// defaults when no file exists there.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            info!(
                "No configuration at {}, using built-in defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "factorlens", "factorlens")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = &self.base_currency;
        if base.len() != 3 || !base.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::InvalidCurrency(base.clone()));
        }
        for (currency, cfg) in &self.currencies {
            if !cfg.fallback_rate.is_finite() || cfg.fallback_rate <= 0.0 {
                return Err(ConfigError::InvalidFallbackRate {
                    currency: currency.clone(),
                    rate: cfg.fallback_rate,
                });
            }
        }
        for group in [&self.factors, &self.regions] {
            let mut names = HashSet::new();
            if let Some(dup) = group.iter().find(|a| !names.insert(a.name.as_str())) {
                return Err(ConfigError::DuplicateAsset(dup.name.clone()));
            }
        }
        for asset in self.factors.iter().chain(&self.regions) {
            if asset.currency != *base && !self.currencies.contains_key(&asset.currency) {
                return Err(ConfigError::MissingFallbackRate(asset.currency.clone()));
            }
        }
        if self.trading_days_per_year == 0 {
            return Err(ConfigError::InvalidTradingDays);
        }
        if !self.risk_free_rate.is_finite() {
            return Err(ConfigError::InvalidRiskFreeRate);
        }
        if self.rolling_window < 2 {
            return Err(ConfigError::InvalidRollingWindow);
        }
        let end = self.date_range().end;
        if self.start_date > end {
            return Err(ConfigError::InvalidDateRange {
                start: self.start_date,
                end,
            });
        }
        let s = &self.synthetic;
        if !s.initial_price.is_finite() || s.initial_price <= 0.0 {
            return Err(ConfigError::InvalidSynthetic("initial_price must be positive"));
        }
        if !s.daily_drift.is_finite() {
            return Err(ConfigError::InvalidSynthetic("daily_drift must be finite"));
        }
        if !s.daily_volatility.is_finite() || s.daily_volatility < 0.0 {
            return Err(ConfigError::InvalidSynthetic(
                "daily_volatility must be non-negative",
            ));
        }
        self.region_weights().map(|_| ())
    }

    /// Configured region weights, or `None` for equal weighting.
    pub fn region_weights(&self) -> Result<Option<BTreeMap<String, f64>>, ConfigError> {
        let weighted = self.regions.iter().filter(|r| r.weight.is_some()).count();
        if weighted == 0 {
            return Ok(None);
        }
        if weighted != self.regions.len() {
            return Err(ConfigError::PartialWeights);
        }
        let weights: BTreeMap<String, f64> = self
            .regions
            .iter()
            .filter_map(|r| r.weight.map(|w| (r.name.clone(), w)))
            .collect();
        validate_weights(&weights)?;
        Ok(Some(weights))
    }

    pub fn date_range(&self) -> DateRange {
        let end = self.end_date.unwrap_or_else(|| Utc::now().date_naive());
        DateRange::new(self.start_date, end)
    }

    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            trading_days_per_year: self.trading_days_per_year,
            risk_free_rate: self.risk_free_rate,
        }
    }

    pub fn normalizer(&self) -> CurrencyNormalizer {
        let fallback_rates = self
            .currencies
            .iter()
            .map(|(currency, cfg)| (currency.clone(), cfg.fallback_rate))
            .collect();
        CurrencyNormalizer::new(self.base_currency.clone(), fallback_rates)
    }

    pub fn allocation_model(&self) -> Result<GeographyAllocationModel, ConfigError> {
        match self.region_weights()? {
            Some(weights) => GeographyAllocationModel::with_weights(weights),
            None => Ok(GeographyAllocationModel::equal_weight(
                self.regions.iter().map(|r| r.name.clone()),
            )),
        }
    }

    pub fn yahoo_base_url(&self) -> &str {
        self.providers
            .yahoo
            .as_ref()
            .map_or("https://query1.finance.yahoo.com", |p| &p.base_url)
    }
}
