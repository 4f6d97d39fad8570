pub mod cli;
pub mod core;
pub mod providers;

pub use crate::core::config;

use crate::cli::RunContext;
use crate::core::config::AppConfig;
use crate::providers::{
    FallbackPriceProvider, SyntheticPriceProvider, YahooCurrencyProvider, YahooFinanceProvider,
};
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    Factors,
    Geography,
    Analyze,
}

/// Command line overrides applied on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_path: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub output_dir: Option<PathBuf>,
}

pub fn load_config(options: &RunOptions) -> Result<AppConfig> {
    let mut config = match options.config_path.as_deref() {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    if let Some(start) = options.start_date {
        config.start_date = start;
    }
    if let Some(end) = options.end_date {
        config.end_date = Some(end);
    }
    if let Some(dir) = &options.output_dir {
        config.output_dir = Some(dir.display().to_string());
    }
    config.validate()?;
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

pub async fn run_command(command: AppCommand, options: &RunOptions) -> Result<()> {
    info!("factorlens starting...");
    let config = load_config(options)?;

    let base_url = config.yahoo_base_url();
    let currencies: HashMap<String, String> = config
        .factors
        .iter()
        .chain(&config.regions)
        .map(|a| (a.symbol.clone(), a.currency.clone()))
        .collect();
    let price_provider = FallbackPriceProvider::new(
        YahooFinanceProvider::new(base_url)?,
        SyntheticPriceProvider::new(
            config.synthetic.clone(),
            currencies,
            config.base_currency.clone(),
        ),
    );
    let currency_provider = YahooCurrencyProvider::new(base_url)?;

    let output_dir = config.output_dir.as_ref().map(PathBuf::from);
    let ctx = RunContext {
        config: &config,
        prices: &price_provider,
        rates: &currency_provider,
        output_dir: output_dir.as_deref(),
    };

    match command {
        AppCommand::Factors => {
            cli::factors::run(&ctx).await?;
        }
        AppCommand::Geography => {
            cli::geography::run(&ctx).await?;
        }
        AppCommand::Analyze => {
            cli::factors::run(&ctx).await?;
            cli::ui::print_separator();
            cli::geography::run(&ctx).await?;
        }
    }
    Ok(())
}
