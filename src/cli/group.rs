//! Acquisition and normalization of one group of configured assets.

use super::ui;
use crate::core::config::{AppConfig, AssetConfig};
use crate::core::currency::{CurrencyNormalizer, CurrencyRateProvider};
use crate::core::error::ConfigError;
use crate::core::price::{HistorySource, PriceHistory, PriceProvider};
use crate::core::series::{ExchangeRateSeries, PriceSeries, RateQuote};
use anyhow::Result;
use comfy_table::Cell;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// An asset left out of the analysis, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedAsset {
    pub name: String,
    pub symbol: String,
    pub reason: String,
}

/// Validated base-currency prices for every usable asset of a group, keyed
/// by asset name.
#[derive(Debug, Clone, Default)]
pub struct GroupData {
    pub prices: BTreeMap<String, PriceSeries>,
    pub sources: BTreeMap<String, HistorySource>,
    pub excluded: Vec<ExcludedAsset>,
}

impl GroupData {
    pub fn synthetic_assets(&self) -> impl Iterator<Item = &str> {
        self.sources
            .iter()
            .filter(|(_, source)| **source == HistorySource::Synthetic)
            .map(|(name, _)| name.as_str())
    }
}

/// Fetches prices and exchange rates for `assets` concurrently, then
/// validates and converts every history to the base currency.
///
/// Never fails as a whole: an asset whose history cannot be fetched or
/// fails validation is reported in [`GroupData::excluded`].
pub async fn load_group(
    assets: &[AssetConfig],
    config: &AppConfig,
    price_provider: &dyn PriceProvider,
    rate_provider: &dyn CurrencyRateProvider,
) -> GroupData {
    let range = config.date_range();
    let base = config.base_currency.as_str();
    let currencies: BTreeSet<&str> = assets
        .iter()
        .map(|a| a.currency.as_str())
        .filter(|c| *c != base)
        .collect();

    let pb = ui::new_progress_bar((assets.len() + currencies.len()) as u64);
    let price_futures = assets.iter().map(|asset| {
        let pb = pb.clone();
        async move {
            let res = price_provider.fetch_history(&asset.symbol, range).await;
            pb.inc(1);
            res
        }
    });
    let rate_futures = currencies.iter().map(|currency| {
        let pb = pb.clone();
        let quote = config
            .currencies
            .get(*currency)
            .map_or(RateQuote::BasePerForeign, |c| c.quote);
        async move {
            let res = rate_provider
                .fetch_rates(currency, base, quote, range)
                .await;
            pb.inc(1);
            (*currency, res)
        }
    });
    let (histories, rates) = futures::join!(join_all(price_futures), join_all(rate_futures));
    pb.finish_and_clear();

    let rates: HashMap<&str, ExchangeRateSeries> = rates
        .into_iter()
        .filter_map(|(currency, res)| match res {
            Ok(series) => Some((currency, series)),
            Err(e) => {
                warn!(%currency, error = %e, "Exchange rates unavailable, fallback rate will be used");
                None
            }
        })
        .collect();

    let normalizer = config.normalizer();
    let mut data = GroupData::default();
    for (asset, history) in assets.iter().zip(histories) {
        match prepare_asset(asset, history, &normalizer, rates.get(asset.currency.as_str())) {
            Ok((series, source)) => {
                data.sources.insert(asset.name.clone(), source);
                data.prices.insert(asset.name.clone(), series);
            }
            Err(reason) => {
                warn!(asset = %asset.name, symbol = %asset.symbol, %reason, "Excluding asset");
                data.excluded.push(ExcludedAsset {
                    name: asset.name.clone(),
                    symbol: asset.symbol.clone(),
                    reason,
                });
            }
        }
    }
    debug!(
        usable = data.prices.len(),
        excluded = data.excluded.len(),
        "Loaded asset group"
    );
    data
}

fn prepare_asset(
    asset: &AssetConfig,
    history: Result<PriceHistory>,
    normalizer: &CurrencyNormalizer,
    rates: Option<&ExchangeRateSeries>,
) -> Result<(PriceSeries, HistorySource), String> {
    let history = history.map_err(|e| format!("{e:#}"))?;
    if history.currency != asset.currency {
        warn!(
            symbol = %asset.symbol,
            configured = %asset.currency,
            reported = %history.currency,
            "Source currency differs from configuration, using configured currency"
        );
    }
    let source = history.source;
    let series = history.into_series().map_err(|e| e.to_string())?;
    let normalized = normalizer
        .normalize(&series, &asset.currency, rates)
        .ok_or_else(|| ConfigError::MissingFallbackRate(asset.currency.clone()).to_string())?;
    Ok((normalized, source))
}

pub fn display_exclusions(data: &GroupData) {
    let synthetic: Vec<&str> = data.synthetic_assets().collect();
    if !synthetic.is_empty() {
        println!(
            "{}",
            ui::style_text(
                &format!("Synthetic prices used for: {}", synthetic.join(", ")),
                ui::StyleType::Warning
            )
        );
    }
    if data.excluded.is_empty() {
        return;
    }
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Excluded"),
        ui::header_cell("Symbol"),
        ui::header_cell("Reason"),
    ]);
    for excluded in &data.excluded {
        table.add_row(vec![
            Cell::new(&excluded.name),
            Cell::new(&excluded.symbol),
            Cell::new(ui::style_text(&excluded.reason, ui::StyleType::Error)),
        ]);
    }
    println!("{table}");
}
