use super::group::{self, GroupData};
use super::report::{self, AllocationReport, GroupReport};
use super::{RunContext, ui};
use crate::core::config::AppConfig;
use crate::core::metrics::MetricsEngine;
use crate::core::series::ReturnSeries;
use anyhow::{Context, Result, bail};
use comfy_table::Cell;
use std::collections::BTreeMap;

pub const REPORT_FILE: &str = "geography.json";

pub async fn run(ctx: &RunContext<'_>) -> Result<GroupReport> {
    let config = ctx.config;
    if config.regions.is_empty() {
        bail!("No regions configured");
    }

    let data = group::load_group(&config.regions, config, ctx.prices, ctx.rates).await;
    let report = analyze(&data, config)?;

    println!(
        "\n{}",
        ui::style_text("Geographic Diversification", ui::StyleType::Title)
    );
    report::display(&report);
    if let Some(allocation) = &report.allocation {
        display_allocation(allocation);
    }
    group::display_exclusions(&data);

    if let Some(dir) = ctx.output_dir {
        report::write_report(dir, REPORT_FILE, &report)?;
    }
    Ok(report)
}

/// Computes region metrics plus the buy-and-hold drift of the configured
/// allocation, renormalized over the regions that survived validation.
pub fn analyze(data: &GroupData, config: &AppConfig) -> Result<GroupReport> {
    if data.prices.is_empty() {
        bail!(
            "No usable regional price data, all {} regions were excluded",
            data.excluded.len()
        );
    }
    let engine = MetricsEngine::new(config.metrics_config());
    let analysis = engine
        .analyze(&data.prices)
        .context("Regional analysis failed")?;

    let model = config
        .allocation_model()?
        .restricted_to(analysis.assets.iter().map(|a| a.name.as_str()));
    let returns: BTreeMap<String, ReturnSeries> = analysis
        .assets
        .iter()
        .map(|a| (a.name.clone(), a.returns.clone()))
        .collect();
    let history = model.drift(&returns)?;
    let diversification_ratio = model.diversification_ratio(&returns)?;
    let ending = history.ending().clone();

    let mut report = GroupReport::build(
        "geography",
        &config.base_currency,
        data,
        &analysis,
        &engine,
        config.rolling_window,
    );
    report.allocation = Some(AllocationReport {
        initial: model.initial_weights().clone(),
        ending,
        diversification_ratio,
        history,
    });
    Ok(report)
}

fn display_allocation(allocation: &AllocationReport) {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Region"),
        ui::header_cell("Initial Weight"),
        ui::header_cell("Current Weight"),
        ui::header_cell("Drift"),
    ]);
    for (region, initial) in &allocation.initial {
        let ending = allocation.ending.get(region).copied().unwrap_or(*initial);
        table.add_row(vec![
            ui::label_cell(region),
            Cell::new(format!("{:.2}%", initial * 100.0)),
            Cell::new(format!("{:.2}%", ending * 100.0)),
            ui::change_cell((ending - initial) * 100.0),
        ]);
    }
    println!("{table}");
    println!(
        "{} {}",
        ui::style_text("Diversification ratio:", ui::StyleType::Label),
        allocation.diversification_ratio
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::series::{Observation, PriceSeries};
    use chrono::NaiveDate;

    fn series(symbol: &str, values: &[f64]) -> PriceSeries {
        PriceSeries::new(
            symbol,
            values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    Observation::new(NaiveDate::from_ymd_opt(2024, 6, i as u32 + 3).unwrap(), *v)
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_allocation_drifts_over_surviving_regions() {
        // the default config has three equally weighted regions
        let data = GroupData {
            prices: BTreeMap::from([
                ("US Market".to_string(), series("SPY", &[100.0, 110.0, 110.0, 120.0])),
                ("Europe".to_string(), series("EXSA.DE", &[50.0, 50.0, 50.0, 50.0])),
            ]),
            ..GroupData::default()
        };
        let report = analyze(&data, &AppConfig::default()).unwrap();
        let allocation = report.allocation.unwrap();

        assert_eq!(allocation.initial.len(), 2);
        assert!((allocation.initial["US Market"] - 0.5).abs() < 1e-12);
        assert_eq!(allocation.history.states.len(), 3);
        assert!((allocation.ending["US Market"] - 0.6 / 1.1).abs() < 1e-9);
        assert!((allocation.ending["Europe"] - 0.5 / 1.1).abs() < 1e-9);
        let total: f64 = allocation.ending.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_configured_weights_are_used() {
        let mut config = AppConfig::default();
        config.regions.truncate(2);
        config.regions[0].weight = Some(0.8);
        config.regions[1].weight = Some(0.2);
        let data = GroupData {
            prices: BTreeMap::from([
                ("US Market".to_string(), series("SPY", &[100.0, 101.0, 99.0])),
                ("Europe".to_string(), series("EXSA.DE", &[50.0, 49.0, 51.0])),
            ]),
            ..GroupData::default()
        };
        let report = analyze(&data, &config).unwrap();
        let allocation = report.allocation.unwrap();
        assert_eq!(allocation.initial["US Market"], 0.8);
        assert!(allocation.diversification_ratio.is_defined());
    }
}
