use super::group::{self, GroupData};
use super::report::{self, GroupReport};
use super::{RunContext, ui};
use crate::core::config::AppConfig;
use crate::core::metrics::MetricsEngine;
use anyhow::{Context, Result, bail};

pub const REPORT_FILE: &str = "factors.json";

pub async fn run(ctx: &RunContext<'_>) -> Result<GroupReport> {
    let config = ctx.config;
    if config.factors.is_empty() {
        bail!("No factors configured");
    }

    let data = group::load_group(&config.factors, config, ctx.prices, ctx.rates).await;
    let report = analyze(&data, config)?;

    println!(
        "\n{}",
        ui::style_text("Factor Performance", ui::StyleType::Title)
    );
    report::display(&report);
    group::display_exclusions(&data);

    if let Some(dir) = ctx.output_dir {
        report::write_report(dir, REPORT_FILE, &report)?;
    }
    Ok(report)
}

/// Runs the metrics engine over the usable factors.
pub fn analyze(data: &GroupData, config: &AppConfig) -> Result<GroupReport> {
    if data.prices.is_empty() {
        bail!(
            "No usable factor price data, all {} factors were excluded",
            data.excluded.len()
        );
    }
    let engine = MetricsEngine::new(config.metrics_config());
    let analysis = engine
        .analyze(&data.prices)
        .context("Factor analysis failed")?;
    Ok(GroupReport::build(
        "factors",
        &config.base_currency,
        data,
        &analysis,
        &engine,
        config.rolling_window,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DataQualityError;
    use crate::core::series::{Observation, PriceSeries};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn series(symbol: &str, month: u32, values: &[f64]) -> PriceSeries {
        PriceSeries::new(
            symbol,
            values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    Observation::new(NaiveDate::from_ymd_opt(2024, month, i as u32 + 1).unwrap(), *v)
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_analyze_factors() {
        let data = GroupData {
            prices: BTreeMap::from([
                ("Value".to_string(), series("VLUE", 3, &[10.0, 11.0, 12.1])),
                ("Quality".to_string(), series("QUAL", 3, &[20.0, 19.0, 19.0])),
            ]),
            ..GroupData::default()
        };
        let report = analyze(&data, &AppConfig::default()).unwrap();
        assert_eq!(report.group, "factors");
        assert_eq!(report.assets.len(), 2);
        let value = report.assets.iter().find(|a| a.name == "Value").unwrap();
        assert!((value.summary.total_return.value().unwrap() - 0.21).abs() < 1e-9);
        assert_eq!(report.performers.unwrap().best, "Value");
    }

    #[test]
    fn test_disjoint_factors_fail() {
        let data = GroupData {
            prices: BTreeMap::from([
                ("Value".to_string(), series("VLUE", 3, &[10.0, 11.0])),
                ("Quality".to_string(), series("QUAL", 4, &[20.0, 19.0])),
            ]),
            ..GroupData::default()
        };
        let err = analyze(&data, &AppConfig::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataQualityError>(),
            Some(DataQualityError::NoOverlap { .. })
        ));
    }

    #[test]
    fn test_all_factors_excluded() {
        let err = analyze(&GroupData::default(), &AppConfig::default()).unwrap_err();
        assert!(err.to_string().contains("No usable factor price data"));
    }
}
