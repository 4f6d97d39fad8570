//! Serializable per-group report carrying every computed series.

use super::group::{ExcludedAsset, GroupData};
use super::ui;
use crate::core::allocation::AllocationHistory;
use crate::core::metrics::{
    Analysis, CorrelationMatrix, Metric, MetricsEngine, MetricsSummary, Performers,
    RollingMetric, best_and_worst, relative_performance,
};
use crate::core::price::HistorySource;
use crate::core::series::Observation;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RollingPoint {
    pub date: NaiveDate,
    pub value: Metric,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetReport {
    pub name: String,
    pub symbol: String,
    pub source: HistorySource,
    pub summary: MetricsSummary,
    pub returns: Vec<Observation>,
    pub cumulative_returns: Vec<Observation>,
    pub drawdowns: Vec<Observation>,
    /// Prices rebased to 100 on the first aligned date.
    pub relative_performance: Vec<Observation>,
    pub rolling_volatility: Vec<RollingPoint>,
    pub rolling_return: Vec<RollingPoint>,
    pub rolling_sharpe: Vec<RollingPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationReport {
    pub initial: BTreeMap<String, f64>,
    pub ending: BTreeMap<String, f64>,
    pub diversification_ratio: Metric,
    pub history: AllocationHistory,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub group: String,
    pub base_currency: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub observations: usize,
    pub assets: Vec<AssetReport>,
    pub correlations: CorrelationMatrix,
    pub performers: Option<Performers>,
    pub excluded: Vec<ExcludedAsset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation: Option<AllocationReport>,
}

impl GroupReport {
    pub fn build(
        group: &str,
        base_currency: &str,
        data: &GroupData,
        analysis: &Analysis,
        engine: &MetricsEngine,
        rolling_window: usize,
    ) -> Self {
        let assets = analysis
            .assets
            .iter()
            .map(|a| {
                let rolling = |metric: RollingMetric| -> Vec<RollingPoint> {
                    engine
                        .rolling_metric(&a.returns, rolling_window, metric)
                        .into_iter()
                        .map(|(date, value)| RollingPoint { date, value })
                        .collect()
                };
                AssetReport {
                    name: a.name.clone(),
                    symbol: a.prices.symbol().to_string(),
                    source: data
                        .sources
                        .get(&a.name)
                        .copied()
                        .unwrap_or(HistorySource::Market),
                    summary: a.summary,
                    returns: a.returns.points().to_vec(),
                    cumulative_returns: a.cumulative.clone(),
                    drawdowns: a.drawdowns.clone(),
                    relative_performance: relative_performance(&a.prices),
                    rolling_volatility: rolling(RollingMetric::Volatility),
                    rolling_return: rolling(RollingMetric::Return),
                    rolling_sharpe: rolling(RollingMetric::Sharpe),
                }
            })
            .collect();

        GroupReport {
            group: group.to_string(),
            base_currency: base_currency.to_string(),
            start_date: analysis.dates.first().copied(),
            end_date: analysis.dates.last().copied(),
            observations: analysis.dates.len(),
            assets,
            correlations: analysis.correlations.clone(),
            performers: best_and_worst(analysis),
            excluded: data.excluded.clone(),
            allocation: None,
        }
    }
}

/// Prints the metrics summary, correlation matrix and best/worst performers.
pub fn display(report: &GroupReport) {
    match (report.start_date, report.end_date) {
        (Some(start), Some(end)) => println!(
            "{} {} to {} ({} trading days, {})",
            ui::style_text("Window:", ui::StyleType::Label),
            start,
            end,
            report.observations,
            report.base_currency
        ),
        _ => println!(
            "{}",
            ui::style_text("No overlapping price history", ui::StyleType::Warning)
        ),
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Asset"),
        ui::header_cell("Total Return"),
        ui::header_cell("Annual Return"),
        ui::header_cell("Volatility"),
        ui::header_cell("Sharpe"),
        ui::header_cell("Return/Risk"),
        ui::header_cell("Sortino"),
        ui::header_cell("Max Drawdown"),
    ]);
    for asset in &report.assets {
        let name = match asset.source {
            HistorySource::Synthetic => format!("{} *", asset.name),
            HistorySource::Market => asset.name.clone(),
        };
        let s = &asset.summary;
        table.add_row(vec![
            ui::label_cell(&name),
            ui::percent_cell(s.total_return),
            ui::percent_cell(s.annualized_return),
            ui::percent_cell(s.annualized_volatility),
            ui::metric_cell(s.sharpe_ratio),
            ui::metric_cell(s.return_to_risk),
            ui::metric_cell(s.sortino_ratio),
            ui::percent_cell(s.max_drawdown),
        ]);
    }
    println!("{table}");

    if report.correlations.assets.len() > 1 {
        let mut table = ui::new_styled_table();
        let mut header = vec![ui::header_cell("Correlation")];
        header.extend(report.correlations.assets.iter().map(|a| ui::header_cell(a)));
        table.set_header(header);
        for (name, row) in report.correlations.assets.iter().zip(&report.correlations.values) {
            let mut cells = vec![ui::label_cell(name)];
            cells.extend(row.iter().map(|m| ui::metric_cell(*m)));
            table.add_row(cells);
        }
        println!("{table}");
    }

    if let Some(p) = &report.performers {
        println!(
            "{} {} ({:.2}%)   {} {} ({:.2}%)",
            ui::style_text("Best:", ui::StyleType::Label),
            ui::style_text(&p.best, ui::StyleType::Highlight),
            p.best_return * 100.0,
            ui::style_text("Worst:", ui::StyleType::Label),
            ui::style_text(&p.worst, ui::StyleType::Error),
            p.worst_return * 100.0
        );
    }
}

/// Writes `report` as pretty JSON to `dir/file_name`, creating `dir`.
pub fn write_report(dir: &Path, file_name: &str, report: &GroupReport) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    let path = dir.join(file_name);
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    fs::write(&path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    info!("Wrote {} report to {}", report.group, path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metrics::MetricsConfig;
    use crate::core::series::PriceSeries;
    use tempfile::TempDir;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, day).unwrap()
    }

    fn group_data() -> GroupData {
        let series = |symbol: &str, values: &[f64]| {
            PriceSeries::new(
                symbol,
                values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| Observation::new(date(i as u32 + 1), *v))
                    .collect(),
            )
            .unwrap()
        };
        GroupData {
            prices: BTreeMap::from([
                ("Value".to_string(), series("VLUE", &[100.0, 102.0, 101.0, 104.0])),
                ("Momentum".to_string(), series("MTUM", &[50.0, 49.0, 51.0, 50.0])),
            ]),
            sources: BTreeMap::from([
                ("Value".to_string(), HistorySource::Market),
                ("Momentum".to_string(), HistorySource::Synthetic),
            ]),
            excluded: vec![ExcludedAsset {
                name: "Quality".to_string(),
                symbol: "QUAL".to_string(),
                reason: "QUAL: non-positive price 0 on 2024-02-02".to_string(),
            }],
        }
    }

    #[test]
    fn test_build_report() {
        let data = group_data();
        let engine = MetricsEngine::new(MetricsConfig::default());
        let analysis = engine.analyze(&data.prices).unwrap();
        let report = GroupReport::build("factors", "EUR", &data, &analysis, &engine, 2);

        assert_eq!(report.observations, 4);
        assert_eq!(report.start_date, Some(date(1)));
        assert_eq!(report.end_date, Some(date(4)));
        let value = report.assets.iter().find(|a| a.name == "Value").unwrap();
        assert_eq!(value.symbol, "VLUE");
        assert!((value.relative_performance[3].value - 104.0).abs() < 1e-9);
        assert_eq!(value.rolling_volatility.len(), 3);
        assert!(!value.rolling_volatility[0].value.is_defined());
        assert!(value.rolling_volatility[1].value.is_defined());
        let momentum = report.assets.iter().find(|a| a.name == "Momentum").unwrap();
        assert_eq!(momentum.source, HistorySource::Synthetic);

        let performers = report.performers.unwrap();
        assert_eq!(performers.best, "Value");
        assert_eq!(performers.worst, "Momentum");
    }

    #[test]
    fn test_write_report() -> Result<()> {
        let data = group_data();
        let engine = MetricsEngine::new(MetricsConfig::default());
        let analysis = engine.analyze(&data.prices)?;
        let report = GroupReport::build("factors", "EUR", &data, &analysis, &engine, 2);

        let temp_dir = TempDir::new()?;
        let out = temp_dir.path().join("reports");
        let path = write_report(&out, "factors.json", &report)?;
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path)?)?;

        assert_eq!(json["group"], "factors");
        assert_eq!(json["excluded"][0]["symbol"], "QUAL");
        assert_eq!(json["assets"][0]["rolling_volatility"][0]["value"], "insufficient_data");
        assert!(json["assets"][0]["summary"]["total_return"].is_number());
        assert!(json.get("allocation").is_none());
        Ok(())
    }
}
