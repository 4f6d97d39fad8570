//! Return and risk statistics over aligned base-currency price series.
//!
//! The engine inner-joins every asset on dates, then derives per asset the
//! simple return series, the cumulative return curve, the drawdown curve and
//! a [`MetricsSummary`], plus a Pearson [`CorrelationMatrix`] across assets.
//!
//! Statistics that cannot be computed (too few observations, zero
//! volatility, no downside days) are [`Metric::Undefined`], never zero.
//! Standard deviations are sample deviations (n - 1 denominator).

use crate::core::error::DataQualityError;
use crate::core::series::{Observation, PriceSeries, ReturnSeries};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use tracing::debug;

pub const DEFAULT_TRADING_DAYS_PER_YEAR: u32 = 252;
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

/// Why a statistic has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    InsufficientData,
    ZeroVolatility,
    NoDownsideReturns,
    ZeroDownsideDeviation,
}

impl Display for UndefinedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                UndefinedReason::InsufficientData => "insufficient data",
                UndefinedReason::ZeroVolatility => "zero volatility",
                UndefinedReason::NoDownsideReturns => "no negative returns",
                UndefinedReason::ZeroDownsideDeviation => "zero downside deviation",
            }
        )
    }
}

/// A scalar statistic that is either a number or explicitly undefined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Metric {
    Defined(f64),
    Undefined(UndefinedReason),
}

impl Metric {
    pub fn value(&self) -> Option<f64> {
        match self {
            Metric::Defined(v) => Some(*v),
            Metric::Undefined(_) => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Metric::Defined(_))
    }
}

impl From<Result<f64, UndefinedReason>> for Metric {
    fn from(result: Result<f64, UndefinedReason>) -> Self {
        match result {
            Ok(v) => Metric::Defined(v),
            Err(reason) => Metric::Undefined(reason),
        }
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Defined(v) => write!(f, "{v:.4}"),
            Metric::Undefined(_) => write!(f, "N/A"),
        }
    }
}

/// Constants the engine annualizes with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsConfig {
    pub trading_days_per_year: u32,
    pub risk_free_rate: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            trading_days_per_year: DEFAULT_TRADING_DAYS_PER_YEAR,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
        }
    }
}

/// Fixed per-asset record over the aligned evaluation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_return: Metric,
    pub annualized_return: Metric,
    pub annualized_volatility: Metric,
    pub sharpe_ratio: Metric,
    /// Annualized return over annualized volatility, without the risk-free rate.
    pub return_to_risk: Metric,
    pub sortino_ratio: Metric,
    pub max_drawdown: Metric,
}

/// Everything computed for one asset.
#[derive(Debug, Clone, Serialize)]
pub struct AssetAnalysis {
    pub name: String,
    pub prices: PriceSeries,
    pub returns: ReturnSeries,
    /// Cumulative return per date, 0 at the first aligned date.
    pub cumulative: Vec<Observation>,
    pub drawdowns: Vec<Observation>,
    pub summary: MetricsSummary,
}

/// Square, symmetric matrix of Pearson correlations of daily returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub assets: Vec<String>,
    pub values: Vec<Vec<Metric>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<Metric> {
        let i = self.assets.iter().position(|n| n == a)?;
        let j = self.assets.iter().position(|n| n == b)?;
        Some(self.values[i][j])
    }
}

/// Result of one engine run over a group of assets.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub dates: Vec<NaiveDate>,
    pub assets: Vec<AssetAnalysis>,
    pub correlations: CorrelationMatrix,
}

impl Analysis {
    pub fn asset(&self, name: &str) -> Option<&AssetAnalysis> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// Best and worst assets by total return.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Performers {
    pub best: String,
    pub best_return: f64,
    pub worst: String,
    pub worst_return: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollingMetric {
    Volatility,
    Return,
    Sharpe,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsEngine {
    config: MetricsConfig,
}

impl MetricsEngine {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Aligns `assets` on their common dates and computes every statistic.
    pub fn analyze(
        &self,
        assets: &BTreeMap<String, PriceSeries>,
    ) -> Result<Analysis, DataQualityError> {
        let aligned = align(assets)?;
        let dates: Vec<NaiveDate> = aligned
            .values()
            .next()
            .map(|s| s.dates().collect())
            .unwrap_or_default();

        let assets: Vec<AssetAnalysis> = aligned
            .into_iter()
            .map(|(name, prices)| self.analyze_asset(name, prices))
            .collect();

        let returns: Vec<(String, &ReturnSeries)> = assets
            .iter()
            .map(|a| (a.name.clone(), &a.returns))
            .collect();
        let correlations = correlation_matrix(&returns);

        Ok(Analysis {
            dates,
            assets,
            correlations,
        })
    }

    pub fn analyze_asset(&self, name: String, prices: PriceSeries) -> AssetAnalysis {
        let returns = prices.returns();
        let cumulative = cumulative_returns(&prices);
        let drawdowns = drawdowns(&cumulative);
        let summary = self.summarize(&returns, &cumulative, &drawdowns);
        debug!(asset = %name, observations = prices.len(), ?summary, "Computed asset metrics");
        AssetAnalysis {
            name,
            prices,
            returns,
            cumulative,
            drawdowns,
            summary,
        }
    }

    fn summarize(
        &self,
        returns: &ReturnSeries,
        cumulative: &[Observation],
        drawdowns: &[Observation],
    ) -> MetricsSummary {
        let values = returns.values();
        let total = total_return(cumulative, values.len());
        let annualized = total.and_then(|t| self.annualize_return(t, values.len()));
        let volatility = self.annualized_volatility(&values);
        let sharpe = annualized.and_then(|r| self.sharpe(r, volatility?));
        let ratio = annualized.and_then(|r| return_to_risk(r, volatility?));
        let sortino = annualized.and_then(|r| self.sortino(r, &values));

        MetricsSummary {
            total_return: total.into(),
            annualized_return: annualized.into(),
            annualized_volatility: volatility.into(),
            sharpe_ratio: sharpe.into(),
            return_to_risk: ratio.into(),
            sortino_ratio: sortino.into(),
            max_drawdown: max_drawdown(drawdowns),
        }
    }

    /// `(1 + total)^(T / n) - 1` where `n` counts return observations.
    fn annualize_return(&self, total: f64, n: usize) -> Result<f64, UndefinedReason> {
        if n == 0 {
            return Err(UndefinedReason::InsufficientData);
        }
        let exponent = f64::from(self.config.trading_days_per_year) / n as f64;
        Ok((1.0 + total).powf(exponent) - 1.0)
    }

    fn annualized_volatility(&self, returns: &[f64]) -> Result<f64, UndefinedReason> {
        sample_std(returns)
            .map(|sd| sd * f64::from(self.config.trading_days_per_year).sqrt())
            .ok_or(UndefinedReason::InsufficientData)
    }

    fn sharpe(&self, annualized_return: f64, volatility: f64) -> Result<f64, UndefinedReason> {
        if volatility == 0.0 {
            return Err(UndefinedReason::ZeroVolatility);
        }
        Ok((annualized_return - self.config.risk_free_rate) / volatility)
    }

    fn sortino(&self, annualized_return: f64, returns: &[f64]) -> Result<f64, UndefinedReason> {
        let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        if downside.is_empty() {
            return Err(UndefinedReason::NoDownsideReturns);
        }
        let deviation = sample_std(&downside).ok_or(UndefinedReason::InsufficientData)?
            * f64::from(self.config.trading_days_per_year).sqrt();
        if deviation == 0.0 {
            return Err(UndefinedReason::ZeroDownsideDeviation);
        }
        Ok((annualized_return - self.config.risk_free_rate) / deviation)
    }

    /// Trailing-window statistic per return date; dates before the first
    /// full window are undefined.
    pub fn rolling_metric(
        &self,
        returns: &ReturnSeries,
        window: usize,
        metric: RollingMetric,
    ) -> Vec<(NaiveDate, Metric)> {
        let values = returns.values();
        let days = f64::from(self.config.trading_days_per_year);
        returns
            .points()
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if window < 2 || i + 1 < window {
                    return (p.date, Metric::Undefined(UndefinedReason::InsufficientData));
                }
                let slice = &values[i + 1 - window..=i];
                let mean = slice.iter().sum::<f64>() / window as f64;
                let volatility = self.annualized_volatility(slice);
                let value = match metric {
                    RollingMetric::Volatility => volatility,
                    RollingMetric::Return => Ok(mean * days),
                    RollingMetric::Sharpe => volatility.and_then(|v| self.sharpe(mean * days, v)),
                };
                (p.date, value.into())
            })
            .collect()
    }
}

/// Restricts every series to the dates common to all of them.
pub fn align(
    assets: &BTreeMap<String, PriceSeries>,
) -> Result<BTreeMap<String, PriceSeries>, DataQualityError> {
    let mut series = assets.values();
    let Some(first) = series.next() else {
        return Ok(BTreeMap::new());
    };
    let mut common: BTreeSet<NaiveDate> = first.dates().collect();
    for s in series {
        let dates: BTreeSet<NaiveDate> = s.dates().collect();
        common = common.intersection(&dates).copied().collect();
    }

    if assets.len() > 1 && common.is_empty() {
        return Err(DataQualityError::NoOverlap {
            symbols: assets.keys().cloned().collect(),
        });
    }

    debug!(assets = assets.len(), dates = common.len(), "Aligned assets on common dates");
    Ok(assets
        .iter()
        .map(|(name, s)| (name.clone(), s.restrict_to(&common)))
        .collect())
}

/// Running product of `(1 + r_t)` minus 1, starting at 0 on the first date.
pub fn cumulative_returns(prices: &PriceSeries) -> Vec<Observation> {
    let Some(first) = prices.points().first() else {
        return Vec::new();
    };
    let mut growth = 1.0;
    std::iter::once(Observation::new(first.date, 0.0))
        .chain(prices.returns().points().iter().map(|r| {
            growth *= 1.0 + r.value;
            Observation::new(r.date, growth - 1.0)
        }))
        .collect()
}

/// Decline of `1 + cumulative` from its running maximum; 0 at each new peak.
pub fn drawdowns(cumulative: &[Observation]) -> Vec<Observation> {
    let mut peak = f64::MIN;
    cumulative
        .iter()
        .map(|c| {
            let value = 1.0 + c.value;
            peak = peak.max(value);
            Observation::new(c.date, value / peak - 1.0)
        })
        .collect()
}

pub fn max_drawdown(drawdowns: &[Observation]) -> Metric {
    if drawdowns.len() < 2 {
        return Metric::Undefined(UndefinedReason::InsufficientData);
    }
    Metric::Defined(drawdowns.iter().map(|d| d.value).fold(0.0, f64::min))
}

fn total_return(cumulative: &[Observation], n_returns: usize) -> Result<f64, UndefinedReason> {
    match cumulative.last() {
        Some(last) if n_returns > 0 => Ok(last.value),
        _ => Err(UndefinedReason::InsufficientData),
    }
}

pub(crate) fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

/// Pearson correlation of two equally long samples.
pub fn pearson(x: &[f64], y: &[f64]) -> Metric {
    if x.len() != y.len() || x.len() < 2 {
        return Metric::Undefined(UndefinedReason::InsufficientData);
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return Metric::Undefined(UndefinedReason::ZeroVolatility);
    }
    Metric::Defined((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

fn return_to_risk(annualized_return: f64, volatility: f64) -> Result<f64, UndefinedReason> {
    if volatility == 0.0 {
        return Err(UndefinedReason::ZeroVolatility);
    }
    Ok(annualized_return / volatility)
}

/// Pairwise correlation, each pair over the dates where both assets have a
/// return. The diagonal is 1 for any asset with at least two returns.
pub fn correlation_matrix(returns: &[(String, &ReturnSeries)]) -> CorrelationMatrix {
    let n = returns.len();
    let mut values = vec![vec![Metric::Undefined(UndefinedReason::InsufficientData); n]; n];
    for i in 0..n {
        if returns[i].1.len() >= 2 {
            values[i][i] = Metric::Defined(1.0);
        }
        for j in (i + 1)..n {
            let (x, y) = paired_values(returns[i].1, returns[j].1);
            let corr = pearson(&x, &y);
            if !corr.is_defined() {
                debug!(
                    a = %returns[i].1.symbol(),
                    b = %returns[j].1.symbol(),
                    shared = x.len(),
                    "Correlation undefined"
                );
            }
            values[i][j] = corr;
            values[j][i] = corr;
        }
    }
    CorrelationMatrix {
        assets: returns.iter().map(|(name, _)| name.clone()).collect(),
        values,
    }
}

/// Values of both series on their shared dates.
fn paired_values(a: &ReturnSeries, b: &ReturnSeries) -> (Vec<f64>, Vec<f64>) {
    let (a, b) = (a.points(), b.points());
    let (mut i, mut j) = (0, 0);
    let (mut x, mut y) = (Vec::new(), Vec::new());
    while i < a.len() && j < b.len() {
        match a[i].date.cmp(&b[j].date) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                x.push(a[i].value);
                y.push(b[j].value);
                i += 1;
                j += 1;
            }
        }
    }
    (x, y)
}

/// Prices rebased so the first aligned date is 100.
pub fn relative_performance(prices: &PriceSeries) -> Vec<Observation> {
    let Some(first) = prices.points().first() else {
        return Vec::new();
    };
    prices
        .points()
        .iter()
        .map(|p| Observation::new(p.date, p.value / first.value * 100.0))
        .collect()
}

/// Best and worst asset by total return; assets with an undefined total
/// return are skipped.
pub fn best_and_worst(analysis: &Analysis) -> Option<Performers> {
    let ranked: Vec<(&str, f64)> = analysis
        .assets
        .iter()
        .filter_map(|a| a.summary.total_return.value().map(|v| (a.name.as_str(), v)))
        .collect();
    let best = ranked.iter().max_by(|a, b| a.1.total_cmp(&b.1))?;
    let worst = ranked.iter().min_by(|a, b| a.1.total_cmp(&b.1))?;
    Some(Performers {
        best: best.0.to_string(),
        best_return: best.1,
        worst: worst.0.to_string(),
        worst_return: worst.1,
    })
}
