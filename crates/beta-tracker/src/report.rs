use analysis_core::{align, Bar, ReturnSeries};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use factor_analysis::{
    fit_event_windows, residuals, EstimationMode, EventFit, GbmBandGenerator, GbmPathBand,
    ResidualPoint, ReturnSummary, RollingBeta, RollingEstimates, RollingFactorEstimator,
    RollingOls,
};
use serde::Serialize;

use crate::config::TrackerConfig;

/// Everything the tracker computed for one asset/benchmark pair
#[derive(Debug, Clone, Serialize)]
pub struct TrackerReport {
    pub asset: String,
    pub benchmark: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub window: usize,
    pub mode: EstimationMode,
    pub generated_at: DateTime<Utc>,
    /// Aligned observations the rolling estimates were computed over
    pub observations: usize,
    /// Windows left without an estimate because the benchmark did not move
    pub zero_variance_windows: usize,
    pub last_close: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolling_beta: Option<RollingBeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolling_ols: Option<RollingOls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residuals: Option<Vec<ResidualPoint>>,
    pub summary: ReturnSummary,
    pub band: GbmPathBand,
    pub events: Vec<EventFit>,
}

pub fn build_report(
    config: &TrackerConfig,
    asset_bars: &[Bar],
    benchmark_bars: &[Bar],
) -> Result<TrackerReport> {
    let last_close = match asset_bars.last() {
        Some(bar) => bar.close,
        None => bail!("no bars returned for {}", config.asset),
    };
    if benchmark_bars.is_empty() {
        bail!("no bars returned for {}", config.benchmark);
    }

    let asset_returns = ReturnSeries::from_bars(asset_bars)
        .with_context(|| format!("bad bars for {}", config.asset))?;
    let benchmark_returns = ReturnSeries::from_bars(benchmark_bars)
        .with_context(|| format!("bad bars for {}", config.benchmark))?;

    let pair = align(&asset_returns, &benchmark_returns);
    tracing::info!(
        "{} vs {}: {} aligned observations ({} and {} observable returns)",
        config.asset,
        config.benchmark,
        pair.len(),
        asset_returns.observable_count(),
        benchmark_returns.observable_count()
    );

    let estimator = RollingFactorEstimator::new(config.window)?;
    let estimates = estimator
        .run(&pair, config.mode)
        .with_context(|| format!("rolling estimation with window {}", estimator.window()))?;

    let residuals = match &estimates.ols {
        Some(fits) => Some(residuals(&pair, fits)?),
        None => None,
    };

    let zero_variance_windows = zero_variance_windows(&estimates);
    if zero_variance_windows > 0 {
        tracing::warn!(
            "{} windows had a constant benchmark and carry no estimate",
            zero_variance_windows
        );
    }

    let summary =
        ReturnSummary::from_returns(pair.asset()).context("summarizing asset returns")?;
    let generator = GbmBandGenerator::new(config.confidence)?;
    let band = generator
        .generate(last_close, summary.mu, summary.sigma, config.days_left)
        .context("generating price band")?;
    tracing::info!(
        "mu={:.4} sigma={:.4}, {}-day band from {:.2} (z={:.4})",
        summary.mu,
        summary.sigma,
        config.days_left,
        last_close,
        generator.z_score()
    );

    let events = fit_event_windows(&pair, &config.events)?;

    Ok(TrackerReport {
        asset: config.asset.clone(),
        benchmark: config.benchmark.clone(),
        from: config.from,
        to: config.to,
        window: config.window,
        mode: config.mode,
        generated_at: Utc::now(),
        observations: pair.len(),
        zero_variance_windows,
        last_close,
        rolling_beta: estimates.beta,
        rolling_ols: estimates.ols,
        residuals,
        summary,
        band,
        events,
    })
}

/// Both estimators flag the same windows, so whichever ran gives the count.
fn zero_variance_windows(estimates: &RollingEstimates) -> usize {
    let beta = estimates.beta.as_ref().map_or(0, |b| b.zero_variance_count());
    let ols = estimates.ols.as_ref().map_or(0, |o| o.zero_variance_count());
    beta.max(ols)
}
