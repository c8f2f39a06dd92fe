//! beta-tracker: rolling beta of an asset against a benchmark, plus a GBM price band.
//!
//! Fetches daily bars for both tickers from Polygon, derives close-to-close
//! returns, and writes a JSON report with the rolling covariance beta, rolling
//! OLS fits, per-event regressions and an analytic percentile band.
//!
//! Usage:
//!   cargo run -p beta-tracker -- --asset AAPL
//!   cargo run -p beta-tracker -- --asset TLT --benchmark AGG --window 60 --mode ols
//!   cargo run -p beta-tracker -- --asset AAPL --event "earnings=2024-01-25..2024-02-05"
//!   cargo run -p beta-tracker -- --asset AAPL --days-left 63 --output aapl.json

mod config;
mod report;

use analysis_core::{Bar, BarRequest, BarSource};
use anyhow::{Context, Result};
use polygon_client::{PolygonClient, PolygonConfig};

use config::{TrackerConfig, USAGE};
use report::build_report;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = TrackerConfig::from_env_and_args(&args)?;
    tracing::info!(
        "Tracking {} against {} from {} to {} (window {}, mode {})",
        config.asset,
        config.benchmark,
        config.from,
        config.to,
        config.window,
        config.mode.as_str()
    );

    let polygon_config = PolygonConfig::new(config.polygon_api_key.clone())
        .with_rate_limit(config.polygon_rate_limit)
        .with_base_url(config.polygon_base_url.clone());
    let client = PolygonClient::new(polygon_config)?;

    let (asset_bars, benchmark_bars) = fetch_pair(&client, &config).await?;
    let report = build_report(&config, &asset_bars, &benchmark_bars)?;

    let json = serde_json::to_string_pretty(&report)?;
    match &config.output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("writing report to {}", path.display()))?;
            tracing::info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

/// Logs go to stderr so stdout stays clean for the report.
fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "beta_tracker=info,polygon_client=warn".into());

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Fetch asset and benchmark bars concurrently.
async fn fetch_pair<S: BarSource>(
    source: &S,
    config: &TrackerConfig,
) -> Result<(Vec<Bar>, Vec<Bar>)> {
    let asset_request = bar_request(&config.asset, config);
    let benchmark_request = bar_request(&config.benchmark, config);

    let (asset, benchmark) = tokio::join!(
        source.fetch_bars(&asset_request),
        source.fetch_bars(&benchmark_request)
    );
    let asset = asset.with_context(|| format!("fetching bars for {}", config.asset))?;
    let benchmark =
        benchmark.with_context(|| format!("fetching bars for {}", config.benchmark))?;

    tracing::info!(
        "Fetched {} bars for {} and {} bars for {}",
        asset.len(),
        config.asset,
        benchmark.len(),
        config.benchmark
    );
    Ok((asset, benchmark))
}

fn bar_request(symbol: &str, config: &TrackerConfig) -> BarRequest {
    BarRequest {
        timespan: config.timespan,
        ..BarRequest::daily(symbol, config.from, config.to)
    }
}
