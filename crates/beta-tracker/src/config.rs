use analysis_core::{EventWindow, Timespan};
use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use factor_analysis::{EstimationMode, DEFAULT_CONFIDENCE, MAX_DAYS_LEFT};
use polygon_client::{DEFAULT_BASE_URL, DEFAULT_RATE_LIMIT};
use std::env;
use std::path::PathBuf;

pub const USAGE: &str = "\
Usage:
  beta-tracker --asset TICKER [options]

Options:
  --benchmark TICKER          Benchmark ticker (default: SPY)
  --from YYYY-MM-DD           First date to fetch (default: 2023-01-01)
  --to YYYY-MM-DD             Last date to fetch (default: 2025-01-01)
  --timespan day|week|...     Bar granularity (default: day)
  --window N                  Rolling window length, >= 2 (default: 20, env TRACKER_WINDOW)
  --mode covariance|ols|both  Rolling estimates to produce (default: both)
  --days-left N               Trading days to project forward (default: 21, env TRACKER_DAYS_LEFT)
  --confidence P              Central band width in (0, 1) (default: 0.80, env TRACKER_CONFIDENCE)
  --event LABEL=START..END    Fit a regression over a named date range (repeatable)
  --output PATH               Write the JSON report to PATH instead of stdout

Environment:
  POLYGON_API_KEY             Required
  POLYGON_RATE_LIMIT          Requests per minute (default: 500, free tier: 5)
  POLYGON_BASE_URL            API root (default: https://api.polygon.io)";

const DEFAULT_BENCHMARK: &str = "SPY";
const DEFAULT_FROM: &str = "2023-01-01";
const DEFAULT_TO: &str = "2025-01-01";
const DEFAULT_WINDOW: usize = 20;
const DEFAULT_DAYS_LEFT: i64 = 21;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub polygon_api_key: String,
    pub polygon_rate_limit: usize,
    pub polygon_base_url: String,

    pub asset: String,
    pub benchmark: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub timespan: Timespan,

    pub window: usize,
    pub mode: EstimationMode,
    pub days_left: i64,
    pub confidence: f64,
    pub events: Vec<EventWindow>,

    pub output: Option<PathBuf>,
}

impl TrackerConfig {
    /// Environment supplies defaults and credentials; argv overrides.
    pub fn from_env_and_args(args: &[String]) -> Result<Self> {
        Self::from_sources(args, |key| env::var(key).ok())
    }

    pub fn from_sources<F>(args: &[String], env_var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let polygon_api_key = env_var("POLYGON_API_KEY").context("POLYGON_API_KEY not set")?;
        let polygon_rate_limit: usize = match env_var("POLYGON_RATE_LIMIT") {
            Some(v) => v.parse().context("POLYGON_RATE_LIMIT must be an integer")?,
            None => DEFAULT_RATE_LIMIT,
        };
        let polygon_base_url =
            env_var("POLYGON_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let asset = flag_value(args, "--asset")
            .ok_or_else(|| anyhow!("--asset is required\n\n{}", USAGE))?
            .to_uppercase();
        let benchmark = flag_value(args, "--benchmark")
            .unwrap_or(DEFAULT_BENCHMARK)
            .to_uppercase();

        let from = parse_date(flag_value(args, "--from").unwrap_or(DEFAULT_FROM))
            .context("invalid --from")?;
        let to =
            parse_date(flag_value(args, "--to").unwrap_or(DEFAULT_TO)).context("invalid --to")?;
        if from > to {
            bail!("--from ({}) is after --to ({})", from, to);
        }

        let timespan = Timespan::parse(flag_value(args, "--timespan").unwrap_or("day"))?;

        let raw_window = flag_value(args, "--window")
            .map(str::to_string)
            .or_else(|| env_var("TRACKER_WINDOW"));
        let window: usize = match raw_window {
            Some(v) => v.parse().with_context(|| format!("invalid window '{}'", v))?,
            None => DEFAULT_WINDOW,
        };
        if window < 2 {
            bail!("window must be at least 2, got {}", window);
        }

        let mode = match flag_value(args, "--mode") {
            Some(v) => EstimationMode::parse(v)?,
            None => EstimationMode::Both,
        };

        let raw_days_left = flag_value(args, "--days-left")
            .map(str::to_string)
            .or_else(|| env_var("TRACKER_DAYS_LEFT"));
        let days_left: i64 = match raw_days_left {
            Some(v) => v.parse().with_context(|| format!("invalid days-left '{}'", v))?,
            None => DEFAULT_DAYS_LEFT,
        };
        if !(0..=MAX_DAYS_LEFT).contains(&days_left) {
            bail!("days-left must lie in 0..={}, got {}", MAX_DAYS_LEFT, days_left);
        }

        let raw_confidence = flag_value(args, "--confidence")
            .map(str::to_string)
            .or_else(|| env_var("TRACKER_CONFIDENCE"));
        let confidence: f64 = match raw_confidence {
            Some(v) => v.parse().with_context(|| format!("invalid confidence '{}'", v))?,
            None => DEFAULT_CONFIDENCE,
        };
        if !(confidence > 0.0 && confidence < 1.0) {
            bail!("confidence must lie strictly between 0 and 1, got {}", confidence);
        }

        let events = flag_values(args, "--event")
            .into_iter()
            .map(parse_event)
            .collect::<Result<Vec<_>>>()?;

        let output = flag_value(args, "--output").map(PathBuf::from);

        Ok(Self {
            polygon_api_key,
            polygon_rate_limit,
            polygon_base_url,
            asset,
            benchmark,
            from,
            to,
            timespan,
            window,
            mode,
            days_left,
            confidence,
            events,
            output,
        })
    }
}

/// Parse `LABEL=START..END`, e.g. `election=2024-11-01..2024-11-15`.
pub fn parse_event(raw: &str) -> Result<EventWindow> {
    let (label, range) = raw
        .rsplit_once('=')
        .ok_or_else(|| anyhow!("event '{}' must look like LABEL=START..END", raw))?;
    let (start, end) = range
        .split_once("..")
        .ok_or_else(|| anyhow!("event '{}' must look like LABEL=START..END", raw))?;

    let label = label.trim();
    if label.is_empty() {
        bail!("event '{}' has an empty label", raw);
    }

    let start =
        parse_date(start).with_context(|| format!("invalid start date in event '{}'", raw))?;
    let end = parse_date(end).with_context(|| format!("invalid end date in event '{}'", raw))?;
    Ok(EventWindow::new(label, start, end)?)
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM-DD, got '{}'", value))
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn flag_values<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
    args.windows(2)
        .filter(|w| w[0] == flag)
        .map(|w| w[1].as_str())
        .collect()
}
