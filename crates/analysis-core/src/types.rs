use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub vwap: Option<f64>,
}

/// Bar granularity understood by the price feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timespan {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl Timespan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timespan::Minute => "minute",
            Timespan::Hour => "hour",
            Timespan::Day => "day",
            Timespan::Week => "week",
            Timespan::Month => "month",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AnalysisError> {
        match value.to_ascii_lowercase().as_str() {
            "minute" => Ok(Timespan::Minute),
            "hour" => Ok(Timespan::Hour),
            "day" => Ok(Timespan::Day),
            "week" => Ok(Timespan::Week),
            "month" => Ok(Timespan::Month),
            other => Err(AnalysisError::InvalidData(format!("unknown timespan '{}'", other))),
        }
    }
}

/// Request for a contiguous range of bars
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarRequest {
    pub symbol: String,
    pub multiplier: u32,
    pub timespan: Timespan,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl BarRequest {
    /// One bar per trading day, the granularity the analytics assume.
    pub fn daily(symbol: impl Into<String>, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            multiplier: 1,
            timespan: Timespan::Day,
            from,
            to,
        }
    }
}

/// A single period's fractional return. `None` marks an unobservable period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

/// Chronologically ordered percentage-return series.
///
/// Timestamps are strictly increasing. Non-finite values are stored as
/// missing rather than rejected, since upstream feeds occasionally emit them
/// for halted sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    points: Vec<ReturnPoint>,
}

impl ReturnSeries {
    pub fn new(points: Vec<ReturnPoint>) -> Result<Self, AnalysisError> {
        for pair in points.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(AnalysisError::InvalidData(format!(
                    "return timestamps must be strictly increasing ({} follows {})",
                    pair[1].timestamp, pair[0].timestamp
                )));
            }
        }

        let points = points
            .into_iter()
            .map(|p| ReturnPoint {
                timestamp: p.timestamp,
                value: p.value.filter(|v| v.is_finite()),
            })
            .collect();

        Ok(Self { points })
    }

    /// Build close-to-close returns: `(close[t] - close[t-1]) / close[t-1]`.
    ///
    /// The first bar has no prior close and is missing; so is any period whose
    /// prior close is not strictly positive.
    pub fn from_bars(bars: &[Bar]) -> Result<Self, AnalysisError> {
        let mut points = Vec::with_capacity(bars.len());
        let mut prev_close: Option<f64> = None;

        for bar in bars {
            let value = match prev_close {
                Some(prev) if prev > 0.0 && prev.is_finite() => Some((bar.close - prev) / prev),
                _ => None,
            };
            points.push(ReturnPoint { timestamp: bar.timestamp, value });
            prev_close = Some(bar.close);
        }

        Self::new(points)
    }

    pub fn points(&self) -> &[ReturnPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of points carrying a value
    pub fn observable_count(&self) -> usize {
        self.points.iter().filter(|p| p.value.is_some()).count()
    }
}

/// A labelled date range, inclusive at both ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindow {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl EventWindow {
    pub fn new(
        label: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, AnalysisError> {
        let label = label.into();
        if start > end {
            return Err(AnalysisError::InvalidData(format!(
                "event '{}' starts ({}) after it ends ({})",
                label, start, end
            )));
        }
        Ok(Self { label, start, end })
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        let date = timestamp.date_naive();
        date >= self.start && date <= self.end
    }
}
