//! Pairing of asset and benchmark return series on a shared time index.
//!
//! Both inputs are chronologically sorted, so the intersection is a single
//! merge pass. Points missing in either series are dropped from both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, ReturnSeries};

/// Asset and benchmark returns restricted to timestamps observable in both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignedReturnPair {
    timestamps: Vec<DateTime<Utc>>,
    asset: Vec<f64>,
    benchmark: Vec<f64>,
}

impl AlignedReturnPair {
    /// Build a pair from data the caller already aligned.
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        asset: Vec<f64>,
        benchmark: Vec<f64>,
    ) -> Result<Self, AnalysisError> {
        if asset.len() != timestamps.len() || benchmark.len() != timestamps.len() {
            return Err(AnalysisError::AlignmentMismatch(format!(
                "{} timestamps, {} asset returns, {} benchmark returns",
                timestamps.len(),
                asset.len(),
                benchmark.len()
            )));
        }
        if timestamps.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AnalysisError::AlignmentMismatch(
                "timestamps must be strictly increasing".to_string(),
            ));
        }
        if asset.iter().chain(benchmark.iter()).any(|v| !v.is_finite()) {
            return Err(AnalysisError::AlignmentMismatch(
                "aligned returns must all be observable".to_string(),
            ));
        }
        Ok(Self { timestamps, asset, benchmark })
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn asset(&self) -> &[f64] {
        &self.asset
    }

    pub fn benchmark(&self) -> &[f64] {
        &self.benchmark
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Keep only the positions whose timestamp satisfies `keep`.
    pub fn filter_by_time<F>(&self, keep: F) -> Self
    where
        F: Fn(&DateTime<Utc>) -> bool,
    {
        let mut out = Self::default();
        for i in 0..self.len() {
            if keep(&self.timestamps[i]) {
                out.timestamps.push(self.timestamps[i]);
                out.asset.push(self.asset[i]);
                out.benchmark.push(self.benchmark[i]);
            }
        }
        out
    }
}

/// Ordered intersection of the observable points of both series.
///
/// An empty intersection yields an empty pair; deciding whether that is an
/// error is left to the estimator consuming it.
pub fn align(asset: &ReturnSeries, benchmark: &ReturnSeries) -> AlignedReturnPair {
    let a = asset.points();
    let b = benchmark.points();
    let mut out = AlignedReturnPair::default();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        if a[i].timestamp < b[j].timestamp {
            i += 1;
        } else if a[i].timestamp > b[j].timestamp {
            j += 1;
        } else {
            if let (Some(av), Some(bv)) = (a[i].value, b[j].value) {
                out.timestamps.push(a[i].timestamp);
                out.asset.push(av);
                out.benchmark.push(bv);
            }
            i += 1;
            j += 1;
        }
    }

    out
}
