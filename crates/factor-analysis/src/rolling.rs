use analysis_core::{AlignedReturnPair, AnalysisError};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::regression::{ols_single_factor, CentredSums, BENCHMARK_TERM, CONST_TERM};

/// Per-index outcome of a rolling estimate.
///
/// The two undefined states are kept apart: a window that has not filled yet
/// is not the same thing as a window whose benchmark never moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum WindowEstimate<T> {
    InsufficientHistory,
    ZeroVariance,
    Value(T),
}

impl<T> WindowEstimate<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            WindowEstimate::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, WindowEstimate::Value(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingPoint<T> {
    pub timestamp: DateTime<Utc>,
    pub estimate: WindowEstimate<T>,
}

/// Timestamp-indexed sequence of per-window statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingWindowResult<T> {
    pub window: usize,
    pub points: Vec<RollingPoint<T>>,
}

impl<T> RollingWindowResult<T> {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WindowEstimate<T>> {
        self.points.get(index).map(|p| &p.estimate)
    }

    pub fn defined_count(&self) -> usize {
        self.points.iter().filter(|p| p.estimate.is_defined()).count()
    }

    pub fn zero_variance_count(&self) -> usize {
        self.points
            .iter()
            .filter(|p| matches!(p.estimate, WindowEstimate::ZeroVariance))
            .count()
    }
}

/// Fitted single-factor regression for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OlsFit {
    #[serde(rename = "const")]
    pub intercept: f64,
    pub beta: f64,
    pub p_value: Option<f64>,
    pub r_squared: Option<f64>,
    pub beta_std_error: Option<f64>,
    pub t_stat: Option<f64>,
    pub nobs: usize,
    pub df_resid: usize,
}

pub type RollingBeta = RollingWindowResult<f64>;
pub type RollingOls = RollingWindowResult<OlsFit>;

/// Which rolling estimates to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimationMode {
    /// Covariance / variance ratio only
    Covariance,
    /// Rolling OLS with significance and fit quality
    Ols,
    Both,
}

impl EstimationMode {
    pub fn parse(value: &str) -> Result<Self, AnalysisError> {
        match value.to_ascii_lowercase().as_str() {
            "covariance" | "cov" => Ok(EstimationMode::Covariance),
            "ols" => Ok(EstimationMode::Ols),
            "both" => Ok(EstimationMode::Both),
            other => Err(AnalysisError::InvalidData(format!(
                "unknown estimation mode '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EstimationMode::Covariance => "covariance",
            EstimationMode::Ols => "ols",
            EstimationMode::Both => "both",
        }
    }
}

/// Estimates produced by [`RollingFactorEstimator::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingEstimates {
    pub beta: Option<RollingBeta>,
    pub ols: Option<RollingOls>,
}

/// Residual of one observation against its own window's fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualPoint {
    pub timestamp: DateTime<Utc>,
    pub residual: Option<f64>,
}

/// Covariance-ratio beta for a single window.
pub fn covariance_beta_window(asset: &[f64], benchmark: &[f64]) -> WindowEstimate<f64> {
    if asset.len() < 2 || asset.len() != benchmark.len() {
        return WindowEstimate::InsufficientHistory;
    }
    if benchmark.iter().all(|&b| b == benchmark[0]) {
        return WindowEstimate::ZeroVariance;
    }

    // Cov / Var with the shared n - 1 divisor cancelled
    let sums = CentredSums::new(benchmark, asset);
    if sums.sxx <= 0.0 || !sums.sxx.is_finite() {
        return WindowEstimate::ZeroVariance;
    }

    WindowEstimate::Value(sums.sxy / sums.sxx)
}

/// OLS fit of `asset ~ 1 + benchmark` for a single window.
pub fn fit_window(
    asset: &[f64],
    benchmark: &[f64],
) -> Result<WindowEstimate<OlsFit>, AnalysisError> {
    let results = match ols_single_factor(asset, benchmark, BENCHMARK_TERM) {
        Ok(r) => r,
        Err(AnalysisError::InsufficientData(_)) => {
            return Ok(WindowEstimate::InsufficientHistory)
        }
        Err(AnalysisError::DegenerateInput(_)) => return Ok(WindowEstimate::ZeroVariance),
        Err(e) => return Err(e),
    };

    let intercept = results
        .coefficient(CONST_TERM)
        .ok_or_else(|| AnalysisError::CalculationError("regression has no intercept".to_string()))?;
    let slope = results.coefficient(BENCHMARK_TERM).ok_or_else(|| {
        AnalysisError::CalculationError("regression has no benchmark term".to_string())
    })?;

    Ok(WindowEstimate::Value(OlsFit {
        intercept: intercept.estimate,
        beta: slope.estimate,
        p_value: slope.p_value,
        r_squared: results.r_squared,
        beta_std_error: slope.std_error,
        t_stat: slope.t_stat,
        nobs: results.nobs,
        df_resid: results.df_resid,
    }))
}

/// Sliding-window beta and regression estimator over an aligned return pair.
///
/// Every window is fitted from scratch, so the output at index `i` depends
/// only on observations `i - window + 1 ..= i`.
#[derive(Debug, Clone, Copy)]
pub struct RollingFactorEstimator {
    window: usize,
}

impl RollingFactorEstimator {
    pub fn new(window: usize) -> Result<Self, AnalysisError> {
        if window < 2 {
            return Err(AnalysisError::InvalidData(format!(
                "rolling window must be at least 2, got {}",
                window
            )));
        }
        Ok(Self { window })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    fn check_length(&self, pair: &AlignedReturnPair) -> Result<(), AnalysisError> {
        if pair.is_empty() {
            return Err(AnalysisError::InsufficientData(
                "asset and benchmark share no observable dates".to_string(),
            ));
        }
        if pair.len() < self.window {
            return Err(AnalysisError::InsufficientData(format!(
                "{} aligned observations, window needs {}",
                pair.len(),
                self.window
            )));
        }
        Ok(())
    }

    /// Rolling `Cov(asset, bench) / Var(bench)` with Bessel-corrected estimators.
    pub fn covariance_beta(&self, pair: &AlignedReturnPair) -> Result<RollingBeta, AnalysisError> {
        self.check_length(pair)?;

        let asset = pair.asset();
        let bench = pair.benchmark();
        let points: Vec<RollingPoint<f64>> = pair
            .timestamps()
            .iter()
            .enumerate()
            .map(|(i, ts)| {
                let estimate = if i + 1 < self.window {
                    WindowEstimate::InsufficientHistory
                } else {
                    let start = i + 1 - self.window;
                    covariance_beta_window(&asset[start..=i], &bench[start..=i])
                };
                RollingPoint { timestamp: *ts, estimate }
            })
            .collect();

        let result = RollingWindowResult { window: self.window, points };
        tracing::debug!(
            "rolling covariance beta: {} points, {} defined, {} zero-variance windows",
            result.len(),
            result.defined_count(),
            result.zero_variance_count()
        );
        Ok(result)
    }

    /// Rolling OLS of asset on benchmark. Windows are fitted in parallel.
    pub fn ols(&self, pair: &AlignedReturnPair) -> Result<RollingOls, AnalysisError> {
        self.check_length(pair)?;

        let asset = pair.asset();
        let bench = pair.benchmark();
        let timestamps = pair.timestamps();
        let window = self.window;

        let points = (0..pair.len())
            .into_par_iter()
            .map(|i| -> Result<RollingPoint<OlsFit>, AnalysisError> {
                let estimate = if i + 1 < window {
                    WindowEstimate::InsufficientHistory
                } else {
                    let start = i + 1 - window;
                    fit_window(&asset[start..=i], &bench[start..=i])?
                };
                Ok(RollingPoint { timestamp: timestamps[i], estimate })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let result = RollingWindowResult { window, points };
        tracing::debug!(
            "rolling OLS: {} points, {} defined, {} zero-variance windows",
            result.len(),
            result.defined_count(),
            result.zero_variance_count()
        );
        Ok(result)
    }

    pub fn run(
        &self,
        pair: &AlignedReturnPair,
        mode: EstimationMode,
    ) -> Result<RollingEstimates, AnalysisError> {
        let beta = match mode {
            EstimationMode::Covariance | EstimationMode::Both => Some(self.covariance_beta(pair)?),
            EstimationMode::Ols => None,
        };
        let ols = match mode {
            EstimationMode::Ols | EstimationMode::Both => Some(self.ols(pair)?),
            EstimationMode::Covariance => None,
        };
        Ok(RollingEstimates { beta, ols })
    }
}

pub fn rolling_covariance_beta(
    pair: &AlignedReturnPair,
    window: usize,
) -> Result<RollingBeta, AnalysisError> {
    RollingFactorEstimator::new(window)?.covariance_beta(pair)
}

pub fn rolling_ols(pair: &AlignedReturnPair, window: usize) -> Result<RollingOls, AnalysisError> {
    RollingFactorEstimator::new(window)?.ols(pair)
}

/// `asset - (const + beta * bench)` using each timestamp's own window fit.
pub fn residuals(
    pair: &AlignedReturnPair,
    fits: &RollingOls,
) -> Result<Vec<ResidualPoint>, AnalysisError> {
    if pair.len() != fits.len() {
        return Err(AnalysisError::AlignmentMismatch(format!(
            "{} observations but {} fitted windows",
            pair.len(),
            fits.len()
        )));
    }

    pair.timestamps()
        .iter()
        .zip(pair.asset().iter().zip(pair.benchmark().iter()))
        .zip(fits.points.iter())
        .map(|((ts, (a, b)), point)| {
            if point.timestamp != *ts {
                return Err(AnalysisError::AlignmentMismatch(format!(
                    "fit for {} paired with observation at {}",
                    point.timestamp, ts
                )));
            }
            let residual = point.estimate.value().map(|fit| a - (fit.intercept + fit.beta * b));
            Ok(ResidualPoint { timestamp: *ts, residual })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn pair_from(asset: Vec<f64>, bench: Vec<f64>) -> AlignedReturnPair {
        let origin = Utc.with_ymd_and_hms(2024, 1, 2, 5, 0, 0).unwrap();
        let ts = (0..asset.len()).map(|i| origin + Duration::days(i as i64)).collect();
        AlignedReturnPair::new(ts, asset, bench).unwrap()
    }

    /// Deterministic, non-periodic benchmark returns around 0.
    fn bench_returns(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let x = i as f64;
                0.01 * (x * 0.7).sin() + 0.004 * (x * 1.3).cos() + 0.0005
            })
            .collect()
    }

    fn noisy(bench: &[f64]) -> Vec<f64> {
        bench
            .iter()
            .enumerate()
            .map(|(i, b)| 0.0002 + 1.2 * b + 0.003 * ((i as f64) * 2.1).sin())
            .collect()
    }

    #[test]
    fn test_window_must_be_at_least_two() {
        assert!(RollingFactorEstimator::new(1).is_err());
        assert!(RollingFactorEstimator::new(2).is_ok());
    }

    #[test]
    fn test_undefined_leading_entries() {
        let bench = bench_returns(25);
        let pair = pair_from(noisy(&bench), bench);

        let beta = rolling_covariance_beta(&pair, 20).unwrap();
        let ols = rolling_ols(&pair, 20).unwrap();

        for result_len in [beta.len(), ols.len()] {
            assert_eq!(result_len, 25);
        }
        assert_eq!(beta.defined_count(), 6);
        assert_eq!(ols.defined_count(), 6);
        for i in 0..19 {
            assert_eq!(beta.get(i), Some(&WindowEstimate::InsufficientHistory));
            assert_eq!(ols.get(i), Some(&WindowEstimate::InsufficientHistory));
        }
        for i in 19..25 {
            assert!(beta.get(i).unwrap().is_defined());
            assert!(ols.get(i).unwrap().is_defined());
        }
    }

    #[test]
    fn test_beta_agreement_on_noiseless_data() {
        let bench = bench_returns(60);
        let asset: Vec<f64> = bench.iter().map(|b| 0.0003 + 0.85 * b).collect();
        let pair = pair_from(asset, bench);

        let beta = rolling_covariance_beta(&pair, 20).unwrap();
        let ols = rolling_ols(&pair, 20).unwrap();

        for i in 19..60 {
            let cov_beta = *beta.get(i).unwrap().value().unwrap();
            let fit = ols.get(i).unwrap().value().unwrap();
            assert!(((cov_beta - fit.beta) / fit.beta).abs() < 1e-9, "index {}", i);
            assert!((fit.beta - 0.85).abs() < 1e-9);
            assert!((fit.intercept - 0.0003).abs() < 1e-9);
            assert!((fit.r_squared.unwrap() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_beta_agreement_with_noise() {
        let bench = bench_returns(80);
        let pair = pair_from(noisy(&bench), bench);

        let beta = rolling_covariance_beta(&pair, 30).unwrap();
        let ols = rolling_ols(&pair, 30).unwrap();

        for i in 29..80 {
            let cov_beta = *beta.get(i).unwrap().value().unwrap();
            let fit = ols.get(i).unwrap().value().unwrap();
            assert!(((cov_beta - fit.beta) / fit.beta).abs() < 1e-9);
        }
    }

    #[test]
    fn test_beta_agreement_far_from_zero() {
        // tiny moves around a large level
        let bench: Vec<f64> = (0..40).map(|i| 1000.0 + 1e-6 * ((i as f64) * 0.7).sin()).collect();
        let asset: Vec<f64> = bench.iter().map(|b| 2.0 * b).collect();
        let pair = pair_from(asset, bench);

        let beta = rolling_covariance_beta(&pair, 20).unwrap();
        let ols = rolling_ols(&pair, 20).unwrap();

        for i in 19..40 {
            let cov_beta = *beta.get(i).unwrap().value().unwrap();
            let fit = ols.get(i).unwrap().value().unwrap();
            assert!(((cov_beta - fit.beta) / fit.beta).abs() < 1e-9, "index {}", i);
            assert!((cov_beta - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_r_squared_bounds_and_p_values() {
        let bench = bench_returns(100);
        let pair = pair_from(noisy(&bench), bench);

        let ols = rolling_ols(&pair, 15).unwrap();
        for point in &ols.points {
            if let Some(fit) = point.estimate.value() {
                let r2 = fit.r_squared.unwrap();
                assert!((0.0..=1.0 + 1e-9).contains(&r2));
                let p = fit.p_value.unwrap();
                assert!((0.0..=1.0).contains(&p));
                assert_eq!(fit.df_resid, 13);
                assert_eq!(fit.nobs, 15);
            }
        }
    }

    #[test]
    fn test_flat_benchmark_window_is_zero_variance() {
        let mut bench = bench_returns(30);
        for b in bench.iter_mut().take(12).skip(2) {
            *b = 0.002;
        }
        let asset = noisy(&bench);
        let pair = pair_from(asset, bench);

        let beta = rolling_covariance_beta(&pair, 5).unwrap();
        let ols = rolling_ols(&pair, 5).unwrap();

        // windows ending at 6..=11 lie entirely within the flat stretch 2..=11
        for i in 6..=11 {
            assert_eq!(beta.get(i), Some(&WindowEstimate::ZeroVariance));
            assert_eq!(ols.get(i), Some(&WindowEstimate::ZeroVariance));
        }
        // windows after the stretch recover
        for i in 16..30 {
            let b = beta.get(i).unwrap().value().unwrap();
            assert!(b.is_finite());
        }
        assert_eq!(beta.zero_variance_count(), 6);
    }

    #[test]
    fn test_short_series_is_whole_call_error() {
        let bench = bench_returns(10);
        let pair = pair_from(noisy(&bench), bench);

        assert!(matches!(
            rolling_covariance_beta(&pair, 20),
            Err(AnalysisError::InsufficientData(_))
        ));
        assert!(matches!(rolling_ols(&pair, 20), Err(AnalysisError::InsufficientData(_))));
    }

    #[test]
    fn test_empty_pair_is_error() {
        let pair = AlignedReturnPair::default();
        assert!(matches!(
            rolling_covariance_beta(&pair, 2),
            Err(AnalysisError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_residuals_use_window_fit() {
        let bench = bench_returns(40);
        let pair = pair_from(noisy(&bench), bench);
        let ols = rolling_ols(&pair, 10).unwrap();

        let resid = residuals(&pair, &ols).unwrap();
        assert_eq!(resid.len(), 40);
        assert!(resid[..9].iter().all(|r| r.residual.is_none()));

        let fit = ols.get(25).unwrap().value().unwrap();
        let expected = pair.asset()[25] - (fit.intercept + fit.beta * pair.benchmark()[25]);
        assert!((resid[25].residual.unwrap() - expected).abs() < 1e-15);
    }

    #[test]
    fn test_residuals_reject_foreign_fit() {
        let bench = bench_returns(40);
        let pair = pair_from(noisy(&bench), bench.clone());
        let ols = rolling_ols(&pair, 10).unwrap();
        let shorter = pair_from(noisy(&bench[..30]), bench[..30].to_vec());

        assert!(matches!(
            residuals(&shorter, &ols),
            Err(AnalysisError::AlignmentMismatch(_))
        ));
    }

    #[test]
    fn test_run_respects_mode() {
        let bench = bench_returns(30);
        let pair = pair_from(noisy(&bench), bench);
        let estimator = RollingFactorEstimator::new(10).unwrap();

        let cov_only = estimator.run(&pair, EstimationMode::Covariance).unwrap();
        assert!(cov_only.beta.is_some() && cov_only.ols.is_none());

        let both = estimator.run(&pair, EstimationMode::Both).unwrap();
        assert!(both.beta.is_some() && both.ols.is_some());

        assert_eq!(EstimationMode::parse("OLS").unwrap(), EstimationMode::Ols);
        assert!(EstimationMode::parse("kalman").is_err());
    }

    #[test]
    fn test_window_estimate_serializes_with_status_tag() {
        let json = serde_json::to_value(WindowEstimate::Value(1.5)).unwrap();
        assert_eq!(json["status"], "value");
        assert_eq!(json["value"], 1.5);

        let json = serde_json::to_value(WindowEstimate::<f64>::ZeroVariance).unwrap();
        assert_eq!(json["status"], "zero_variance");
    }
}
