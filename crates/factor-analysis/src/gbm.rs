use analysis_core::AnalysisError;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Width of the central interval when none is given (10th to 90th percentile)
pub const DEFAULT_CONFIDENCE: f64 = 0.80;

/// Longest projection accepted: one hundred trading years
pub const MAX_DAYS_LEFT: i64 = 100 * 252;

/// Median and central-interval price paths under geometric Brownian motion.
///
/// Index `k` is `k` trading days from now; index 0 is the starting price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbmPathBand {
    pub median: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
    pub confidence: f64,
    pub z_score: f64,
}

impl GbmPathBand {
    pub fn len(&self) -> usize {
        self.median.len()
    }

    pub fn is_empty(&self) -> bool {
        self.median.is_empty()
    }
}

/// Closed-form percentile bands for a lognormal price.
///
/// `ln(S_t / S_0) ~ N((mu - sigma^2 / 2) t, sigma^2 t)`, so each band is the
/// exponential of a normal quantile. No sampling is involved.
#[derive(Debug, Clone, Copy)]
pub struct GbmBandGenerator {
    confidence: f64,
    z_score: f64,
}

impl GbmBandGenerator {
    pub fn new(confidence: f64) -> Result<Self, AnalysisError> {
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(AnalysisError::DegenerateInput(format!(
                "confidence must lie strictly between 0 and 1, got {}",
                confidence
            )));
        }

        let normal =
            Normal::new(0.0, 1.0).map_err(|e| AnalysisError::CalculationError(e.to_string()))?;
        let tail = (1.0 - confidence) / 2.0;
        let z_score = normal.inverse_cdf(1.0 - tail);

        Ok(Self { confidence, z_score })
    }

    pub fn z_score(&self) -> f64 {
        self.z_score
    }

    /// Project `days_left` trading days forward from `s0`.
    ///
    /// `mu` and `sigma` are annualized drift and volatility.
    pub fn generate(
        &self,
        s0: f64,
        mu: f64,
        sigma: f64,
        days_left: i64,
    ) -> Result<GbmPathBand, AnalysisError> {
        validate_path_inputs(s0, mu, sigma, days_left)?;

        let dt = 1.0 / TRADING_DAYS_PER_YEAR;
        let steps = usize::try_from(days_left)
            .ok()
            .and_then(|d| d.checked_add(1))
            .ok_or_else(|| {
                AnalysisError::DegenerateInput(format!(
                    "horizon of {} days is not representable",
                    days_left
                ))
            })?;
        let mut median = Vec::with_capacity(steps);
        let mut upper = Vec::with_capacity(steps);
        let mut lower = Vec::with_capacity(steps);

        for k in 0..steps {
            let t = k as f64 * dt;
            let drift = (mu - 0.5 * sigma * sigma) * t;
            let vol = sigma * t.sqrt();

            median.push(s0 * drift.exp());
            upper.push(s0 * (drift + self.z_score * vol).exp());
            lower.push(s0 * (drift - self.z_score * vol).exp());
        }

        Ok(GbmPathBand {
            median,
            upper,
            lower,
            confidence: self.confidence,
            z_score: self.z_score,
        })
    }
}

fn validate_path_inputs(
    s0: f64,
    mu: f64,
    sigma: f64,
    days_left: i64,
) -> Result<(), AnalysisError> {
    if !(0..=MAX_DAYS_LEFT).contains(&days_left) {
        return Err(AnalysisError::DegenerateInput(format!(
            "days_left must lie in 0..={}, got {}",
            MAX_DAYS_LEFT, days_left
        )));
    }
    if !s0.is_finite() || s0 <= 0.0 {
        return Err(AnalysisError::DegenerateInput(format!(
            "starting price must be positive, got {}",
            s0
        )));
    }
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(AnalysisError::DegenerateInput(format!(
            "volatility must be non-negative, got {}",
            sigma
        )));
    }
    if !mu.is_finite() {
        return Err(AnalysisError::DegenerateInput(format!("drift must be finite, got {}", mu)));
    }
    Ok(())
}

/// One-shot band generation. All inputs are checked before any work is done.
pub fn generate(
    s0: f64,
    mu: f64,
    sigma: f64,
    days_left: i64,
    confidence: f64,
) -> Result<GbmPathBand, AnalysisError> {
    validate_path_inputs(s0, mu, sigma, days_left)?;
    GbmBandGenerator::new(confidence)?.generate(s0, mu, sigma, days_left)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn width_at(band: &GbmPathBand, k: usize) -> f64 {
        band.upper[k] - band.lower[k]
    }

    #[test]
    fn test_z_score_for_default_confidence() {
        let gen = GbmBandGenerator::new(DEFAULT_CONFIDENCE).unwrap();
        assert!((gen.z_score() - 1.2815515655446004).abs() < 1e-8);
    }

    #[test]
    fn test_zero_horizon_is_starting_price() {
        let band = generate(100.0, 0.10, 0.20, 0, DEFAULT_CONFIDENCE).unwrap();

        assert_eq!(band.len(), 1);
        assert_eq!(band.median[0], 100.0);
        assert_eq!(band.upper[0], 100.0);
        assert_eq!(band.lower[0], 100.0);
    }

    #[test]
    fn test_band_widens_with_horizon() {
        let band = generate(100.0, 0.0, 0.20, 252, DEFAULT_CONFIDENCE).unwrap();

        assert_eq!(band.len(), 253);
        assert!(width_at(&band, 252) > width_at(&band, 1));
        for k in 1..band.len() {
            assert!(band.lower[k] < band.median[k]);
            assert!(band.median[k] < band.upper[k]);
            assert!(width_at(&band, k) > width_at(&band, k - 1));
        }
    }

    #[test]
    fn test_one_year_quantiles() {
        // After one year: median = S0 * exp(mu - sigma^2 / 2), upper adds z * sigma
        let band = generate(100.0, 0.0, 0.20, 252, DEFAULT_CONFIDENCE).unwrap();
        let drift = -0.5 * 0.04;
        let z = 1.2815515655446004;

        assert!((band.median[252] - 100.0 * f64::exp(drift)).abs() < 1e-9);
        assert!((band.upper[252] - 100.0 * f64::exp(drift + z * 0.20)).abs() < 1e-6);
        assert!((band.lower[252] - 100.0 * f64::exp(drift - z * 0.20)).abs() < 1e-6);
    }

    #[test]
    fn test_zero_volatility_collapses_band() {
        let band = generate(50.0, 0.05, 0.0, 10, DEFAULT_CONFIDENCE).unwrap();

        assert_eq!(band.len(), 11);
        for k in 0..=10 {
            assert_eq!(band.upper[k], band.median[k]);
            assert_eq!(band.lower[k], band.median[k]);
            let expected = 50.0 * (0.05 * k as f64 / 252.0).exp();
            assert!((band.median[k] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_deterministic_output() {
        let a = generate(123.45, 0.07, 0.31, 63, 0.9).unwrap();
        let b = generate(123.45, 0.07, 0.31, 63, 0.9).unwrap();

        for k in 0..a.len() {
            assert_eq!(a.median[k].to_bits(), b.median[k].to_bits());
            assert_eq!(a.upper[k].to_bits(), b.upper[k].to_bits());
            assert_eq!(a.lower[k].to_bits(), b.lower[k].to_bits());
        }
    }

    #[test]
    fn test_wider_confidence_wider_band() {
        let narrow = generate(100.0, 0.05, 0.25, 21, 0.5).unwrap();
        let wide = generate(100.0, 0.05, 0.25, 21, 0.95).unwrap();
        assert!(width_at(&wide, 21) > width_at(&narrow, 21));
        assert_eq!(wide.median, narrow.median);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let cases = [
            (100.0, 0.1, 0.2, -1, 0.8),
            (0.0, 0.1, 0.2, 5, 0.8),
            (-10.0, 0.1, 0.2, 5, 0.8),
            (100.0, 0.1, -0.2, 5, 0.8),
            (100.0, 0.1, 0.2, 5, 0.0),
            (100.0, 0.1, 0.2, 5, 1.0),
            (100.0, f64::NAN, 0.2, 5, 0.8),
            (100.0, 0.0, 0.2, MAX_DAYS_LEFT + 1, 0.8),
            (100.0, 0.0, 0.2, i64::MAX, 0.8),
        ];
        for (s0, mu, sigma, days, conf) in cases {
            assert!(matches!(
                generate(s0, mu, sigma, days, conf),
                Err(AnalysisError::DegenerateInput(_))
            ));
        }

        let gen = GbmBandGenerator::new(DEFAULT_CONFIDENCE).unwrap();
        assert!(matches!(
            gen.generate(100.0, 0.0, 0.2, i64::MAX),
            Err(AnalysisError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_longest_horizon_accepted() {
        let band = generate(100.0, 0.05, 0.2, MAX_DAYS_LEFT, DEFAULT_CONFIDENCE).unwrap();
        assert_eq!(band.len(), MAX_DAYS_LEFT as usize + 1);
        assert!(band.upper[band.len() - 1].is_finite());
    }
}
