use analysis_core::AnalysisError;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::gbm::TRADING_DAYS_PER_YEAR;

/// Daily return moments and their annualized counterparts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnSummary {
    pub observations: usize,
    pub mean_daily: f64,
    /// Sample standard deviation (n - 1)
    pub std_daily: f64,
    /// Annualized drift: mean daily return x 252
    pub mu: f64,
    /// Annualized volatility: daily std x sqrt(252)
    pub sigma: f64,
}

impl ReturnSummary {
    pub fn from_returns(returns: &[f64]) -> Result<Self, AnalysisError> {
        if returns.len() < 2 {
            return Err(AnalysisError::InsufficientData(format!(
                "need at least 2 returns for a volatility estimate, got {}",
                returns.len()
            )));
        }
        if returns.iter().any(|r| !r.is_finite()) {
            return Err(AnalysisError::InvalidData("returns must be finite".to_string()));
        }

        let mean_daily = returns.mean();
        let std_daily = returns.std_dev();

        Ok(Self {
            observations: returns.len(),
            mean_daily,
            std_daily,
            mu: mean_daily * TRADING_DAYS_PER_YEAR,
            sigma: std_daily * TRADING_DAYS_PER_YEAR.sqrt(),
        })
    }
}
