//! Benchmark-relative return analytics.
//!
//! Rolling beta (covariance ratio and single-factor OLS), per-event
//! regressions, and closed-form GBM percentile bands. Everything here is a
//! pure function of its inputs; fetching and presenting data live elsewhere.

pub mod events;
pub mod gbm;
pub mod regression;
pub mod rolling;
pub mod summary;

pub use analysis_core::{align, AlignedReturnPair};
pub use events::{fit_event_windows, EventFit};
pub use gbm::{
    generate, GbmBandGenerator, GbmPathBand, DEFAULT_CONFIDENCE, MAX_DAYS_LEFT,
    TRADING_DAYS_PER_YEAR,
};
pub use regression::{ols_single_factor, Coefficient, RegressionResults};
pub use rolling::{
    covariance_beta_window, fit_window, residuals, rolling_covariance_beta, rolling_ols,
    EstimationMode, OlsFit, ResidualPoint, RollingBeta, RollingEstimates, RollingFactorEstimator,
    RollingOls, RollingPoint, RollingWindowResult, WindowEstimate,
};
pub use summary::ReturnSummary;
