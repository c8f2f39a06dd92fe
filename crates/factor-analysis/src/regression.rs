use analysis_core::AnalysisError;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Name of the intercept term in regression output.
pub const CONST_TERM: &str = "const";

/// Name given to the benchmark regressor by the rolling estimator.
pub const BENCHMARK_TERM: &str = "benchmark";

/// One fitted coefficient with its significance statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: Option<f64>,
    pub t_stat: Option<f64>,
    /// Two-sided p-value for H0: coefficient = 0
    pub p_value: Option<f64>,
}

/// Output of a single-regressor OLS fit `y ~ 1 + x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionResults {
    pub coefficients: Vec<Coefficient>,
    /// `None` when `y` has no variance, so there is nothing to explain
    pub r_squared: Option<f64>,
    pub nobs: usize,
    pub df_resid: usize,
}

impl RegressionResults {
    /// Coefficient lookup by term name.
    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }
}

/// Two-pass centred sums of a paired sample.
///
/// Both rolling beta estimators go through this so that they agree to
/// rounding even when the series sit far from zero.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CentredSums {
    pub mean_x: f64,
    pub mean_y: f64,
    pub sxx: f64,
    pub sxy: f64,
    pub syy: f64,
}

impl CentredSums {
    /// Callers guarantee `x` and `y` have the same non-zero length.
    pub(crate) fn new(x: &[f64], y: &[f64]) -> Self {
        let n = x.len() as f64;
        let mean_x = x.iter().sum::<f64>() / n;
        let mean_y = y.iter().sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        let mut syy = 0.0;
        for (xi, yi) in x.iter().zip(y.iter()) {
            let dx = xi - mean_x;
            let dy = yi - mean_y;
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }

        Self {
            mean_x,
            mean_y,
            sxx,
            sxy,
            syy,
        }
    }
}

/// Fit `y = alpha + beta * x + e` by ordinary least squares.
///
/// Uses centred sums rather than the normal equations so that a noiseless
/// linear relationship reproduces `Cov(x, y) / Var(x)` to machine precision.
/// Significance uses a Student-t with `n - 2` degrees of freedom and is left
/// undefined when no residual degrees of freedom remain.
pub fn ols_single_factor(
    y: &[f64],
    x: &[f64],
    regressor: &str,
) -> Result<RegressionResults, AnalysisError> {
    if y.len() != x.len() {
        return Err(AnalysisError::AlignmentMismatch(format!(
            "regression needs equal lengths, got {} and {}",
            y.len(),
            x.len()
        )));
    }
    let n = x.len();
    if n < 2 {
        return Err(AnalysisError::InsufficientData(format!(
            "regression needs at least 2 observations, got {}",
            n
        )));
    }
    if x.iter().all(|&v| v == x[0]) {
        return Err(AnalysisError::DegenerateInput(format!(
            "regressor '{}' has zero variance",
            regressor
        )));
    }

    let nf = n as f64;
    let CentredSums {
        mean_x,
        mean_y,
        sxx,
        sxy,
        syy,
    } = CentredSums::new(x, y);

    if sxx <= 0.0 {
        return Err(AnalysisError::DegenerateInput(format!(
            "regressor '{}' has zero variance",
            regressor
        )));
    }

    let beta = sxy / sxx;
    let alpha = mean_y - beta * mean_x;

    // Single regressor with intercept: R^2 equals the squared correlation
    let r_squared = if syy > 0.0 {
        Some(((sxy * sxy) / (sxx * syy)).clamp(0.0, 1.0))
    } else {
        None
    };

    let df_resid = n - 2;
    let (alpha_se, beta_se) = if df_resid > 0 {
        let ssr: f64 = x
            .iter()
            .zip(y.iter())
            .map(|(xi, yi)| (yi - (alpha + beta * xi)).powi(2))
            .sum();
        let s2 = ssr / df_resid as f64;
        (
            Some((s2 * (1.0 / nf + mean_x * mean_x / sxx)).sqrt()),
            Some((s2 / sxx).sqrt()),
        )
    } else {
        (None, None)
    };

    let t_dist = if df_resid > 0 {
        Some(
            StudentsT::new(0.0, 1.0, df_resid as f64)
                .map_err(|e| AnalysisError::CalculationError(e.to_string()))?,
        )
    } else {
        None
    };

    let coefficients = vec![
        coefficient(CONST_TERM, alpha, alpha_se, t_dist.as_ref()),
        coefficient(regressor, beta, beta_se, t_dist.as_ref()),
    ];

    Ok(RegressionResults {
        coefficients,
        r_squared,
        nobs: n,
        df_resid,
    })
}

fn coefficient(
    name: &str,
    estimate: f64,
    std_error: Option<f64>,
    t_dist: Option<&StudentsT>,
) -> Coefficient {
    let (t_stat, p_value) = match (std_error, t_dist) {
        (Some(se), Some(dist)) if se > 0.0 => {
            let t = estimate / se;
            (Some(t), Some((2.0 * dist.sf(t.abs())).min(1.0)))
        }
        // Exact fit: any non-zero estimate is infinitely significant
        (Some(_), Some(_)) if estimate != 0.0 => (None, Some(0.0)),
        _ => (None, None),
    };

    Coefficient {
        name: name.to_string(),
        estimate,
        std_error,
        t_stat,
        p_value,
    }
}
