//! Regression analysis.
//!
//! Ordinary least squares on a single predictor. The leak-rate linear
//! method and the exponential starting guesses are built on it.
//!
//! # Examples
//!
//! ```
//! use u_vacuum::regression::simple_linear_regression;
//!
//! let x = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let y = [2.1, 3.9, 6.1, 7.9, 10.1];
//! let result = simple_linear_regression(&x, &y).unwrap();
//! assert!((result.slope - 2.0).abs() < 0.1);
//! assert!((result.intercept - 0.1).abs() < 0.2);
//! assert!(result.r_squared > 0.99);
//! ```

use u_numflow::{special, stats};

/// Result of a simple linear regression: y = intercept + slope · x.
#[derive(Debug, Clone)]
pub struct SimpleRegressionResult {
    /// Slope coefficient (β₁).
    pub slope: f64,
    /// Intercept (β₀).
    pub intercept: f64,
    /// Coefficient of determination (R²).
    pub r_squared: f64,
    /// Standard error of the slope.
    pub slope_se: f64,
    /// Two-tailed p-value for H₀: β₁ = 0.
    pub slope_p: f64,
    /// Residual standard error (√(SSE/(n-2))).
    pub residual_se: f64,
    /// Sample size.
    pub n: usize,
}

impl SimpleRegressionResult {
    /// Predicted value at `x`.
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Computes simple linear regression (OLS closed-form).
///
/// # Algorithm
///
/// β₁ = cov(x,y) / var(x)
/// β₀ = ȳ - β₁·x̄
///
/// # Returns
///
/// `None` if fewer than 3 observations, slices differ in length, x has zero
/// variance, or inputs contain non-finite values.
///
/// # References
///
/// Draper & Smith (1998). "Applied Regression Analysis", 3rd edition.
pub fn simple_linear_regression(x: &[f64], y: &[f64]) -> Option<SimpleRegressionResult> {
    let n = x.len();
    if n < 3 || n != y.len() {
        return None;
    }
    if x.iter().any(|v| !v.is_finite()) || y.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let x_mean = stats::mean(x)?;
    let y_mean = stats::mean(y)?;
    let x_var = stats::variance(x)?;
    let cov = stats::covariance(x, y)?;

    if x_var < 1e-300 {
        return None; // zero variance in x
    }

    let slope = cov / x_var;
    let intercept = y_mean - slope * x_mean;

    let ss_res: f64 = x
        .iter()
        .zip(y.iter())
        .map(|(&xi, &yi)| {
            let r = yi - (intercept + slope * xi);
            r * r
        })
        .sum();
    let ss_tot: f64 = y.iter().map(|&yi| (yi - y_mean).powi(2)).sum();

    let nf = n as f64;
    let df_res = nf - 2.0;

    let r_squared = if ss_tot > 1e-300 {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    } else {
        1.0
    };

    let mse = ss_res / df_res;
    let residual_se = mse.sqrt();

    let ss_x = x_var * (nf - 1.0);
    let slope_se = (mse / ss_x).sqrt();

    let slope_p = if slope_se > 1e-300 {
        let t = slope / slope_se;
        two_tailed_t(t, df_res)
    } else if slope.abs() > 0.0 {
        0.0
    } else {
        1.0
    };

    Some(SimpleRegressionResult {
        slope,
        intercept,
        r_squared,
        slope_se,
        slope_p,
        residual_se,
        n,
    })
}

/// Two-tailed p-value of a Student-t statistic.
pub(crate) fn two_tailed_t(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    let p = 2.0 * (1.0 - special::t_distribution_cdf(t.abs(), df));
    if p.is_nan() {
        1.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_line() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 6.0, 8.0, 10.0];
        let r = simple_linear_regression(&x, &y).expect("should compute");
        assert!((r.slope - 2.0).abs() < 1e-10);
        assert!(r.intercept.abs() < 1e-10);
        assert!((r.r_squared - 1.0).abs() < 1e-10);
        assert!(r.slope_p < 1e-10);
        assert!((r.predict(6.0) - 12.0).abs() < 1e-10);
    }

    #[test]
    fn noisy_line() {
        let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &xi)| 3.0 - 0.5 * xi + if i % 2 == 0 { 0.2 } else { -0.2 })
            .collect();
        let r = simple_linear_regression(&x, &y).expect("should compute");
        assert!((r.slope + 0.5).abs() < 0.01);
        assert!(r.r_squared > 0.99);
        assert!(r.residual_se > 0.0);
    }

    #[test]
    fn flat_response_has_unit_r_squared_and_no_slope() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [5.0; 4];
        let r = simple_linear_regression(&x, &y).expect("should compute");
        assert_eq!(r.slope, 0.0);
        assert_eq!(r.r_squared, 1.0);
        assert_eq!(r.slope_p, 1.0);
    }

    #[test]
    fn degenerate_inputs() {
        assert!(simple_linear_regression(&[1.0, 2.0], &[1.0, 2.0]).is_none());
        assert!(simple_linear_regression(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(simple_linear_regression(&[1.0, 2.0, 3.0], &[1.0, f64::NAN, 3.0]).is_none());
        assert!(simple_linear_regression(&[1.0, 2.0, 3.0], &[1.0, 2.0]).is_none());
    }
}
