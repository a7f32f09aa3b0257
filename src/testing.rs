//! Hypothesis testing.
//!
//! Two-sample tests used by the comparison engine: Welch's t-test for a
//! difference in means and the Kolmogorov–Smirnov test for a difference in
//! distribution shape.
//!
//! # Examples
//!
//! ```
//! use u_vacuum::testing::{ks_two_sample, two_sample_t_test};
//!
//! let a = [5.1, 4.9, 5.2, 5.0, 4.8];
//! let b = [7.1, 6.9, 7.2, 7.0, 6.8];
//! let t = two_sample_t_test(&a, &b).unwrap();
//! assert!(t.p_value < 0.01); // means clearly differ
//!
//! let ks = ks_two_sample(&a, &b).unwrap();
//! assert_eq!(ks.statistic, 1.0); // no overlap at all
//! ```

use u_numflow::stats;

use crate::regression::two_tailed_t;

/// Result of a hypothesis test.
#[derive(Debug, Clone, Copy)]
pub struct TestResult {
    /// Test statistic (t or D depending on test).
    pub statistic: f64,
    /// Degrees of freedom (fractional for Welch, effective n for KS).
    pub df: f64,
    /// Two-tailed p-value.
    pub p_value: f64,
}

// ---------------------------------------------------------------------------
// t-test
// ---------------------------------------------------------------------------

/// Two-sample Welch t-test: H₀: μ₁ = μ₂ (unequal variances).
///
/// # Algorithm
///
/// t = (x̄₁ - x̄₂) / √(s₁²/n₁ + s₂²/n₂)
/// df = Welch-Satterthwaite approximation.
///
/// # Returns
///
/// `None` if either sample has fewer than 2 observations, contains
/// non-finite values, or both samples have zero variance.
///
/// # References
///
/// Welch (1947). "The generalization of Student's problem when several
/// different population variances are involved". Biometrika, 34, 28–35.
pub fn two_sample_t_test(a: &[f64], b: &[f64]) -> Option<TestResult> {
    let n1 = a.len();
    let n2 = b.len();
    if n1 < 2 || n2 < 2 {
        return None;
    }
    if a.iter().any(|v| !v.is_finite()) || b.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let mean1 = stats::mean(a)?;
    let mean2 = stats::mean(b)?;
    let var1 = stats::variance(a)?;
    let var2 = stats::variance(b)?;

    let n1f = n1 as f64;
    let n2f = n2 as f64;

    let v1 = var1 / n1f;
    let v2 = var2 / n2f;
    let se_sq = v1 + v2;
    if se_sq < 1e-300 {
        return None;
    }

    let t = (mean1 - mean2) / se_sq.sqrt();

    // Welch-Satterthwaite degrees of freedom
    let df = se_sq.powi(2) / (v1 * v1 / (n1f - 1.0) + v2 * v2 / (n2f - 1.0));

    Some(TestResult {
        statistic: t,
        df,
        p_value: two_tailed_t(t, df),
    })
}

// ---------------------------------------------------------------------------
// Kolmogorov–Smirnov
// ---------------------------------------------------------------------------

/// Two-sample Kolmogorov–Smirnov test: H₀: both samples share a distribution.
///
/// # Algorithm
///
/// D = sup |F₁(x) − F₂(x)| over the pooled sample, evaluated after each
/// distinct value so ties are handled exactly.
///
/// p-value from the asymptotic Kolmogorov distribution with effective size
/// nₑ = n₁n₂/(n₁+n₂) and Stephens' correction
/// λ = (√nₑ + 0.12 + 0.11/√nₑ)·D,
/// P(D > d) ≈ 2·Σ (-1)^(k-1) exp(-2k²λ²).
///
/// # Returns
///
/// `None` if either sample is empty or contains non-finite values.
///
/// # References
///
/// Stephens (1970). "Use of the Kolmogorov–Smirnov, Cramér–von Mises and
/// related statistics without extensive tables". JRSS B, 32, 115–122.
pub fn ks_two_sample(a: &[f64], b: &[f64]) -> Option<TestResult> {
    let n1 = a.len();
    let n2 = b.len();
    if n1 == 0 || n2 == 0 {
        return None;
    }
    if a.iter().any(|v| !v.is_finite()) || b.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let mut sa = a.to_vec();
    let mut sb = b.to_vec();
    sa.sort_by(f64::total_cmp);
    sb.sort_by(f64::total_cmp);

    let n1f = n1 as f64;
    let n2f = n2 as f64;
    let (mut i, mut j) = (0usize, 0usize);
    let mut d_stat = 0.0_f64;
    while i < n1 && j < n2 {
        let x = sa[i].min(sb[j]);
        while i < n1 && sa[i] <= x {
            i += 1;
        }
        while j < n2 && sb[j] <= x {
            j += 1;
        }
        d_stat = d_stat.max((i as f64 / n1f - j as f64 / n2f).abs());
    }

    let ne = n1f * n2f / (n1f + n2f);
    Some(TestResult {
        statistic: d_stat,
        df: ne,
        p_value: kolmogorov_p_value(d_stat, ne),
    })
}

/// Upper tail of the Kolmogorov distribution with Stephens' correction.
fn kolmogorov_p_value(d: f64, ne: f64) -> f64 {
    let sqrt_ne = ne.sqrt();
    let lambda = (sqrt_ne + 0.12 + 0.11 / sqrt_ne) * d;
    if lambda < 1e-3 {
        return 1.0;
    }
    let mut p_value = 0.0;
    for k in 1..=100 {
        let kf = k as f64;
        let sign = if k % 2 == 1 { 1.0 } else { -1.0 };
        let term = sign * (-2.0 * kf * kf * lambda * lambda).exp();
        p_value += term;
        if term.abs() < 1e-15 {
            break;
        }
    }
    (2.0 * p_value).clamp(0.0, 1.0)
}
