//! Correlation analysis.
//!
//! Pearson correlation with its p-value, and a lagged cross-correlation
//! used to align two uniformly resampled series.
//!
//! # Examples
//!
//! ```
//! use u_vacuum::correlation::pearson;
//!
//! let x = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let y = [2.0, 4.0, 5.0, 4.0, 5.0];
//!
//! let p = pearson(&x, &y).unwrap();
//! assert!(p.r > 0.7);
//! assert!(p.p_value < 0.2);
//! ```

use u_numflow::stats;

use crate::regression::two_tailed_t;

/// Result of a correlation computation.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationResult {
    /// Correlation coefficient in [-1, 1].
    pub r: f64,
    /// Two-tailed p-value for testing H₀: ρ = 0.
    pub p_value: f64,
    /// Sample size.
    pub n: usize,
}

// ---------------------------------------------------------------------------
// Pearson
// ---------------------------------------------------------------------------

/// Computes Pearson product-moment correlation coefficient and p-value.
///
/// # Algorithm
///
/// r = cov(x,y) / (σ_x · σ_y)
///
/// p-value via t-test: t = r·√(n-2) / √(1-r²), df = n-2.
///
/// # Returns
///
/// `None` if either slice has fewer than 3 elements, the slices differ in
/// length, or either variable has zero variance.
///
/// # References
///
/// Pearson (1895). "Note on regression and inheritance in the case of
/// two parents". Proceedings of the Royal Society of London, 58, 240–242.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<CorrelationResult> {
    let n = x.len();
    if n < 3 || n != y.len() {
        return None;
    }

    if x.iter().any(|v| !v.is_finite()) || y.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let cov = stats::covariance(x, y)?;
    let sx = stats::std_dev(x)?;
    let sy = stats::std_dev(y)?;

    if sx < 1e-300 || sy < 1e-300 {
        return None; // zero variance
    }

    let r = (cov / (sx * sy)).clamp(-1.0, 1.0);
    let p_value = correlation_p_value(r, n);

    Some(CorrelationResult { r, p_value, n })
}

/// p-value for H₀: ρ = 0 using the t-distribution with n−2 df.
fn correlation_p_value(r: f64, n: usize) -> f64 {
    if n < 3 {
        return 1.0;
    }
    let df = (n - 2) as f64;
    let r2 = r * r;

    // r ≈ ±1 makes the denominator vanish
    if r2 >= 1.0 - 1e-15 {
        return 0.0;
    }

    let t = r * (df / (1.0 - r2)).sqrt();
    two_tailed_t(t, df)
}

// ---------------------------------------------------------------------------
// Lagged cross-correlation
// ---------------------------------------------------------------------------

/// Peak of a lagged, per-lag normalized cross-correlation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossCorrelationPeak {
    /// Lag (in samples) maximizing the correlation; `y[i + lag]` pairs with `x[i]`.
    pub lag: isize,
    /// Correlation at that lag, in [-1, 1].
    pub r: f64,
    /// Number of overlapping pairs at that lag.
    pub overlap: usize,
}

/// Finds the lag in `-max_lag..=max_lag` maximizing the Pearson correlation
/// between `x[i]` and `y[i + lag]` over their overlapping pairs.
///
/// Each lag is normalized by the mean and variance of its own overlapping
/// segments, so the score is a proper correlation in [-1, 1]. Lags leaving
/// fewer than 3 pairs, or with a constant segment, are skipped. Ties keep
/// the lag closest to zero.
///
/// # Returns
///
/// `None` if the slices differ in length, contain non-finite values, or no
/// lag yields a defined correlation.
///
/// # Complexity
///
/// Time: O(n · max_lag), Space: O(n)
pub fn cross_correlation_peak(x: &[f64], y: &[f64], max_lag: usize) -> Option<CrossCorrelationPeak> {
    let n = x.len();
    if n != y.len() || n < 3 {
        return None;
    }
    if x.iter().any(|v| !v.is_finite()) || y.iter().any(|v| !v.is_finite()) {
        return None;
    }

    // centering keeps the prefix sums well conditioned; r is shift invariant
    let mx = stats::mean(x)?;
    let my = stats::mean(y)?;
    let x: Vec<f64> = x.iter().map(|v| v - mx).collect();
    let y: Vec<f64> = y.iter().map(|v| v - my).collect();
    let px = PrefixSums::new(&x);
    let py = PrefixSums::new(&y);
    let max_lag = max_lag.min(n - 3);

    let mut best: Option<CrossCorrelationPeak> = None;
    // visit lags by increasing |lag| so ties keep the smallest shift
    let lags = std::iter::once(0isize).chain((1..=max_lag as isize).flat_map(|l| [l, -l]));
    for lag in lags {
        let (x0, y0, m) = if lag >= 0 {
            (0, lag as usize, n - lag as usize)
        } else {
            ((-lag) as usize, 0, n - (-lag) as usize)
        };
        let Some(r) = segment_correlation(&x, &y, &px, &py, x0, y0, m) else {
            continue;
        };
        if best.map_or(true, |b| r > b.r + 1e-12) {
            best = Some(CrossCorrelationPeak { lag, r, overlap: m });
        }
    }
    best
}

struct PrefixSums {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl PrefixSums {
    fn new(data: &[f64]) -> Self {
        let mut sum = Vec::with_capacity(data.len() + 1);
        let mut sum_sq = Vec::with_capacity(data.len() + 1);
        sum.push(0.0);
        sum_sq.push(0.0);
        for &v in data {
            sum.push(sum[sum.len() - 1] + v);
            sum_sq.push(sum_sq[sum_sq.len() - 1] + v * v);
        }
        Self { sum, sum_sq }
    }

    fn range(&self, start: usize, len: usize) -> (f64, f64) {
        (
            self.sum[start + len] - self.sum[start],
            self.sum_sq[start + len] - self.sum_sq[start],
        )
    }
}

fn segment_correlation(
    x: &[f64],
    y: &[f64],
    px: &PrefixSums,
    py: &PrefixSums,
    x0: usize,
    y0: usize,
    m: usize,
) -> Option<f64> {
    if m < 3 {
        return None;
    }
    let mf = m as f64;
    let (sx, sxx) = px.range(x0, m);
    let (sy, syy) = py.range(y0, m);
    let sxy: f64 = x[x0..x0 + m]
        .iter()
        .zip(&y[y0..y0 + m])
        .map(|(a, b)| a * b)
        .sum();

    let vx = sxx - sx * sx / mf;
    let vy = syy - sy * sy / mf;
    // relative guard against cancellation in the prefix sums
    if vx <= 1e-12 * sxx.abs().max(1e-300) || vy <= 1e-12 * syy.abs().max(1e-300) {
        return None;
    }
    let r = (sxy - sx * sy / mf) / (vx * vy).sqrt();
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}
