//! Leak rate of an isolated chamber from its pressure rise.
//!
//! Three independent estimates are computed over the same samples:
//!
//! | Method        | Rate                              | Quality       |
//! |---------------|-----------------------------------|---------------|
//! | Linear        | OLS slope dP/dt                   | R²            |
//! | Exponential   | `k·(P̄ − C)` of `A·exp(k·t) + C`   | R² of the fit |
//! | Conductance   | `slope · V / C_ref`               | R² of the OLS |
//!
//! They are combined by [`reconcile`] into a quality-weighted average.
//!
//! # Examples
//!
//! ```
//! use u_vacuum::vacuum::{estimate_leak_rate, LeakConfig, LeakMethod, LeakSeverity};
//! use u_vacuum::TimeSeries;
//!
//! let time: Vec<f64> = (0..120).map(|i| i as f64).collect();
//! let value = time.iter().map(|t| 1e-4 + 2e-6 * t).collect();
//! let s = TimeSeries::new(time, value).unwrap();
//!
//! let r = estimate_leak_rate(&s, &LeakConfig::default()).unwrap();
//! let linear = r.per_method[&LeakMethod::Linear];
//! assert!((linear.rate - 2e-6).abs() < 1e-12);
//! assert_eq!(r.severity, LeakSeverity::Minor);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use u_numflow::stats;

use crate::config::{check_descending, check_positive, Validate};
use crate::error::{AnalysisError, Result};
use crate::fitting::{levenberg_marquardt, FitOptions, Model, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};
use crate::regression::simple_linear_regression;
use crate::series::TimeSeries;

/// Fewest points any leak method accepts.
pub const MIN_LEAK_SAMPLES: usize = 3;

/// Reference conductance used to normalize the conductance method.
pub const DEFAULT_REFERENCE_CONDUCTANCE: f64 = 1000.0;

/// Estimation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakMethod {
    Linear,
    Exponential,
    Conductance,
}

/// Which methods to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodSelection {
    /// Every method; conductance only when a volume is configured.
    #[default]
    All,
    Linear,
    Exponential,
    Conductance,
}

/// Leak severity, from harmless to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LeakSeverity {
    Negligible,
    Minor,
    Significant,
    Severe,
}

/// Rate bands for [`LeakSeverity`]. A rate must strictly exceed a band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeakSeverityPolicy {
    pub severe: f64,
    pub significant: f64,
    pub minor: f64,
}

impl Default for LeakSeverityPolicy {
    fn default() -> Self {
        Self {
            severe: 1e-3,
            significant: 1e-5,
            minor: 1e-7,
        }
    }
}

impl LeakSeverityPolicy {
    pub fn classify(&self, rate: f64) -> LeakSeverity {
        if rate > self.severe {
            LeakSeverity::Severe
        } else if rate > self.significant {
            LeakSeverity::Significant
        } else if rate > self.minor {
            LeakSeverity::Minor
        } else {
            LeakSeverity::Negligible
        }
    }
}

impl Validate for LeakSeverityPolicy {
    fn validate(&self) -> Result<()> {
        check_descending("leak severity", &[self.severe, self.significant, self.minor])
    }
}

/// Leak estimator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeakConfig {
    pub method: MethodSelection,
    /// Chamber volume in litres; enables the conductance method.
    pub volume: Option<f64>,
    pub reference_conductance: f64,
    /// Iteration budget for the exponential fit.
    pub max_iterations: usize,
    pub tolerance: f64,
    pub severity: LeakSeverityPolicy,
}

impl Default for LeakConfig {
    fn default() -> Self {
        Self {
            method: MethodSelection::All,
            volume: None,
            reference_conductance: DEFAULT_REFERENCE_CONDUCTANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            severity: LeakSeverityPolicy::default(),
        }
    }
}

impl LeakConfig {
    /// Methods this configuration runs, in reporting order.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` when the conductance method is requested without a volume.
    pub fn methods(&self) -> Result<Vec<LeakMethod>> {
        let methods = match self.method {
            MethodSelection::All => {
                let mut m = vec![LeakMethod::Linear, LeakMethod::Exponential];
                if self.volume.is_some() {
                    m.push(LeakMethod::Conductance);
                }
                m
            }
            MethodSelection::Linear => vec![LeakMethod::Linear],
            MethodSelection::Exponential => vec![LeakMethod::Exponential],
            MethodSelection::Conductance => {
                if self.volume.is_none() {
                    return Err(AnalysisError::invalid(
                        "volume",
                        "the conductance method needs a chamber volume",
                    ));
                }
                vec![LeakMethod::Conductance]
            }
        };
        Ok(methods)
    }
}

impl Validate for LeakConfig {
    fn validate(&self) -> Result<()> {
        if let Some(v) = self.volume {
            check_positive("volume", v)?;
        }
        check_positive("reference_conductance", self.reference_conductance)?;
        if self.max_iterations == 0 {
            return Err(AnalysisError::invalid("max_iterations", "must be at least 1"));
        }
        check_positive("tolerance", self.tolerance)?;
        self.severity.validate()
    }
}

/// Rate and quality reported by one method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MethodEstimate {
    /// Pressure rise rate (pressure units per second, or throughput for
    /// the conductance method).
    pub rate: f64,
    /// Goodness of fit in [0, 1].
    pub quality: f64,
}

/// Leak rate estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakRateResult {
    pub per_method: BTreeMap<LeakMethod, MethodEstimate>,
    pub reconciled_rate: f64,
    pub severity: LeakSeverity,
    /// Samples the estimate used.
    pub n_points: usize,
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

/// `A·exp(k·t) + C` over `[A, k, C]`.
struct ExponentialRise;

impl Model for ExponentialRise {
    fn n_params(&self) -> usize {
        3
    }

    fn eval(&self, t: f64, p: &[f64]) -> f64 {
        p[0] * (p[1] * t).exp() + p[2]
    }

    fn gradient(&self, t: f64, p: &[f64], out: &mut [f64]) {
        let e = (p[1] * t).exp();
        out[0] = e;
        out[1] = p[0] * t * e;
        out[2] = 1.0;
    }
}

/// Estimates the leak rate of a rising-pressure segment.
///
/// Non-finite samples are dropped first.
///
/// # Errors
///
/// - `InvalidParameter` for an invalid configuration, or when every sample
///   shares one timestamp.
/// - `InsufficientData` with fewer than 3 finite samples.
/// - `NonPositiveValue` if a finite sample is ≤ 0.
pub fn estimate_leak_rate(series: &TimeSeries, config: &LeakConfig) -> Result<LeakRateResult> {
    config.validate()?;
    let methods = config.methods()?;

    let finite = series
        .finite()
        .ok_or_else(|| AnalysisError::insufficient("leak rate", MIN_LEAK_SAMPLES, 0))?;
    let n = finite.len();
    if n < MIN_LEAK_SAMPLES {
        return Err(AnalysisError::insufficient("leak rate", MIN_LEAK_SAMPLES, n));
    }
    finite.require_positive()?;

    let t0 = finite.start();
    let t: Vec<f64> = finite.times().iter().map(|x| x - t0).collect();
    let p = finite.values();

    let linear = simple_linear_regression(&t, p)
        .ok_or_else(|| AnalysisError::invalid("series", "timestamps must not all be equal"))?;

    let mut per_method = BTreeMap::new();
    for method in methods {
        let estimate = match method {
            LeakMethod::Linear => MethodEstimate {
                rate: linear.slope,
                quality: linear.r_squared,
            },
            LeakMethod::Exponential => exponential_estimate(&t, p, config),
            LeakMethod::Conductance => {
                let volume = config.volume.ok_or_else(|| {
                    AnalysisError::invalid("volume", "the conductance method needs a chamber volume")
                })?;
                MethodEstimate {
                    rate: linear.slope * volume / config.reference_conductance,
                    quality: linear.r_squared,
                }
            }
        };
        debug!(?method, rate = estimate.rate, quality = estimate.quality, "leak method estimate");
        per_method.insert(method, estimate);
    }

    let reconciled_rate = reconcile(&per_method)
        .ok_or_else(|| AnalysisError::insufficient("leak rate", MIN_LEAK_SAMPLES, n))?;

    Ok(LeakRateResult {
        severity: config.severity.classify(reconciled_rate),
        per_method,
        reconciled_rate,
        n_points: n,
    })
}

/// Fits `A·exp(k·t) + C`, started from a log-linear fit with `C = 0`.
fn exponential_estimate(t: &[f64], p: &[f64], config: &LeakConfig) -> MethodEstimate {
    let log_p: Vec<f64> = p.iter().map(|v| v.ln()).collect();
    let (a0, k0) = match simple_linear_regression(t, &log_p) {
        Some(r) => (r.intercept.exp(), r.slope),
        None => (p[0], 0.0),
    };

    let options = FitOptions {
        max_iterations: config.max_iterations,
        tolerance: config.tolerance,
    };
    let fit = levenberg_marquardt(&ExponentialRise, t, p, &[a0, k0, 0.0], options);
    let params = if fit.params.iter().all(|v| v.is_finite()) {
        fit.params.clone()
    } else {
        vec![a0, k0, 0.0]
    };
    let (k, c) = (params[1], params[2]);

    let mean_p = stats::mean(p).unwrap_or(p[0]);
    let rate = k * (mean_p - c);
    let quality = if fit.converged { fit.r_squared } else { 0.0 };
    if !fit.converged {
        warn!(iterations = fit.iterations, "exponential leak fit did not converge");
    }
    MethodEstimate {
        rate: if rate.is_finite() { rate } else { k0 * mean_p },
        quality,
    }
}

/// Quality-weighted average of the finite per-method rates.
///
/// Qualities are clamped to [0, 1]. When they sum to (almost) zero every
/// method gets the same weight. `None` if there is no finite rate.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use u_vacuum::vacuum::{reconcile, LeakMethod, MethodEstimate};
///
/// let mut m = BTreeMap::new();
/// m.insert(LeakMethod::Linear, MethodEstimate { rate: 1.0, quality: 0.75 });
/// m.insert(LeakMethod::Exponential, MethodEstimate { rate: 2.0, quality: 0.25 });
/// assert_eq!(reconcile(&m), Some(1.25));
/// ```
pub fn reconcile(estimates: &BTreeMap<LeakMethod, MethodEstimate>) -> Option<f64> {
    let usable: Vec<(f64, f64)> = estimates
        .values()
        .filter(|e| e.rate.is_finite())
        .map(|e| {
            let q = if e.quality.is_finite() {
                e.quality.clamp(0.0, 1.0)
            } else {
                0.0
            };
            (e.rate, q)
        })
        .collect();
    if usable.is_empty() {
        return None;
    }

    let total: f64 = usable.iter().map(|(_, q)| q).sum();
    if total <= 1e-12 {
        let rates: Vec<f64> = usable.iter().map(|(r, _)| *r).collect();
        return stats::mean(&rates);
    }
    Some(usable.iter().map(|(r, q)| r * q).sum::<f64>() / total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rise(f: impl Fn(f64) -> f64, n: usize) -> TimeSeries {
        let time: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        let value = time.iter().map(|&t| f(t - 100.0)).collect();
        TimeSeries::new(time, value).expect("valid")
    }

    #[test]
    fn linear_rise_reconciles_to_slope() {
        let s = rise(|t| 5e-4 + 3e-6 * t, 200);
        let r = estimate_leak_rate(&s, &LeakConfig::default()).unwrap();
        let lin = r.per_method[&LeakMethod::Linear];
        assert!((lin.quality - 1.0).abs() < 1e-9);
        assert!((r.reconciled_rate - 3e-6).abs() / 3e-6 < 0.01, "rate = {}", r.reconciled_rate);
        assert!(!r.per_method.contains_key(&LeakMethod::Conductance));
        assert_eq!(r.severity, LeakSeverity::Minor);
        assert_eq!(r.n_points, 200);
    }

    #[test]
    fn exponential_rise_is_fitted() {
        // P = 1e-4·exp(0.01·t) + 1e-5
        let s = rise(|t| 1e-4 * (0.01 * t).exp() + 1e-5, 150);
        let cfg = LeakConfig {
            method: MethodSelection::Exponential,
            ..LeakConfig::default()
        };
        let r = estimate_leak_rate(&s, &cfg).unwrap();
        let e = r.per_method[&LeakMethod::Exponential];
        assert!(e.quality > 0.999);
        let mean_p = stats::mean(s.values()).unwrap();
        let expected = 0.01 * (mean_p - 1e-5);
        assert!((e.rate - expected).abs() / expected < 0.01, "rate = {}", e.rate);
        assert_eq!(r.per_method.len(), 1);
    }

    #[test]
    fn conductance_needs_volume() {
        let s = rise(|t| 1e-3 + 1e-5 * t, 20);
        let cfg = LeakConfig {
            method: MethodSelection::Conductance,
            ..LeakConfig::default()
        };
        assert!(matches!(
            estimate_leak_rate(&s, &cfg),
            Err(AnalysisError::InvalidParameter { name: "volume", .. })
        ));

        let cfg = LeakConfig {
            method: MethodSelection::Conductance,
            volume: Some(50.0),
            ..LeakConfig::default()
        };
        let r = estimate_leak_rate(&s, &cfg).unwrap();
        let c = r.per_method[&LeakMethod::Conductance];
        assert!((c.rate - 1e-5 * 50.0 / 1000.0).abs() < 1e-15);
        assert!((r.reconciled_rate - c.rate).abs() < 1e-18);
    }

    #[test]
    fn all_with_volume_runs_three_methods() {
        let s = rise(|t| 1e-3 + 1e-5 * t, 50);
        let cfg = LeakConfig {
            volume: Some(10.0),
            ..LeakConfig::default()
        };
        let r = estimate_leak_rate(&s, &cfg).unwrap();
        let keys: Vec<LeakMethod> = r.per_method.keys().copied().collect();
        assert_eq!(keys, vec![LeakMethod::Linear, LeakMethod::Exponential, LeakMethod::Conductance]);
    }

    #[test]
    fn reconcile_falls_back_to_equal_weights() {
        let mut m = BTreeMap::new();
        m.insert(LeakMethod::Linear, MethodEstimate { rate: 1.0, quality: 0.0 });
        m.insert(LeakMethod::Exponential, MethodEstimate { rate: 3.0, quality: f64::NAN });
        assert_eq!(reconcile(&m), Some(2.0));
        m.insert(LeakMethod::Conductance, MethodEstimate { rate: f64::INFINITY, quality: 1.0 });
        assert_eq!(reconcile(&m), Some(2.0));
        assert_eq!(reconcile(&BTreeMap::new()), None);
    }

    #[test]
    fn severity_bands() {
        let p = LeakSeverityPolicy::default();
        assert_eq!(p.classify(2e-3), LeakSeverity::Severe);
        assert_eq!(p.classify(1e-3), LeakSeverity::Significant);
        assert_eq!(p.classify(1e-6), LeakSeverity::Minor);
        assert_eq!(p.classify(1e-7), LeakSeverity::Negligible);
        assert_eq!(p.classify(-1.0), LeakSeverity::Negligible);
    }

    #[test]
    fn input_checks() {
        let s = TimeSeries::new(vec![0.0, 1.0], vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            estimate_leak_rate(&s, &LeakConfig::default()),
            Err(AnalysisError::InsufficientData { required: 3, actual: 2, .. })
        ));
        let s = TimeSeries::new(vec![0.0, 1.0, 2.0, 3.0], vec![1.0, f64::NAN, 2.0, f64::NAN]).unwrap();
        assert!(matches!(
            estimate_leak_rate(&s, &LeakConfig::default()),
            Err(AnalysisError::InsufficientData { actual: 2, .. })
        ));
        let s = TimeSeries::new(vec![0.0, 1.0, 2.0], vec![1.0, -2.0, 3.0]).unwrap();
        assert!(matches!(
            estimate_leak_rate(&s, &LeakConfig::default()),
            Err(AnalysisError::NonPositiveValue { index: 1, .. })
        ));
        let s = TimeSeries::new(vec![5.0, 5.0, 5.0], vec![1.0, 2.0, 3.0]).unwrap();
        assert!(estimate_leak_rate(&s, &LeakConfig::default()).is_err());
    }
}
