//! Pump-down analysis.
//!
//! # Model
//!
//! ```text
//! P(t) = (P₀ − P_u)·exp(−t/τ) + P_u
//! ```
//!
//! with `t` measured from the first sample. The fit runs Levenberg–Marquardt
//! over `(P₀, ln τ, P_u)`; optimizing `ln τ` keeps τ positive. Starting
//! values are read off the data:
//!
//! - `P₀`: first value
//! - `P_u`: base pressure of the tail
//! - `τ`: time at which the curve first drops below `P_u + (P₀ − P_u)/e`
//!
//! A fit that does not converge is not an error. The result carries
//! `converged == false`, a fit quality of 0 and the starting values.
//!
//! # Milestones
//!
//! The elapsed time at which pressure first reaches each threshold,
//! interpolated linearly in `ln P` between the bracketing samples.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{check_positive, Validate};
use crate::error::{AnalysisError, Result};
use crate::fitting::{levenberg_marquardt, FitOptions, Model, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};
use crate::series::TimeSeries;
use crate::vacuum::base_pressure::{estimate_base_pressure, BasePressureConfig};

/// Fewest finite samples a pump-down fit accepts.
pub const MIN_PUMP_DOWN_SAMPLES: usize = 5;

/// Thresholds reported by default, 1e-2 down to 1e-9.
pub const DEFAULT_THRESHOLDS: [f64; 8] = [1e-2, 1e-3, 1e-4, 1e-5, 1e-6, 1e-7, 1e-8, 1e-9];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Pump-down analyzer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PumpDownConfig {
    /// Pressures whose first crossing is reported.
    pub thresholds: Vec<f64>,
    /// Iteration budget for the fit.
    pub max_iterations: usize,
    /// Relative convergence tolerance for the fit.
    pub tolerance: f64,
    /// Tail used for the ultimate-pressure starting value.
    pub tail_fraction: f64,
}

impl Default for PumpDownConfig {
    fn default() -> Self {
        Self {
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            tail_fraction: 0.1,
        }
    }
}

impl Validate for PumpDownConfig {
    fn validate(&self) -> Result<()> {
        for &t in &self.thresholds {
            check_positive("thresholds", t)?;
        }
        if self.max_iterations == 0 {
            return Err(AnalysisError::invalid("max_iterations", "must be at least 1"));
        }
        check_positive("tolerance", self.tolerance)?;
        BasePressureConfig {
            tail_fraction: self.tail_fraction,
        }
        .validate()
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Elapsed time at which a threshold was first reached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub threshold: f64,
    /// Seconds since the first sample.
    pub elapsed: f64,
}

/// Outcome of a pump-down analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpDownResult {
    /// Fitted P₀.
    pub initial_value: f64,
    /// Fitted τ in seconds.
    pub time_constant: f64,
    /// Fitted P_u.
    pub ultimate_value: f64,
    /// R² of the fit, 0 when not converged.
    pub fit_quality: f64,
    pub converged: bool,
    pub iterations: usize,
    /// Span of the analyzed samples in seconds.
    pub total_time: f64,
    /// Only thresholds actually reached, in configuration order.
    pub milestones: Vec<Milestone>,
}

impl PumpDownResult {
    /// Elapsed time for `threshold`, if it was reached.
    pub fn milestone(&self, threshold: f64) -> Option<f64> {
        self.milestones
            .iter()
            .find(|m| m.threshold == threshold)
            .map(|m| m.elapsed)
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// `(P₀ − P_u)·exp(−t/τ) + P_u` over `[P₀, ln τ, P_u]`.
struct ExponentialDecay;

impl Model for ExponentialDecay {
    fn n_params(&self) -> usize {
        3
    }

    fn eval(&self, t: f64, p: &[f64]) -> f64 {
        let tau = p[1].exp();
        (p[0] - p[2]) * (-t / tau).exp() + p[2]
    }

    fn gradient(&self, t: f64, p: &[f64], out: &mut [f64]) {
        let tau = p[1].exp();
        let e = (-t / tau).exp();
        out[0] = e;
        out[1] = (p[0] - p[2]) * e * t / tau;
        out[2] = 1.0 - e;
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Fits the pump-down curve and reports milestones.
///
/// Non-finite samples are dropped first.
///
/// # Errors
///
/// - `InvalidParameter` for an invalid configuration.
/// - `InsufficientData` with fewer than 5 finite samples.
/// - `NonPositiveValue` if a finite sample is ≤ 0.
///
/// # Examples
///
/// ```
/// use u_vacuum::vacuum::{analyze_pump_down, PumpDownConfig};
/// use u_vacuum::TimeSeries;
///
/// let time: Vec<f64> = (0..=300).map(|i| i as f64).collect();
/// let value = time.iter().map(|t| 99.0 * (-t / 25.0).exp() + 1.0).collect();
/// let s = TimeSeries::new(time, value).unwrap();
///
/// let r = analyze_pump_down(&s, &PumpDownConfig::default()).unwrap();
/// assert!(r.converged);
/// assert!((r.time_constant - 25.0).abs() < 0.5);
/// assert!((r.ultimate_value - 1.0).abs() < 0.05);
/// // the curve never drops below 1, so no default threshold is reached
/// assert!(r.milestones.is_empty());
/// ```
pub fn analyze_pump_down(series: &TimeSeries, config: &PumpDownConfig) -> Result<PumpDownResult> {
    config.validate()?;
    let finite = series
        .finite()
        .ok_or_else(|| AnalysisError::insufficient("pump-down fit", MIN_PUMP_DOWN_SAMPLES, 0))?;
    if finite.len() < MIN_PUMP_DOWN_SAMPLES {
        return Err(AnalysisError::insufficient(
            "pump-down fit",
            MIN_PUMP_DOWN_SAMPLES,
            finite.len(),
        ));
    }
    finite.require_positive()?;

    let t0 = finite.start();
    let t: Vec<f64> = finite.times().iter().map(|x| x - t0).collect();
    let p = finite.values();
    let total_time = finite.span();

    let base = estimate_base_pressure(
        &finite,
        &BasePressureConfig {
            tail_fraction: config.tail_fraction,
        },
    )?;
    let p0 = p[0];
    let pu = base.floor_value;
    let tau0 = initial_time_constant(&t, p, p0, pu, total_time);

    let options = FitOptions {
        max_iterations: config.max_iterations,
        tolerance: config.tolerance,
    };
    let fit = levenberg_marquardt(&ExponentialDecay, &t, p, &[p0, tau0.ln(), pu], options);

    let milestones = milestones(&t, p, &config.thresholds);

    let result = if fit.converged && fit.params.iter().all(|v| v.is_finite()) {
        debug!(
            iterations = fit.iterations,
            r_squared = fit.r_squared,
            tau = fit.params[1].exp(),
            "pump-down fit converged"
        );
        PumpDownResult {
            initial_value: fit.params[0],
            time_constant: fit.params[1].exp(),
            ultimate_value: fit.params[2],
            fit_quality: fit.r_squared,
            converged: true,
            iterations: fit.iterations,
            total_time,
            milestones,
        }
    } else {
        warn!(
            iterations = fit.iterations,
            "pump-down fit did not converge; reporting starting values"
        );
        PumpDownResult {
            initial_value: p0,
            time_constant: tau0,
            ultimate_value: pu,
            fit_quality: 0.0,
            converged: false,
            iterations: fit.iterations,
            total_time,
            milestones,
        }
    };
    Ok(result)
}

/// Time to fall to `1/e` of the initial drop, interpolated; the span (or 1 s)
/// when the data never gets there.
fn initial_time_constant(t: &[f64], p: &[f64], p0: f64, pu: f64, span: f64) -> f64 {
    let fallback = if span > 0.0 { span } else { 1.0 };
    let target = pu + (p0 - pu) / std::f64::consts::E;
    let Some(i) = p.iter().position(|&v| v <= target) else {
        return fallback;
    };
    if i == 0 {
        return fallback;
    }
    let (ta, tb) = (t[i - 1], t[i]);
    let (pa, pb) = (p[i - 1], p[i]);
    let tau = if pa > pb {
        ta + (pa - target) / (pa - pb) * (tb - ta)
    } else {
        tb
    };
    if tau.is_finite() && tau > 0.0 {
        tau
    } else {
        fallback
    }
}

/// First crossing of each threshold, interpolated in log pressure.
fn milestones(t: &[f64], p: &[f64], thresholds: &[f64]) -> Vec<Milestone> {
    thresholds
        .iter()
        .filter_map(|&threshold| {
            let i = p.iter().position(|&v| v <= threshold)?;
            let elapsed = if i == 0 {
                0.0
            } else {
                let (la, lb) = (p[i - 1].ln(), p[i].ln());
                let frac = (la - threshold.ln()) / (la - lb);
                t[i - 1] + frac * (t[i] - t[i - 1])
            };
            Some(Milestone { threshold, elapsed })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

/// Pump-down cycle detection configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CycleConfig {
    /// A sample belongs to a cycle while `d(log₁₀ P)/dsample` is below this.
    pub slope_threshold: f64,
    /// Minimum consecutive samples in a cycle.
    pub min_samples: usize,
    /// Minimum drop in decades across a cycle.
    pub min_decades: f64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            slope_threshold: -0.001,
            min_samples: 10,
            min_decades: 2.0,
        }
    }
}

impl Validate for CycleConfig {
    fn validate(&self) -> Result<()> {
        if !(self.slope_threshold.is_finite() && self.slope_threshold < 0.0) {
            return Err(AnalysisError::invalid(
                "slope_threshold",
                format!("must be negative, got {}", self.slope_threshold),
            ));
        }
        if self.min_samples < 2 {
            return Err(AnalysisError::invalid("min_samples", "must be at least 2"));
        }
        check_positive("min_decades", self.min_decades)
    }
}

/// How many decades a cycle covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleEfficiency {
    /// More than 4 decades.
    High,
    /// More than 2 decades.
    Moderate,
    Low,
}

impl CycleEfficiency {
    fn from_decades(decades: f64) -> Self {
        if decades > 4.0 {
            Self::High
        } else if decades > 2.0 {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

/// One pump-down segment inside a longer recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpDownCycle {
    /// First sample of the cycle (index into the finite samples).
    pub start_index: usize,
    /// Last sample of the cycle, inclusive.
    pub end_index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub initial_pressure: f64,
    pub final_pressure: f64,
    /// `log₁₀(initial / final)`.
    pub decades: f64,
    /// Decades per second; 0 for a zero-length cycle.
    pub average_rate: f64,
    pub efficiency: CycleEfficiency,
}

/// Finds the pump-down segments of a recording with several cycles.
///
/// The slope is the central difference of `log₁₀ P` per sample (one-sided at
/// the ends). A cycle is a maximal run of samples whose slope is below the
/// threshold, long enough and deep enough per `config`. A run still open at
/// the end of the data counts as well.
///
/// # Errors
///
/// - `InvalidParameter` for an invalid configuration.
/// - `NonPositiveValue` if a finite sample is ≤ 0.
pub fn detect_pump_down_cycles(series: &TimeSeries, config: &CycleConfig) -> Result<Vec<PumpDownCycle>> {
    config.validate()?;
    let Some(finite) = series.finite() else {
        return Ok(Vec::new());
    };
    finite.require_positive()?;
    let n = finite.len();
    if n < config.min_samples || n < 2 {
        return Ok(Vec::new());
    }

    let p = finite.values();
    let t = finite.times();
    let log: Vec<f64> = p.iter().map(|v| v.log10()).collect();
    let slope: Vec<f64> = (0..n)
        .map(|i| {
            if i == 0 {
                log[1] - log[0]
            } else if i == n - 1 {
                log[n - 1] - log[n - 2]
            } else {
                (log[i + 1] - log[i - 1]) / 2.0
            }
        })
        .collect();

    let mut cycles = Vec::new();
    let mut start = None;
    for i in 0..=n {
        let pumping = i < n && slope[i] < config.slope_threshold;
        match (pumping, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if let Some(cycle) = build_cycle(t, p, s, i - 1, config) {
                    cycles.push(cycle);
                }
                start = None;
            }
            _ => {}
        }
    }

    debug!(cycles = cycles.len(), "pump-down cycles detected");
    Ok(cycles)
}

fn build_cycle(t: &[f64], p: &[f64], start: usize, end: usize, config: &CycleConfig) -> Option<PumpDownCycle> {
    if end + 1 - start < config.min_samples {
        return None;
    }
    let decades = (p[start] / p[end]).log10();
    if decades < config.min_decades {
        return None;
    }
    let duration = t[end] - t[start];
    Some(PumpDownCycle {
        start_index: start,
        end_index: end,
        start_time: t[start],
        end_time: t[end],
        duration,
        initial_pressure: p[start],
        final_pressure: p[end],
        decades,
        average_rate: if duration > 0.0 { decades / duration } else { 0.0 },
        efficiency: CycleEfficiency::from_decades(decades),
    })
}
