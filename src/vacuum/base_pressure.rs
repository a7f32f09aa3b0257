//! Base pressure: the steady floor a system settles at after pump-down.
//!
//! # Algorithm
//!
//! Over the last `max(⌈n·f⌉, 5)` finite samples:
//!
//! ```text
//! floor      = median(tail)
//! stability  = s / x̄          (coefficient of variation)
//! confidence = 1 / (1 + stability)
//! ```
//!
//! The median keeps residual spikes in the tail from dragging the floor up.

use serde::{Deserialize, Serialize};
use tracing::debug;
use u_numflow::stats;

use crate::config::Validate;
use crate::error::{AnalysisError, Result};
use crate::series::TimeSeries;

/// Fewest tail samples the estimate is computed from.
pub const MIN_TAIL_SAMPLES: usize = 5;

/// Base pressure configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BasePressureConfig {
    /// Fraction of the series, counted from the end, treated as steady state.
    pub tail_fraction: f64,
}

impl Default for BasePressureConfig {
    fn default() -> Self {
        Self { tail_fraction: 0.1 }
    }
}

impl Validate for BasePressureConfig {
    fn validate(&self) -> Result<()> {
        let f = self.tail_fraction;
        if f.is_finite() && f > 0.0 && f <= 1.0 {
            Ok(())
        } else {
            Err(AnalysisError::invalid(
                "tail_fraction",
                format!("must lie in (0, 1], got {f}"),
            ))
        }
    }
}

/// Steady-state floor of a pressure series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasePressureResult {
    /// Median of the tail.
    pub floor_value: f64,
    /// Coefficient of variation over the tail.
    pub stability: f64,
    /// `1 / (1 + stability)`, in (0, 1].
    pub confidence: f64,
    /// Number of samples the estimate used.
    pub tail_len: usize,
}

/// Estimates the base pressure from the tail of `series`.
///
/// # Errors
///
/// - `InvalidParameter` for a tail fraction outside (0, 1].
/// - `InsufficientData` with fewer than 5 finite samples.
/// - `NonPositiveValue` if a tail value is ≤ 0. The reported index refers to
///   the original series.
///
/// # Examples
///
/// ```
/// use u_vacuum::vacuum::{estimate_base_pressure, BasePressureConfig};
/// use u_vacuum::TimeSeries;
///
/// let value: Vec<f64> = (0..100).map(|i| if i < 80 { 1e-3 } else { 2e-7 }).collect();
/// let time = (0..100).map(|i| i as f64).collect();
/// let s = TimeSeries::new(time, value).unwrap();
///
/// let r = estimate_base_pressure(&s, &BasePressureConfig::default()).unwrap();
/// assert_eq!(r.floor_value, 2e-7);
/// assert!(r.stability < 1e-9);
/// assert_eq!(r.tail_len, 10);
/// ```
pub fn estimate_base_pressure(series: &TimeSeries, config: &BasePressureConfig) -> Result<BasePressureResult> {
    config.validate()?;

    let finite: Vec<(usize, f64)> = series
        .values()
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .collect();
    let n = finite.len();
    if n < MIN_TAIL_SAMPLES {
        return Err(AnalysisError::insufficient("base pressure", MIN_TAIL_SAMPLES, n));
    }

    let tail_len = ((n as f64 * config.tail_fraction).ceil() as usize).clamp(MIN_TAIL_SAMPLES, n);
    let tail = &finite[n - tail_len..];
    if let Some(&(index, value)) = tail.iter().find(|(_, v)| *v <= 0.0) {
        return Err(AnalysisError::NonPositiveValue { index, value });
    }

    let values: Vec<f64> = tail.iter().map(|&(_, v)| v).collect();
    let floor_value = stats::median(&values).ok_or_else(|| AnalysisError::insufficient("base pressure", MIN_TAIL_SAMPLES, 0))?;
    let stability = coefficient_of_variation(&values).unwrap_or(0.0).abs();

    debug!(floor_value, stability, tail_len, "base pressure estimated");
    Ok(BasePressureResult {
        floor_value,
        stability,
        confidence: 1.0 / (1.0 + stability),
        tail_len,
    })
}

/// `s / x̄`; `None` for a zero mean or fewer than 2 values.
fn coefficient_of_variation(data: &[f64]) -> Option<f64> {
    let m = stats::mean(data)?;
    if m.abs() < 1e-300 {
        return None;
    }
    Some(stats::std_dev(data)? / m)
}
