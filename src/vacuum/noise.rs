//! Noise characteristics of a pressure signal.
//!
//! # Algorithm
//!
//! A polynomial trend (quadratic by default) is fitted by least squares
//! against the sample index and subtracted. On the residual `d`:
//!
//! ```text
//! noise_rms          = √(mean(d²))
//! peak_to_peak       = max(d) − min(d)
//! snr_db             = 10·log10(mean(y²) / mean(d²))
//! dominant_frequency = k*·fs / n,   k* = argmax |D_k|²,  0 < k < n/2
//! ```
//!
//! The index is rescaled to [−1, 1] before fitting so the normal equations
//! stay well conditioned for long recordings.

use serde::{Deserialize, Serialize};
use tracing::debug;
use u_numflow::fourier::rfft;
use u_numflow::matrix::Matrix;
use u_numflow::stats;

use crate::config::{check_positive, Validate};
use crate::error::{AnalysisError, Result};
use crate::series::TimeSeries;

/// Highest supported trend degree.
pub const MAX_TREND_DEGREE: usize = 3;

/// Noise analysis configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoiseConfig {
    /// Sampling rate in Hz. `None` derives it from the median sample interval.
    pub sample_rate: Option<f64>,
    /// Degree of the removed polynomial trend, at most 3.
    pub trend_degree: usize,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            sample_rate: None,
            trend_degree: 2,
        }
    }
}

impl NoiseConfig {
    /// Default detrending at a fixed sampling rate.
    pub fn with_sample_rate(sample_rate: f64) -> Self {
        Self {
            sample_rate: Some(sample_rate),
            ..Self::default()
        }
    }
}

impl Validate for NoiseConfig {
    fn validate(&self) -> Result<()> {
        if let Some(fs) = self.sample_rate {
            check_positive("sample_rate", fs)?;
        }
        if self.trend_degree > MAX_TREND_DEGREE {
            return Err(AnalysisError::invalid(
                "trend_degree",
                format!("must be at most {MAX_TREND_DEGREE}, got {}", self.trend_degree),
            ));
        }
        Ok(())
    }
}

/// Noise measured on the detrended signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseMetrics {
    /// Root mean square of the residual.
    pub noise_rms: f64,
    /// Spread of the residual.
    pub peak_to_peak: f64,
    /// Signal-to-noise ratio in dB; `None` for a residual of exactly zero.
    pub snr_db: Option<f64>,
    /// Strongest positive frequency of the residual in Hz, 0 with fewer
    /// than three samples.
    pub dominant_frequency: f64,
    /// Sampling rate the frequency refers to.
    pub sample_rate: f64,
    /// Residual after the trend is removed.
    pub detrended: Vec<f64>,
}

/// Measures the noise of `series` around its polynomial trend.
///
/// # Errors
///
/// - `InvalidParameter` for an invalid configuration, or when the sampling
///   rate is not configured and every timestamp is identical.
/// - `InsufficientData` with fewer than `trend_degree + 2` finite samples.
///
/// # Examples
///
/// ```
/// use u_vacuum::vacuum::{noise_metrics, NoiseConfig};
/// use u_vacuum::TimeSeries;
///
/// // 2 Hz ripple on a drifting gauge reading, sampled at 16 Hz
/// let time: Vec<f64> = (0..128).map(|i| i as f64 / 16.0).collect();
/// let value = time
///     .iter()
///     .map(|t| 1e-4 + 1e-6 * t + 1e-6 * (2.0 * std::f64::consts::PI * 2.0 * t).sin())
///     .collect();
/// let s = TimeSeries::new(time, value).unwrap();
///
/// let m = noise_metrics(&s, &NoiseConfig::default()).unwrap();
/// assert_eq!(m.sample_rate, 16.0);
/// assert_eq!(m.dominant_frequency, 2.0);
/// ```
pub fn noise_metrics(series: &TimeSeries, config: &NoiseConfig) -> Result<NoiseMetrics> {
    config.validate()?;

    let required = config.trend_degree + 2;
    let finite = series
        .finite()
        .ok_or_else(|| AnalysisError::insufficient("noise metrics", required, 0))?;
    let y = finite.values();
    let n = y.len();
    if n < required {
        return Err(AnalysisError::insufficient("noise metrics", required, n));
    }

    let sample_rate = match config.sample_rate {
        Some(fs) => fs,
        None => finite
            .median_interval()
            .map(|dt| 1.0 / dt)
            .filter(|fs| fs.is_finite())
            .ok_or_else(|| AnalysisError::invalid("sample_rate", "every timestamp is identical"))?,
    };

    let coefficients = fit_trend(y, config.trend_degree)
        .ok_or_else(|| AnalysisError::invalid("trend_degree", "trend fit is singular"))?;
    let detrended: Vec<f64> = y
        .iter()
        .enumerate()
        .map(|(i, v)| v - polyval(&coefficients, scaled_index(i, n)))
        .collect();

    let noise_power = mean_square(&detrended);
    let noise_rms = noise_power.sqrt();
    let peak_to_peak = match (stats::max(&detrended), stats::min(&detrended)) {
        (Some(hi), Some(lo)) => hi - lo,
        _ => 0.0,
    };
    let snr_db = (noise_power > 0.0).then(|| 10.0 * (mean_square(y) / noise_power).log10());
    let dominant_frequency = dominant_bin(&detrended).map_or(0.0, |k| k as f64 * sample_rate / n as f64);

    debug!(noise_rms, peak_to_peak, dominant_frequency, "noise measured");
    Ok(NoiseMetrics {
        noise_rms,
        peak_to_peak,
        snr_db,
        dominant_frequency,
        sample_rate,
        detrended,
    })
}

// ---------------------------------------------------------------------------
// Trend
// ---------------------------------------------------------------------------

/// Sample index mapped onto [−1, 1].
fn scaled_index(i: usize, n: usize) -> f64 {
    if n < 2 {
        0.0
    } else {
        2.0 * i as f64 / (n - 1) as f64 - 1.0
    }
}

/// Least-squares polynomial coefficients, constant term first.
fn fit_trend(y: &[f64], degree: usize) -> Option<Vec<f64>> {
    let k = degree + 1;
    let n = y.len();
    let mut normal = vec![0.0; k * k];
    let mut rhs = vec![0.0; k];
    let mut powers = vec![0.0; k];
    for (i, &v) in y.iter().enumerate() {
        let u = scaled_index(i, n);
        let mut p = 1.0;
        for slot in powers.iter_mut() {
            *slot = p;
            p *= u;
        }
        for a in 0..k {
            rhs[a] += powers[a] * v;
            for b in 0..k {
                normal[a * k + b] += powers[a] * powers[b];
            }
        }
    }
    Matrix::new(k, k, normal).ok()?.cholesky_solve(&rhs).ok()
}

fn polyval(coefficients: &[f64], u: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * u + c)
}

fn mean_square(data: &[f64]) -> f64 {
    let squares: Vec<f64> = data.iter().map(|v| v * v).collect();
    stats::mean(&squares).unwrap_or(0.0)
}

/// Strongest bin strictly between zero and the Nyquist frequency.
fn dominant_bin(data: &[f64]) -> Option<usize> {
    let spectrum = rfft(data);
    let last = (data.len().saturating_sub(1)) / 2;
    (1..=last)
        .map(|k| (k, spectrum[k].norm_sqr()))
        .fold(None, |best: Option<(usize, f64)>, (k, power)| match best {
            Some((_, p)) if p >= power => best,
            _ => Some((k, power)),
        })
        .map(|(k, _)| k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sampled(n: usize, fs: f64, f: impl Fn(f64) -> f64) -> TimeSeries {
        let time: Vec<f64> = (0..n).map(|i| i as f64 / fs).collect();
        let value = time.iter().map(|&t| f(t)).collect();
        TimeSeries::new(time, value).expect("valid")
    }

    #[test]
    fn sine_on_a_trend() {
        let amplitude = 1e-4;
        let s = sampled(256, 10.0, |t| 1e-3 + 2e-5 * t + amplitude * (2.0 * PI * 1.25 * t).sin());
        let m = noise_metrics(&s, &NoiseConfig::default()).unwrap();

        assert!((m.sample_rate - 10.0).abs() < 1e-9);
        assert!((m.dominant_frequency - 1.25).abs() < 1e-9, "f = {}", m.dominant_frequency);
        let rms = amplitude / 2.0_f64.sqrt();
        assert!((m.noise_rms - rms).abs() / rms < 0.02, "rms = {}", m.noise_rms);
        assert!((m.peak_to_peak - 2.0 * amplitude).abs() / (2.0 * amplitude) < 0.02);

        let signal_power = s.values().iter().map(|v| v * v).sum::<f64>() / 256.0;
        let expected = 10.0 * (signal_power / (rms * rms)).log10();
        assert!((m.snr_db.unwrap() - expected).abs() < 0.2);
        assert_eq!(m.detrended.len(), 256);
    }

    #[test]
    fn quadratic_trend_is_removed_entirely() {
        let s = sampled(50, 1.0, |t| 5.0 - 0.2 * t + 0.003 * t * t);
        let m = noise_metrics(&s, &NoiseConfig::default()).unwrap();
        assert!(m.noise_rms < 1e-12);
        assert!(m.peak_to_peak < 1e-11);
    }

    #[test]
    fn constant_signal_has_no_noise() {
        let s = sampled(20, 1.0, |_| 2.0);
        let m = noise_metrics(&s, &NoiseConfig::default()).unwrap();
        assert!(m.noise_rms < 1e-14);
        assert!(m.snr_db.map_or(true, |db| db > 200.0));
    }

    #[test]
    fn configured_rate_overrides_timestamps() {
        let s = sampled(64, 4.0, |t| (2.0 * PI * 0.5 * t).sin());
        let m = noise_metrics(&s, &NoiseConfig::default()).unwrap();
        assert_eq!(m.dominant_frequency, 0.5);
        let m = noise_metrics(&s, &NoiseConfig::with_sample_rate(8.0)).unwrap();
        assert_eq!(m.sample_rate, 8.0);
        assert_eq!(m.dominant_frequency, 1.0);
    }

    #[test]
    fn three_samples_resolve_one_bin() {
        let s = TimeSeries::new(vec![0.0, 1.0, 2.0], vec![1.0, 3.0, 2.0]).unwrap();
        let cfg = NoiseConfig {
            trend_degree: 1,
            ..NoiseConfig::default()
        };
        let m = noise_metrics(&s, &cfg).unwrap();
        assert!((m.dominant_frequency - 1.0 / 3.0).abs() < 1e-12);
        assert!(m.noise_rms > 0.0);

        let two = TimeSeries::new(vec![0.0, 1.0], vec![1.0, 3.0]).unwrap();
        let cfg = NoiseConfig {
            trend_degree: 0,
            ..NoiseConfig::default()
        };
        assert_eq!(noise_metrics(&two, &cfg).unwrap().dominant_frequency, 0.0);
    }

    #[test]
    fn failures() {
        let short = TimeSeries::new(vec![0.0, 1.0, 2.0], vec![1.0, 2.0, 1.5]).unwrap();
        assert!(matches!(
            noise_metrics(&short, &NoiseConfig::default()),
            Err(AnalysisError::InsufficientData { required: 4, .. })
        ));
        let s = sampled(20, 1.0, |t| t);
        let bad_rate = NoiseConfig::with_sample_rate(0.0);
        assert!(matches!(noise_metrics(&s, &bad_rate), Err(AnalysisError::InvalidParameter { .. })));
        let bad_degree = NoiseConfig {
            trend_degree: 4,
            ..NoiseConfig::default()
        };
        assert!(matches!(noise_metrics(&s, &bad_degree), Err(AnalysisError::InvalidParameter { .. })));
        let same = TimeSeries::new(vec![1.0; 6], vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]).unwrap();
        assert!(noise_metrics(&same, &NoiseConfig::default()).is_err());
    }

    #[test]
    fn polyval_horner() {
        assert_eq!(polyval(&[1.0, 2.0, 3.0], 2.0), 17.0);
        assert_eq!(scaled_index(0, 5), -1.0);
        assert_eq!(scaled_index(4, 5), 1.0);
    }
}
