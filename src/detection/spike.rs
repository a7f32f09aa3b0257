//! Spike detection against a trailing median baseline.
//!
//! # Algorithm
//!
//! For a series of length n the window is
//!
//! ```text
//! w = clamp(n / 10, 10, n / 2)
//! ```
//!
//! For every index i ≥ w the baseline is the median of the finite values in
//! `value[i-w..i]` and the ratio is `value[i] / baseline`. Ratios above the
//! lowest band are reported:
//!
//! ```text
//! ratio > 100  → Critical
//! ratio > 10   → High
//! ratio > 3    → Medium
//! ```
//!
//! Adjacent spike points are reported individually; runs are not merged.
//!
//! # Reference
//!
//! Hampel, F.R. (1974). "The Influence Curve and its Role in Robust
//! Estimation", *JASA* 69(346).

use serde::{Deserialize, Serialize};
use tracing::debug;
use u_numflow::stats;

use crate::config::{check_descending, Validate};
use crate::error::{AnalysisError, Result};
use crate::series::TimeSeries;

/// Shortest series the adaptive window accepts.
pub const MIN_SERIES_LEN: usize = 20;

const MIN_WINDOW: usize = 10;

/// Spike severity, ordered from mildest to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Never emitted by the detector; kept for callers that grade their own events.
    Low,
    Medium,
    High,
    Critical,
}

/// Ratio bands separating the severities. A ratio must strictly exceed a
/// band to fall into it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpikeSeverityPolicy {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for SpikeSeverityPolicy {
    fn default() -> Self {
        Self {
            critical: 100.0,
            high: 10.0,
            medium: 3.0,
        }
    }
}

impl SpikeSeverityPolicy {
    /// Severity for `ratio`, or `None` when it is at or below the medium band.
    pub fn classify(&self, ratio: f64) -> Option<Severity> {
        if ratio > self.critical {
            Some(Severity::Critical)
        } else if ratio > self.high {
            Some(Severity::High)
        } else if ratio > self.medium {
            Some(Severity::Medium)
        } else {
            None
        }
    }
}

impl Validate for SpikeSeverityPolicy {
    fn validate(&self) -> Result<()> {
        check_descending("spike severity", &[self.critical, self.high, self.medium])?;
        if self.medium <= 0.0 {
            return Err(AnalysisError::invalid("spike severity", "bands must be positive"));
        }
        Ok(())
    }
}

/// Spike detector configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpikeConfig {
    /// Fixed window length; `None` selects the adaptive rule.
    pub window: Option<usize>,
    pub severity: SpikeSeverityPolicy,
}

impl Validate for SpikeConfig {
    fn validate(&self) -> Result<()> {
        if self.window == Some(0) {
            return Err(AnalysisError::invalid("window", "must be at least 1"));
        }
        self.severity.validate()
    }
}

/// Why a window length was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowReason {
    /// `n / 10` was within bounds.
    Adaptive,
    /// `n / 10` was below the minimum of 10.
    ClampedToMin,
    /// `n / 10` exceeded half the series.
    ClampedToMax,
    /// Taken from [`SpikeConfig::window`].
    Explicit,
}

/// A window length together with the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowChoice {
    pub window: usize,
    pub reason: WindowReason,
}

/// A point whose value exceeds its local baseline by more than the medium band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeEvent {
    /// Position in the input series.
    pub index: usize,
    pub time: f64,
    /// Observed value at `index`.
    pub magnitude: f64,
    /// Median of the preceding window.
    pub baseline: f64,
    /// `magnitude / baseline`.
    pub ratio: f64,
    pub severity: Severity,
}

/// Picks the baseline window for a series of `len` samples.
///
/// # Errors
///
/// - `InsufficientData` if `len < 20`.
/// - `InvalidParameter` if an explicit window is 0 or not shorter than the series.
pub fn choose_window(len: usize, config: &SpikeConfig) -> Result<WindowChoice> {
    if len < MIN_SERIES_LEN {
        return Err(AnalysisError::insufficient("spike detection", MIN_SERIES_LEN, len));
    }
    if let Some(window) = config.window {
        if window == 0 || window >= len {
            return Err(AnalysisError::invalid(
                "window",
                format!("must lie in 1..{len}, got {window}"),
            ));
        }
        return Ok(WindowChoice {
            window,
            reason: WindowReason::Explicit,
        });
    }

    let proposed = len / 10;
    let max = len / 2;
    let choice = if proposed < MIN_WINDOW {
        WindowChoice {
            window: MIN_WINDOW,
            reason: WindowReason::ClampedToMin,
        }
    } else if proposed > max {
        WindowChoice {
            window: max,
            reason: WindowReason::ClampedToMax,
        }
    } else {
        WindowChoice {
            window: proposed,
            reason: WindowReason::Adaptive,
        }
    };
    Ok(choice)
}

/// Scans `series` for spikes.
///
/// Non-finite values are skipped: they never become events and are left out
/// of baselines. Windows without a positive finite median produce no events.
///
/// # Examples
///
/// ```
/// use u_vacuum::detection::{detect_spikes, Severity, SpikeConfig};
/// use u_vacuum::TimeSeries;
///
/// let mut value = vec![1e-6; 60];
/// value[40] = 5e-5; // 50x the baseline
/// let time = (0..60).map(|i| i as f64).collect();
/// let series = TimeSeries::new(time, value).unwrap();
///
/// let events = detect_spikes(&series, &SpikeConfig::default()).unwrap();
/// assert_eq!(events.len(), 1);
/// assert_eq!(events[0].index, 40);
/// assert_eq!(events[0].severity, Severity::High);
/// ```
///
/// # Complexity
///
/// Time: O(n · w log w), Space: O(w)
pub fn detect_spikes(series: &TimeSeries, config: &SpikeConfig) -> Result<Vec<SpikeEvent>> {
    config.validate()?;
    let choice = choose_window(series.len(), config)?;
    debug!(window = choice.window, reason = ?choice.reason, "spike window selected");

    let values = series.values();
    let times = series.times();
    let w = choice.window;
    let mut events = Vec::new();
    let mut buf = Vec::with_capacity(w);

    for i in w..values.len() {
        let v = values[i];
        if !v.is_finite() {
            continue;
        }
        buf.clear();
        buf.extend(values[i - w..i].iter().copied().filter(|x| x.is_finite()));
        let Some(baseline) = stats::median(&buf) else {
            continue;
        };
        if baseline <= 0.0 {
            continue;
        }
        let ratio = v / baseline;
        if let Some(severity) = config.severity.classify(ratio) {
            events.push(SpikeEvent {
                index: i,
                time: times[i],
                magnitude: v,
                baseline,
                ratio,
                severity,
            });
        }
    }

    debug!(events = events.len(), "spike scan finished");
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: Vec<f64>) -> TimeSeries {
        let time = (0..values.len()).map(|i| i as f64 * 0.5).collect();
        TimeSeries::new(time, values).expect("valid series")
    }

    #[test]
    fn window_rules() {
        let cfg = SpikeConfig::default();
        assert_eq!(
            choose_window(50, &cfg).unwrap(),
            WindowChoice {
                window: 10,
                reason: WindowReason::ClampedToMin
            }
        );
        assert_eq!(
            choose_window(300, &cfg).unwrap(),
            WindowChoice {
                window: 30,
                reason: WindowReason::Adaptive
            }
        );
        assert_eq!(choose_window(20, &cfg).unwrap().window, 10);
        assert!(matches!(
            choose_window(19, &cfg),
            Err(AnalysisError::InsufficientData { required: 20, actual: 19, .. })
        ));
    }

    #[test]
    fn explicit_window_must_fit() {
        let cfg = SpikeConfig {
            window: Some(25),
            ..SpikeConfig::default()
        };
        assert_eq!(choose_window(40, &cfg).unwrap().reason, WindowReason::Explicit);
        assert!(choose_window(25, &cfg).is_err());
    }

    #[test]
    fn single_spike_is_found() {
        let mut v = vec![2e-7; 100];
        v[57] = 2e-7 * 50.0;
        let events = detect_spikes(&series(v), &SpikeConfig::default()).unwrap();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.index, 57);
        assert!((e.time - 28.5).abs() < 1e-12);
        assert!((e.ratio - 50.0).abs() < 1e-9);
        assert_eq!(e.severity, Severity::High);
    }

    #[test]
    fn severity_bands() {
        let p = SpikeSeverityPolicy::default();
        assert_eq!(p.classify(3.0), None);
        assert_eq!(p.classify(3.01), Some(Severity::Medium));
        assert_eq!(p.classify(10.0), Some(Severity::Medium));
        assert_eq!(p.classify(10.5), Some(Severity::High));
        assert_eq!(p.classify(150.0), Some(Severity::Critical));
    }

    #[test]
    fn adjacent_spikes_are_reported_individually() {
        let mut v = vec![1.0; 60];
        v[30] = 500.0;
        v[31] = 20.0;
        let events = detect_spikes(&series(v), &SpikeConfig::default()).unwrap();
        let idx: Vec<usize> = events.iter().map(|e| e.index).collect();
        assert_eq!(idx, vec![30, 31]);
        assert_eq!(events[0].severity, Severity::Critical);
        assert_eq!(events[1].severity, Severity::High);
    }

    #[test]
    fn nan_is_skipped_without_aborting() {
        let mut v = vec![1.0; 60];
        v[20] = f64::NAN;
        v[25] = f64::INFINITY;
        v[40] = 5.0;
        let events = detect_spikes(&series(v), &SpikeConfig::default()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].index, 40);
        assert_eq!(events[0].severity, Severity::Medium);
    }

    #[test]
    fn smooth_decay_has_no_events() {
        let v: Vec<f64> = (0..200).map(|i| 1e-3 * (-(i as f64) / 40.0).exp() + 1e-7).collect();
        assert!(detect_spikes(&series(v), &SpikeConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn too_short_is_an_error() {
        let err = detect_spikes(&series(vec![1.0; 10]), &SpikeConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { .. }));
    }
}
