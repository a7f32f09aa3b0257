//! The `(time, value)` sequence every analyzer consumes.
//!
//! # Examples
//!
//! ```
//! use u_vacuum::TimeSeries;
//!
//! let s = TimeSeries::new(vec![0.0, 1.0, 2.0], vec![10.0, 5.0, 2.5]).unwrap();
//! assert_eq!(s.len(), 3);
//! assert_eq!(s.interpolate(0.5), Some(7.5));
//! assert_eq!(s.interpolate(3.0), None);
//! ```

use serde::{Deserialize, Serialize};
use u_numflow::stats;

use crate::error::{AnalysisError, Result};

/// Ordered `(timestamp, value)` pairs with non-decreasing, finite time.
///
/// Values may be non-finite; analyzers decide how to treat them. The series
/// is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSeries", into = "RawSeries")]
pub struct TimeSeries {
    time: Vec<f64>,
    value: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct RawSeries {
    time: Vec<f64>,
    value: Vec<f64>,
}

impl TryFrom<RawSeries> for TimeSeries {
    type Error = AnalysisError;

    fn try_from(raw: RawSeries) -> Result<Self> {
        TimeSeries::new(raw.time, raw.value)
    }
}

impl From<TimeSeries> for RawSeries {
    fn from(s: TimeSeries) -> Self {
        RawSeries {
            time: s.time,
            value: s.value,
        }
    }
}

impl TimeSeries {
    /// Builds a series from parallel time and value vectors.
    ///
    /// # Errors
    ///
    /// - `InsufficientData` if the series is empty.
    /// - `InvalidParameter` if the lengths differ, or a timestamp is
    ///   non-finite or smaller than its predecessor.
    pub fn new(time: Vec<f64>, value: Vec<f64>) -> Result<Self> {
        if time.len() != value.len() {
            return Err(AnalysisError::invalid(
                "series",
                format!(
                    "time has {} samples but value has {}",
                    time.len(),
                    value.len()
                ),
            ));
        }
        if time.is_empty() {
            return Err(AnalysisError::insufficient("time series", 1, 0));
        }
        if let Some(i) = time.iter().position(|t| !t.is_finite()) {
            return Err(AnalysisError::invalid(
                "series",
                format!("timestamp at index {i} is not finite"),
            ));
        }
        if let Some(i) = time.windows(2).position(|w| w[1] < w[0]) {
            return Err(AnalysisError::invalid(
                "series",
                format!("timestamps decrease at index {}", i + 1),
            ));
        }
        Ok(Self { time, value })
    }

    /// Builds a series from `(time, value)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let (time, value) = pairs.into_iter().unzip();
        Self::new(time, value)
    }

    /// Number of samples (always ≥ 1).
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Always `false`; present for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.time
    }

    pub fn values(&self) -> &[f64] {
        &self.value
    }

    /// Iterates over `(time, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.time.iter().copied().zip(self.value.iter().copied())
    }

    /// First timestamp.
    pub fn start(&self) -> f64 {
        self.time[0]
    }

    /// Last timestamp.
    pub fn end(&self) -> f64 {
        self.time[self.time.len() - 1]
    }

    /// `end − start`.
    pub fn span(&self) -> f64 {
        self.end() - self.start()
    }

    /// Median of the positive gaps between consecutive timestamps.
    ///
    /// `None` if no two samples have distinct timestamps.
    pub fn median_interval(&self) -> Option<f64> {
        let gaps: Vec<f64> = self
            .time
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|&d| d > 0.0)
            .collect();
        stats::median(&gaps)
    }

    /// Copy of the series without non-finite values.
    ///
    /// Returns `None` if nothing finite is left.
    pub fn finite(&self) -> Option<TimeSeries> {
        let (time, value): (Vec<f64>, Vec<f64>) = self.iter().filter(|(_, v)| v.is_finite()).unzip();
        if time.is_empty() {
            None
        } else {
            Some(TimeSeries { time, value })
        }
    }

    /// Fails with `NonPositiveValue` on the first value ≤ 0 (or non-finite).
    pub fn require_positive(&self) -> Result<()> {
        match self.value.iter().position(|&v| !(v.is_finite() && v > 0.0)) {
            Some(index) => Err(AnalysisError::NonPositiveValue {
                index,
                value: self.value[index],
            }),
            None => Ok(()),
        }
    }

    /// Copy with every timestamp moved by `−offset`.
    ///
    /// This is how an alignment offset is applied to series B.
    pub fn shifted(&self, offset: f64) -> TimeSeries {
        TimeSeries {
            time: self.time.iter().map(|t| t - offset).collect(),
            value: self.value.clone(),
        }
    }

    /// Samples with `t0 ≤ t ≤ t1`, or `None` if the window is empty.
    pub fn window(&self, t0: f64, t1: f64) -> Option<TimeSeries> {
        let (time, value): (Vec<f64>, Vec<f64>) =
            self.iter().filter(|&(t, _)| t >= t0 && t <= t1).unzip();
        if time.is_empty() {
            None
        } else {
            Some(TimeSeries { time, value })
        }
    }

    /// Linear interpolation at `t`.
    ///
    /// Returns `None` outside `[start, end]`. With duplicate timestamps the
    /// last sample at that time wins.
    pub fn interpolate(&self, t: f64) -> Option<f64> {
        if !t.is_finite() || t < self.start() || t > self.end() {
            return None;
        }
        // first index with time > t
        let hi = self.time.partition_point(|&x| x <= t);
        if hi == 0 {
            return Some(self.value[0]);
        }
        let lo = hi - 1;
        if hi == self.time.len() || self.time[lo] == t {
            return Some(self.value[lo]);
        }
        let (t0, t1) = (self.time[lo], self.time[hi]);
        let (v0, v1) = (self.value[lo], self.value[hi]);
        let frac = (t - t0) / (t1 - t0);
        Some(v0 + frac * (v1 - v0))
    }

    /// Interpolated values on `grid`; `NaN` where the grid leaves the range.
    pub fn resample(&self, grid: &[f64]) -> Vec<f64> {
        grid.iter()
            .map(|&t| self.interpolate(t).unwrap_or(f64::NAN))
            .collect()
    }
}

/// Time interval covered by both series, if any.
pub(crate) fn overlap(a: &TimeSeries, b: &TimeSeries) -> Option<(f64, f64)> {
    let lo = a.start().max(b.start());
    let hi = a.end().min(b.end());
    if hi > lo {
        Some((lo, hi))
    } else {
        None
    }
}

/// Uniform grid on `[lo, hi]` with the requested spacing, widened so that
/// at most `max_points` points are produced.
pub(crate) fn uniform_grid(lo: f64, hi: f64, spacing: f64, max_points: usize) -> Vec<f64> {
    if !spacing.is_finite() || spacing <= 0.0 || hi <= lo || max_points < 2 {
        return vec![lo];
    }
    // count stays in f64 until it is known to fit
    let count = ((hi - lo) / spacing).floor() + 1.0;
    let (step, n) = if count.is_finite() && count <= max_points as f64 {
        (spacing, count as usize)
    } else {
        ((hi - lo) / (max_points - 1) as f64, max_points)
    };
    (0..n).map(|i| (lo + i as f64 * step).min(hi)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_structural_problems() {
        assert!(matches!(
            TimeSeries::new(vec![], vec![]),
            Err(AnalysisError::InsufficientData { .. })
        ));
        assert!(matches!(
            TimeSeries::new(vec![0.0, 1.0], vec![1.0]),
            Err(AnalysisError::InvalidParameter { .. })
        ));
        assert!(matches!(
            TimeSeries::new(vec![0.0, 2.0, 1.0], vec![1.0, 1.0, 1.0]),
            Err(AnalysisError::InvalidParameter { .. })
        ));
        assert!(TimeSeries::new(vec![0.0, f64::NAN], vec![1.0, 1.0]).is_err());
    }

    #[test]
    fn allows_repeated_timestamps_and_nan_values() {
        let s = TimeSeries::new(vec![0.0, 1.0, 1.0, 2.0], vec![1.0, f64::NAN, 2.0, 3.0]).unwrap();
        assert_eq!(s.len(), 4);
        assert_eq!(s.median_interval(), Some(1.0));
        let f = s.finite().unwrap();
        assert_eq!(f.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn interpolation() {
        let s = TimeSeries::new(vec![0.0, 2.0, 4.0], vec![0.0, 4.0, 0.0]).unwrap();
        assert_eq!(s.interpolate(1.0), Some(2.0));
        assert_eq!(s.interpolate(2.0), Some(4.0));
        assert_eq!(s.interpolate(3.0), Some(2.0));
        assert_eq!(s.interpolate(4.0), Some(0.0));
        assert_eq!(s.interpolate(-0.1), None);
        let r = s.resample(&[0.0, 5.0]);
        assert_eq!(r[0], 0.0);
        assert!(r[1].is_nan());
    }

    #[test]
    fn shifting_moves_time_back() {
        let s = TimeSeries::new(vec![10.0, 11.0], vec![1.0, 2.0]).unwrap();
        let sh = s.shifted(10.0);
        assert_eq!(sh.times(), &[0.0, 1.0]);
        assert_eq!(sh.values(), s.values());
    }

    #[test]
    fn require_positive_reports_first_offender() {
        let s = TimeSeries::new(vec![0.0, 1.0, 2.0], vec![1.0, 0.0, -1.0]).unwrap();
        assert_eq!(
            s.require_positive(),
            Err(AnalysisError::NonPositiveValue {
                index: 1,
                value: 0.0
            })
        );
    }

    #[test]
    fn grid_is_capped() {
        let g = uniform_grid(0.0, 10.0, 1.0, 100);
        assert_eq!(g.len(), 11);
        assert_eq!(g[10], 10.0);
        let g = uniform_grid(0.0, 10.0, 0.001, 101);
        assert_eq!(g.len(), 101);
        assert!((g[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn grid_count_beyond_usize_is_capped() {
        let g = uniform_grid(0.0, 1e12, 1e-10, 1000);
        assert_eq!(g.len(), 1000);
        assert_eq!(g[999], 1e12);
        let g = uniform_grid(0.0, f64::MAX, f64::MIN_POSITIVE, 10);
        assert_eq!(g.len(), 10);
    }

    #[test]
    fn overlap_of_disjoint_series_is_none() {
        let a = TimeSeries::new(vec![0.0, 1.0], vec![1.0, 1.0]).unwrap();
        let b = TimeSeries::new(vec![2.0, 3.0], vec![1.0, 1.0]).unwrap();
        assert!(overlap(&a, &b).is_none());
        let c = TimeSeries::new(vec![0.5, 3.0], vec![1.0, 1.0]).unwrap();
        assert_eq!(overlap(&a, &c), Some((0.5, 1.0)));
    }

    #[test]
    fn serde_rejects_invalid_series() {
        let ok: TimeSeries = serde_json::from_str(r#"{"time":[0.0,1.0],"value":[1.0,2.0]}"#).unwrap();
        assert_eq!(ok.len(), 2);
        let bad: std::result::Result<TimeSeries, _> =
            serde_json::from_str(r#"{"time":[1.0,0.0],"value":[1.0,2.0]}"#);
        assert!(bad.is_err());
    }
}
