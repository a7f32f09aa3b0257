//! Time alignment of two series.
//!
//! The offset is the shift applied to series B: after
//! `b.shifted(offset)` its features line up with series A.
//!
//! # Strategies
//!
//! - **StartTime**: `offset = t_b[0] − t_a[0]`
//! - **PeakAlign**: `offset = t_b[argmax] − t_a[argmax]`
//! - **CrossCorrelation**: both series are resampled on a uniform grid over
//!   their common interval (spacing = the finer median sample interval) and
//!   the lag maximizing the per-lag Pearson correlation gives the offset
//! - **Manual**: caller-supplied offset
//! - **Auto**: CrossCorrelation when the overlap holds at least 30 grid
//!   points and the value ranges overlap by at least 10 % of the narrower
//!   one, StartTime otherwise; disjoint time ranges fail

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use u_numflow::stats;

use crate::config::Validate;
use crate::correlation::{cross_correlation_peak, pearson};
use crate::error::{AnalysisError, Result};
use crate::series::{overlap, uniform_grid, TimeSeries};

/// Method that produced an alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlignMethod {
    StartTime,
    PeakAlign,
    CrossCorrelation,
    Manual,
}

/// Requested alignment strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignStrategy {
    #[default]
    Auto,
    StartTime,
    PeakAlign,
    CrossCorrelation,
    Manual { offset: f64 },
}

/// Aligner configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlignConfig {
    pub method: AlignStrategy,
    /// Upper bound on resampling grid points; the spacing widens beyond it.
    pub max_grid_points: usize,
    /// Auto picks cross-correlation only from this many overlap grid points.
    pub min_grid_points: usize,
    /// Auto picks cross-correlation only if the value ranges intersect over
    /// at least this fraction of the narrower range.
    pub min_range_overlap: f64,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            method: AlignStrategy::Auto,
            max_grid_points: 4096,
            min_grid_points: 30,
            min_range_overlap: 0.1,
        }
    }
}

impl AlignConfig {
    /// Default configuration with another strategy.
    pub fn with_method(method: AlignStrategy) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }
}

impl Validate for AlignConfig {
    fn validate(&self) -> Result<()> {
        if let AlignStrategy::Manual { offset } = self.method {
            if !offset.is_finite() {
                return Err(AnalysisError::invalid("offset", "manual offset must be finite"));
            }
        }
        if self.max_grid_points < 3 {
            return Err(AnalysisError::invalid("max_grid_points", "must be at least 3"));
        }
        if self.min_grid_points < 3 {
            return Err(AnalysisError::invalid("min_grid_points", "must be at least 3"));
        }
        if !(0.0..=1.0).contains(&self.min_range_overlap) {
            return Err(AnalysisError::invalid("min_range_overlap", "must lie in [0, 1]"));
        }
        Ok(())
    }
}

/// Why a method was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DecisionReason {
    /// The caller asked for this method.
    Requested,
    /// Enough overlapping points and comparable values.
    Correlatable { grid_points: usize },
    /// The common interval is too short to correlate.
    TooFewGridPoints { grid_points: usize },
    /// The value ranges barely intersect (or one series is flat).
    ValueRangesApart { overlap_fraction: f64 },
}

/// Method selected for a pair of series, with the reason.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentDecision {
    pub method: AlignMethod,
    pub reason: DecisionReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    /// Shift applied to series B (`b.shifted(offset)`).
    pub offset: f64,
    pub method: AlignMethod,
    /// Agreement of the aligned series in [0, 1].
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Decides which method [`align`] will use.
///
/// # Errors
///
/// - `InvalidParameter` for an invalid configuration.
/// - `AlignmentFailure` under `Auto` when the time ranges are disjoint or a
///   series has no finite values.
pub fn choose_method(a: &TimeSeries, b: &TimeSeries, config: &AlignConfig) -> Result<AlignmentDecision> {
    config.validate()?;
    let requested = match config.method {
        AlignStrategy::Auto => None,
        AlignStrategy::StartTime => Some(AlignMethod::StartTime),
        AlignStrategy::PeakAlign => Some(AlignMethod::PeakAlign),
        AlignStrategy::CrossCorrelation => Some(AlignMethod::CrossCorrelation),
        AlignStrategy::Manual { .. } => Some(AlignMethod::Manual),
    };
    if let Some(method) = requested {
        return Ok(AlignmentDecision {
            method,
            reason: DecisionReason::Requested,
        });
    }

    let (fa, fb) = finite_pair(a, b)?;
    let (lo, hi) = overlap(&fa, &fb)
        .ok_or_else(|| AnalysisError::alignment("time ranges do not overlap"))?;
    let spacing = grid_spacing(&fa, &fb)?;
    let grid_points = uniform_grid(lo, hi, spacing, config.max_grid_points).len();

    let decision = if grid_points < config.min_grid_points {
        AlignmentDecision {
            method: AlignMethod::StartTime,
            reason: DecisionReason::TooFewGridPoints { grid_points },
        }
    } else {
        let overlap_fraction = value_range_overlap(&fa, &fb);
        if overlap_fraction >= config.min_range_overlap && overlap_fraction > 0.0 {
            AlignmentDecision {
                method: AlignMethod::CrossCorrelation,
                reason: DecisionReason::Correlatable { grid_points },
            }
        } else {
            AlignmentDecision {
                method: AlignMethod::StartTime,
                reason: DecisionReason::ValueRangesApart { overlap_fraction },
            }
        }
    };
    debug!(method = ?decision.method, reason = ?decision.reason, "alignment method chosen");
    Ok(decision)
}

// ---------------------------------------------------------------------------
// Alignment
// ---------------------------------------------------------------------------

/// Aligns series B to series A.
///
/// # Errors
///
/// - `InvalidParameter` for an invalid configuration.
/// - `AlignmentFailure` when no method is viable: disjoint ranges under
///   `Auto`, no finite values, or a cross-correlation without a defined peak.
///
/// # Examples
///
/// ```
/// use u_vacuum::comparison::{align, AlignConfig, AlignMethod, AlignStrategy};
/// use u_vacuum::TimeSeries;
///
/// let a = TimeSeries::new(vec![10.0, 11.0, 12.0], vec![1.0, 3.0, 2.0]).unwrap();
/// let b = TimeSeries::new(vec![14.0, 15.0, 16.0], vec![1.0, 3.0, 2.0]).unwrap();
///
/// let r = align(&a, &b, &AlignConfig::with_method(AlignStrategy::StartTime)).unwrap();
/// assert_eq!(r.method, AlignMethod::StartTime);
/// assert_eq!(r.offset, 4.0);
/// ```
pub fn align(a: &TimeSeries, b: &TimeSeries, config: &AlignConfig) -> Result<AlignmentResult> {
    let decision = choose_method(a, b, config)?;
    let (fa, fb) = finite_pair(a, b)?;

    let result = match decision.method {
        AlignMethod::StartTime => fixed(&fa, &fb, AlignMethod::StartTime, fb.start() - fa.start(), config),
        AlignMethod::PeakAlign => {
            let ia = argmax(fa.values()).ok_or_else(|| AnalysisError::alignment("series A has no peak"))?;
            let ib = argmax(fb.values()).ok_or_else(|| AnalysisError::alignment("series B has no peak"))?;
            let offset = fb.times()[ib] - fa.times()[ia];
            fixed(&fa, &fb, AlignMethod::PeakAlign, offset, config)
        }
        AlignMethod::Manual => {
            let offset = match config.method {
                AlignStrategy::Manual { offset } => offset,
                _ => 0.0,
            };
            fixed(&fa, &fb, AlignMethod::Manual, offset, config)
        }
        AlignMethod::CrossCorrelation => match cross_correlate(&fa, &fb, config) {
            Ok(r) => r,
            Err(e) if config.method == AlignStrategy::Auto => {
                warn!(error = %e, "cross-correlation failed, falling back to start-time alignment");
                fixed(&fa, &fb, AlignMethod::StartTime, fb.start() - fa.start(), config)
            }
            Err(e) => return Err(e),
        },
    };
    debug!(offset = result.offset, method = ?result.method, confidence = result.confidence, "series aligned");
    Ok(result)
}

fn cross_correlate(a: &TimeSeries, b: &TimeSeries, config: &AlignConfig) -> Result<AlignmentResult> {
    let (lo, hi) = overlap(a, b).ok_or_else(|| AnalysisError::alignment("time ranges do not overlap"))?;
    let spacing = grid_spacing(a, b)?;
    let grid = uniform_grid(lo, hi, spacing, config.max_grid_points);
    if grid.len() < 3 {
        return Err(AnalysisError::alignment(format!(
            "overlap holds only {} grid points",
            grid.len()
        )));
    }
    let step = grid[1] - grid[0];
    let xa = a.resample(&grid);
    let xb = b.resample(&grid);
    let peak = cross_correlation_peak(&xa, &xb, grid.len() / 2)
        .ok_or_else(|| AnalysisError::alignment("cross-correlation is undefined (flat overlap)"))?;

    Ok(AlignmentResult {
        offset: peak.lag as f64 * step,
        method: AlignMethod::CrossCorrelation,
        confidence: peak.r.clamp(0.0, 1.0),
    })
}

/// Result for a method whose offset is known up front; the confidence is the
/// correlation of the aligned overlap.
fn fixed(a: &TimeSeries, b: &TimeSeries, method: AlignMethod, offset: f64, config: &AlignConfig) -> AlignmentResult {
    AlignmentResult {
        offset,
        method,
        confidence: aligned_correlation(a, b, offset, config.max_grid_points)
            .map_or(0.0, |r| r.clamp(0.0, 1.0)),
    }
}

fn aligned_correlation(a: &TimeSeries, b: &TimeSeries, offset: f64, max_points: usize) -> Option<f64> {
    let shifted = b.shifted(offset);
    let (lo, hi) = overlap(a, &shifted)?;
    let spacing = grid_spacing(a, b).ok()?;
    let grid = uniform_grid(lo, hi, spacing, max_points);
    pearson(&a.resample(&grid), &shifted.resample(&grid)).map(|c| c.r)
}

fn finite_pair(a: &TimeSeries, b: &TimeSeries) -> Result<(TimeSeries, TimeSeries)> {
    let fa = a.finite().ok_or_else(|| AnalysisError::alignment("series A has no finite values"))?;
    let fb = b.finite().ok_or_else(|| AnalysisError::alignment("series B has no finite values"))?;
    Ok((fa, fb))
}

/// Finer of the two median sample intervals.
pub(crate) fn grid_spacing(a: &TimeSeries, b: &TimeSeries) -> Result<f64> {
    match (a.median_interval(), b.median_interval()) {
        (Some(x), Some(y)) => Ok(x.min(y)),
        (Some(x), None) | (None, Some(x)) => Ok(x),
        (None, None) => Err(AnalysisError::alignment("no sample interval: every timestamp is identical")),
    }
}

/// Index of the first maximum among finite values.
fn argmax(data: &[f64]) -> Option<usize> {
    data.iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

fn min_max(data: &[f64]) -> Option<(f64, f64)> {
    Some((stats::min(data)?, stats::max(data)?))
}

/// Length of the value-range intersection over the narrower range.
fn value_range_overlap(a: &TimeSeries, b: &TimeSeries) -> f64 {
    let (Some((a_lo, a_hi)), Some((b_lo, b_hi))) = (min_max(a.values()), min_max(b.values())) else {
        return 0.0;
    };
    let narrower = (a_hi - a_lo).min(b_hi - b_lo);
    if narrower <= 0.0 {
        return 0.0;
    }
    let inter = a_hi.min(b_hi) - a_lo.max(b_lo);
    (inter / narrower).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bump_series(start: f64, n: usize, dt: f64, center: f64) -> TimeSeries {
        let time: Vec<f64> = (0..n).map(|i| start + i as f64 * dt).collect();
        let value = time
            .iter()
            .map(|t| 1.0 + 5.0 * (-((t - center) / 8.0).powi(2)).exp())
            .collect();
        TimeSeries::new(time, value).expect("valid")
    }

    #[test]
    fn identical_series_align_at_zero() {
        let a = bump_series(0.0, 200, 1.0, 80.0);
        let r = align(&a, &a, &AlignConfig::with_method(AlignStrategy::CrossCorrelation)).unwrap();
        assert_eq!(r.offset, 0.0);
        assert!((r.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cross_correlation_recovers_delay() {
        let a = bump_series(0.0, 200, 1.0, 80.0);
        // same waveform recorded 15 s later
        let b = bump_series(15.0, 200, 1.0, 95.0);
        let r = align(&a, &b, &AlignConfig::default()).unwrap();
        assert_eq!(r.method, AlignMethod::CrossCorrelation);
        assert!((r.offset - 15.0).abs() <= 1.0, "offset = {}", r.offset);
        assert!(r.confidence > 0.99);
    }

    #[test]
    fn argmax_takes_first_finite_maximum() {
        assert_eq!(argmax(&[1.0, f64::NAN, 3.0, 3.0, 2.0]), Some(2));
        assert_eq!(argmax(&[f64::NAN]), None);
    }

    #[test]
    fn start_time_and_peak() {
        let a = bump_series(0.0, 100, 1.0, 40.0);
        let b = bump_series(7.0, 100, 1.0, 60.0);
        let st = align(&a, &b, &AlignConfig::with_method(AlignStrategy::StartTime)).unwrap();
        assert_eq!(st.offset, 7.0);
        assert_eq!(st.method, AlignMethod::StartTime);
        let pk = align(&a, &b, &AlignConfig::with_method(AlignStrategy::PeakAlign)).unwrap();
        assert_eq!(pk.offset, 20.0);
        assert!(pk.confidence > 0.99);
    }

    #[test]
    fn manual_offset_is_used_verbatim() {
        let a = bump_series(0.0, 50, 1.0, 20.0);
        let r = align(&a, &a, &AlignConfig::with_method(AlignStrategy::Manual { offset: 2.5 })).unwrap();
        assert_eq!(r.method, AlignMethod::Manual);
        assert_eq!(r.offset, 2.5);
        assert!(r.confidence < 1.0);
    }

    #[test]
    fn auto_decisions() {
        let a = bump_series(0.0, 200, 1.0, 80.0);
        let cfg = AlignConfig::default();

        let d = choose_method(&a, &a, &cfg).unwrap();
        assert_eq!(d.method, AlignMethod::CrossCorrelation);
        assert_eq!(d.reason, DecisionReason::Correlatable { grid_points: 200 });

        // only 11 overlapping grid points
        let late = bump_series(189.0, 200, 1.0, 250.0);
        let d = choose_method(&a, &late, &cfg).unwrap();
        assert_eq!(d.method, AlignMethod::StartTime);
        assert_eq!(d.reason, DecisionReason::TooFewGridPoints { grid_points: 11 });

        // values in a different decade entirely
        let time: Vec<f64> = (0..200).map(f64::from).collect();
        let high = TimeSeries::new(time, (0..200).map(|i| 100.0 + i as f64).collect()).unwrap();
        let d = choose_method(&a, &high, &cfg).unwrap();
        assert_eq!(d.method, AlignMethod::StartTime);
        assert!(matches!(d.reason, DecisionReason::ValueRangesApart { .. }));

        let explicit = AlignConfig::with_method(AlignStrategy::PeakAlign);
        assert_eq!(choose_method(&a, &high, &explicit).unwrap().reason, DecisionReason::Requested);
    }

    #[test]
    fn disjoint_ranges_fail_under_auto() {
        let a = bump_series(0.0, 50, 1.0, 20.0);
        let b = bump_series(100.0, 50, 1.0, 120.0);
        assert!(matches!(
            align(&a, &b, &AlignConfig::default()),
            Err(AnalysisError::AlignmentFailure(_))
        ));
        // start time still works when asked for explicitly
        let r = align(&a, &b, &AlignConfig::with_method(AlignStrategy::StartTime)).unwrap();
        assert_eq!(r.offset, 100.0);
        assert!(r.confidence > 0.99);
    }

    #[test]
    fn flat_series_cannot_be_cross_correlated() {
        let time: Vec<f64> = (0..100).map(f64::from).collect();
        let flat = TimeSeries::new(time, vec![1.0; 100]).unwrap();
        let cfg = AlignConfig::with_method(AlignStrategy::CrossCorrelation);
        assert!(matches!(align(&flat, &flat, &cfg), Err(AnalysisError::AlignmentFailure(_))));
        // auto never gets there: the value range is degenerate
        let r = align(&flat, &flat, &AlignConfig::default()).unwrap();
        assert_eq!(r.method, AlignMethod::StartTime);
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn extreme_sampling_span_is_gridded() {
        // median step 1e-10 over a span of 1e12
        let time = vec![0.0, 1e-10, 2e-10, 3e-10, 1e12];
        let a = TimeSeries::new(time, vec![1.0, 2.0, 3.0, 2.0, 1.0]).unwrap();
        let r = align(&a, &a, &AlignConfig::default()).unwrap();
        assert!(r.offset.is_finite());
        let d = choose_method(&a, &a, &AlignConfig::default()).unwrap();
        assert_ne!(d.reason, DecisionReason::Requested);
    }

    #[test]
    fn invalid_config() {
        let a = bump_series(0.0, 50, 1.0, 20.0);
        let cfg = AlignConfig::with_method(AlignStrategy::Manual { offset: f64::NAN });
        assert!(matches!(align(&a, &a, &cfg), Err(AnalysisError::InvalidParameter { .. })));
    }
}
