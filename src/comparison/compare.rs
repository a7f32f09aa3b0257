//! Two-series comparison.
//!
//! | Kind                 | Inputs                    | Statistics                                   |
//! |----------------------|---------------------------|----------------------------------------------|
//! | Difference           | aligned grid over overlap | mean/max (abs) difference, Welch t, p-value   |
//! | Correlation          | aligned grid over overlap | Pearson r, p-value, r²                       |
//! | StatisticalSummary   | raw finite values         | Welch t, KS D, their p-values, means, std    |
//! | Overlay / SideBySide | each series on its own    | base pressure and stability of each series   |
//!
//! Statistics that cannot be computed (e.g. a t-test on constant data) are
//! left out of the map rather than stored as sentinels.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use u_numflow::stats;

use crate::comparison::align::{grid_spacing, AlignmentResult};
use crate::comparison::insight::generate_insights;
use crate::config::Validate;
use crate::correlation::pearson;
use crate::error::{AnalysisError, Result};
use crate::series::{overlap, uniform_grid, TimeSeries};
use crate::testing::{ks_two_sample, two_sample_t_test};
use crate::vacuum::{estimate_base_pressure, BasePressureConfig};

/// Fewest grid points the aligned comparisons accept.
pub const MIN_COMPARISON_POINTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonKind {
    Overlay,
    SideBySide,
    Difference,
    Correlation,
    StatisticalSummary,
}

/// Comparison engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompareConfig {
    /// Significance level of the hypothesis tests.
    pub alpha: f64,
    pub max_grid_points: usize,
    /// Used by Overlay and SideBySide.
    pub base_pressure: BasePressureConfig,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            max_grid_points: 4096,
            base_pressure: BasePressureConfig::default(),
        }
    }
}

impl Validate for CompareConfig {
    fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(AnalysisError::invalid("alpha", format!("must lie in (0, 1), got {}", self.alpha)));
        }
        if self.max_grid_points < MIN_COMPARISON_POINTS {
            return Err(AnalysisError::invalid("max_grid_points", "must be at least 3"));
        }
        self.base_pressure.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub kind: ComparisonKind,
    pub statistics: BTreeMap<String, f64>,
    pub insights: Vec<String>,
    /// Alignment applied to series B, if any.
    pub alignment: Option<AlignmentResult>,
    /// Common grid (Difference and Correlation only).
    pub grid: Vec<f64>,
    /// `A − B` on `grid` (Difference only).
    pub difference: Vec<f64>,
}

impl ComparisonResult {
    /// Statistic by name.
    pub fn stat(&self, name: &str) -> Option<f64> {
        self.statistics.get(name).copied()
    }
}

/// Compares series A with series B.
///
/// # Errors
///
/// - `InvalidParameter` for an invalid configuration, or a Difference
///   without an alignment.
/// - `InsufficientData` when the aligned overlap holds fewer than 3 grid
///   points, or a summary sample has fewer than 2 finite values.
/// - Whatever the base pressure estimate reports for Overlay/SideBySide.
///
/// # Examples
///
/// ```
/// use u_vacuum::comparison::{compare, ComparisonKind, CompareConfig};
/// use u_vacuum::TimeSeries;
///
/// let time: Vec<f64> = (0..50).map(|i| i as f64).collect();
/// let a = TimeSeries::new(time.clone(), time.iter().map(|t| t * 2.0).collect()).unwrap();
/// let b = TimeSeries::new(time.clone(), time.iter().map(|t| t + 3.0).collect()).unwrap();
///
/// let r = compare(&a, &b, ComparisonKind::Correlation, None, &CompareConfig::default()).unwrap();
/// assert!((r.stat("correlation_r").unwrap() - 1.0).abs() < 1e-9);
/// assert!(r.insights[0].starts_with("Strong positive correlation"));
/// ```
pub fn compare(
    a: &TimeSeries,
    b: &TimeSeries,
    kind: ComparisonKind,
    alignment: Option<&AlignmentResult>,
    config: &CompareConfig,
) -> Result<ComparisonResult> {
    config.validate()?;
    let mut statistics = BTreeMap::new();
    let mut grid = Vec::new();
    let mut difference = Vec::new();

    match kind {
        ComparisonKind::Difference => {
            let alignment = alignment.ok_or_else(|| {
                AnalysisError::invalid("alignment", "difference comparison requires an alignment")
            })?;
            let (g, ya, yb) = aligned_grid(a, b, alignment.offset, config, "difference")?;
            difference = ya.iter().zip(&yb).map(|(x, y)| x - y).collect();
            difference_statistics(&ya, &yb, &difference, config.alpha, &mut statistics);
            grid = g;
        }
        ComparisonKind::Correlation => {
            let offset = alignment.map_or(0.0, |al| al.offset);
            let (g, ya, yb) = aligned_grid(a, b, offset, config, "correlation")?;
            statistics.insert("n_points".to_string(), g.len() as f64);
            if let Some(c) = pearson(&ya, &yb) {
                statistics.insert("correlation_r".to_string(), c.r);
                statistics.insert("r_squared".to_string(), c.r * c.r);
                statistics.insert("p_value".to_string(), c.p_value);
            }
            grid = g;
        }
        ComparisonKind::StatisticalSummary => summary_statistics(a, b, &mut statistics)?,
        ComparisonKind::Overlay | ComparisonKind::SideBySide => {
            let ba = estimate_base_pressure(a, &config.base_pressure)?;
            let bb = estimate_base_pressure(b, &config.base_pressure)?;
            statistics.insert("base_a".to_string(), ba.floor_value);
            statistics.insert("stability_a".to_string(), ba.stability);
            statistics.insert("base_b".to_string(), bb.floor_value);
            statistics.insert("stability_b".to_string(), bb.stability);
        }
    }

    statistics.retain(|_, v| v.is_finite());
    let insights = generate_insights(&statistics, config.alpha);
    debug!(?kind, statistics = statistics.len(), insights = insights.len(), "comparison finished");

    Ok(ComparisonResult {
        kind,
        statistics,
        insights,
        alignment: alignment.copied(),
        grid,
        difference,
    })
}

/// Resamples A and `B.shifted(offset)` on a uniform grid over their overlap.
fn aligned_grid(
    a: &TimeSeries,
    b: &TimeSeries,
    offset: f64,
    config: &CompareConfig,
    operation: &'static str,
) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    let too_few = |n| AnalysisError::insufficient(operation, MIN_COMPARISON_POINTS, n);
    let fa = a.finite().ok_or_else(|| too_few(0))?;
    let fb = b.finite().ok_or_else(|| too_few(0))?.shifted(offset);
    let (lo, hi) = overlap(&fa, &fb).ok_or_else(|| too_few(0))?;
    let spacing = grid_spacing(&fa, &fb).map_err(|_| too_few(1))?;
    let grid = uniform_grid(lo, hi, spacing, config.max_grid_points);
    if grid.len() < MIN_COMPARISON_POINTS {
        return Err(too_few(grid.len()));
    }
    let ya = fa.resample(&grid);
    let yb = fb.resample(&grid);
    Ok((grid, ya, yb))
}

fn difference_statistics(ya: &[f64], yb: &[f64], diff: &[f64], alpha: f64, out: &mut BTreeMap<String, f64>) {
    let n = diff.len() as f64;
    let mean_diff = diff.iter().sum::<f64>() / n;
    let mean_abs = diff.iter().map(|d| d.abs()).sum::<f64>() / n;
    // signed value of the largest |d|, first occurrence on ties
    let max_diff = diff
        .iter()
        .copied()
        .fold(0.0_f64, |best, d| if d.abs() > best.abs() { d } else { best });

    out.insert("n_points".to_string(), n);
    out.insert("mean_diff".to_string(), mean_diff);
    out.insert("max_diff".to_string(), max_diff);
    out.insert("mean_abs_diff".to_string(), mean_abs);
    out.insert("max_abs_diff".to_string(), max_diff.abs());
    if let Some(t) = two_sample_t_test(ya, yb) {
        out.insert("t_statistic".to_string(), t.statistic);
        out.insert("p_value".to_string(), t.p_value);
        out.insert("significant".to_string(), if t.p_value < alpha { 1.0 } else { 0.0 });
    }
}

fn summary_statistics(a: &TimeSeries, b: &TimeSeries, out: &mut BTreeMap<String, f64>) -> Result<()> {
    let va: Vec<f64> = a.values().iter().copied().filter(|v| v.is_finite()).collect();
    let vb: Vec<f64> = b.values().iter().copied().filter(|v| v.is_finite()).collect();
    for v in [&va, &vb] {
        if v.len() < 2 {
            return Err(AnalysisError::insufficient("statistical summary", 2, v.len()));
        }
    }

    let (mean_a, mean_b) = (stats::mean(&va), stats::mean(&vb));
    let entries = [
        ("mean_a", mean_a),
        ("mean_b", mean_b),
        ("mean_diff", mean_a.zip(mean_b).map(|(x, y)| x - y)),
        ("std_a", stats::std_dev(&va)),
        ("std_b", stats::std_dev(&vb)),
    ];
    for (k, v) in entries {
        if let Some(v) = v {
            out.insert(k.to_string(), v);
        }
    }
    if let Some(t) = two_sample_t_test(&va, &vb) {
        out.insert("t_statistic".to_string(), t.statistic);
        out.insert("t_p_value".to_string(), t.p_value);
        out.insert("p_value".to_string(), t.p_value);
    }
    if let Some(ks) = ks_two_sample(&va, &vb) {
        out.insert("ks_statistic".to_string(), ks.statistic);
        out.insert("ks_p_value".to_string(), ks.p_value);
    }
    Ok(())
}
