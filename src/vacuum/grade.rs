//! Overall A–D performance grade of a vacuum system.
//!
//! # Scoring
//!
//! Each metric is mapped to [0, 1] by log-interpolation between a "best"
//! value (score 1) and a "worst" value (score 0):
//!
//! ```text
//! s(x) = (log x_worst − log x) / (log x_worst − log x_best), clamped
//! ```
//!
//! | Metric         | Best   | Worst   | Weight |
//! |----------------|--------|---------|--------|
//! | base pressure  | 1e-7   | 1e-3    | 0.3    |
//! | leak rate      | 1e-7   | 1e-3    | 0.4    |
//! | pump-down τ    | 60 s   | 3600 s  | 0.3    |
//!
//! The pump-down score is discounted by the fit quality q:
//! `q·s(τ) + (1 − q)·0.5`, so a fit that explains nothing counts as neutral.
//! The weighted average is bucketed at 0.85 / 0.65 / 0.4 into A / B / C,
//! anything lower is D.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{check_positive, AnalysisConfig, Validate};
use crate::detection::{detect_spikes, SpikeEvent};
use crate::error::{AnalysisError, Result};
use crate::series::TimeSeries;
use crate::vacuum::base_pressure::{estimate_base_pressure, BasePressureResult};
use crate::vacuum::leak::{estimate_leak_rate, LeakRateResult};
use crate::vacuum::pumpdown::{analyze_pump_down, PumpDownResult};

/// Key of the pump-down score in [`PerformanceGrade::contributing_scores`].
pub const PUMP_DOWN_SCORE: &str = "pump_down";
/// Key of the leak score.
pub const LEAK_RATE_SCORE: &str = "leak_rate";
/// Key of the base pressure score.
pub const BASE_PRESSURE_SCORE: &str = "base_pressure";

/// Letter grade, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

/// Reference bands, weights and cutoffs used for grading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GradePolicy {
    pub base_pressure_best: f64,
    pub base_pressure_worst: f64,
    pub leak_rate_best: f64,
    pub leak_rate_worst: f64,
    pub time_constant_best: f64,
    pub time_constant_worst: f64,
    pub pump_down_weight: f64,
    pub leak_rate_weight: f64,
    pub base_pressure_weight: f64,
    pub a_cutoff: f64,
    pub b_cutoff: f64,
    pub c_cutoff: f64,
}

impl Default for GradePolicy {
    fn default() -> Self {
        Self {
            base_pressure_best: 1e-7,
            base_pressure_worst: 1e-3,
            leak_rate_best: 1e-7,
            leak_rate_worst: 1e-3,
            time_constant_best: 60.0,
            time_constant_worst: 3600.0,
            pump_down_weight: 0.3,
            leak_rate_weight: 0.4,
            base_pressure_weight: 0.3,
            a_cutoff: 0.85,
            b_cutoff: 0.65,
            c_cutoff: 0.4,
        }
    }
}

impl Validate for GradePolicy {
    fn validate(&self) -> Result<()> {
        let bands = [
            ("base_pressure", self.base_pressure_best, self.base_pressure_worst),
            ("leak_rate", self.leak_rate_best, self.leak_rate_worst),
            ("time_constant", self.time_constant_best, self.time_constant_worst),
        ];
        for (name, best, worst) in bands {
            check_positive(name, best)?;
            check_positive(name, worst)?;
            if best >= worst {
                return Err(AnalysisError::invalid(name, format!("best ({best}) must be below worst ({worst})")));
            }
        }
        let weights = [self.pump_down_weight, self.leak_rate_weight, self.base_pressure_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
            return Err(AnalysisError::invalid("weights", "must be non-negative with a positive sum"));
        }
        let cutoffs = [self.a_cutoff, self.b_cutoff, self.c_cutoff];
        if cutoffs.iter().any(|c| !(0.0..=1.0).contains(c)) || cutoffs.windows(2).any(|w| w[0] <= w[1]) {
            return Err(AnalysisError::invalid("cutoffs", "must lie in [0, 1] and decrease from A to C"));
        }
        Ok(())
    }
}

impl GradePolicy {
    /// Letter for a weighted score.
    pub fn letter(&self, score: f64) -> Grade {
        if score >= self.a_cutoff {
            Grade::A
        } else if score >= self.b_cutoff {
            Grade::B
        } else if score >= self.c_cutoff {
            Grade::C
        } else {
            Grade::D
        }
    }
}

/// Grade with the per-metric scores behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceGrade {
    pub grade: Grade,
    /// Weighted average of the contributing scores.
    pub score: f64,
    /// `pump_down`, `leak_rate` and `base_pressure`, each in [0, 1].
    pub contributing_scores: BTreeMap<String, f64>,
    /// One readable rating per scored metric.
    pub factors: Vec<String>,
}

/// Full single-series assessment: every analysis plus the grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemAssessment {
    pub grade: PerformanceGrade,
    pub base_pressure: BasePressureResult,
    pub pump_down: PumpDownResult,
    pub leak: LeakRateResult,
    pub spikes: Vec<SpikeEvent>,
}

/// Aggregates analysis results into a [`PerformanceGrade`].
#[derive(Debug, Clone, Default)]
pub struct PerformanceGrader {
    policy: GradePolicy,
}

impl PerformanceGrader {
    /// Grader with the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grader with a custom policy.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the policy is inconsistent.
    pub fn with_policy(policy: GradePolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &GradePolicy {
        &self.policy
    }

    /// Scores and grades already computed results.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::BTreeMap;
    /// use u_vacuum::vacuum::{
    ///     BasePressureResult, Grade, LeakRateResult, LeakSeverity, PerformanceGrader, PumpDownResult,
    /// };
    ///
    /// let pump = PumpDownResult {
    ///     initial_value: 1e3,
    ///     time_constant: 30.0,
    ///     ultimate_value: 5e-8,
    ///     fit_quality: 0.99,
    ///     converged: true,
    ///     iterations: 12,
    ///     total_time: 600.0,
    ///     milestones: vec![],
    /// };
    /// let leak = LeakRateResult {
    ///     per_method: BTreeMap::new(),
    ///     reconciled_rate: 5e-8,
    ///     severity: LeakSeverity::Negligible,
    ///     n_points: 100,
    /// };
    /// let base = BasePressureResult { floor_value: 5e-8, stability: 0.01, confidence: 0.99, tail_len: 60 };
    ///
    /// let g = PerformanceGrader::new().grade(&pump, &leak, &base);
    /// assert_eq!(g.grade, Grade::A);
    /// ```
    pub fn grade(&self, pump_down: &PumpDownResult, leak: &LeakRateResult, base: &BasePressureResult) -> PerformanceGrade {
        let p = &self.policy;
        let pump_score = pump_down_score(pump_down, p);
        let leak_score = if leak.reconciled_rate <= 0.0 {
            1.0
        } else {
            log_score(leak.reconciled_rate, p.leak_rate_best, p.leak_rate_worst)
        };
        let base_score = log_score(base.floor_value, p.base_pressure_best, p.base_pressure_worst);

        let total_weight = p.pump_down_weight + p.leak_rate_weight + p.base_pressure_weight;
        let score = (p.pump_down_weight * pump_score + p.leak_rate_weight * leak_score + p.base_pressure_weight * base_score)
            / total_weight;
        let grade = p.letter(score);
        debug!(score, ?grade, pump_score, leak_score, base_score, "performance graded");

        let contributing_scores = BTreeMap::from([
            (PUMP_DOWN_SCORE.to_string(), pump_score),
            (LEAK_RATE_SCORE.to_string(), leak_score),
            (BASE_PRESSURE_SCORE.to_string(), base_score),
        ]);
        let factors = vec![
            format!("{} base pressure", p.rating(base_score)),
            format!("{} pump-down performance", p.rating(pump_score)),
            format!("{} leak tightness", p.rating(leak_score)),
        ];

        PerformanceGrade {
            grade,
            score,
            contributing_scores,
            factors,
        }
    }

    /// Runs base pressure, pump-down and spike analysis on `pump_down`, leak
    /// estimation on `rate_of_rise`, then grades.
    ///
    /// Any analysis failure is returned as is. The grade's factors are
    /// extended with the spike frequency and tail stability ratings.
    pub fn assess(
        &self,
        pump_down: &TimeSeries,
        rate_of_rise: &TimeSeries,
        config: &AnalysisConfig,
    ) -> Result<SystemAssessment> {
        let spikes = detect_spikes(pump_down, &config.spike)?;
        let base_pressure = estimate_base_pressure(pump_down, &config.base_pressure)?;
        let pump = analyze_pump_down(pump_down, &config.pump_down)?;
        let leak = estimate_leak_rate(rate_of_rise, &config.leak)?;

        let mut grade = self.grade(&pump, &leak, &base_pressure);
        let per_thousand = spikes.len() as f64 / pump_down.len() as f64 * 1000.0;
        grade.factors.push(spike_frequency_rating(per_thousand).to_string());
        grade.factors.push(stability_rating(base_pressure.stability).to_string());

        Ok(SystemAssessment {
            grade,
            base_pressure,
            pump_down: pump,
            leak,
            spikes,
        })
    }
}

impl GradePolicy {
    fn rating(&self, score: f64) -> &'static str {
        match self.letter(score) {
            Grade::A => "Excellent",
            Grade::B => "Good",
            Grade::C => "Adequate",
            Grade::D => "Poor",
        }
    }
}

/// 1 at or below `best`, 0 at or above `worst`, log-linear in between.
fn log_score(value: f64, best: f64, worst: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    if value <= best {
        return 1.0;
    }
    if value >= worst {
        return 0.0;
    }
    ((worst.ln() - value.ln()) / (worst.ln() - best.ln())).clamp(0.0, 1.0)
}

fn pump_down_score(result: &PumpDownResult, policy: &GradePolicy) -> f64 {
    let q = if result.fit_quality.is_finite() {
        result.fit_quality.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let tau_score = log_score(result.time_constant, policy.time_constant_best, policy.time_constant_worst);
    q * tau_score + (1.0 - q) * 0.5
}

fn spike_frequency_rating(per_thousand: f64) -> &'static str {
    if per_thousand < 1.0 {
        "Low spike frequency"
    } else if per_thousand < 5.0 {
        "Moderate spike frequency"
    } else if per_thousand < 10.0 {
        "High spike frequency"
    } else {
        "Very high spike frequency"
    }
}

fn stability_rating(stability: f64) -> &'static str {
    if stability < 0.1 {
        "Excellent pressure stability"
    } else if stability < 0.3 {
        "Good pressure stability"
    } else if stability < 0.5 {
        "Adequate pressure stability"
    } else {
        "Poor pressure stability"
    }
}
