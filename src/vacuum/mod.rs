//! Single-series vacuum analysis.
//!
//! Every analyzer takes a pressure [`TimeSeries`](crate::TimeSeries) and a
//! config record, and returns an owned result. Values must be positive;
//! non-finite samples are dropped before analysis.
//!
//! # Analyzers
//!
//! - [`estimate_base_pressure`]: median floor and stability of the tail
//! - [`analyze_pump_down`]: exponential fit, time constant, milestones
//! - [`detect_pump_down_cycles`]: pump-down segments in a long recording
//! - [`estimate_leak_rate`]: linear, exponential and conductance rates,
//!   reconciled into one
//! - [`estimate_outgassing`]: leak rate per unit surface
//! - [`noise_metrics`]: residual noise around the trend and its dominant
//!   frequency
//! - [`PerformanceGrader`]: A–D grade from the above
//!
//! # References
//!
//! - O'Hanlon, J.F. (2003). *A User's Guide to Vacuum Technology*, 3rd ed.,
//!   Wiley. Chapters 3 (gas flow) and 4 (outgassing).

mod base_pressure;
mod grade;
mod leak;
mod noise;
mod outgassing;
mod pumpdown;

pub use base_pressure::{estimate_base_pressure, BasePressureConfig, BasePressureResult, MIN_TAIL_SAMPLES};
pub use grade::{
    Grade, GradePolicy, PerformanceGrade, PerformanceGrader, SystemAssessment, BASE_PRESSURE_SCORE,
    LEAK_RATE_SCORE, PUMP_DOWN_SCORE,
};
pub use leak::{
    estimate_leak_rate, reconcile, LeakConfig, LeakMethod, LeakRateResult, LeakSeverity, LeakSeverityPolicy,
    MethodEstimate, MethodSelection, DEFAULT_REFERENCE_CONDUCTANCE, MIN_LEAK_SAMPLES,
};
pub use noise::{noise_metrics, NoiseConfig, NoiseMetrics, MAX_TREND_DEGREE};
pub use outgassing::{estimate_outgassing, OutgassingLevel, OutgassingResult};
pub use pumpdown::{
    analyze_pump_down, detect_pump_down_cycles, CycleConfig, CycleEfficiency, Milestone, PumpDownConfig,
    PumpDownCycle, PumpDownResult, DEFAULT_THRESHOLDS, MIN_PUMP_DOWN_SAMPLES,
};
