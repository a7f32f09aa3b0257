//! # u-vacuum
//!
//! Time-series analysis for vacuum systems: pump-down characterization,
//! leak and outgassing rates, base pressure, spike detection, signal noise,
//! performance grading, and multi-series alignment and comparison.
//!
//! Every analyzer is a pure function of its input series and a
//! configuration record. Nothing is cached and nothing is written to disk;
//! the caller owns the data and the results.
//!
//! ## Modules
//!
//! - [`series`]: Time-stamped samples, windows, interpolation, resampling
//! - [`detection`]: Spike detection against a trailing-median baseline
//! - [`vacuum`]: Base pressure, pump-down fit and milestones, pump-down
//!   cycles, leak rate (linear, exponential, conductance), outgassing,
//!   signal noise, performance grading
//! - [`comparison`]: Series alignment (start time, peak, cross-correlation)
//!   and comparison (difference, correlation, statistical summary) with
//!   generated insights
//! - [`fitting`]: Levenberg-Marquardt nonlinear least squares
//! - [`regression`]: Simple linear regression
//! - [`correlation`]: Pearson correlation and lagged cross-correlation
//! - [`testing`]: Welch t-test and two-sample Kolmogorov-Smirnov test
//! - [`config`]: Serde-backed configuration with validation
//! - [`persist`]: Flat key-value form of result records
//!
//! ## Design Philosophy
//!
//! - **Fail loudly**: degenerate input is an [`AnalysisError`], never a
//!   silent NaN
//! - **Deterministic**: the same input and configuration give the same
//!   result, down to the order of generated insights
//! - **Numerical stability**: descriptive statistics, linear solves and
//!   distribution functions come from `u-numflow`
//! - **Research-backed**: fitting and tests reference the literature they
//!   implement

pub mod comparison;
pub mod config;
pub mod correlation;
pub mod detection;
pub mod error;
pub mod fitting;
pub mod persist;
pub mod regression;
pub mod series;
pub mod testing;
pub mod vacuum;

pub use comparison::{AlignMethod, AlignmentResult, ComparisonKind, ComparisonResult};
pub use config::AnalysisConfig;
pub use detection::{Severity, SpikeEvent};
pub use error::{AnalysisError, Result};
pub use series::TimeSeries;
pub use vacuum::{
    BasePressureResult, Grade, LeakRateResult, LeakSeverity, NoiseMetrics, OutgassingResult, PerformanceGrade,
    PumpDownResult,
};
