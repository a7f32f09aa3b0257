//! Multi-series comparison.
//!
//! [`align`] finds the time offset between two series; [`compare`]
//! contrasts them (difference, correlation, statistical tests) and turns the
//! statistics into readable insights with [`generate_insights`].
//!
//! # Examples
//!
//! ```
//! use u_vacuum::comparison::{align, compare, AlignConfig, ComparisonKind, CompareConfig};
//! use u_vacuum::TimeSeries;
//!
//! let bump = |t: f64| 1.0 + (-((t - 60.0) / 6.0).powi(2)).exp();
//! let time: Vec<f64> = (0..150).map(|i| i as f64).collect();
//! let a = TimeSeries::new(time.clone(), time.iter().map(|&t| bump(t)).collect()).unwrap();
//! // B records the same event 12 s later
//! let b = TimeSeries::new(
//!     time.iter().map(|t| t + 12.0).collect(),
//!     time.iter().map(|&t| bump(t)).collect(),
//! )
//! .unwrap();
//!
//! let alignment = align(&a, &b, &AlignConfig::default()).unwrap();
//! assert!((alignment.offset - 12.0).abs() <= 1.0);
//!
//! let diff = compare(&a, &b, ComparisonKind::Difference, Some(&alignment), &CompareConfig::default()).unwrap();
//! assert!(diff.stat("max_abs_diff").unwrap() < 1e-6);
//! ```

mod align;
mod compare;
mod insight;

pub use align::{
    align, choose_method, AlignConfig, AlignMethod, AlignStrategy, AlignmentDecision, AlignmentResult, DecisionReason,
};
pub use compare::{compare, CompareConfig, ComparisonKind, ComparisonResult, MIN_COMPARISON_POINTS};
pub use insight::generate_insights;
