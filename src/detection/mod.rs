//! Transient anomaly detection.
//!
//! Spikes are points that jump far above the local baseline, such as a
//! burst from a gauge glitch or a sudden gas release.
//!
//! # Detectors
//!
//! - [`detect_spikes`]: ratio against the median of a trailing window, with
//!   severity bands
//!
//! # References
//!
//! - Hampel, F.R. (1974). "The Influence Curve and its Role in Robust
//!   Estimation", *JASA* 69(346), pp. 383-393.

mod spike;

pub use spike::{
    choose_window, detect_spikes, Severity, SpikeConfig, SpikeEvent, SpikeSeverityPolicy, WindowChoice,
    WindowReason, MIN_SERIES_LEN,
};
