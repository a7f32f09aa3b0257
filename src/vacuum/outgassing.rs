//! Outgassing rate from a leak-rate estimate.
//!
//! ```text
//! rate            = reconciled_rate · V        (gas throughput)
//! normalized_rate = rate / A                   (per unit surface)
//! ```

use serde::{Deserialize, Serialize};

use crate::config::check_positive;
use crate::error::Result;
use crate::vacuum::leak::LeakRateResult;

/// Qualitative outgassing level of the normalized rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutgassingLevel {
    VeryLow,
    Low,
    Moderate,
    High,
}

impl OutgassingLevel {
    /// `> 1e-6` High, `> 1e-8` Moderate, `> 1e-10` Low.
    pub fn from_normalized_rate(rate: f64) -> Self {
        if rate > 1e-6 {
            Self::High
        } else if rate > 1e-8 {
            Self::Moderate
        } else if rate > 1e-10 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgassingResult {
    pub rate: f64,
    /// `rate / surface_area`.
    pub normalized_rate: f64,
    pub surface_area: f64,
    pub volume: f64,
    pub level: OutgassingLevel,
}

/// Normalizes the reconciled leak rate by chamber volume and surface area.
///
/// # Errors
///
/// `InvalidParameter` if `surface_area` or `volume` is not positive and finite.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use u_vacuum::vacuum::{estimate_outgassing, LeakRateResult, LeakSeverity, OutgassingLevel};
///
/// let leak = LeakRateResult {
///     per_method: BTreeMap::new(),
///     reconciled_rate: 2e-7,
///     severity: LeakSeverity::Minor,
///     n_points: 100,
/// };
/// let r = estimate_outgassing(&leak, 500.0, 10.0).unwrap();
/// assert!((r.rate - 2e-6).abs() < 1e-18);
/// assert!((r.normalized_rate - 4e-9).abs() < 1e-20);
/// assert_eq!(r.level, OutgassingLevel::Low);
/// ```
pub fn estimate_outgassing(leak: &LeakRateResult, surface_area: f64, volume: f64) -> Result<OutgassingResult> {
    check_positive("surface_area", surface_area)?;
    check_positive("volume", volume)?;
    let rate = leak.reconciled_rate * volume;
    let normalized_rate = rate / surface_area;
    Ok(OutgassingResult {
        rate,
        normalized_rate,
        surface_area,
        volume,
        level: OutgassingLevel::from_normalized_rate(normalized_rate),
    })
}
