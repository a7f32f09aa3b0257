//! Loading analyzer configuration.
//!
//! Every analyzer takes a small config record with `Default` values matching
//! the fixed policy constants. Records reject unknown keys, so a typo in a
//! configuration document fails loudly instead of being ignored.
//!
//! # Examples
//!
//! ```
//! use u_vacuum::config::{from_json, AnalysisConfig};
//! use u_vacuum::detection::SpikeConfig;
//!
//! let spike: SpikeConfig = from_json(r#"{ "window": 25 }"#).unwrap();
//! assert_eq!(spike.window, Some(25));
//!
//! // unknown options are rejected
//! assert!(from_json::<SpikeConfig>(r#"{ "windw": 25 }"#).is_err());
//!
//! let all: AnalysisConfig = from_json(r#"{ "leak": { "volume": 12.5 } }"#).unwrap();
//! assert_eq!(all.leak.volume, Some(12.5));
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::comparison::{AlignConfig, CompareConfig};
use crate::detection::SpikeConfig;
use crate::error::{AnalysisError, Result};
use crate::vacuum::{BasePressureConfig, CycleConfig, GradePolicy, LeakConfig, NoiseConfig, PumpDownConfig};

/// Parses a configuration record from JSON and validates it.
///
/// # Errors
///
/// `InvalidParameter { name: "config" }` for malformed JSON, unknown keys or
/// wrongly typed values; whatever [`Validate::validate`] reports otherwise.
pub fn from_json<T>(text: &str) -> Result<T>
where
    T: DeserializeOwned + Validate,
{
    let parsed: T = serde_json::from_str(text).map_err(|e| AnalysisError::invalid("config", e.to_string()))?;
    parsed.validate()?;
    Ok(parsed)
}

/// Checks the semantic constraints serde cannot express.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// All analyzer sections in one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub spike: SpikeConfig,
    pub base_pressure: BasePressureConfig,
    pub pump_down: PumpDownConfig,
    pub cycles: CycleConfig,
    pub leak: LeakConfig,
    pub noise: NoiseConfig,
    pub grade: GradePolicy,
    pub align: AlignConfig,
    pub compare: CompareConfig,
}

impl Validate for AnalysisConfig {
    fn validate(&self) -> Result<()> {
        self.spike.validate()?;
        self.base_pressure.validate()?;
        self.pump_down.validate()?;
        self.cycles.validate()?;
        self.leak.validate()?;
        self.noise.validate()?;
        self.grade.validate()?;
        self.align.validate()?;
        self.compare.validate()
    }
}

/// `value` must be finite and strictly positive.
pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AnalysisError::invalid(name, format!("must be positive and finite, got {value}")))
    }
}

/// `values` must be finite and strictly decreasing (most severe band first).
pub(crate) fn check_descending(name: &'static str, values: &[f64]) -> Result<()> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::invalid(name, "thresholds must be finite"));
    }
    if values.windows(2).any(|w| w[0] <= w[1]) {
        return Err(AnalysisError::invalid(name, format!("thresholds must be strictly decreasing, got {values:?}")));
    }
    Ok(())
}
