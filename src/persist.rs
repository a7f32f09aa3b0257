//! Flat key-value form of result records.
//!
//! Any serializable record is flattened into a `BTreeMap<String, String>`:
//!
//! - nested fields are joined with `.`
//! - sequence elements are addressed as `#i`
//! - leaves are stored as JSON scalar text (`1e-7`, `true`, `"High"`, `null`)
//! - empty containers are stored as `[]` and `{}`
//! - `\`, `.` and `#` inside field names are escaped with `\`
//!
//! Floats are written with round-trip precision, so
//! `from_flat(to_flat(r)) == r` for every result record.
//!
//! # Examples
//!
//! ```
//! use u_vacuum::persist::{from_flat, to_flat};
//! use u_vacuum::vacuum::{Milestone, PumpDownResult};
//!
//! let r = PumpDownResult {
//!     initial_value: 1013.25,
//!     time_constant: 41.7,
//!     ultimate_value: 2.5e-7,
//!     fit_quality: 0.998,
//!     converged: true,
//!     iterations: 9,
//!     total_time: 3600.0,
//!     milestones: vec![Milestone { threshold: 1e-2, elapsed: 812.5 }],
//! };
//! let flat = to_flat(&r).unwrap();
//! assert_eq!(flat["milestones.#0.elapsed"], "812.5");
//! assert_eq!(flat["converged"], "true");
//!
//! let back: PumpDownResult = from_flat(&flat).unwrap();
//! assert_eq!(back, r);
//! ```

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AnalysisError, Result};

/// Flattened record.
pub type FlatRecord = BTreeMap<String, String>;

const EMPTY_ARRAY: &str = "[]";
const EMPTY_OBJECT: &str = "{}";

/// Flattens `record`.
///
/// # Errors
///
/// `InvalidParameter { name: "record" }` if the record cannot be serialized.
pub fn to_flat<T: Serialize>(record: &T) -> Result<FlatRecord> {
    let value = serde_json::to_value(record).map_err(record_error)?;
    let mut out = FlatRecord::new();
    flatten(String::new(), &value, &mut out)?;
    Ok(out)
}

/// Rebuilds a record from its flat form.
///
/// # Errors
///
/// `InvalidParameter { name: "record" }` for malformed keys or leaves, or a
/// flat form that does not describe a `T`.
pub fn from_flat<T: DeserializeOwned>(flat: &FlatRecord) -> Result<T> {
    let mut root = Value::Null;
    for (key, text) in flat {
        let path = parse_path(key)?;
        let leaf = match text.as_str() {
            EMPTY_ARRAY => Value::Array(Vec::new()),
            EMPTY_OBJECT => Value::Object(Map::new()),
            _ => serde_json::from_str(text).map_err(record_error)?,
        };
        insert(&mut root, &path, leaf, key)?;
    }
    serde_json::from_value(root).map_err(record_error)
}

fn record_error(e: serde_json::Error) -> AnalysisError {
    AnalysisError::invalid("record", e.to_string())
}

// ---------------------------------------------------------------------------
// Flattening
// ---------------------------------------------------------------------------

fn flatten(prefix: String, value: &Value, out: &mut FlatRecord) -> Result<()> {
    match value {
        Value::Object(map) if map.is_empty() => {
            out.insert(prefix, EMPTY_OBJECT.to_string());
        }
        Value::Object(map) => {
            for (k, v) in map {
                flatten(join(&prefix, &escape(k)), v, out)?;
            }
        }
        Value::Array(items) if items.is_empty() => {
            out.insert(prefix, EMPTY_ARRAY.to_string());
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(join(&prefix, &format!("#{i}")), v, out)?;
            }
        }
        scalar => {
            out.insert(prefix, serde_json::to_string(scalar).map_err(record_error)?);
        }
    }
    Ok(())
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

fn escape(key: &str) -> String {
    let mut s = String::with_capacity(key.len());
    for c in key.chars() {
        if matches!(c, '\\' | '.' | '#') {
            s.push('\\');
        }
        s.push(c);
    }
    s
}

// ---------------------------------------------------------------------------
// Rebuilding
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<Segment>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let malformed = || AnalysisError::invalid("record", format!("malformed key `{path}`"));

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut is_index = false;
    let mut at_start = true;
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.push(chars.next().ok_or_else(malformed)?),
            '.' => {
                segments.push(segment(&current, is_index).ok_or_else(malformed)?);
                current.clear();
                is_index = false;
                at_start = true;
                continue;
            }
            '#' if at_start => is_index = true,
            _ => current.push(c),
        }
        at_start = false;
    }
    segments.push(segment(&current, is_index).ok_or_else(malformed)?);
    Ok(segments)
}

fn segment(text: &str, is_index: bool) -> Option<Segment> {
    if is_index {
        text.parse().ok().map(Segment::Index)
    } else {
        Some(Segment::Key(text.to_string()))
    }
}

fn insert(node: &mut Value, path: &[Segment], leaf: Value, key: &str) -> Result<()> {
    let Some((first, rest)) = path.split_first() else {
        *node = leaf;
        return Ok(());
    };
    let conflict = || AnalysisError::invalid("record", format!("key `{key}` conflicts with another entry"));
    let slot = match first {
        Segment::Key(k) => {
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else {
                return Err(conflict());
            };
            map.entry(k.clone()).or_insert(Value::Null)
        }
        Segment::Index(i) => {
            if node.is_null() {
                *node = Value::Array(Vec::new());
            }
            let Value::Array(items) = node else {
                return Err(conflict());
            };
            if items.len() <= *i {
                items.resize(*i + 1, Value::Null);
            }
            &mut items[*i]
        }
    };
    insert(slot, rest, leaf, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::{AlignMethod, AlignmentResult, ComparisonKind, ComparisonResult};
    use crate::vacuum::{LeakMethod, LeakRateResult, LeakSeverity, MethodEstimate};

    #[test]
    fn keys_and_leaves() {
        let r = AlignmentResult {
            offset: -0.1,
            method: AlignMethod::CrossCorrelation,
            confidence: 0.97,
        };
        let flat = to_flat(&r).unwrap();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat["offset"], "-0.1");
        assert_eq!(flat["method"], "\"CrossCorrelation\"");
        assert_eq!(from_flat::<AlignmentResult>(&flat).unwrap(), r);
    }

    #[test]
    fn leak_result_round_trip() {
        let mut per_method = BTreeMap::new();
        per_method.insert(
            LeakMethod::Linear,
            MethodEstimate {
                rate: 3.000000000000001e-6,
                quality: 0.9999999999999998,
            },
        );
        per_method.insert(
            LeakMethod::Exponential,
            MethodEstimate {
                rate: 2.9e-6,
                quality: 0.0,
            },
        );
        let r = LeakRateResult {
            per_method,
            reconciled_rate: 3.000000000000001e-6,
            severity: LeakSeverity::Minor,
            n_points: 200,
        };
        let flat = to_flat(&r).unwrap();
        assert!(flat.contains_key("per_method.linear.rate"));
        assert_eq!(from_flat::<LeakRateResult>(&flat).unwrap(), r);
    }

    #[test]
    fn escaped_keys_empty_containers_and_long_arrays() {
        let mut statistics = BTreeMap::new();
        statistics.insert("odd.key#1\\x".to_string(), 1.5);
        let r = ComparisonResult {
            kind: ComparisonKind::Difference,
            statistics,
            insights: Vec::new(),
            alignment: None,
            grid: (0..12).map(|i| i as f64 * 0.1).collect(),
            difference: vec![0.0; 12],
        };
        let flat = to_flat(&r).unwrap();
        assert_eq!(flat["statistics.odd\\.key\\#1\\\\x"], "1.5");
        assert_eq!(flat["insights"], "[]");
        assert_eq!(flat["alignment"], "null");
        assert!(flat.contains_key("grid.#11"));
        assert_eq!(from_flat::<ComparisonResult>(&flat).unwrap(), r);
    }

    #[test]
    fn path_parsing() {
        assert_eq!(
            parse_path("a.#3.b\\.c").unwrap(),
            vec![
                Segment::Key("a".into()),
                Segment::Index(3),
                Segment::Key("b.c".into())
            ]
        );
        assert!(parse_path("a.#x").is_err());
        assert!(parse_path("a\\").is_err());
    }

    #[test]
    fn malformed_flat_form_is_rejected() {
        let mut flat = FlatRecord::new();
        flat.insert("offset".into(), "not json".into());
        assert!(from_flat::<AlignmentResult>(&flat).is_err());

        let mut flat = FlatRecord::new();
        flat.insert("a".into(), "1".into());
        flat.insert("a.b".into(), "2".into());
        assert!(from_flat::<serde_json::Value>(&flat).is_err());
    }
}
