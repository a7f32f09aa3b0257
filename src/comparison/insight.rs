//! Readable findings from comparison statistics.
//!
//! A fixed table of rules: each one inspects the statistics map and, when it
//! applies, renders one sentence. Rules run in table order, so the output is
//! deterministic for a given map.

use std::collections::BTreeMap;

type Stats = BTreeMap<String, f64>;

struct Rule {
    render: fn(&Stats, f64) -> Option<String>,
}

const RULES: &[Rule] = &[
    Rule { render: mean_difference },
    Rule { render: correlation_strength },
    Rule { render: distribution_shape },
    Rule { render: relative_stability },
    Rule { render: base_pressure_gap },
];

/// Applies every rule to `stats` at significance level `alpha`.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use u_vacuum::comparison::generate_insights;
///
/// let stats = BTreeMap::from([
///     ("mean_diff".to_string(), 2.5),
///     ("p_value".to_string(), 0.001),
/// ]);
/// let insights = generate_insights(&stats, 0.05);
/// assert_eq!(insights, vec!["Series A shows significantly higher values than Series B"]);
/// ```
pub fn generate_insights(stats: &BTreeMap<String, f64>, alpha: f64) -> Vec<String> {
    RULES.iter().filter_map(|rule| (rule.render)(stats, alpha)).collect()
}

fn get(stats: &Stats, key: &str) -> Option<f64> {
    stats.get(key).copied().filter(|v| v.is_finite())
}

fn mean_difference(stats: &Stats, alpha: f64) -> Option<String> {
    let diff = get(stats, "mean_diff")?;
    let p = get(stats, "p_value")?;
    let text = if p >= alpha {
        "No statistically significant difference between the series means"
    } else if diff > 0.0 {
        "Series A shows significantly higher values than Series B"
    } else if diff < 0.0 {
        "Series A shows significantly lower values than Series B"
    } else {
        return None;
    };
    Some(text.to_string())
}

fn correlation_strength(stats: &Stats, alpha: f64) -> Option<String> {
    let r = get(stats, "correlation_r")?;
    let direction = if r >= 0.0 { "positive" } else { "negative" };
    let strength = match r.abs() {
        a if a >= 0.8 => "Strong",
        a if a >= 0.5 => "Moderate",
        a if a >= 0.3 => "Weak",
        _ => return Some(format!("No meaningful linear relationship (r = {r:.2})")),
    };
    let qualifier = match get(stats, "p_value") {
        Some(p) if p >= alpha => ", not statistically significant",
        _ => "",
    };
    Some(format!("{strength} {direction} correlation (r = {r:.2}){qualifier}"))
}

fn distribution_shape(stats: &Stats, alpha: f64) -> Option<String> {
    let p = get(stats, "ks_p_value")?;
    let text = if p < alpha {
        "Value distributions differ significantly (Kolmogorov-Smirnov)"
    } else {
        "Value distributions are consistent (Kolmogorov-Smirnov)"
    };
    Some(text.to_string())
}

fn relative_stability(stats: &Stats, _alpha: f64) -> Option<String> {
    let a = get(stats, "stability_a")?;
    let b = get(stats, "stability_b")?;
    if a < 0.5 * b {
        Some("Series A is markedly more stable than Series B".to_string())
    } else if b < 0.5 * a {
        Some("Series B is markedly more stable than Series A".to_string())
    } else {
        None
    }
}

fn base_pressure_gap(stats: &Stats, _alpha: f64) -> Option<String> {
    let a = get(stats, "base_a").filter(|v| *v > 0.0)?;
    let b = get(stats, "base_b").filter(|v| *v > 0.0)?;
    if a / b >= 10.0 {
        Some(format!("Series B reaches a {:.1}x lower base pressure than Series A", a / b))
    } else if b / a >= 10.0 {
        Some(format!("Series A reaches a {:.1}x lower base pressure than Series B", b / a))
    } else {
        None
    }
}
