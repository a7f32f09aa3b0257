//! End-to-end checks through the public API.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use u_vacuum::comparison::{
    align, compare, AlignConfig, AlignMethod, AlignStrategy, AlignmentResult, CompareConfig, ComparisonKind,
};
use u_vacuum::detection::{detect_spikes, Severity, SpikeConfig};
use u_vacuum::persist::{from_flat, to_flat};
use u_vacuum::vacuum::{
    analyze_pump_down, detect_pump_down_cycles, estimate_leak_rate, estimate_outgassing, noise_metrics, CycleConfig,
    LeakConfig, LeakMethod, MethodSelection, NoiseConfig, PerformanceGrader, PumpDownConfig,
};
use u_vacuum::{AnalysisConfig, TimeSeries};

fn sampled(n: usize, dt: f64, start: f64, f: impl Fn(f64) -> f64) -> TimeSeries {
    let time: Vec<f64> = (0..n).map(|i| start + i as f64 * dt).collect();
    let value = time.iter().map(|&t| f(t)).collect();
    TimeSeries::new(time, value).expect("valid series")
}

fn pump_down_curve(t: f64) -> f64 {
    (1013.25 - 0.5) * (-t / 40.0).exp() + 0.5
}

fn bump(t: f64) -> f64 {
    1.0 + 4.0 * (-((t - 70.0) / 9.0).powi(2)).exp() + 0.5 * (t / 23.0).sin()
}

fn assert_round_trip<T>(record: &T)
where
    T: Serialize + DeserializeOwned + PartialEq + Debug,
{
    let flat = to_flat(record).expect("flatten");
    let back: T = from_flat(&flat).expect("rebuild");
    assert_eq!(&back, record);
}

#[test]
fn pump_down_recovers_known_decay() {
    let s = sampled(301, 2.0, 0.0, pump_down_curve);
    let r = analyze_pump_down(&s, &PumpDownConfig::default()).unwrap();
    assert!(r.converged);
    assert!(r.fit_quality > 0.95);
    assert!((r.time_constant - 40.0).abs() / 40.0 < 0.05, "tau = {}", r.time_constant);
    assert!((r.ultimate_value - 0.5).abs() / 0.5 < 0.05, "pu = {}", r.ultimate_value);
    assert_eq!(r.total_time, 600.0);
}

#[test]
fn single_spike_is_found_at_its_index() {
    let baseline = |t: f64| 1e-6 * (1.0 + 0.05 * (t / 10.0).sin());
    let smooth = sampled(200, 1.0, 0.0, baseline);
    let mut value = smooth.values().to_vec();
    value[120] = 50.0 * baseline(120.0);
    let s = TimeSeries::new(smooth.times().to_vec(), value).unwrap();

    let events = detect_spikes(&s, &SpikeConfig::default()).unwrap();
    assert_eq!(events.len(), 1, "{events:?}");
    assert_eq!(events[0].index, 120);
    assert!(matches!(events[0].severity, Severity::High | Severity::Critical));
}

#[test]
fn identical_series_align_at_zero() {
    let a = sampled(200, 1.0, 0.0, bump);
    let r = align(&a, &a, &AlignConfig::with_method(AlignStrategy::CrossCorrelation)).unwrap();
    assert_eq!(r.offset, 0.0);
    assert!((r.confidence - 1.0).abs() < 1e-9);

    let b = sampled(200, 1.0, 42.0, bump);
    let st = align(&a, &b, &AlignConfig::with_method(AlignStrategy::StartTime)).unwrap();
    assert_eq!(st.method, AlignMethod::StartTime);
    assert_eq!(st.offset, b.times()[0] - a.times()[0]);
}

#[test]
fn shifted_series_offset_is_recovered_within_one_step() {
    let dt = 0.5;
    let a = sampled(400, dt, 0.0, bump);
    let b = sampled(400, dt, 7.5, |t| bump(t - 7.5));
    let r = align(&a, &b, &AlignConfig::with_method(AlignStrategy::CrossCorrelation)).unwrap();
    assert!((r.offset - 7.5).abs() <= dt, "offset = {}", r.offset);
    assert!(r.confidence > 0.99);
}

#[test]
fn comparison_is_symmetric() {
    let cfg = CompareConfig::default();
    let a = sampled(120, 1.0, 0.0, bump);
    let b = sampled(120, 1.0, 10.0, |t| 0.8 * bump(t) + 0.3 * (t / 5.0).cos());

    let ab = compare(&a, &b, ComparisonKind::Correlation, None, &cfg).unwrap();
    let ba = compare(&b, &a, ComparisonKind::Correlation, None, &cfg).unwrap();
    let (r_ab, r_ba) = (ab.stat("correlation_r").unwrap(), ba.stat("correlation_r").unwrap());
    assert!((r_ab.abs() - r_ba.abs()).abs() < 1e-12);
    assert!((ab.stat("p_value").unwrap() - ba.stat("p_value").unwrap()).abs() < 1e-12);

    let zero = AlignmentResult {
        offset: 0.0,
        method: AlignMethod::Manual,
        confidence: 1.0,
    };
    let ab = compare(&a, &b, ComparisonKind::Difference, Some(&zero), &cfg).unwrap();
    let ba = compare(&b, &a, ComparisonKind::Difference, Some(&zero), &cfg).unwrap();
    for key in ["mean_diff", "max_diff"] {
        let (x, y) = (ab.stat(key).unwrap(), ba.stat(key).unwrap());
        assert!((x + y).abs() < 1e-12, "{key}: {x} vs {y}");
    }
}

#[test]
fn linear_leak_matches_slope() {
    let s = sampled(120, 5.0, 1000.0, |t| 2e-4 + 4e-7 * (t - 1000.0));
    let cfg = LeakConfig {
        method: MethodSelection::Linear,
        ..LeakConfig::default()
    };
    let r = estimate_leak_rate(&s, &cfg).unwrap();
    assert!((r.per_method[&LeakMethod::Linear].quality - 1.0).abs() < 1e-9);
    assert!((r.reconciled_rate - 4e-7).abs() / 4e-7 < 0.01);
}

#[test]
fn assessment_and_results_survive_the_flat_form() {
    let pump = sampled(301, 2.0, 0.0, pump_down_curve);
    let rise = sampled(100, 1.0, 0.0, |t| 5e-4 + 3e-6 * t);
    let config = AnalysisConfig {
        leak: LeakConfig {
            volume: Some(50.0),
            ..LeakConfig::default()
        },
        ..AnalysisConfig::default()
    };

    let assessment = PerformanceGrader::new().assess(&pump, &rise, &config).unwrap();
    assert!(assessment.spikes.is_empty());
    assert!(assessment.leak.per_method.contains_key(&LeakMethod::Conductance));
    assert!(assessment.grade.factors.len() >= 3);
    assert_round_trip(&assessment);
    assert_round_trip(&assessment.grade);
    assert_round_trip(&assessment.pump_down);
    assert_round_trip(&assessment.leak);
    assert_round_trip(&assessment.base_pressure);
    assert_round_trip(&pump);

    let outgassing = estimate_outgassing(&assessment.leak, 2500.0, 50.0).unwrap();
    assert_round_trip(&outgassing);

    let mut value = pump.values().to_vec();
    value[150] *= 1000.0;
    let spiky = TimeSeries::new(pump.times().to_vec(), value).unwrap();
    let events = detect_spikes(&spiky, &SpikeConfig::default()).unwrap();
    assert!(!events.is_empty());
    assert_round_trip(&events);

    let a = sampled(200, 1.0, 0.0, bump);
    let b = sampled(200, 1.0, 12.0, |t| bump(t - 12.0));
    let alignment = align(&a, &b, &AlignConfig::default()).unwrap();
    assert_round_trip(&alignment);
    let diff = compare(&a, &b, ComparisonKind::Difference, Some(&alignment), &CompareConfig::default()).unwrap();
    assert_round_trip(&diff);
    let summary = compare(&a, &b, ComparisonKind::StatisticalSummary, None, &CompareConfig::default()).unwrap();
    assert_round_trip(&summary);
}

#[test]
fn gauge_ripple_is_measured_on_a_pump_down_tail() {
    // 0.2 Hz ripple on a slowly settling floor, sampled at 2 Hz
    let ripple = 2e-8;
    let s = sampled(400, 0.5, 0.0, |t| {
        1e-6 + 5e-7 * (-t / 400.0).exp() + ripple * (2.0 * std::f64::consts::PI * 0.2 * t).sin()
    });
    let m = noise_metrics(&s, &NoiseConfig::default()).unwrap();
    assert!((m.dominant_frequency - 0.2).abs() < 1e-9, "f = {}", m.dominant_frequency);
    let rms = ripple / 2.0_f64.sqrt();
    assert!((m.noise_rms - rms).abs() / rms < 0.05, "rms = {}", m.noise_rms);
    assert!(m.snr_db.unwrap() > 30.0);
    assert_round_trip(&m);
}

#[test]
fn repeated_pump_downs_are_segmented() {
    // two evacuations separated by a vent back to atmosphere
    let curve = |t: f64| 1000.0 * (-t / 15.0).exp() + 1e-4;
    let mut time = Vec::new();
    let mut value = Vec::new();
    for cycle in 0..2 {
        for i in 0..150 {
            time.push((cycle * 200 + i) as f64);
            value.push(curve(i as f64));
        }
        for i in 150..200 {
            time.push((cycle * 200 + i) as f64);
            value.push(1000.0);
        }
    }
    let s = TimeSeries::new(time, value).unwrap();
    let cycles = detect_pump_down_cycles(&s, &CycleConfig::default()).unwrap();
    assert_eq!(cycles.len(), 2, "{cycles:?}");
    assert!(cycles.iter().all(|c| c.decades > 4.0));
    assert_round_trip(&cycles);
}
