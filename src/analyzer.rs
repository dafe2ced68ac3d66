//! Window Analyzer: rule-based anomaly detection over a window of motion
//! samples.
//!
//! The caller picks the window (e.g. "last five minutes"); every rule looks at
//! the whole slice it is given. Four independent rules each add a fixed weight
//! to the score:
//!
//! | rule                     | fires when                              | weight |
//! |--------------------------|-----------------------------------------|--------|
//! | unusual speed-up         | `max speed > max(8, 3 × mean speed)`    | 0.35   |
//! | abrupt elevation drop    | `min vertical rate < -2.5 m/s`          | 0.35   |
//! | idleness after movement  | `mean > 0.8 km/h` and idle `> 180 s`    | 0.2    |
//! | erratic heading          | bearing variance `> 8000 deg²`          | 0.1    |
//!
//! The verdict triggers once the score reaches the configured threshold and
//! reports the highest-priority fired rule as its type.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::error::AnalyzeError;
use crate::models::{AnomalyType, AnomalyVerdict, MotionSample, NormalizedSample, VerdictDetails};

/// Absolute speed floor for the speed-up rule, km/h.
pub const SPEED_FLOOR_KMH: f64 = 8.0;
/// Multiple of the window mean that counts as a spike.
pub const SPEED_SPIKE_FACTOR: f64 = 3.0;
/// Vertical rate below which the descent looks like a fall, m/s.
pub const DROP_RATE_MPS: f64 = -2.5;
/// Window mean speed above which the hiker counts as having moved, km/h.
pub const MOVED_MEAN_KMH: f64 = 0.8;
/// Per-sample speed above which a sample counts as moving, km/h.
pub const MOVING_SAMPLE_KMH: f64 = 0.5;
pub const IDLE_LIMIT_SECS: f64 = 180.0;
pub const HEADING_VARIANCE_LIMIT: f64 = 8000.0;
/// Default score needed to trigger.
pub const DEFAULT_TRIGGER_THRESHOLD: f64 = 0.5;

// ---

/// Rule evaluator with a tunable trigger threshold.
///
/// Holds no state between calls, so one instance can be shared across
/// requests.
#[derive(Debug, Clone, Copy)]
pub struct WindowAnalyzer {
    trigger_threshold: f64,
}

impl Default for WindowAnalyzer {
    fn default() -> Self {
        Self {
            trigger_threshold: DEFAULT_TRIGGER_THRESHOLD,
        }
    }
}

impl WindowAnalyzer {
    pub fn new(trigger_threshold: f64) -> Self {
        Self { trigger_threshold }
    }

    pub fn trigger_threshold(&self) -> f64 {
        self.trigger_threshold
    }

    /// Validate, normalize and evaluate a raw window.
    pub fn analyze(&self, samples: &[MotionSample]) -> Result<AnomalyVerdict, AnalyzeError> {
        // ---
        let normalized = normalize(samples)?;
        Ok(self.evaluate(&normalized))
    }

    /// Evaluate an already normalized window. Never fails.
    pub fn evaluate(&self, samples: &[NormalizedSample]) -> AnomalyVerdict {
        // ---
        let Some(stats) = WindowStats::compute(samples) else {
            return AnomalyVerdict::no_data();
        };

        let fired = stats.fired_rules();
        let score: f64 = fired.iter().map(|rule| rule.weight()).sum();

        tracing::trace!(
            samples = samples.len(),
            score,
            ?fired,
            mean = stats.mean_speed,
            max = stats.max_speed,
            idle = stats.idle_secs,
            heading_var = stats.heading_variance,
            "evaluated window"
        );

        if score >= self.trigger_threshold {
            AnomalyVerdict {
                triggered: true,
                kind: fired.first().copied(),
                score: Some(score),
                details: Some(stats.details()),
                fired,
            }
        } else {
            AnomalyVerdict {
                triggered: false,
                kind: None,
                score: Some(score),
                details: None,
                fired,
            }
        }
    }
}

/// Analyze a window with the default threshold.
pub fn analyze(samples: &[MotionSample]) -> Result<AnomalyVerdict, AnalyzeError> {
    WindowAnalyzer::default().analyze(samples)
}

// ---

/// Apply field defaults and parse timestamps.
///
/// Speed, vertical rate and bearing default to 0. A missing or unparseable
/// timestamp rejects the window, since duration math depends on it.
pub fn normalize(samples: &[MotionSample]) -> Result<Vec<NormalizedSample>, AnalyzeError> {
    // ---
    samples
        .iter()
        .enumerate()
        .map(|(index, sample)| {
            let ts = parse_timestamp(index, sample.ts.as_ref())?;
            Ok(NormalizedSample {
                ts,
                speed_kmh: sample.speed_kmh.unwrap_or(0.0),
                vert_rate_mps: sample.vert_rate_mps.unwrap_or(0.0),
                bearing_deg: sample.bearing_deg.unwrap_or(0.0),
            })
        })
        .collect()
}

fn parse_timestamp(
    index: usize,
    raw: Option<&serde_json::Value>,
) -> Result<DateTime<Utc>, AnalyzeError> {
    // ---
    match raw {
        None | Some(serde_json::Value::Null) => Err(AnalyzeError::MissingTimestamp { index }),
        Some(value) => parse_instant(value).ok_or_else(|| AnalyzeError::InvalidTimestamp {
            index,
            value: value.to_string(),
        }),
    }
}

/// Read a wire timestamp: RFC 3339, zone-less ISO 8601 (as UTC), or epoch
/// milliseconds.
pub fn parse_instant(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    // ---
    use serde_json::Value;

    match value {
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))?;
            Utc.timestamp_millis_opt(millis).single()
        }
        Value::String(text) => parse_text_timestamp(text.trim()),
        _ => None,
    }
}

fn parse_text_timestamp(text: &str) -> Option<DateTime<Utc>> {
    // ---
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }

    // Zone-less ISO 8601 is read as UTC.
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ---

/// Window-level metrics the rules are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean_speed: f64,
    pub max_speed: f64,
    pub min_vert_rate: f64,
    pub idle_secs: f64,
    pub heading_variance: f64,
}

impl WindowStats {
    /// Returns `None` for an empty window.
    pub fn compute(samples: &[NormalizedSample]) -> Option<Self> {
        // ---
        if samples.is_empty() {
            return None;
        }

        let speeds: Vec<f64> = samples.iter().map(|s| s.speed_kmh).collect();
        let bearings: Vec<f64> = samples.iter().map(|s| s.bearing_deg).collect();

        Some(WindowStats {
            mean_speed: mean(&speeds),
            max_speed: speeds.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min_vert_rate: samples
                .iter()
                .map(|s| s.vert_rate_mps)
                .fold(f64::INFINITY, f64::min),
            idle_secs: idle_duration_secs(samples),
            heading_variance: population_variance(&bearings),
        })
    }

    pub fn speed_spike(&self) -> bool {
        self.max_speed > SPEED_FLOOR_KMH.max(SPEED_SPIKE_FACTOR * self.mean_speed)
    }

    pub fn elevation_drop(&self) -> bool {
        self.min_vert_rate < DROP_RATE_MPS
    }

    pub fn idle_after_movement(&self) -> bool {
        self.mean_speed > MOVED_MEAN_KMH && self.idle_secs > IDLE_LIMIT_SECS
    }

    pub fn erratic_heading(&self) -> bool {
        self.heading_variance > HEADING_VARIANCE_LIMIT
    }

    /// Fired rules in priority order.
    pub fn fired_rules(&self) -> Vec<AnomalyType> {
        // ---
        [
            (AnomalyType::UnusualSpeed, self.speed_spike()),
            (AnomalyType::ElevationDrop, self.elevation_drop()),
            (AnomalyType::ExtendedIdleness, self.idle_after_movement()),
            (AnomalyType::ErraticHeading, self.erratic_heading()),
        ]
        .into_iter()
        .filter_map(|(rule, hit)| hit.then_some(rule))
        .collect()
    }

    pub fn details(&self) -> VerdictDetails {
        VerdictDetails {
            mean: self.mean_speed,
            max_speed: self.max_speed,
            idle_dur_sec: self.idle_secs,
            heading_var: self.heading_variance,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_variance(values: &[f64]) -> f64 {
    // ---
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

/// Seconds between the last sample and the last moving sample.
///
/// Zero when nothing moved, or when the tail sample is itself moving. Clamped
/// at zero so out-of-order timestamps never produce a negative duration.
pub fn idle_duration_secs(samples: &[NormalizedSample]) -> f64 {
    // ---
    let Some(last) = samples.last() else {
        return 0.0;
    };
    let Some(last_move) = samples
        .iter()
        .rev()
        .find(|s| s.speed_kmh > MOVING_SAMPLE_KMH)
    else {
        return 0.0;
    };

    let millis = (last.ts - last_move.ts).num_milliseconds();
    (millis as f64 / 1000.0).max(0.0)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const EPS: f64 = 1e-9;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    fn sample(offset_secs: i64, speed: f64, vert: f64, bearing: f64) -> NormalizedSample {
        NormalizedSample {
            ts: t0() + Duration::seconds(offset_secs),
            speed_kmh: speed,
            vert_rate_mps: vert,
            bearing_deg: bearing,
        }
    }

    fn raw(offset_secs: i64) -> MotionSample {
        MotionSample {
            ts: Some(json!((t0() + Duration::seconds(offset_secs)).to_rfc3339())),
            ..Default::default()
        }
    }

    /// A steady hiker: 3 km/h due east every 10 seconds.
    fn steady(n: i64) -> Vec<NormalizedSample> {
        (0..n).map(|i| sample(i * 10, 3.0, 0.0, 90.0)).collect()
    }

    #[test]
    fn test_empty_window_has_no_score() {
        // ---
        let verdict = analyze(&[]).unwrap();
        assert_eq!(verdict, AnomalyVerdict::no_data());
        assert!(verdict.score.is_none());
    }

    #[test]
    fn test_steady_hike_is_quiet() {
        // ---
        // Two minutes at 3 km/h heading 90.
        let verdict = WindowAnalyzer::default().evaluate(&steady(13));

        assert!(!verdict.triggered);
        assert_eq!(verdict.score, Some(0.0));
        assert!(verdict.kind.is_none());
        assert!(verdict.details.is_none());
        assert!(verdict.fired.is_empty());
    }

    #[test]
    fn test_speed_spike_fires_alone() {
        // ---
        let mut window = steady(9);
        window.push(sample(90, 30.0, 0.0, 90.0));

        let stats = WindowStats::compute(&window).unwrap();
        assert!((stats.mean_speed - 5.7).abs() < EPS);
        assert_eq!(stats.max_speed, 30.0);
        assert!(stats.speed_spike());

        let verdict = WindowAnalyzer::default().evaluate(&window);
        assert_eq!(verdict.fired, vec![AnomalyType::UnusualSpeed]);
        assert!((verdict.score.unwrap() - 0.35).abs() < EPS);
        assert!(!verdict.triggered, "0.35 is below the default threshold");

        let verdict = WindowAnalyzer::new(0.35).evaluate(&window);
        assert!(verdict.triggered);
        assert_eq!(verdict.kind, Some(AnomalyType::UnusualSpeed));
    }

    #[test]
    fn test_speed_floor_applies_to_slow_windows() {
        // ---
        // 7 km/h is far above 3x a near-zero mean but still below the floor.
        let mut window: Vec<_> = (0..9).map(|i| sample(i * 10, 0.0, 0.0, 0.0)).collect();
        window.push(sample(90, 7.0, 0.0, 0.0));
        assert!(!WindowStats::compute(&window).unwrap().speed_spike());

        window.push(sample(100, 8.5, 0.0, 0.0));
        assert!(WindowStats::compute(&window).unwrap().speed_spike());
    }

    #[test]
    fn test_elevation_drop() {
        // ---
        let window: Vec<_> = [-1.0, -1.0, -3.0, -1.0]
            .iter()
            .enumerate()
            .map(|(i, v)| sample(i as i64 * 5, 0.0, *v, 0.0))
            .collect();

        let verdict = WindowAnalyzer::default().evaluate(&window);
        assert_eq!(verdict.fired, vec![AnomalyType::ElevationDrop]);
        assert!((verdict.score.unwrap() - 0.35).abs() < EPS);
        assert!(!verdict.triggered);

        let verdict = WindowAnalyzer::new(0.35).evaluate(&window);
        assert!(verdict.triggered);
        assert_eq!(verdict.kind, Some(AnomalyType::ElevationDrop));
    }

    #[test]
    fn test_drop_boundary_is_strict() {
        // ---
        let window = vec![sample(0, 0.0, -2.5, 0.0)];
        assert!(!WindowStats::compute(&window).unwrap().elevation_drop());
    }

    #[test]
    fn test_idle_after_movement() {
        // ---
        // Ten samples over ten minutes: moving for five, then stopped. The tail
        // sample lands 200 s after the last moving one.
        let mut window: Vec<_> = (0..5).map(|i| sample(i * 60, 5.0, 0.0, 0.0)).collect();
        window.extend((0..4).map(|i| sample(300 + i * 40, 0.0, 0.0, 0.0)));
        window.push(sample(440, 0.0, 0.0, 0.0));

        let stats = WindowStats::compute(&window).unwrap();
        assert!((stats.mean_speed - 2.5).abs() < EPS);
        assert_eq!(stats.idle_secs, 200.0);
        assert!(stats.idle_after_movement());
        assert!(!stats.speed_spike());

        let verdict = WindowAnalyzer::default().evaluate(&window);
        assert_eq!(verdict.fired, vec![AnomalyType::ExtendedIdleness]);
        assert!((verdict.score.unwrap() - 0.2).abs() < EPS);

        let verdict = WindowAnalyzer::new(0.2).evaluate(&window);
        assert!(verdict.triggered);
        assert_eq!(verdict.kind, Some(AnomalyType::ExtendedIdleness));
        assert_eq!(verdict.details.unwrap().idle_dur_sec, 200.0);
    }

    #[test]
    fn test_idle_needs_prior_movement() {
        // ---
        // A hiker who never moved much has no idleness signal.
        let mut window = vec![sample(0, 1.0, 0.0, 0.0)];
        window.extend((1..10).map(|i| sample(i * 60, 0.0, 0.0, 0.0)));

        let stats = WindowStats::compute(&window).unwrap();
        assert_eq!(stats.idle_secs, 540.0);
        assert!(!stats.idle_after_movement());
    }

    #[test]
    fn test_idle_zero_when_tail_is_moving_or_nothing_moves() {
        // ---
        assert_eq!(idle_duration_secs(&steady(5)), 0.0);

        let still: Vec<_> = (0..5).map(|i| sample(i * 60, 0.2, 0.0, 0.0)).collect();
        assert_eq!(idle_duration_secs(&still), 0.0);
    }

    #[test]
    fn test_idle_clamped_for_backwards_clock() {
        // ---
        let window = vec![sample(100, 4.0, 0.0, 0.0), sample(0, 0.0, 0.0, 0.0)];
        assert_eq!(idle_duration_secs(&window), 0.0);
    }

    #[test]
    fn test_duplicate_timestamps_tolerated() {
        // ---
        let window = vec![sample(0, 4.0, 0.0, 0.0), sample(0, 0.0, 0.0, 0.0)];
        assert_eq!(idle_duration_secs(&window), 0.0);
        assert!(WindowStats::compute(&window).is_some());
    }

    #[test]
    fn test_erratic_heading() {
        // ---
        // Alternating 0 and 180 gives variance 8100.
        let window: Vec<_> = (0..10)
            .map(|i| sample(i * 10, 3.0, 0.0, if i % 2 == 0 { 0.0 } else { 180.0 }))
            .collect();

        let stats = WindowStats::compute(&window).unwrap();
        assert!((stats.heading_variance - 8100.0).abs() < EPS);

        let verdict = WindowAnalyzer::default().evaluate(&window);
        assert_eq!(verdict.fired, vec![AnomalyType::ErraticHeading]);
        assert!(!verdict.triggered);
    }

    #[test]
    fn test_combined_rules_trigger_with_priority_label() {
        // ---
        let mut window = steady(9);
        window.push(sample(90, 30.0, -4.0, 90.0));

        let verdict = WindowAnalyzer::default().evaluate(&window);
        assert!(verdict.triggered);
        assert_eq!(verdict.kind, Some(AnomalyType::UnusualSpeed));
        assert!((verdict.score.unwrap() - 0.7).abs() < EPS);
        assert_eq!(
            verdict.fired,
            vec![AnomalyType::UnusualSpeed, AnomalyType::ElevationDrop]
        );

        let details = verdict.details.unwrap();
        assert_eq!(details.max_speed, 30.0);
        assert_eq!(details.idle_dur_sec, 0.0);
        assert_eq!(details.heading_var, 0.0);
    }

    #[test]
    fn test_drop_with_idleness_reports_drop() {
        // ---
        let mut window: Vec<_> = (0..5).map(|i| sample(i * 60, 5.0, 0.0, 0.0)).collect();
        window.push(sample(300, 0.0, -6.0, 0.0));
        window.push(sample(500, 0.0, 0.0, 0.0));

        let verdict = WindowAnalyzer::default().evaluate(&window);
        assert!(verdict.triggered);
        assert_eq!(verdict.kind, Some(AnomalyType::ElevationDrop));
        assert!((verdict.score.unwrap() - 0.55).abs() < EPS);
    }

    #[test]
    fn test_all_rules_score_one() {
        // ---
        let mut window: Vec<_> = (0..6)
            .map(|i| sample(i * 60, 4.0, 0.0, if i % 2 == 0 { 0.0 } else { 200.0 }))
            .collect();
        window.push(sample(360, 40.0, -5.0, 350.0));
        window.push(sample(600, 0.0, 0.0, 10.0));

        let verdict = WindowAnalyzer::default().evaluate(&window);
        assert_eq!(verdict.fired.len(), 4);
        assert!((verdict.score.unwrap() - 1.0).abs() < EPS);
        assert_eq!(verdict.kind, Some(AnomalyType::UnusualSpeed));
    }

    #[test]
    fn test_single_sample_window() {
        // ---
        // mean == max, so the spike rule cannot fire; only a drop can.
        let fast = WindowStats::compute(&[sample(0, 12.0, 0.0, 45.0)]).unwrap();
        assert_eq!(fast.heading_variance, 0.0);
        assert_eq!(fast.idle_secs, 0.0);
        assert_eq!(fast.mean_speed, fast.max_speed);
        assert!(fast.fired_rules().is_empty());

        let falling = WindowStats::compute(&[sample(0, 0.0, -3.0, 45.0)]).unwrap();
        assert_eq!(falling.fired_rules(), vec![AnomalyType::ElevationDrop]);
    }

    #[test]
    fn test_adding_a_drop_sample_raises_score() {
        // ---
        let windows = vec![
            steady(6),
            vec![sample(0, 0.0, 0.0, 0.0)],
            {
                let mut w = steady(9);
                w.push(sample(90, 30.0, 0.0, 90.0));
                w
            },
        ];

        for mut window in windows {
            let before = WindowAnalyzer::default().evaluate(&window).score.unwrap();
            let tail = *window.last().unwrap();
            window.push(NormalizedSample {
                ts: tail.ts + Duration::seconds(5),
                vert_rate_mps: -3.0,
                ..tail
            });
            let after = WindowAnalyzer::default().evaluate(&window).score.unwrap();
            assert!(after - before >= 0.35 - EPS, "{before} -> {after}");
        }
    }

    #[test]
    fn test_normalize_defaults_missing_fields() {
        // ---
        let normalized = normalize(&[raw(0)]).unwrap();
        assert_eq!(normalized[0].speed_kmh, 0.0);
        assert_eq!(normalized[0].vert_rate_mps, 0.0);
        assert_eq!(normalized[0].bearing_deg, 0.0);
        assert_eq!(normalized[0].ts, t0());
    }

    #[test]
    fn test_normalize_timestamp_formats() {
        // ---
        let formats = [
            json!("2025-06-01T08:00:00Z"),
            json!("2025-06-01T10:00:00+02:00"),
            json!("2025-06-01T08:00:00.000"),
            json!("2025-06-01 08:00:00"),
            json!(t0().timestamp_millis()),
        ];

        for ts in formats {
            let sample = MotionSample {
                ts: Some(ts.clone()),
                ..Default::default()
            };
            assert_eq!(normalize(&[sample]).unwrap()[0].ts, t0(), "{ts}");
        }
    }

    #[test]
    fn test_missing_timestamp_is_rejected() {
        // ---
        let samples = vec![raw(0), MotionSample::default()];
        assert_eq!(
            analyze(&samples).unwrap_err(),
            AnalyzeError::MissingTimestamp { index: 1 }
        );
    }

    #[test]
    fn test_garbage_timestamp_is_rejected() {
        // ---
        for bad in [json!("yesterday"), json!(true), json!({ "at": 1 })] {
            let sample = MotionSample {
                ts: Some(bad),
                ..Default::default()
            };
            let err = analyze(&[sample]).unwrap_err();
            assert!(matches!(err, AnalyzeError::InvalidTimestamp { index: 0, .. }));
        }
    }

    #[test]
    fn test_analysis_is_idempotent() {
        // ---
        let mut samples: Vec<_> = (0..5).map(raw).collect();
        samples[2].vert_rate_mps = Some(-3.2);
        samples[3].speed_kmh = Some(12.0);

        assert_eq!(analyze(&samples).unwrap(), analyze(&samples).unwrap());
    }
}
