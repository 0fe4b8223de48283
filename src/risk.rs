//! Condensation risk over a telemetry window.
//!
//! For each reading the condensation margin is
//! `(airTempC - assumedLeafAirDeltaC) - dewPointC`: how far the assumed leaf
//! surface sits above the dew point. A margin at or below zero means
//! condensation is likely; at or below the threshold counts as time at risk.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{parse_instant, TelemetryPoint};
use crate::psychro::dew_point_c;
use crate::recommendations::{recommendations_for, Recommendation};

/// Default margin threshold (°C) for banding and time at risk.
pub const DEFAULT_MARGIN_THRESHOLD_C: f64 = 0.5;

/// A single gap between readings never contributes more than this.
pub const MAX_INTERVAL_MINUTES: f64 = 120.0;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    /// `high` when the worst margin is at or below zero, `medium` when it is
    /// at or below the threshold, `low` otherwise.
    pub fn classify(min_margin_c: f64, margin_c_threshold: f64) -> Self {
        if min_margin_c <= 0.0 {
            RiskBand::High
        } else if min_margin_c <= margin_c_threshold {
            RiskBand::Medium
        } else {
            RiskBand::Low
        }
    }
}

/// One reading as fed to the engine. Nothing here is trusted yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSample {
    pub ts: String,
    pub air_temp_c: Option<f64>,
    pub rh: Option<f64>,
    #[serde(default)]
    pub dew_point_c: Option<f64>,
}

impl RiskSample {
    /// Decode one untyped sample; `None` when its shape is unreadable.
    pub fn from_row(row: &Value) -> Option<Self> {
        serde_json::from_value(row.clone()).ok()
    }
}

impl From<&TelemetryPoint> for RiskSample {
    fn from(point: &TelemetryPoint) -> Self {
        RiskSample {
            ts: point.ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            air_temp_c: Some(point.air_temp_c),
            rh: Some(point.rh),
            dew_point_c: point.dew_point_c,
        }
    }
}

/// Tunables for [`compute_telemetry_risk_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskParams {
    pub assumed_leaf_air_delta_c: f64,
    pub margin_c_threshold: f64,
    pub max_interval_minutes: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            assumed_leaf_air_delta_c: crate::psychro::delta_f_to_c(1.0),
            margin_c_threshold: DEFAULT_MARGIN_THRESHOLD_C,
            max_interval_minutes: MAX_INTERVAL_MINUTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskExtremes {
    pub min_air_temp_c: f64,
    pub max_rh: f64,
    pub max_dew_point_c: f64,
    pub min_condensation_margin_c: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSummary {
    pub risk_band: RiskBand,
    pub points_analyzed: usize,
    pub extremes: RiskExtremes,
    pub time_at_risk_minutes: u64,
    pub min_margin_at_iso: String,
    pub recommendations: Vec<Recommendation>,
}

/// A reading that survived filtering, with its derived values.
struct Analyzed {
    ts: DateTime<Utc>,
    air_temp_c: f64,
    rh: f64,
    dew_point_c: f64,
    margin_c: f64,
}

/// Condensation margin for one reading.
pub fn condensation_margin_c(
    air_temp_c: f64,
    dew_point_c: f64,
    assumed_leaf_air_delta_c: f64,
) -> f64 {
    (air_temp_c - assumed_leaf_air_delta_c) - dew_point_c
}

/// Risk summary for `points`, or `None` when no usable reading remains.
pub fn compute_telemetry_risk(
    points: &[RiskSample],
    assumed_leaf_air_delta_c: f64,
    margin_c_threshold: f64,
) -> Option<RiskSummary> {
    compute_telemetry_risk_with(
        points,
        &RiskParams {
            assumed_leaf_air_delta_c,
            margin_c_threshold,
            ..RiskParams::default()
        },
    )
}

/// [`compute_telemetry_risk`] with an explicit gap cap.
pub fn compute_telemetry_risk_with(
    points: &[RiskSample],
    params: &RiskParams,
) -> Option<RiskSummary> {
    // ---
    let mut analyzed: Vec<Analyzed> = points
        .iter()
        .filter_map(|p| analyze(p, params.assumed_leaf_air_delta_c))
        .collect();

    if analyzed.is_empty() {
        return None;
    }

    analyzed.sort_by_key(|a| a.ts);

    let first = &analyzed[0];
    let mut min_air_temp_c = first.air_temp_c;
    let mut max_rh = first.rh;
    let mut max_dew_point_c = first.dew_point_c;
    let mut min_margin_c = first.margin_c;
    let mut min_margin_at = first.ts;

    for a in &analyzed[1..] {
        min_air_temp_c = min_air_temp_c.min(a.air_temp_c);
        max_rh = max_rh.max(a.rh);
        max_dew_point_c = max_dew_point_c.max(a.dew_point_c);
        // Strict comparison: the first occurrence of the minimum wins
        if a.margin_c < min_margin_c {
            min_margin_c = a.margin_c;
            min_margin_at = a.ts;
        }
    }

    let cap = if params.max_interval_minutes.is_finite() {
        params.max_interval_minutes.max(0.0)
    } else {
        MAX_INTERVAL_MINUTES
    };

    let mut at_risk_minutes = 0.0;
    for pair in analyzed.windows(2) {
        let (earlier, later) = (&pair[0], &pair[1]);
        let dt_minutes = (later.ts - earlier.ts).num_milliseconds() as f64 / 60_000.0;
        let dt_minutes = dt_minutes.clamp(0.0, cap);
        // Risk state persists from a reading until the next one
        if earlier.margin_c <= params.margin_c_threshold {
            at_risk_minutes += dt_minutes;
        }
    }

    let risk_band = RiskBand::classify(min_margin_c, params.margin_c_threshold);

    // Rounding must not push the total past the span it was measured over
    let span = analyzed[analyzed.len() - 1].ts - analyzed[0].ts;
    let span_minutes = (span.num_milliseconds() as f64 / 60_000.0).floor();
    let time_at_risk_minutes = at_risk_minutes.round().min(span_minutes).max(0.0) as u64;

    tracing::debug!(
        points = analyzed.len(),
        min_margin_c,
        at_risk_minutes,
        ?risk_band,
        "Computed telemetry risk"
    );

    Some(RiskSummary {
        risk_band,
        points_analyzed: analyzed.len(),
        extremes: RiskExtremes {
            min_air_temp_c,
            max_rh,
            max_dew_point_c,
            min_condensation_margin_c: min_margin_c,
        },
        time_at_risk_minutes,
        min_margin_at_iso: min_margin_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        recommendations: recommendations_for(risk_band),
    })
}

/// Parse and derive one sample; `None` drops it from the analysis.
fn analyze(sample: &RiskSample, assumed_leaf_air_delta_c: f64) -> Option<Analyzed> {
    // ---
    let ts = parse_instant(&sample.ts).ok()?;
    let air_temp_c = sample.air_temp_c.filter(|t| t.is_finite())?;
    let rh = sample.rh.filter(|rh| rh.is_finite())?;

    // An upstream dew point is used as-is; derive only when missing
    let dew_point_c = sample
        .dew_point_c
        .unwrap_or_else(|| dew_point_c(air_temp_c, rh));
    if !dew_point_c.is_finite() {
        return None;
    }

    let margin_c = condensation_margin_c(air_temp_c, dew_point_c, assumed_leaf_air_delta_c);
    if !margin_c.is_finite() {
        return None;
    }

    Some(Analyzed {
        ts,
        air_temp_c,
        rh,
        dew_point_c,
        margin_c,
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::psychro::delta_f_to_c;
    use crate::recommendations::RecommendationCode;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 22, 0, 0).unwrap()
    }

    fn create_test_sample(offset_minutes: i64, temp_c: f64, rh: f64) -> RiskSample {
        // ---
        RiskSample {
            ts: (t0() + Duration::minutes(offset_minutes)).to_rfc3339(),
            air_temp_c: Some(temp_c),
            rh: Some(rh),
            dew_point_c: None,
        }
    }

    #[test]
    fn test_empty_input_is_insufficient_data() {
        // ---
        assert!(compute_telemetry_risk(&[], 0.56, 0.5).is_none());
    }

    #[test]
    fn test_only_unusable_samples_is_insufficient_data() {
        // ---
        let samples = vec![
            RiskSample {
                ts: "not a time".into(),
                air_temp_c: Some(20.0),
                rh: Some(50.0),
                dew_point_c: None,
            },
            RiskSample {
                ts: t0().to_rfc3339(),
                air_temp_c: Some(f64::NAN),
                rh: Some(50.0),
                dew_point_c: None,
            },
            RiskSample {
                ts: t0().to_rfc3339(),
                air_temp_c: Some(20.0),
                rh: None,
                dew_point_c: None,
            },
            RiskSample {
                ts: t0().to_rfc3339(),
                air_temp_c: Some(20.0),
                rh: Some(50.0),
                dew_point_c: Some(f64::INFINITY),
            },
        ];
        assert!(compute_telemetry_risk(&samples, 0.56, 0.5).is_none());
    }

    #[test]
    fn test_two_point_night_is_high_risk() {
        // ---
        let samples = vec![
            create_test_sample(0, 18.0, 95.0),
            create_test_sample(60, 16.0, 98.0),
        ];
        let summary = compute_telemetry_risk(&samples, delta_f_to_c(1.0), 0.5).unwrap();

        assert_eq!(summary.risk_band, RiskBand::High);
        assert_eq!(summary.time_at_risk_minutes, 60);
        assert_eq!(summary.points_analyzed, 2);
        assert_eq!(summary.extremes.min_air_temp_c, 16.0);
        assert_eq!(summary.extremes.max_rh, 98.0);
        assert!(summary.extremes.min_condensation_margin_c <= 0.0);
        assert_eq!(
            summary.min_margin_at_iso,
            (t0() + Duration::minutes(60)).to_rfc3339_opts(SecondsFormat::AutoSi, true)
        );
        assert_eq!(
            summary.recommendations.first().map(|r| r.code),
            Some(RecommendationCode::LowerNightRh)
        );
    }

    #[test]
    fn test_dry_room_is_low_risk() {
        // ---
        let samples = vec![
            create_test_sample(0, 24.0, 50.0),
            create_test_sample(30, 22.0, 55.0),
            create_test_sample(60, 21.0, 58.0),
        ];
        let summary = compute_telemetry_risk(&samples, 0.56, 0.5).unwrap();

        assert_eq!(summary.risk_band, RiskBand::Low);
        assert_eq!(summary.time_at_risk_minutes, 0);
        assert_eq!(summary.recommendations.len(), 1);
        assert_eq!(summary.recommendations[0].code, RecommendationCode::Maintain);
    }

    #[test]
    fn test_medium_band_between_zero_and_threshold() {
        // ---
        // Upstream dew point 0.3°C below the leaf temperature
        let sample = RiskSample {
            ts: t0().to_rfc3339(),
            air_temp_c: Some(20.0),
            rh: Some(90.0),
            dew_point_c: Some(19.2),
        };
        let summary = compute_telemetry_risk(&[sample], 0.5, 0.5).unwrap();
        assert_eq!(summary.risk_band, RiskBand::Medium);
        assert!((summary.extremes.min_condensation_margin_c - 0.3).abs() < 1e-9);
        assert_eq!(summary.extremes.max_dew_point_c, 19.2);
    }

    #[test]
    fn test_unsorted_input_is_ordered_before_integration() {
        // ---
        // At risk only in the first half hour
        let samples = vec![
            create_test_sample(60, 24.0, 40.0),
            create_test_sample(0, 16.0, 99.0),
            create_test_sample(30, 24.0, 40.0),
        ];
        let summary = compute_telemetry_risk(&samples, 0.56, 0.5).unwrap();
        assert_eq!(summary.time_at_risk_minutes, 30);
        assert_eq!(summary.min_margin_at_iso, t0().to_rfc3339_opts(SecondsFormat::AutoSi, true));
    }

    #[test]
    fn test_gap_is_capped() {
        // ---
        // Three days between readings, still at most 120 minutes
        let samples = vec![
            create_test_sample(0, 16.0, 99.0),
            create_test_sample(3 * 24 * 60, 16.0, 99.0),
        ];
        let summary = compute_telemetry_risk(&samples, 0.56, 0.5).unwrap();
        assert_eq!(summary.time_at_risk_minutes, 120);

        let params = RiskParams {
            assumed_leaf_air_delta_c: 0.56,
            margin_c_threshold: 0.5,
            max_interval_minutes: 45.0,
        };
        let summary = compute_telemetry_risk_with(&samples, &params).unwrap();
        assert_eq!(summary.time_at_risk_minutes, 45);
    }

    #[test]
    fn test_time_at_risk_rounds_to_minutes() {
        // ---
        // 1 min 40 s at risk inside a ten minute window
        let samples = vec![
            RiskSample {
                ts: "2025-06-01T22:00:00Z".into(),
                air_temp_c: Some(16.0),
                rh: Some(99.0),
                dew_point_c: None,
            },
            RiskSample {
                ts: "2025-06-01T22:01:40Z".into(),
                air_temp_c: Some(24.0),
                rh: Some(40.0),
                dew_point_c: None,
            },
            RiskSample {
                ts: "2025-06-01T22:10:00Z".into(),
                air_temp_c: Some(24.0),
                rh: Some(40.0),
                dew_point_c: None,
            },
        ];
        let summary = compute_telemetry_risk(&samples, 0.56, 0.5).unwrap();
        assert_eq!(summary.time_at_risk_minutes, 2);
    }

    #[test]
    fn test_time_at_risk_never_exceeds_the_window() {
        // ---
        let samples = vec![
            RiskSample {
                ts: "2025-06-01T22:00:00Z".into(),
                air_temp_c: Some(16.0),
                rh: Some(99.0),
                dew_point_c: None,
            },
            RiskSample {
                ts: "2025-06-01T22:00:30Z".into(),
                air_temp_c: Some(16.0),
                rh: Some(99.0),
                dew_point_c: None,
            },
        ];
        let summary = compute_telemetry_risk(&samples, 0.56, 0.5).unwrap();
        assert_eq!(summary.time_at_risk_minutes, 0);
    }

    #[test]
    fn test_unreadable_rows_are_dropped() {
        // ---
        let rows = [
            serde_json::json!({"ts": "2025-06-01T22:00:00Z", "airTempC": 16.0, "rh": 99.0}),
            serde_json::json!({"airTempC": 16.0, "rh": 99.0}),
            serde_json::json!({"ts": "2025-06-01T22:30:00Z", "airTempC": "16", "rh": 99.0}),
        ];
        let samples: Vec<RiskSample> = rows.iter().filter_map(RiskSample::from_row).collect();
        assert_eq!(samples.len(), 1);
        assert_eq!(compute_telemetry_risk(&samples, 0.56, 0.5).unwrap().points_analyzed, 1);
    }

    #[test]
    fn test_first_minimum_wins_ties() {
        // ---
        let samples = vec![
            create_test_sample(0, 16.0, 99.0),
            create_test_sample(10, 16.0, 99.0),
        ];
        let summary = compute_telemetry_risk(&samples, 0.56, 0.5).unwrap();
        assert_eq!(summary.min_margin_at_iso, t0().to_rfc3339_opts(SecondsFormat::AutoSi, true));
    }

    #[test]
    fn test_band_classification_edges() {
        // ---
        assert_eq!(RiskBand::classify(0.0, 0.5), RiskBand::High);
        assert_eq!(RiskBand::classify(-2.0, 0.5), RiskBand::High);
        assert_eq!(RiskBand::classify(0.5, 0.5), RiskBand::Medium);
        assert_eq!(RiskBand::classify(0.51, 0.5), RiskBand::Low);
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        // ---
        let summary = compute_telemetry_risk(&[create_test_sample(0, 20.0, 60.0)], 0.56, 0.5)
            .unwrap();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["riskBand"], "low");
        assert!(json["extremes"]["minCondensationMarginC"].is_number());
        assert_eq!(json["timeAtRiskMinutes"], 0);
        assert!(json["minMarginAtIso"].is_string());
    }

    proptest! {
        #[test]
        fn raising_humidity_never_raises_margin(
            temp_c in -10.0f64..45.0,
            rh in 0.0f64..100.0,
            bump in 0.0f64..30.0,
            delta in 0.0f64..3.0,
        ) {
            let wetter = (rh + bump).min(100.0);
            let base = condensation_margin_c(temp_c, dew_point_c(temp_c, rh), delta);
            let raised = condensation_margin_c(temp_c, dew_point_c(temp_c, wetter), delta);
            prop_assert!(raised <= base + 1e-9);
        }

        #[test]
        fn time_at_risk_bounded_by_window(
            readings in proptest::collection::vec(
                (0i64..10_000, 0.0f64..40.0, 0.0f64..100.0),
                1..40,
            ),
            threshold in 0.0f64..5.0,
        ) {
            let samples: Vec<RiskSample> = readings
                .iter()
                .map(|(minute, t, rh)| create_test_sample(*minute, *t, *rh))
                .collect();
            let summary = compute_telemetry_risk(&samples, 0.56, threshold).unwrap();

            let first = readings.iter().map(|r| r.0).min().unwrap();
            let last = readings.iter().map(|r| r.0).max().unwrap();
            prop_assert!(summary.time_at_risk_minutes <= (last - first) as u64);
            prop_assert_eq!(summary.points_analyzed, samples.len());
        }
    }
}
