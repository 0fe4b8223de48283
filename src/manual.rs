//! Single-sample worst-case estimate for grows with no telemetry yet.
//!
//! The grower reports the lights-off reading and the overnight extremes in
//! °F. The worst case pairs the night's minimum temperature with its maximum
//! humidity; the leaf is assumed to sit `assumedLeafAirDeltaF` below the air.

use serde::{Deserialize, Serialize};

use crate::errors::TelemetryError;
use crate::psychro::{c_to_f, delta_c_to_f, delta_f_to_c, dew_point_c, f_to_c};
use crate::recommendations::{recommendations_with_flags, Recommendation, SituationalFlags};
use crate::risk::{condensation_margin_c, RiskBand};

/// Margin threshold (°C) used by the manual estimate unless overridden.
pub const MANUAL_MARGIN_THRESHOLD_C: f64 = 0.5;

/// Leaf-to-air gap (°F) assumed when the caller gives none.
pub const DEFAULT_LEAF_AIR_DELTA_F: f64 = 1.0;

fn default_leaf_air_delta_f() -> f64 {
    DEFAULT_LEAF_AIR_DELTA_F
}

// ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualEstimateInput {
    pub lights_off_temp_f: f64,
    pub lights_off_rh: f64,
    pub night_min_temp_f: f64,
    pub night_max_rh: f64,
    #[serde(default = "default_leaf_air_delta_f")]
    pub assumed_leaf_air_delta_f: f64,
    #[serde(default)]
    pub margin_c_threshold: Option<f64>,
    #[serde(flatten)]
    pub flags: SituationalFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualEstimate {
    pub dew_point_lights_off_c: f64,
    pub dew_point_lights_off_f: f64,
    pub dew_point_worst_c: f64,
    pub dew_point_worst_f: f64,
    pub night_min_temp_c: f64,
    pub assumed_leaf_air_delta_c: f64,
    pub assumed_leaf_temp_c: f64,
    pub margin_worst_c: f64,
    pub margin_worst_f: f64,
    pub margin_c_threshold: f64,
    pub risk_band: RiskBand,
    pub recommendations: Vec<Recommendation>,
}

fn require_finite(name: &str, value: f64) -> Result<f64, TelemetryError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(TelemetryError::validation(format!("{name} must be a finite number")))
    }
}

fn require_rh(name: &str, value: f64) -> Result<f64, TelemetryError> {
    // ---
    let value = require_finite(name, value)?;
    if !(0.0..=100.0).contains(&value) {
        return Err(TelemetryError::validation(format!(
            "{name} must be within [0, 100], got {value}"
        )));
    }
    Ok(value)
}

/// Estimate the worst-case condensation margin for one night.
pub fn estimate_manual(input: &ManualEstimateInput) -> Result<ManualEstimate, TelemetryError> {
    // ---
    let lights_off_temp_f = require_finite("lightsOffTempF", input.lights_off_temp_f)?;
    let lights_off_rh = require_rh("lightsOffRh", input.lights_off_rh)?;
    let night_min_temp_f = require_finite("nightMinTempF", input.night_min_temp_f)?;
    let night_max_rh = require_rh("nightMaxRh", input.night_max_rh)?;
    let delta_f = require_finite("assumedLeafAirDeltaF", input.assumed_leaf_air_delta_f)?;
    let threshold = require_finite(
        "marginCThreshold",
        input.margin_c_threshold.unwrap_or(MANUAL_MARGIN_THRESHOLD_C),
    )?;

    let lights_off_temp_c = f_to_c(lights_off_temp_f);
    let night_min_temp_c = f_to_c(night_min_temp_f);
    // A gap, not a reading: delta conversion only
    let assumed_leaf_air_delta_c = delta_f_to_c(delta_f);

    let dew_point_lights_off_c = dew_point_c(lights_off_temp_c, lights_off_rh);
    let dew_point_worst_c = dew_point_c(night_min_temp_c, night_max_rh);
    if !dew_point_lights_off_c.is_finite() || !dew_point_worst_c.is_finite() {
        return Err(TelemetryError::validation(
            "Inputs do not produce a defined dew point",
        ));
    }

    let assumed_leaf_temp_c = night_min_temp_c - assumed_leaf_air_delta_c;
    let margin_worst_c =
        condensation_margin_c(night_min_temp_c, dew_point_worst_c, assumed_leaf_air_delta_c);
    let risk_band = RiskBand::classify(margin_worst_c, threshold);

    tracing::debug!(margin_worst_c, ?risk_band, "Computed manual estimate");

    Ok(ManualEstimate {
        dew_point_lights_off_c,
        dew_point_lights_off_f: c_to_f(dew_point_lights_off_c),
        dew_point_worst_c,
        dew_point_worst_f: c_to_f(dew_point_worst_c),
        night_min_temp_c,
        assumed_leaf_air_delta_c,
        assumed_leaf_temp_c,
        margin_worst_c,
        margin_worst_f: delta_c_to_f(margin_worst_c),
        margin_c_threshold: threshold,
        risk_band,
        recommendations: recommendations_with_flags(risk_band, &input.flags),
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::recommendations::RecommendationCode;

    fn create_test_input(night_min_f: f64, night_max_rh: f64) -> ManualEstimateInput {
        // ---
        ManualEstimateInput {
            lights_off_temp_f: 75.0,
            lights_off_rh: 55.0,
            night_min_temp_f: night_min_f,
            night_max_rh,
            assumed_leaf_air_delta_f: 1.0,
            margin_c_threshold: None,
            flags: SituationalFlags::default(),
        }
    }

    #[test]
    fn test_typical_night_is_low_risk() {
        // ---
        let estimate = estimate_manual(&create_test_input(68.0, 62.0)).unwrap();

        assert!((estimate.night_min_temp_c - 20.0).abs() < 1e-9);
        assert!((estimate.assumed_leaf_air_delta_c - 0.5556).abs() < 1e-3);
        assert!((estimate.assumed_leaf_temp_c - 19.444).abs() < 1e-2);
        assert!((estimate.dew_point_worst_c - 12.49).abs() < 0.05);
        assert!((estimate.margin_worst_c - 6.95).abs() < 0.05);

        // Band follows the margin
        assert_eq!(estimate.risk_band, RiskBand::Low);
        assert_eq!(estimate.margin_worst_c <= 0.5, estimate.risk_band != RiskBand::Low);
        assert_eq!(estimate.recommendations[0].code, RecommendationCode::Maintain);
        assert_eq!(estimate.recommendations.len(), 1);
    }

    #[test]
    fn test_saturated_night_is_high_risk() {
        // ---
        let estimate = estimate_manual(&create_test_input(64.0, 99.0)).unwrap();
        assert_eq!(estimate.risk_band, RiskBand::High);
        assert!(estimate.margin_worst_c <= 0.0);
        assert_eq!(estimate.recommendations[0].code, RecommendationCode::LowerNightRh);
        assert!((estimate.margin_worst_f - estimate.margin_worst_c * 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_medium_band_between_zero_and_threshold() {
        // ---
        // Zero leaf gap at 98% RH leaves a margin of roughly 0.33°C
        let mut input = create_test_input(68.0, 98.0);
        input.assumed_leaf_air_delta_f = 0.0;
        let estimate = estimate_manual(&input).unwrap();
        assert!(estimate.margin_worst_c > 0.0 && estimate.margin_worst_c <= 0.5);
        assert_eq!(estimate.risk_band, RiskBand::Medium);
    }

    #[test]
    fn test_flags_append_recommendations() {
        // ---
        let mut input = create_test_input(64.0, 99.0);
        input.flags = SituationalFlags {
            late_irrigation: true,
            fan_off_incident: true,
            dehumidifier_at_capacity: true,
        };
        let codes: Vec<_> = estimate_manual(&input)
            .unwrap()
            .recommendations
            .iter()
            .map(|r| r.code)
            .collect();
        assert_eq!(
            codes,
            vec![
                RecommendationCode::LowerNightRh,
                RecommendationCode::IncreaseAirflow,
                RecommendationCode::SlowTempRamp,
                RecommendationCode::IrrigationTiming,
                RecommendationCode::FanContinuity,
                RecommendationCode::DehumidifierCapacity,
            ]
        );
    }

    #[test]
    fn test_delta_uses_offset_free_conversion() {
        // ---
        let mut input = create_test_input(68.0, 62.0);
        input.assumed_leaf_air_delta_f = 1.8;
        let estimate = estimate_manual(&input).unwrap();
        assert!((estimate.assumed_leaf_air_delta_c - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_override_changes_band() {
        // ---
        let mut input = create_test_input(68.0, 62.0);
        input.margin_c_threshold = Some(10.0);
        assert_eq!(estimate_manual(&input).unwrap().risk_band, RiskBand::Medium);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        // ---
        let err = estimate_manual(&create_test_input(68.0, 120.0)).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = estimate_manual(&create_test_input(f64::NAN, 60.0)).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let mut input = create_test_input(68.0, 60.0);
        input.assumed_leaf_air_delta_f = f64::INFINITY;
        assert!(estimate_manual(&input).is_err());
    }

    #[test]
    fn test_input_deserializes_with_flattened_flags() {
        // ---
        let input: ManualEstimateInput = serde_json::from_value(serde_json::json!({
            "lightsOffTempF": 75.0,
            "lightsOffRh": 55.0,
            "nightMinTempF": 68.0,
            "nightMaxRh": 62.0,
            "fanOffIncident": true
        }))
        .unwrap();
        assert_eq!(input.assumed_leaf_air_delta_f, DEFAULT_LEAF_AIR_DELTA_F);
        assert!(input.flags.fan_off_incident);
        assert!(!input.flags.late_irrigation);
    }
}
