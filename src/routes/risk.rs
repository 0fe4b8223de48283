//! Risk endpoints: per-source window risk, stateless telemetry risk, and
//! the manual estimate.
//!
//! An empty analysis is a successful response with `summary: null` and
//! `status: "insufficient_data"`, never an error.

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::points::pull_for_source;
use super::{resolve_window, ValidJson};
use crate::errors::TelemetryError;
use crate::manual::{estimate_manual, ManualEstimate, ManualEstimateInput};
use crate::models::{IngestSummary, SourceType};
use crate::psychro::delta_f_to_c;
use crate::risk::{compute_telemetry_risk_with, RiskParams, RiskSample, RiskSummary};
use crate::AppState;

/// Leaf-to-air gap (°F) assumed when the request names none.
const DEFAULT_LEAF_AIR_DELTA_F: f64 = 1.0;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/sources/{source_id}/risk", post(source_risk))
        .route("/risk/telemetry", post(telemetry_risk))
        .route("/risk/manual", post(manual_risk))
}

/// Risk tunables shared by the telemetry endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RiskOptions {
    assumed_leaf_air_delta_f: Option<f64>,
    assumed_leaf_air_delta_c: Option<f64>,
    margin_c_threshold: Option<f64>,
    max_interval_minutes: Option<f64>,
}

impl RiskOptions {
    /// Resolve against service defaults. A °C delta wins over a °F one.
    fn resolve(&self, state: &AppState) -> Result<RiskParams, TelemetryError> {
        // ---
        let delta_c = self.assumed_leaf_air_delta_c;
        let assumed_leaf_air_delta_c = match (delta_c, self.assumed_leaf_air_delta_f) {
            (Some(c), _) => c,
            (None, Some(f)) => delta_f_to_c(f),
            (None, None) => delta_f_to_c(DEFAULT_LEAF_AIR_DELTA_F),
        };
        let margin_c_threshold = self
            .margin_c_threshold
            .unwrap_or(state.config.risk_margin_threshold_c);
        let max_interval_minutes = self
            .max_interval_minutes
            .unwrap_or(state.config.risk_max_interval_minutes);

        if !assumed_leaf_air_delta_c.is_finite() {
            return Err(TelemetryError::validation("assumed leaf-air delta must be finite"));
        }
        if !margin_c_threshold.is_finite() {
            return Err(TelemetryError::validation("marginCThreshold must be finite"));
        }
        if !max_interval_minutes.is_finite() || max_interval_minutes < 0.0 {
            return Err(TelemetryError::validation(
                "maxIntervalMinutes must be a non-negative number",
            ));
        }

        Ok(RiskParams {
            assumed_leaf_air_delta_c,
            margin_c_threshold,
            max_interval_minutes,
        })
    }
}

/// Echo of the resolved inputs, for downstream consumers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RiskInputEcho {
    #[serde(skip_serializing_if = "Option::is_none")]
    source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<String>,
    assumed_leaf_air_delta_c: f64,
    margin_c_threshold: f64,
    max_interval_minutes: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RiskResponse {
    status: &'static str,
    summary: Option<RiskSummary>,
    input: RiskInputEcho,
    #[serde(skip_serializing_if = "Option::is_none")]
    pull: Option<IngestSummary>,
}

fn risk_response(
    summary: Option<RiskSummary>,
    input: RiskInputEcho,
    pull: Option<IngestSummary>,
) -> RiskResponse {
    RiskResponse {
        status: if summary.is_some() {
            "ok"
        } else {
            "insufficient_data"
        },
        summary,
        input,
        pull,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceRiskRequest {
    start: Option<String>,
    end: Option<String>,
    limit: Option<usize>,
    #[serde(default)]
    pull: bool,
    timeout_secs: Option<u64>,
    #[serde(flatten)]
    options: RiskOptions,
}

async fn source_risk(
    Path(source_id): Path<String>,
    State(state): State<AppState>,
    body: Option<ValidJson<SourceRiskRequest>>,
) -> Result<Json<RiskResponse>, TelemetryError> {
    // ---
    let body = body.map(|ValidJson(b)| b).unwrap_or_default();
    info!("POST /sources/{}/risk - pull={}", source_id, body.pull);

    let params = body.options.resolve(&state)?;
    let (start, end) = resolve_window(body.start.as_deref(), body.end.as_deref())?;
    let source = state.store.get_source(&source_id).await?;

    let pull = if body.pull && source.source_type == SourceType::PulseDevice {
        Some(pull_for_source(&state, &source.id, &start, &end, body.timeout_secs).await?)
    } else {
        None
    };

    let points = state
        .store
        .get_points(&source.id, &start, &end, body.limit)
        .await?;
    let samples: Vec<RiskSample> = points.iter().map(RiskSample::from).collect();
    let summary = compute_telemetry_risk_with(&samples, &params);

    Ok(Json(risk_response(
        summary,
        RiskInputEcho {
            source_id: Some(source.id),
            start: Some(start),
            end: Some(end),
            assumed_leaf_air_delta_c: params.assumed_leaf_air_delta_c,
            margin_c_threshold: params.margin_c_threshold,
            max_interval_minutes: params.max_interval_minutes,
        },
        pull,
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TelemetryRiskRequest {
    /// Untyped so an unreadable sample is dropped instead of failing the call.
    points: Vec<Value>,
    #[serde(flatten)]
    options: RiskOptions,
}

async fn telemetry_risk(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<TelemetryRiskRequest>,
) -> Result<Json<RiskResponse>, TelemetryError> {
    // ---
    info!("POST /risk/telemetry - {} points", body.points.len());

    let params = body.options.resolve(&state)?;
    let samples: Vec<RiskSample> = body
        .points
        .iter()
        .filter_map(RiskSample::from_row)
        .collect();
    let summary = compute_telemetry_risk_with(&samples, &params);

    Ok(Json(risk_response(
        summary,
        RiskInputEcho {
            source_id: None,
            start: None,
            end: None,
            assumed_leaf_air_delta_c: params.assumed_leaf_air_delta_c,
            margin_c_threshold: params.margin_c_threshold,
            max_interval_minutes: params.max_interval_minutes,
        },
        None,
    )))
}

async fn manual_risk(
    ValidJson(body): ValidJson<ManualEstimateInput>,
) -> Result<Json<ManualEstimate>, TelemetryError> {
    // ---
    info!("POST /risk/manual");
    Ok(Json(estimate_manual(&body)?))
}
