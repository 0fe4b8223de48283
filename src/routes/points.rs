//! Point ingestion, window reads and device pulls for a source.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{resolve_window, ValidJson};
use crate::errors::TelemetryError;
use crate::models::{IngestMode, IngestSummary, TelemetryPoint};
use crate::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route(
            "/sources/{source_id}/points",
            get(get_points).post(ingest_points),
        )
        .route("/sources/{source_id}/pull", post(pull_window))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestRequest {
    mode: Option<String>,
    /// Rows stay untyped here so each one is decoded and judged on its own.
    points: Vec<Value>,
}

async fn ingest_points(
    Path(source_id): Path<String>,
    State(state): State<AppState>,
    ValidJson(body): ValidJson<IngestRequest>,
) -> Result<Json<IngestSummary>, TelemetryError> {
    // ---
    info!(
        "POST /sources/{}/points - {} rows",
        source_id,
        body.points.len()
    );

    let mode = match body.mode.as_deref() {
        Some(mode) => IngestMode::parse(mode)?,
        None => IngestMode::default(),
    };

    let summary = state
        .store
        .ingest_points(&source_id, mode, &body.points)
        .await?;
    Ok(Json(summary))
}

/// Query parameters for a window read.
#[derive(Debug, Deserialize)]
pub struct PointsQuery {
    start: Option<String>,
    end: Option<String>,
    limit: Option<usize>,
}

async fn get_points(
    Path(source_id): Path<String>,
    Query(params): Query<PointsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<TelemetryPoint>>, TelemetryError> {
    // ---
    debug!("GET /sources/{}/points - {:?}", source_id, params);

    let (start, end) = resolve_window(params.start.as_deref(), params.end.as_deref())?;
    let points = state
        .store
        .get_points(&source_id, &start, &end, params.limit)
        .await?;
    Ok(Json(points))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    start: Option<String>,
    end: Option<String>,
    timeout_secs: Option<u64>,
}

async fn pull_window(
    Path(source_id): Path<String>,
    State(state): State<AppState>,
    body: Option<ValidJson<PullRequest>>,
) -> Result<Json<IngestSummary>, TelemetryError> {
    // ---
    let body = body.map(|ValidJson(b)| b).unwrap_or_default();
    info!("POST /sources/{}/pull", source_id);

    let (start, end) = resolve_window(body.start.as_deref(), body.end.as_deref())?;
    let summary = pull_for_source(&state, &source_id, &start, &end, body.timeout_secs).await?;
    Ok(Json(summary))
}

/// Run the adapter pull for a device-backed source.
pub(super) async fn pull_for_source(
    state: &AppState,
    source_id: &str,
    start: &str,
    end: &str,
    timeout_secs: Option<u64>,
) -> Result<IngestSummary, TelemetryError> {
    // ---
    let source = state.store.get_source(source_id).await?;
    let adapter = state
        .adapters
        .for_source_type(source.source_type)
        .ok_or_else(|| {
            TelemetryError::validation(format!(
                "Source {} of type '{}' has no device adapter",
                source.id, source.source_type
            ))
        })?;

    let timeout_secs = timeout_secs.unwrap_or(state.config.pulse_timeout_secs);
    let timeout = Duration::from_secs(timeout_secs.max(1));
    adapter
        .pull_window(&state.store, &source.id, start, end, timeout)
        .await
}
