//! Source creation and lookup.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::ValidJson;
use crate::errors::TelemetryError;
use crate::models::{NewSource, SourceConfig, SourceType, TelemetrySource};
use crate::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route(
            "/grows/{grow_id}/sources",
            get(list_sources).post(create_source),
        )
        .route("/sources/{source_id}", get(get_source))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSourceRequest {
    #[serde(rename = "type")]
    source_type: String,
    name: String,
    timezone: Option<String>,
    config: Option<Value>,
}

async fn create_source(
    Path(grow_id): Path<String>,
    State(state): State<AppState>,
    ValidJson(body): ValidJson<CreateSourceRequest>,
) -> Result<(StatusCode, Json<TelemetrySource>), TelemetryError> {
    // ---
    info!("POST /grows/{}/sources - type {}", grow_id, body.source_type);

    let source_type = SourceType::parse(&body.source_type)?;
    let config = SourceConfig::for_type(source_type, body.config.as_ref())?;

    let source = state
        .store
        .create_source(NewSource {
            grow_id,
            source_type,
            name: body.name,
            timezone: body.timezone,
            config,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(source.redacted())))
}

async fn list_sources(
    Path(grow_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<TelemetrySource>>, TelemetryError> {
    // ---
    let sources = state.store.list_sources(&grow_id).await?;
    Ok(Json(sources.iter().map(TelemetrySource::redacted).collect()))
}

async fn get_source(
    Path(source_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TelemetrySource>, TelemetryError> {
    // ---
    let source = state.store.get_source(&source_id).await?;
    Ok(Json(source.redacted()))
}
