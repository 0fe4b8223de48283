//! Pulse credential checks and device discovery, used before creating a
//! pulse-device source.

use std::time::Duration;

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ValidJson;
use crate::adapters::Device;
use crate::errors::TelemetryError;
use crate::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/pulse/verify", post(verify))
        .route("/pulse/devices", post(devices))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialRequest {
    api_key: String,
    timeout_secs: Option<u64>,
}

#[derive(Serialize)]
struct DevicesResponse {
    devices: Vec<Device>,
}

fn call_timeout(state: &AppState, timeout_secs: Option<u64>) -> Duration {
    Duration::from_secs(timeout_secs.unwrap_or(state.config.pulse_timeout_secs).max(1))
}

async fn bounded<T>(
    timeout: Duration,
    call: impl std::future::Future<Output = Result<T, TelemetryError>>,
) -> Result<T, TelemetryError> {
    // ---
    tokio::time::timeout(timeout, call).await.map_err(|_| {
        TelemetryError::UpstreamUnavailable(format!("timed out after {}s", timeout.as_secs()))
    })?
}

async fn verify(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<CredentialRequest>,
) -> Result<Json<Value>, TelemetryError> {
    // ---
    tracing::info!("POST /pulse/verify");
    let timeout = call_timeout(&state, body.timeout_secs);
    bounded(timeout, state.adapters.pulse.verify_credential(&body.api_key)).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn devices(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<CredentialRequest>,
) -> Result<Json<DevicesResponse>, TelemetryError> {
    // ---
    tracing::info!("POST /pulse/devices");
    let timeout = call_timeout(&state, body.timeout_secs);
    let devices = bounded(timeout, state.adapters.pulse.list_devices(&body.api_key)).await?;
    Ok(Json(DevicesResponse { devices }))
}
