#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::ServiceExt;

use dewguard::{routes, AppState, Config, DeviceAdapters, PulseAdapter, TelemetryStore};

pub const GOOD_KEY: &str = "pk_good_0001";
pub const EMPTY_KEY: &str = "pk_empty_0002";
pub const SLOW_KEY: &str = "pk_slow_0003";

// ---

pub struct TestApp {
    pub router: Router,
    pub store: TelemetryStore,
}

impl TestApp {
    /// App over an in-memory store, with the Pulse adapter aimed at `pulse_url`.
    pub fn new(pulse_url: &str) -> Self {
        // ---
        let config = Config {
            pulse_api_url: pulse_url.to_string(),
            pulse_timeout_secs: 5,
            ..Config::default()
        };
        let store = TelemetryStore::in_memory().with_max_limit(config.points_max_limit);
        let pulse = PulseAdapter::new(pulse_url, Duration::from_secs(5), 10).unwrap();

        let state = AppState {
            store: store.clone(),
            adapters: DeviceAdapters::new(Arc::new(pulse)),
            config,
        };

        Self {
            router: routes::router(state),
            store,
        }
    }

    /// App whose Pulse adapter points at nothing reachable.
    pub fn without_pulse() -> Self {
        Self::new("http://127.0.0.1:9")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        // ---
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }

    pub async fn get(&self, uri: &str) -> Result<(StatusCode, Value)> {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn create_source(&self, grow_id: &str, body: Value) -> Result<Value> {
        // ---
        let (status, value) = self.post(&format!("/grows/{grow_id}/sources"), body).await?;
        assert_eq!(status, StatusCode::CREATED, "create failed: {value}");
        Ok(value)
    }
}

pub fn point(ts: &str, air_temp_c: f64, rh: f64) -> Value {
    json!({ "ts": ts, "airTempC": air_temp_c, "rh": rh })
}

// --- Pulse API stub

fn key_of(headers: &HeaderMap) -> &str {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

async fn users_me(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    // ---
    match key_of(&headers) {
        GOOD_KEY | EMPTY_KEY => (StatusCode::OK, Json(json!({ "id": 1 }))),
        SLOW_KEY => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            (StatusCode::OK, Json(json!({ "id": 3 })))
        }
        _ => (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad key" }))),
    }
}

async fn devices(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    // ---
    match key_of(&headers) {
        GOOD_KEY => (
            StatusCode::OK,
            Json(json!({
                "devices": [
                    { "id": 4411, "name": "Flower tent", "deviceType": "PulsePro" },
                    { "id": "hub-2", "name": "Veg room" },
                    { "name": "no id, dropped" }
                ]
            })),
        ),
        EMPTY_KEY => (StatusCode::OK, Json(json!({ "devices": [] }))),
        _ => (StatusCode::FORBIDDEN, Json(json!({ "error": "bad key" }))),
    }
}

/// Two pages: 18°C/95% and 16°C/98% an hour apart, then one more reading
/// with a device-reported dew point.
async fn data_range(
    headers: HeaderMap,
    Path(device_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    // ---
    if key_of(&headers) != GOOD_KEY {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    if device_id != "4411" || !query.contains_key("start") || !query.contains_key("end") {
        return (StatusCode::BAD_REQUEST, Json(json!({})));
    }

    match query.get("cursor").map(String::as_str) {
        None => (
            StatusCode::OK,
            Json(json!({
                "dataPoints": [
                    {
                        "createdAt": "2025-06-01T22:00:00Z",
                        "temperatureF": 64.4,
                        "humidityRh": 95.0
                    },
                    {
                        "createdAt": "2025-06-01T23:00:00Z",
                        "temperatureF": 60.8,
                        "humidityRh": 98.0
                    },
                    { "createdAt": "garbage" }
                ],
                "nextCursor": "page-2"
            })),
        ),
        Some("page-2") => (
            StatusCode::OK,
            Json(json!({
                "dataPoints": [
                    {
                        "createdAt": "2025-06-02T00:00:00Z",
                        "temperatureF": 60.8,
                        "humidityRh": 98.0,
                        "dpF": 59.0
                    }
                ]
            })),
        ),
        Some(_) => (StatusCode::BAD_REQUEST, Json(json!({}))),
    }
}

/// Start the Pulse stub on an ephemeral port and return its base URL.
pub async fn spawn_pulse_stub() -> String {
    // ---
    let app = Router::new()
        .route("/users/me", get(users_me))
        .route("/devices", get(devices))
        .route("/devices/{device_id}/data-range", get(data_range));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}
