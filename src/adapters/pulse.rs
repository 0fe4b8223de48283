//! Adapter for the Pulse cloud monitoring API.
//!
//! Endpoints used (all authenticated with the `x-api-key` header):
//! - `GET /users/me` to verify a key
//! - `GET /devices` for `{"devices": [{id, name, deviceType}]}`
//! - `GET /devices/{id}/data-range?start=&end=[&cursor=]` for
//!   `{"dataPoints": [...], "nextCursor": "..."}`
//!
//! Readings arrive in °F. Both the air temperature and the device-computed
//! dew point are absolute readings, so both take the point conversion.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{Device, DeviceAdapter};
use crate::errors::TelemetryError;
use crate::models::{DecodedRow, PointInput, SourceConfig, SourceType};
use crate::psychro::f_to_c;

const API_KEY_HEADER: &str = "x-api-key";

// ---

pub struct PulseAdapter {
    client: Client,
    base_url: String,
    max_pages: u32,
}

impl PulseAdapter {
    /// Build an adapter for `base_url`. `request_timeout` bounds each HTTP call.
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        max_pages: u32,
    ) -> Result<Self, TelemetryError> {
        // ---
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_pages: max_pages.max(1),
        })
    }

    fn get(&self, path: &str, secret: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header(API_KEY_HEADER, secret)
    }

    /// Send a request and map transport and status failures.
    async fn send(&self, request: RequestBuilder) -> Result<Response, TelemetryError> {
        // ---
        let response = request.send().await.map_err(|e| {
            tracing::warn!("Pulse request failed: {}", e);
            TelemetryError::UpstreamUnavailable(if e.is_timeout() {
                "request timed out".to_string()
            } else {
                "request failed".to_string()
            })
        })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TelemetryError::AuthFailed),
            status => {
                tracing::warn!("Pulse API answered {}", status);
                Err(TelemetryError::UpstreamUnavailable(format!(
                    "upstream answered {status}"
                )))
            }
        }
    }

    async fn json(response: Response) -> Result<Value, TelemetryError> {
        response.json::<Value>().await.map_err(|e| {
            tracing::warn!("Pulse API returned an unreadable body: {}", e);
            TelemetryError::UpstreamUnavailable("malformed upstream response".to_string())
        })
    }
}

/// One reading as returned by the data-range endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PulseDataPoint {
    created_at: DateTime<Utc>,
    temperature_f: Option<f64>,
    humidity_rh: Option<f64>,
    dp_f: Option<f64>,
}

impl PulseDataPoint {
    fn to_input(&self) -> PointInput {
        PointInput {
            ts: self.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            air_temp_c: self.temperature_f.map(f_to_c),
            rh: self.humidity_rh,
            dew_point_c: self.dp_f.map(f_to_c),
        }
    }
}

/// Device ids come back as numbers or strings depending on the product line.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl DeviceAdapter for PulseAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::PulseDevice
    }

    async fn verify_credential(&self, secret: &str) -> Result<(), TelemetryError> {
        // ---
        if secret.trim().is_empty() {
            return Err(TelemetryError::validation("apiKey is required"));
        }
        self.send(self.get("/users/me", secret)).await?;
        Ok(())
    }

    async fn list_devices(&self, secret: &str) -> Result<Vec<Device>, TelemetryError> {
        // ---
        if secret.trim().is_empty() {
            return Err(TelemetryError::validation("apiKey is required"));
        }
        let body = Self::json(self.send(self.get("/devices", secret)).await?).await?;

        let devices: Vec<Device> = body
            .get("devices")
            .and_then(|d| d.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let id = item.get("id").and_then(id_string)?;
                        let name = item
                            .get("name")
                            .and_then(|n| n.as_str())
                            .unwrap_or(id.as_str())
                            .to_string();
                        let device_type = item
                            .get("deviceType")
                            .and_then(|t| t.as_str())
                            .map(String::from);
                        Some(Device {
                            id,
                            name,
                            device_type,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        if devices.is_empty() {
            tracing::info!("Pulse credential has no devices");
        }
        Ok(devices)
    }

    async fn fetch_window(
        &self,
        config: &SourceConfig,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DecodedRow>, TelemetryError> {
        // ---
        let pulse = config
            .pulse
            .as_ref()
            .ok_or_else(|| TelemetryError::validation("Source has no pulse config"))?;

        let path = format!("/devices/{}/data-range", pulse.device_id);
        let start_iso = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end_iso = end.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut all_data = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page_count = 0;

        loop {
            if page_count >= self.max_pages {
                tracing::debug!(
                    "Hit page limit of {}, stopping pagination. Fetched {} records so far.",
                    self.max_pages,
                    all_data.len()
                );
                break;
            }
            page_count += 1;

            let mut query = vec![("start", start_iso.as_str()), ("end", end_iso.as_str())];
            if let Some(ref cursor) = cursor {
                query.push(("cursor", cursor.as_str()));
            }

            tracing::debug!("Fetching page {} of {}", page_count, path);
            let request = self.get(&path, &pulse.api_key).query(&query);
            let response = Self::json(self.send(request).await?).await?;

            if let Some(data) = response.get("dataPoints").and_then(|d| d.as_array()) {
                for (i, item) in data.iter().enumerate() {
                    match serde_json::from_value::<PulseDataPoint>(item.clone()) {
                        Ok(reading) => all_data.push(Ok(reading.to_input())),
                        Err(e) => {
                            tracing::debug!(
                                "Failed to parse item {} on page {}: {}",
                                i,
                                page_count,
                                e
                            );
                            all_data.push(Err(format!("Unreadable data point: {e}")));
                        }
                    }
                }
            } else {
                tracing::debug!(
                    "Page {} response missing 'dataPoints' field or not an array",
                    page_count
                );
            }

            cursor = response
                .get("nextCursor")
                .and_then(|c| c.as_str())
                .filter(|c| !c.is_empty())
                .map(String::from);

            if cursor.is_none() {
                break;
            }
        }

        tracing::info!(
            "Finished fetching {} readings from {} pages",
            all_data.len(),
            page_count
        );
        Ok(all_data)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_data_point_conversion() {
        // ---
        let point: PulseDataPoint = serde_json::from_value(json!({
            "createdAt": "2025-06-01T04:00:00Z",
            "temperatureF": 68.0,
            "humidityRh": 62.5,
            "dpF": 54.5
        }))
        .unwrap();
        let input = point.to_input();

        assert_eq!(input.ts, "2025-06-01T04:00:00Z");
        assert!((input.air_temp_c.unwrap() - 20.0).abs() < 1e-9);
        assert_eq!(input.rh, Some(62.5));
        assert!((input.dew_point_c.unwrap() - 12.5).abs() < 1e-9);

        let parsed = input.validate("s").unwrap();
        assert_eq!(parsed.ts, Utc.with_ymd_and_hms(2025, 6, 1, 4, 0, 0).unwrap());
    }

    #[test]
    fn test_missing_dew_point_stays_missing() {
        // ---
        let point: PulseDataPoint = serde_json::from_value(json!({
            "createdAt": "2025-06-01T04:00:00Z",
            "temperatureF": 70.0,
            "humidityRh": 50.0
        }))
        .unwrap();
        assert_eq!(point.to_input().dew_point_c, None);
    }

    #[test]
    fn test_id_string() {
        // ---
        assert_eq!(id_string(&json!(1234)), Some("1234".to_string()));
        assert_eq!(id_string(&json!("hub-7")), Some("hub-7".to_string()));
        assert_eq!(id_string(&json!("")), None);
        assert_eq!(id_string(&json!(null)), None);
    }
}
