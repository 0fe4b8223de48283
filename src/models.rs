//! Data models for telemetry sources, points and ingestion summaries.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TelemetryError;

// ---

/// Closed set of telemetry source kinds. Immutable once a source exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    Manual,
    Upload,
    PulseDevice,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Manual => "manual",
            SourceType::Upload => "upload",
            SourceType::PulseDevice => "pulse-device",
        }
    }

    pub fn parse(value: &str) -> Result<Self, TelemetryError> {
        // ---
        match value {
            "manual" => Ok(SourceType::Manual),
            "upload" => Ok(SourceType::Upload),
            "pulse-device" => Ok(SourceType::PulseDevice),
            other => Err(TelemetryError::validation(format!(
                "Unknown source type '{other}' (expected manual, upload or pulse-device)"
            ))),
        }
    }

    /// Whether callers may push points directly. Device-backed sources only
    /// receive points through their adapter's pull.
    pub fn accepts_direct_ingest(&self) -> bool {
        match self {
            SourceType::Manual | SourceType::Upload => true,
            SourceType::PulseDevice => false,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials and device binding for a Pulse-backed source.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseConfig {
    pub api_key: String,
    pub device_id: String,
}

impl fmt::Debug for PulseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PulseConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("device_id", &self.device_id)
            .finish()
    }
}

/// Type-specific source configuration. Empty for manual and upload sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse: Option<PulseConfig>,
}

impl SourceConfig {
    /// Validate a raw JSON config against the shape required by `source_type`.
    pub fn for_type(source_type: SourceType, raw: Option<&Value>) -> Result<Self, TelemetryError> {
        // ---
        let object = match raw {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(_) => return Err(TelemetryError::validation("config must be a JSON object")),
        };

        match source_type {
            SourceType::Manual | SourceType::Upload => {
                if object.is_some_and(|map| !map.is_empty()) {
                    return Err(TelemetryError::validation(format!(
                        "config must be empty for {source_type} sources"
                    )));
                }
                Ok(SourceConfig::default())
            }
            SourceType::PulseDevice => {
                let map = object.ok_or_else(|| {
                    TelemetryError::validation("pulse-device sources require config.pulse")
                })?;
                if let Some(key) = map.keys().find(|k| k.as_str() != "pulse") {
                    return Err(TelemetryError::validation(format!(
                        "Unexpected config key '{key}' for pulse-device source"
                    )));
                }
                let pulse = map.get("pulse").ok_or_else(|| {
                    TelemetryError::validation("pulse-device sources require config.pulse")
                })?;
                let pulse: PulseConfig = serde_json::from_value(pulse.clone()).map_err(|e| {
                    TelemetryError::validation(format!("Invalid config.pulse: {e}"))
                })?;
                SourceConfig::pulse(pulse)
            }
        }
    }

    pub fn pulse(pulse: PulseConfig) -> Result<Self, TelemetryError> {
        // ---
        if pulse.api_key.trim().is_empty() {
            return Err(TelemetryError::validation("config.pulse.apiKey must not be empty"));
        }
        if pulse.device_id.trim().is_empty() {
            return Err(TelemetryError::validation("config.pulse.deviceId must not be empty"));
        }
        Ok(SourceConfig { pulse: Some(pulse) })
    }

    /// Copy with secrets masked, for responses.
    pub fn redacted(&self) -> Self {
        SourceConfig {
            pulse: self.pulse.as_ref().map(|p| PulseConfig {
                api_key: mask_secret(&p.api_key),
                device_id: p.device_id.clone(),
            }),
        }
    }
}

/// Mask all but the last four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    // ---
    let count = secret.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("****{tail}")
}

/// A telemetry source owned by a grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySource {
    pub id: String,
    pub grow_id: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub name: String,
    pub timezone: String,
    pub config: SourceConfig,
    pub created_at: DateTime<Utc>,
}

impl TelemetrySource {
    pub fn redacted(&self) -> Self {
        TelemetrySource {
            config: self.config.redacted(),
            ..self.clone()
        }
    }
}

/// Fields needed to create a source.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub grow_id: String,
    pub source_type: SourceType,
    pub name: String,
    pub timezone: Option<String>,
    pub config: SourceConfig,
}

/// A stored reading. Unique per `(source_id, ts)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPoint {
    pub source_id: String,
    pub ts: DateTime<Utc>,
    pub air_temp_c: f64,
    pub rh: f64,
    pub dew_point_c: Option<f64>,
}

/// A reading as submitted by a caller or an adapter, before validation.
///
/// Numeric fields are optional so that a row with a missing value is rejected
/// on its own instead of failing the whole batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointInput {
    pub ts: String,
    pub air_temp_c: Option<f64>,
    pub rh: Option<f64>,
    #[serde(default)]
    pub dew_point_c: Option<f64>,
}

/// A row after shape decoding: the typed input, or why it could not be read.
pub type DecodedRow = Result<PointInput, String>;

impl PointInput {
    /// Decode one untyped row. A shape error stays with the row instead of
    /// failing the batch it came in.
    pub fn from_row(row: &Value) -> DecodedRow {
        serde_json::from_value(row.clone()).map_err(|e| format!("Malformed row: {e}"))
    }

    /// Validate this row for `source_id`. The error string describes the
    /// first rule the row breaks.
    pub fn validate(&self, source_id: &str) -> Result<TelemetryPoint, String> {
        // ---
        let ts = parse_instant(&self.ts)?;

        let air_temp_c = match self.air_temp_c {
            Some(t) if t.is_finite() => t,
            Some(t) => return Err(format!("airTempC must be finite, got {t}")),
            None => return Err("airTempC is required".to_string()),
        };

        let rh = match self.rh {
            Some(rh) if rh.is_finite() && (0.0..=100.0).contains(&rh) => rh,
            Some(rh) => return Err(format!("rh must be within [0, 100], got {rh}")),
            None => return Err("rh is required".to_string()),
        };

        if let Some(dp) = self.dew_point_c {
            if !dp.is_finite() {
                return Err(format!("dewPointC must be finite when present, got {dp}"));
            }
        }

        Ok(TelemetryPoint {
            source_id: source_id.to_string(),
            ts,
            air_temp_c,
            rh,
            dew_point_c: self.dew_point_c,
        })
    }
}

/// Parse an ISO-8601 / RFC 3339 instant into UTC, truncated to whole
/// microseconds (the resolution of `TIMESTAMPTZ`).
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(6))
        .map_err(|e| format!("Invalid timestamp '{value}': {e}"))
}

/// How ingestion treats a key that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestMode {
    /// Replace the stored values.
    #[default]
    Upsert,
    /// Leave the stored row alone and count the input as skipped.
    SkipExisting,
}

impl IngestMode {
    pub fn parse(value: &str) -> Result<Self, TelemetryError> {
        match value {
            "upsert" => Ok(IngestMode::Upsert),
            "skip-existing" => Ok(IngestMode::SkipExisting),
            other => Err(TelemetryError::validation(format!(
                "Unknown ingest mode '{other}' (expected upsert or skip-existing)"
            ))),
        }
    }
}

/// One input row that was not stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRejection {
    pub index: usize,
    pub code: String,
    pub message: String,
}

/// Result of a batch ingest or a device pull.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub ingested: usize,
    pub updated: usize,
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RowRejection>,
}
