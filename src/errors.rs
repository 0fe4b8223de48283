//! Error taxonomy for the telemetry and risk operations.
//!
//! Every variant maps to a stable machine code (`VALIDATION_ERROR`,
//! `SOURCE_NOT_INGESTABLE`, ...) that callers can branch on, plus an HTTP
//! status used by the routes layer. An "insufficient data" risk result is not
//! an error and has no variant here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("{0}")]
    Validation(String),

    #[error("Telemetry source not found: {0}")]
    SourceNotFound(String),

    #[error("Source {source_id} of type '{source_type}' does not accept direct ingestion")]
    SourceNotIngestable {
        source_id: String,
        source_type: &'static str,
    },

    #[error("Device API rejected the credential")]
    AuthFailed,

    #[error("Device API unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TelemetryError {
    pub fn validation(message: impl Into<String>) -> Self {
        TelemetryError::Validation(message.into())
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            TelemetryError::Validation(_) => "VALIDATION_ERROR",
            TelemetryError::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            TelemetryError::SourceNotIngestable { .. } => "SOURCE_NOT_INGESTABLE",
            TelemetryError::AuthFailed => "AUTH_FAILED",
            TelemetryError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            TelemetryError::Storage(_) | TelemetryError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            TelemetryError::Validation(_) => StatusCode::BAD_REQUEST,
            TelemetryError::SourceNotFound(_) => StatusCode::NOT_FOUND,
            TelemetryError::SourceNotIngestable { .. } => StatusCode::CONFLICT,
            // The upstream credential failed, not the caller's own auth
            TelemetryError::AuthFailed => StatusCode::BAD_GATEWAY,
            TelemetryError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            TelemetryError::Storage(_) | TelemetryError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether a caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TelemetryError::UpstreamUnavailable(_))
    }
}

impl IntoResponse for TelemetryError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status_code();
        let code = self.code();

        let (message, error_id) = match &self {
            TelemetryError::Storage(e) => {
                let error_id = Uuid::new_v4();
                tracing::error!(error_id = ?error_id, "Storage error: {}", e);
                ("Internal server error".to_string(), Some(error_id))
            }
            TelemetryError::Internal(e) => {
                let error_id = Uuid::new_v4();
                tracing::error!(error_id = ?error_id, "Internal error: {}", e);
                ("Internal server error".to_string(), Some(error_id))
            }
            other => (other.to_string(), None),
        };

        let mut error_obj = json!({
            "code": code,
            "status": status.as_u16(),
            "message": message,
            "retryable": self.is_retryable(),
        });

        if let Some(error_id) = error_id {
            error_obj["error_id"] = json!(error_id.to_string());
        }

        (status, Json(json!({ "error": error_obj }))).into_response()
    }
}
