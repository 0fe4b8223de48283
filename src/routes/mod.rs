use axum::Router;
use chrono::{Duration, SecondsFormat, Utc};

use crate::errors::TelemetryError;
use crate::AppState;
use json::ValidJson;

mod health;
mod json;
mod points;
mod pulse;
mod risk;
mod sources;

// ---

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(sources::router())
        .merge(points::router())
        .merge(pulse::router())
        .merge(risk::router())
        .merge(health::router())
        .with_state(state)
}

/// Resolve an optional `[start, end]` window to ISO strings.
///
/// `end` defaults to now and `start` to 24 hours before `end`.
fn resolve_window(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(String, String), TelemetryError> {
    // ---
    let end = match end {
        Some(end) => end.to_string(),
        None => Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    let start = match start {
        Some(start) => start.to_string(),
        None => {
            let end_ts = crate::models::parse_instant(&end).map_err(TelemetryError::Validation)?;
            (end_ts - Duration::hours(24)).to_rfc3339_opts(SecondsFormat::Secs, true)
        }
    };
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_resolve_window_defaults() {
        // ---
        let (start, end) = resolve_window(None, Some("2025-06-02T00:00:00Z")).unwrap();
        assert_eq!(start, "2025-06-01T00:00:00Z");
        assert_eq!(end, "2025-06-02T00:00:00Z");

        let (start, _) = resolve_window(Some("2025-05-01T00:00:00Z"), None).unwrap();
        assert_eq!(start, "2025-05-01T00:00:00Z");

        assert!(resolve_window(None, Some("tomorrow")).is_err());
    }
}
