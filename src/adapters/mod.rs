//! Device adapters: pull-based ingestion for sources backed by a third-party
//! monitoring API.
//!
//! An adapter can check a credential, list the devices behind it, and fetch a
//! window of readings. [`DeviceAdapter::pull_window`] feeds those readings
//! through the store's device ingestion path, which uses the same keyed
//! upsert as manual ingestion, so overlapping pulls never duplicate points.
//!
//! Calls are bounded by the caller's timeout and are never retried here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::TelemetryError;
use crate::models::{parse_instant, DecodedRow, IngestSummary, SourceConfig, SourceType};
use crate::store::TelemetryStore;

mod pulse;

pub use pulse::PulseAdapter;

// ---

/// A device visible to a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// The source type this adapter serves.
    fn source_type(&self) -> SourceType;

    /// Check that `secret` is accepted upstream.
    async fn verify_credential(&self, secret: &str) -> Result<(), TelemetryError>;

    /// Devices behind `secret`. An empty list is a valid answer.
    async fn list_devices(&self, secret: &str) -> Result<Vec<Device>, TelemetryError>;

    /// Fetch readings for `[start, end]` using the source's config. Upstream
    /// items that cannot be read come back as `Err` rows so the pull summary
    /// accounts for them.
    async fn fetch_window(
        &self,
        config: &SourceConfig,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DecodedRow>, TelemetryError>;

    /// Fetch a window for `source_id` and upsert it into the store.
    async fn pull_window(
        &self,
        store: &TelemetryStore,
        source_id: &str,
        start_iso: &str,
        end_iso: &str,
        timeout: Duration,
    ) -> Result<IngestSummary, TelemetryError> {
        // ---
        let start = parse_instant(start_iso).map_err(TelemetryError::Validation)?;
        let end = parse_instant(end_iso).map_err(TelemetryError::Validation)?;
        if start > end {
            return Err(TelemetryError::validation(format!(
                "Window start {start_iso} is after end {end_iso}"
            )));
        }

        let source = store.get_source(source_id).await?;
        if source.source_type != self.source_type() {
            return Err(TelemetryError::validation(format!(
                "Source {} is of type '{}', not '{}'",
                source.id,
                source.source_type,
                self.source_type()
            )));
        }

        let readings = match tokio::time::timeout(
            timeout,
            self.fetch_window(&source.config, start, end),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(source_id, ?timeout, "Device pull timed out");
                return Err(TelemetryError::UpstreamUnavailable(format!(
                    "timed out after {}s",
                    timeout.as_secs_f64()
                )));
            }
        };

        info!(source_id, fetched = readings.len(), "Fetched device window");
        store.ingest_device_points(&source, &readings).await
    }
}

/// The adapters available to the service, one per device-backed source type.
#[derive(Clone)]
pub struct DeviceAdapters {
    pub pulse: Arc<dyn DeviceAdapter>,
}

impl DeviceAdapters {
    pub fn new(pulse: Arc<dyn DeviceAdapter>) -> Self {
        Self { pulse }
    }

    /// Adapter for a source type; `None` for types that take direct ingestion.
    pub fn for_source_type(&self, source_type: SourceType) -> Option<&dyn DeviceAdapter> {
        match source_type {
            SourceType::PulseDevice => Some(self.pulse.as_ref()),
            SourceType::Manual | SourceType::Upload => None,
        }
    }
}
