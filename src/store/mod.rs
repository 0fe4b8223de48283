//! Telemetry store: sources, points and the ingestion rules around them.
//!
//! `TelemetryStore` owns the rules (which source types accept direct
//! ingestion, per-row validation, window bounds, result caps). Persistence
//! sits behind [`TelemetryRepository`], with a PostgreSQL backend and an
//! in-memory backend. Both express "one point per `(source_id, ts)`" as an
//! insert-or-replace on that key, never as read-then-write.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::TelemetryError;
use crate::models::{
    parse_instant, DecodedRow, IngestMode, IngestSummary, NewSource, PointInput, PulseConfig,
    RowRejection, SourceConfig, SourceType, TelemetryPoint, TelemetrySource,
};
use serde_json::Value;

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

/// Default cap on points returned from a single window query.
pub const DEFAULT_POINTS_LIMIT: usize = 5000;

/// Default timezone for sources created without one.
pub const DEFAULT_TIMEZONE: &str = "UTC";

// ---

/// What a single keyed write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Key existed and the mode left it untouched.
    Unchanged,
}

/// Persistence seam for sources and points.
#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    async fn insert_source(&self, source: &TelemetrySource) -> Result<(), TelemetryError>;

    async fn find_source(&self, id: &str) -> Result<Option<TelemetrySource>, TelemetryError>;

    /// Sources of a grow, oldest first.
    async fn list_sources_by_grow(
        &self,
        grow_id: &str,
    ) -> Result<Vec<TelemetrySource>, TelemetryError>;

    /// Write one point keyed by `(source_id, ts)` in a single atomic step.
    async fn upsert_point(
        &self,
        point: &TelemetryPoint,
        mode: IngestMode,
    ) -> Result<UpsertOutcome, TelemetryError>;

    /// Points with `start <= ts <= end`, ascending, at most `limit`.
    async fn points_in_range(
        &self,
        source_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TelemetryPoint>, TelemetryError>;

    async fn count_points(&self, source_id: &str) -> Result<u64, TelemetryError>;
}

/// Rule-enforcing front of the telemetry repository.
#[derive(Clone)]
pub struct TelemetryStore {
    repo: Arc<dyn TelemetryRepository>,
    max_limit: usize,
}

impl TelemetryStore {
    pub fn new(repo: Arc<dyn TelemetryRepository>) -> Self {
        Self {
            repo,
            max_limit: DEFAULT_POINTS_LIMIT,
        }
    }

    /// Store backed by a fresh in-memory repository.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRepository::new()))
    }

    /// Override the hard cap applied to `get_points`.
    pub fn with_max_limit(mut self, max_limit: usize) -> Self {
        self.max_limit = max_limit.max(1);
        self
    }

    pub fn max_limit(&self) -> usize {
        self.max_limit
    }

    // --- sources

    /// Create a source after validating its fields.
    pub async fn create_source(&self, new: NewSource) -> Result<TelemetrySource, TelemetryError> {
        // ---
        let grow_id = new.grow_id.trim();
        if grow_id.is_empty() {
            return Err(TelemetryError::validation("growId is required"));
        }
        let name = new.name.trim();
        if name.is_empty() {
            return Err(TelemetryError::validation("name is required"));
        }

        match (new.source_type, &new.config.pulse) {
            (SourceType::PulseDevice, None) => {
                return Err(TelemetryError::validation(
                    "pulse-device sources require config.pulse",
                ))
            }
            (SourceType::Manual | SourceType::Upload, Some(_)) => {
                return Err(TelemetryError::validation(format!(
                    "config must be empty for {} sources",
                    new.source_type
                )))
            }
            _ => {}
        }

        let timezone = new
            .timezone
            .as_deref()
            .map(str::trim)
            .filter(|tz| !tz.is_empty())
            .unwrap_or(DEFAULT_TIMEZONE)
            .to_string();

        let source = TelemetrySource {
            id: Uuid::new_v4().to_string(),
            grow_id: grow_id.to_string(),
            source_type: new.source_type,
            name: name.to_string(),
            timezone,
            config: new.config,
            created_at: Utc::now(),
        };

        self.repo.insert_source(&source).await?;

        info!(
            source_id = %source.id,
            grow_id = %source.grow_id,
            source_type = %source.source_type,
            "Created telemetry source"
        );
        Ok(source)
    }

    pub async fn create_manual_source(
        &self,
        grow_id: &str,
        name: &str,
        timezone: Option<&str>,
    ) -> Result<TelemetrySource, TelemetryError> {
        self.create_source(NewSource {
            grow_id: grow_id.to_string(),
            source_type: SourceType::Manual,
            name: name.to_string(),
            timezone: timezone.map(String::from),
            config: SourceConfig::default(),
        })
        .await
    }

    pub async fn create_upload_source(
        &self,
        grow_id: &str,
        name: &str,
        timezone: Option<&str>,
    ) -> Result<TelemetrySource, TelemetryError> {
        self.create_source(NewSource {
            grow_id: grow_id.to_string(),
            source_type: SourceType::Upload,
            name: name.to_string(),
            timezone: timezone.map(String::from),
            config: SourceConfig::default(),
        })
        .await
    }

    pub async fn create_pulse_source(
        &self,
        grow_id: &str,
        name: &str,
        timezone: Option<&str>,
        pulse: PulseConfig,
    ) -> Result<TelemetrySource, TelemetryError> {
        self.create_source(NewSource {
            grow_id: grow_id.to_string(),
            source_type: SourceType::PulseDevice,
            name: name.to_string(),
            timezone: timezone.map(String::from),
            config: SourceConfig::pulse(pulse)?,
        })
        .await
    }

    pub async fn list_sources(
        &self,
        grow_id: &str,
    ) -> Result<Vec<TelemetrySource>, TelemetryError> {
        // ---
        if grow_id.trim().is_empty() {
            return Err(TelemetryError::validation("growId is required"));
        }
        self.repo.list_sources_by_grow(grow_id).await
    }

    pub async fn get_source(&self, source_id: &str) -> Result<TelemetrySource, TelemetryError> {
        self.repo
            .find_source(source_id)
            .await?
            .ok_or_else(|| TelemetryError::SourceNotFound(source_id.to_string()))
    }

    // --- points

    /// Ingest caller-supplied points into a manual or upload source.
    ///
    /// Device-backed sources are refused before the payload is inspected.
    /// Rows are decoded one at a time, so a malformed or invalid row is
    /// skipped and reported while the rest of the batch is kept.
    pub async fn ingest_points(
        &self,
        source_id: &str,
        mode: IngestMode,
        rows: &[Value],
    ) -> Result<IngestSummary, TelemetryError> {
        // ---
        let source = self.get_source(source_id).await?;
        if !source.source_type.accepts_direct_ingest() {
            return Err(TelemetryError::SourceNotIngestable {
                source_id: source.id,
                source_type: source.source_type.as_str(),
            });
        }

        let decoded: Vec<DecodedRow> = rows.iter().map(PointInput::from_row).collect();
        let summary = self.write_batch(&source.id, mode, &decoded).await?;
        info!(
            source_id = %source.id,
            ingested = summary.ingested,
            updated = summary.updated,
            skipped = summary.skipped,
            "Ingested points"
        );
        Ok(summary)
    }

    /// Ingestion path reserved for device adapters.
    pub(crate) async fn ingest_device_points(
        &self,
        source: &TelemetrySource,
        rows: &[DecodedRow],
    ) -> Result<IngestSummary, TelemetryError> {
        // ---
        if source.source_type.accepts_direct_ingest() {
            return Err(TelemetryError::validation(format!(
                "Source {} of type '{}' has no device adapter",
                source.id, source.source_type
            )));
        }

        let summary = self
            .write_batch(&source.id, IngestMode::Upsert, rows)
            .await?;
        info!(
            source_id = %source.id,
            ingested = summary.ingested,
            updated = summary.updated,
            skipped = summary.skipped,
            "Stored device points"
        );
        Ok(summary)
    }

    async fn write_batch(
        &self,
        source_id: &str,
        mode: IngestMode,
        rows: &[DecodedRow],
    ) -> Result<IngestSummary, TelemetryError> {
        // ---
        let mut summary = IngestSummary::default();

        for (index, row) in rows.iter().enumerate() {
            let checked = row
                .as_ref()
                .map_err(String::clone)
                .and_then(|input| input.validate(source_id));
            let point = match checked {
                Ok(point) => point,
                Err(message) => {
                    debug!(source_id, index, "Rejected row: {}", message);
                    summary.skipped += 1;
                    summary.rejected.push(RowRejection {
                        index,
                        code: "VALIDATION_ERROR".to_string(),
                        message,
                    });
                    continue;
                }
            };

            match self.repo.upsert_point(&point, mode).await? {
                UpsertOutcome::Inserted => summary.ingested += 1,
                UpsertOutcome::Updated => summary.updated += 1,
                UpsertOutcome::Unchanged => summary.skipped += 1,
            }
        }

        Ok(summary)
    }

    /// Points of a source within `[start_iso, end_iso]`, ascending by `ts`.
    ///
    /// `limit` is capped at the store's maximum; `None` means the maximum and
    /// `Some(0)` returns no points.
    pub async fn get_points(
        &self,
        source_id: &str,
        start_iso: &str,
        end_iso: &str,
        limit: Option<usize>,
    ) -> Result<Vec<TelemetryPoint>, TelemetryError> {
        // ---
        let start = parse_instant(start_iso).map_err(TelemetryError::Validation)?;
        let end = parse_instant(end_iso).map_err(TelemetryError::Validation)?;
        if start > end {
            return Err(TelemetryError::validation(format!(
                "Window start {start_iso} is after end {end_iso}"
            )));
        }

        let source = self.get_source(source_id).await?;
        let limit = limit.unwrap_or(self.max_limit).min(self.max_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let points = self
            .repo
            .points_in_range(&source.id, start, end, limit)
            .await?;
        debug!(source_id, count = points.len(), limit, "Loaded points");
        Ok(points)
    }

    pub async fn count_points(&self, source_id: &str) -> Result<u64, TelemetryError> {
        self.repo.count_points(source_id).await
    }
}
