//! In-memory repository, used when no database is configured and in tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{TelemetryRepository, UpsertOutcome};
use crate::errors::TelemetryError;
use crate::models::{IngestMode, TelemetryPoint, TelemetrySource};

// ---

#[derive(Default)]
pub struct MemoryRepository {
    sources: RwLock<HashMap<String, TelemetrySource>>,
    // Points per source, keyed and ordered by timestamp
    points: RwLock<HashMap<String, BTreeMap<DateTime<Utc>, TelemetryPoint>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TelemetryRepository for MemoryRepository {
    async fn insert_source(&self, source: &TelemetrySource) -> Result<(), TelemetryError> {
        // ---
        let mut sources = self.sources.write().await;
        if sources.contains_key(&source.id) {
            return Err(TelemetryError::validation(format!(
                "Source id {} already exists",
                source.id
            )));
        }
        sources.insert(source.id.clone(), source.clone());
        Ok(())
    }

    async fn find_source(&self, id: &str) -> Result<Option<TelemetrySource>, TelemetryError> {
        Ok(self.sources.read().await.get(id).cloned())
    }

    async fn list_sources_by_grow(
        &self,
        grow_id: &str,
    ) -> Result<Vec<TelemetrySource>, TelemetryError> {
        // ---
        let mut found: Vec<TelemetrySource> = self
            .sources
            .read()
            .await
            .values()
            .filter(|s| s.grow_id == grow_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn upsert_point(
        &self,
        point: &TelemetryPoint,
        mode: IngestMode,
    ) -> Result<UpsertOutcome, TelemetryError> {
        // ---
        // One write lock per row: concurrent writers to the same key serialize
        // here and the last one to acquire it wins.
        let mut points = self.points.write().await;
        let series = points.entry(point.source_id.clone()).or_default();

        let outcome = match (series.contains_key(&point.ts), mode) {
            (false, _) => UpsertOutcome::Inserted,
            (true, IngestMode::Upsert) => UpsertOutcome::Updated,
            (true, IngestMode::SkipExisting) => return Ok(UpsertOutcome::Unchanged),
        };
        series.insert(point.ts, point.clone());
        Ok(outcome)
    }

    async fn points_in_range(
        &self,
        source_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TelemetryPoint>, TelemetryError> {
        // ---
        let points = self.points.read().await;
        let Some(series) = points.get(source_id) else {
            return Ok(Vec::new());
        };
        Ok(series
            .range(start..=end)
            .map(|(_, p)| p.clone())
            .take(limit)
            .collect())
    }

    async fn count_points(&self, source_id: &str) -> Result<u64, TelemetryError> {
        Ok(self
            .points
            .read()
            .await
            .get(source_id)
            .map_or(0, |series| series.len() as u64))
    }
}
