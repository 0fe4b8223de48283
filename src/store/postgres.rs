//! PostgreSQL repository. Tables are created by `schema::create_schema`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{TelemetryRepository, UpsertOutcome};
use crate::errors::TelemetryError;
use crate::models::{IngestMode, SourceConfig, SourceType, TelemetryPoint, TelemetrySource};

// ---

pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Row shape of `telemetry_sources`; `config` is stored as JSON text.
#[derive(sqlx::FromRow)]
struct SourceRow {
    id: String,
    grow_id: String,
    source_type: String,
    name: String,
    timezone: String,
    config: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SourceRow> for TelemetrySource {
    type Error = TelemetryError;

    fn try_from(row: SourceRow) -> Result<Self, Self::Error> {
        // ---
        let source_type = SourceType::parse(&row.source_type)?;
        let config: SourceConfig = serde_json::from_str(&row.config).map_err(|e| {
            anyhow::anyhow!("Corrupt config for source {}: {}", row.id, e)
        })?;

        Ok(TelemetrySource {
            id: row.id,
            grow_id: row.grow_id,
            source_type,
            name: row.name,
            timezone: row.timezone,
            config,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl TelemetryRepository for PgRepository {
    async fn insert_source(&self, source: &TelemetrySource) -> Result<(), TelemetryError> {
        // ---
        let config = serde_json::to_string(&source.config).map_err(anyhow::Error::from)?;

        sqlx::query(
            r#"
            INSERT INTO telemetry_sources (
                id, grow_id, source_type, name, timezone, config, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&source.id)
        .bind(&source.grow_id)
        .bind(source.source_type.as_str())
        .bind(&source.name)
        .bind(&source.timezone)
        .bind(config)
        .bind(source.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_source(&self, id: &str) -> Result<Option<TelemetrySource>, TelemetryError> {
        // ---
        let row: Option<SourceRow> = sqlx::query_as(
            r#"
            SELECT id, grow_id, source_type, name, timezone, config, created_at
            FROM telemetry_sources
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TelemetrySource::try_from).transpose()
    }

    async fn list_sources_by_grow(
        &self,
        grow_id: &str,
    ) -> Result<Vec<TelemetrySource>, TelemetryError> {
        // ---
        let rows: Vec<SourceRow> = sqlx::query_as(
            r#"
            SELECT id, grow_id, source_type, name, timezone, config, created_at
            FROM telemetry_sources
            WHERE grow_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(grow_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TelemetrySource::try_from).collect()
    }

    async fn upsert_point(
        &self,
        point: &TelemetryPoint,
        mode: IngestMode,
    ) -> Result<UpsertOutcome, TelemetryError> {
        // ---
        match mode {
            IngestMode::Upsert => {
                // xmax is 0 only for a freshly inserted tuple
                let inserted: bool = sqlx::query_scalar(
                    r#"
                    INSERT INTO telemetry_points (
                        source_id, ts, air_temp_c, rh, dew_point_c
                    ) VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (source_id, ts) DO UPDATE SET
                        air_temp_c  = EXCLUDED.air_temp_c,
                        rh          = EXCLUDED.rh,
                        dew_point_c = EXCLUDED.dew_point_c,
                        updated_at  = now()
                    RETURNING (xmax = 0) AS inserted
                    "#,
                )
                .bind(&point.source_id)
                .bind(point.ts)
                .bind(point.air_temp_c)
                .bind(point.rh)
                .bind(point.dew_point_c)
                .fetch_one(&self.pool)
                .await?;

                Ok(if inserted {
                    UpsertOutcome::Inserted
                } else {
                    UpsertOutcome::Updated
                })
            }
            IngestMode::SkipExisting => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO telemetry_points (
                        source_id, ts, air_temp_c, rh, dew_point_c
                    ) VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (source_id, ts) DO NOTHING
                    "#,
                )
                .bind(&point.source_id)
                .bind(point.ts)
                .bind(point.air_temp_c)
                .bind(point.rh)
                .bind(point.dew_point_c)
                .execute(&self.pool)
                .await?;

                Ok(if result.rows_affected() == 1 {
                    UpsertOutcome::Inserted
                } else {
                    UpsertOutcome::Unchanged
                })
            }
        }
    }

    async fn points_in_range(
        &self,
        source_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TelemetryPoint>, TelemetryError> {
        // ---
        let points: Vec<TelemetryPoint> = sqlx::query_as(
            r#"
            SELECT source_id, ts, air_temp_c, rh, dew_point_c
            FROM telemetry_points
            WHERE source_id = $1 AND ts >= $2 AND ts <= $3
            ORDER BY ts ASC
            LIMIT $4
            "#,
        )
        .bind(source_id)
        .bind(start)
        .bind(end)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(points)
    }

    async fn count_points(&self, source_id: &str) -> Result<u64, TelemetryError> {
        // ---
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM telemetry_points WHERE source_id = $1")
                .bind(source_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }
}
