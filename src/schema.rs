//! Database schema management for `dewguard`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` when a database is configured.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// `telemetry_points` is keyed by `(source_id, ts)`; that primary key is what
/// makes point ingestion an insert-or-replace instead of an append.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS telemetry_sources (
            id          TEXT PRIMARY KEY,
            grow_id     TEXT        NOT NULL,
            source_type TEXT        NOT NULL,
            name        TEXT        NOT NULL,
            timezone    TEXT        NOT NULL,
            config      TEXT        NOT NULL,
            created_at  TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS telemetry_points (
            source_id   TEXT             NOT NULL REFERENCES telemetry_sources (id),
            ts          TIMESTAMPTZ      NOT NULL,
            air_temp_c  DOUBLE PRECISION NOT NULL,
            rh          DOUBLE PRECISION NOT NULL,
            dew_point_c DOUBLE PRECISION,
            updated_at  TIMESTAMPTZ      NOT NULL DEFAULT now(),
            PRIMARY KEY (source_id, ts)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_telemetry_sources_grow_id
            ON telemetry_sources (grow_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
