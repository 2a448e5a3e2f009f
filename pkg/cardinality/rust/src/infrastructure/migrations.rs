// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Versioned schema for the snapshot database

use crate::domain::DomainError;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, instrument};

pub const SCHEMA_VERSION: i64 = 1;

fn migration_failed(e: sqlx::Error) -> DomainError {
    DomainError::Storage(format!("migration failed: {e}"))
}

#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> Result<(), DomainError> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)")
        .execute(pool)
        .await
        .map_err(migration_failed)?;

    let current: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(migration_failed)?;
    let current = current.unwrap_or(0);

    if current >= SCHEMA_VERSION {
        debug!(version = current, "Snapshot schema is up to date");
        return Ok(());
    }

    info!(from = current, to = SCHEMA_VERSION, "Migrating snapshot schema");
    let mut tx = pool.begin().await.map_err(migration_failed)?;
    if current < 1 {
        migrate_to_v1(&mut tx).await?;
    }
    sqlx::query("DELETE FROM schema_version")
        .execute(&mut *tx)
        .await
        .map_err(migration_failed)?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(&mut *tx)
        .await
        .map_err(migration_failed)?;
    tx.commit().await.map_err(migration_failed)?;
    Ok(())
}

async fn migrate_to_v1(tx: &mut Transaction<'_, Sqlite>) -> Result<(), DomainError> {
    const STATEMENTS: &[&str] = &[
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            collected_at INTEGER NOT NULL,
            scan_duration_ms INTEGER NOT NULL DEFAULT 0,
            total_services INTEGER NOT NULL DEFAULT 0,
            total_series INTEGER NOT NULL DEFAULT 0,
            service_errors INTEGER NOT NULL DEFAULT 0,
            metric_errors INTEGER NOT NULL DEFAULT 0,
            finalized INTEGER NOT NULL DEFAULT 0
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_snapshots_collected_at ON snapshots(collected_at)",
        r#"
        CREATE TABLE IF NOT EXISTS service_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_id INTEGER NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
            service_name TEXT NOT NULL,
            total_series INTEGER NOT NULL,
            metric_count INTEGER NOT NULL,
            UNIQUE(snapshot_id, service_name)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS metric_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service_snapshot_id INTEGER NOT NULL REFERENCES service_snapshots(id) ON DELETE CASCADE,
            metric_name TEXT NOT NULL,
            series_count INTEGER NOT NULL,
            label_count INTEGER NOT NULL,
            UNIQUE(service_snapshot_id, metric_name)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS label_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            metric_snapshot_id INTEGER NOT NULL REFERENCES metric_snapshots(id) ON DELETE CASCADE,
            label_name TEXT NOT NULL,
            unique_values INTEGER NOT NULL,
            sample_values TEXT NOT NULL DEFAULT '[]',
            UNIQUE(metric_snapshot_id, label_name)
        )
        "#,
    ];

    info!("Running migration to schema version 1");
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(&mut **tx)
            .await
            .map_err(migration_failed)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        run(&pool).await.unwrap();
        run(&pool).await.unwrap();

        let version: i64 = sqlx::query_scalar("SELECT version FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE '%snapshots' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(
            tables,
            vec![
                "label_snapshots",
                "metric_snapshots",
                "service_snapshots",
                "snapshots"
            ]
        );
    }
}
