// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! SQLite implementation of the SnapshotStore port

use super::migrations;
use crate::domain::ports::SnapshotStore;
use crate::domain::{
    DomainError, LabelSnapshot, MetricSnapshot, MetricSnapshotId, NewLabelSnapshot,
    NewMetricSnapshot, NewServiceSnapshot, ServiceSnapshot, ServiceSnapshotId, Snapshot,
    SnapshotId, SnapshotSummary,
};
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

const SNAPSHOT_COLUMNS: &str = "id, collected_at, scan_duration_ms, total_services, total_series, \
     service_errors, metric_errors, finalized";

fn storage(e: sqlx::Error) -> DomainError {
    DomainError::Storage(e.to_string())
}

/// Snapshot tree persisted in SQLite.
///
/// Writers take `write_lock` so concurrent collector tasks never contend on
/// SQLite's single writer; readers go straight to the pool.
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteSnapshotStore {
    /// Open (or create) the database file and bring its schema up to date
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DomainError::Storage(format!(
                    "failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(storage)?;

        let store = Self::with_pool(pool).await?;
        info!("Snapshot store opened");
        Ok(store)
    }

    /// Private in-memory database on one pinned connection
    pub async fn open_in_memory() -> Result<Self, DomainError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(storage)?
            .foreign_keys(true);

        // Every new connection would get a fresh empty database, so never let it go
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(storage)?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, DomainError> {
        migrations::run(&pool).await?;
        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Labels → metrics → services → snapshots, for every snapshot matching `filter`
    async fn delete_where(
        tx: &mut Transaction<'_, Sqlite>,
        filter: &str,
        value: i64,
    ) -> Result<u64, DomainError> {
        let selected = format!("SELECT id FROM snapshots WHERE {filter}");
        let statements = [
            format!(
                "DELETE FROM label_snapshots WHERE metric_snapshot_id IN (\
                 SELECT m.id FROM metric_snapshots m \
                 JOIN service_snapshots s ON m.service_snapshot_id = s.id \
                 WHERE s.snapshot_id IN ({selected}))"
            ),
            format!(
                "DELETE FROM metric_snapshots WHERE service_snapshot_id IN (\
                 SELECT id FROM service_snapshots WHERE snapshot_id IN ({selected}))"
            ),
            format!("DELETE FROM service_snapshots WHERE snapshot_id IN ({selected})"),
        ];
        for statement in &statements {
            sqlx::query(statement)
                .bind(value)
                .execute(&mut **tx)
                .await
                .map_err(storage)?;
        }

        let deleted = sqlx::query(&format!("DELETE FROM snapshots WHERE {filter}"))
            .bind(value)
            .execute(&mut **tx)
            .await
            .map_err(storage)?
            .rows_affected();
        Ok(deleted)
    }

    async fn snapshot_exists(&self, id: SnapshotId) -> Result<bool, DomainError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM snapshots WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(found.is_some())
    }
}

fn count(row: &SqliteRow, column: &str) -> Result<u64, DomainError> {
    let value: i64 = row.try_get(column).map_err(storage)?;
    u64::try_from(value)
        .map_err(|_| DomainError::Storage(format!("negative value in column {column}: {value}")))
}

fn to_unix(at: OffsetDateTime) -> i64 {
    at.unix_timestamp()
}

fn row_to_snapshot(row: &SqliteRow) -> Result<Snapshot, DomainError> {
    let collected_at: i64 = row.try_get("collected_at").map_err(storage)?;
    let collected_at = OffsetDateTime::from_unix_timestamp(collected_at)
        .map_err(|e| DomainError::Storage(format!("invalid collected_at {collected_at}: {e}")))?;
    let finalized: bool = row.try_get("finalized").map_err(storage)?;

    Ok(Snapshot {
        id: SnapshotId::new(row.try_get("id").map_err(storage)?),
        collected_at,
        scan_duration: Duration::from_millis(count(row, "scan_duration_ms")?),
        total_services: count(row, "total_services")?,
        total_series: count(row, "total_series")?,
        service_errors: count(row, "service_errors")?,
        metric_errors: count(row, "metric_errors")?,
        finalized,
    })
}

fn row_to_service(row: &SqliteRow) -> Result<ServiceSnapshot, DomainError> {
    Ok(ServiceSnapshot {
        id: ServiceSnapshotId::new(row.try_get("id").map_err(storage)?),
        snapshot_id: SnapshotId::new(row.try_get("snapshot_id").map_err(storage)?),
        service_name: row.try_get("service_name").map_err(storage)?,
        total_series: count(row, "total_series")?,
        metric_count: count(row, "metric_count")?,
    })
}

fn row_to_metric(row: &SqliteRow) -> Result<MetricSnapshot, DomainError> {
    Ok(MetricSnapshot {
        id: MetricSnapshotId::new(row.try_get("id").map_err(storage)?),
        service_snapshot_id: ServiceSnapshotId::new(
            row.try_get("service_snapshot_id").map_err(storage)?,
        ),
        metric_name: row.try_get("metric_name").map_err(storage)?,
        series_count: count(row, "series_count")?,
        label_count: count(row, "label_count")?,
    })
}

fn row_to_label(row: &SqliteRow) -> Result<LabelSnapshot, DomainError> {
    let samples: String = row.try_get("sample_values").map_err(storage)?;
    let sample_values = serde_json::from_str(&samples)
        .map_err(|e| DomainError::Storage(format!("invalid sample_values: {e}")))?;

    Ok(LabelSnapshot {
        id: row.try_get("id").map_err(storage)?,
        metric_snapshot_id: MetricSnapshotId::new(
            row.try_get("metric_snapshot_id").map_err(storage)?,
        ),
        label_name: row.try_get("label_name").map_err(storage)?,
        unique_values: count(row, "unique_values")?,
        sample_values,
    })
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    #[instrument(skip(self))]
    async fn create_snapshot(
        &self,
        collected_at: OffsetDateTime,
    ) -> Result<SnapshotId, DomainError> {
        let _guard = self.write_lock.lock().await;
        let id = sqlx::query("INSERT INTO snapshots (collected_at) VALUES (?)")
            .bind(to_unix(collected_at))
            .execute(&self.pool)
            .await
            .map_err(storage)?
            .last_insert_rowid();
        debug!(snapshot_id = id, "Created snapshot");
        Ok(SnapshotId::new(id))
    }

    #[instrument(skip(self, summary), fields(snapshot_id = %id))]
    async fn finalize_snapshot(
        &self,
        id: SnapshotId,
        summary: &SnapshotSummary,
    ) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock().await;
        let updated = sqlx::query(
            r#"
            UPDATE snapshots
            SET scan_duration_ms = ?, total_services = ?, total_series = ?,
                service_errors = ?, metric_errors = ?, finalized = 1
            WHERE id = ? AND finalized = 0
            "#,
        )
        .bind(summary.scan_duration.as_millis() as i64)
        .bind(summary.total_services as i64)
        .bind(summary.total_series as i64)
        .bind(summary.service_errors as i64)
        .bind(summary.metric_errors as i64)
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(storage)?
        .rows_affected();

        if updated == 1 {
            return Ok(());
        }
        if self.snapshot_exists(id).await? {
            Err(DomainError::InvalidState(format!(
                "snapshot {id} is already finalized"
            )))
        } else {
            Err(DomainError::SnapshotNotFound(id.to_string()))
        }
    }

    #[instrument(skip(self, service), fields(snapshot_id = %snapshot_id, service = %service.service_name))]
    async fn insert_service(
        &self,
        snapshot_id: SnapshotId,
        service: &NewServiceSnapshot,
    ) -> Result<ServiceSnapshotId, DomainError> {
        let _guard = self.write_lock.lock().await;
        let id = sqlx::query(
            "INSERT INTO service_snapshots (snapshot_id, service_name, total_series, metric_count) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(snapshot_id.get())
        .bind(&service.service_name)
        .bind(service.total_series as i64)
        .bind(service.metric_count as i64)
        .execute(&self.pool)
        .await
        .map_err(storage)?
        .last_insert_rowid();
        Ok(ServiceSnapshotId::new(id))
    }

    #[instrument(skip(self, metric, labels), fields(service_snapshot_id = %service_snapshot_id, metric = %metric.metric_name))]
    async fn insert_metric(
        &self,
        service_snapshot_id: ServiceSnapshotId,
        metric: &NewMetricSnapshot,
        labels: &[NewLabelSnapshot],
    ) -> Result<MetricSnapshotId, DomainError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let id = sqlx::query(
            "INSERT INTO metric_snapshots (service_snapshot_id, metric_name, series_count, label_count) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(service_snapshot_id.get())
        .bind(&metric.metric_name)
        .bind(metric.series_count as i64)
        .bind(metric.label_count as i64)
        .execute(&mut *tx)
        .await
        .map_err(storage)?
        .last_insert_rowid();

        for label in labels {
            let samples = serde_json::to_string(&label.sample_values)
                .map_err(|e| DomainError::Storage(format!("failed to encode samples: {e}")))?;
            sqlx::query(
                "INSERT INTO label_snapshots (metric_snapshot_id, label_name, unique_values, sample_values) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(&label.label_name)
            .bind(label.unique_values as i64)
            .bind(samples)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(MetricSnapshotId::new(id))
    }

    #[instrument(skip(self, id), fields(snapshot_id = %id))]
    async fn delete_snapshot(&self, id: SnapshotId) -> Result<bool, DomainError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let deleted = Self::delete_where(&mut tx, "id = ?", id.get()).await?;
        tx.commit().await.map_err(storage)?;
        Ok(deleted > 0)
    }

    #[instrument(skip(self, cutoff), fields(cutoff = %cutoff))]
    async fn delete_snapshots_before(&self, cutoff: OffsetDateTime) -> Result<u64, DomainError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let deleted = Self::delete_where(&mut tx, "collected_at < ?", to_unix(cutoff)).await?;
        tx.commit().await.map_err(storage)?;
        Ok(deleted)
    }

    async fn get_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>, DomainError> {
        sqlx::query(&format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = ?"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .as_ref()
            .map(row_to_snapshot)
            .transpose()
    }

    async fn latest_snapshot(&self) -> Result<Option<Snapshot>, DomainError> {
        sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE finalized = 1 \
             ORDER BY collected_at DESC, id DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .as_ref()
        .map(row_to_snapshot)
        .transpose()
    }

    async fn snapshot_at_or_before(
        &self,
        at: OffsetDateTime,
    ) -> Result<Option<Snapshot>, DomainError> {
        sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE finalized = 1 AND collected_at <= ? \
             ORDER BY collected_at DESC, id DESC LIMIT 1"
        ))
        .bind(to_unix(at))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .as_ref()
        .map(row_to_snapshot)
        .transpose()
    }

    async fn list_snapshots(&self, limit: u32) -> Result<Vec<Snapshot>, DomainError> {
        sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots ORDER BY collected_at DESC, id DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .iter()
        .map(row_to_snapshot)
        .collect()
    }

    async fn list_services(
        &self,
        snapshot_id: SnapshotId,
    ) -> Result<Vec<ServiceSnapshot>, DomainError> {
        sqlx::query(
            "SELECT id, snapshot_id, service_name, total_series, metric_count \
             FROM service_snapshots WHERE snapshot_id = ? ORDER BY service_name",
        )
        .bind(snapshot_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .iter()
        .map(row_to_service)
        .collect()
    }

    async fn list_metrics(
        &self,
        snapshot_id: SnapshotId,
        service_name: &str,
    ) -> Result<Vec<MetricSnapshot>, DomainError> {
        sqlx::query(
            "SELECT m.id AS id, m.service_snapshot_id AS service_snapshot_id, m.metric_name AS metric_name, \
             m.series_count AS series_count, m.label_count AS label_count \
             FROM metric_snapshots m \
             JOIN service_snapshots s ON m.service_snapshot_id = s.id \
             WHERE s.snapshot_id = ? AND s.service_name = ? \
             ORDER BY m.metric_name",
        )
        .bind(snapshot_id.get())
        .bind(service_name)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .iter()
        .map(row_to_metric)
        .collect()
    }

    async fn list_labels(
        &self,
        snapshot_id: SnapshotId,
        service_name: &str,
        metric_name: &str,
    ) -> Result<Vec<LabelSnapshot>, DomainError> {
        sqlx::query(
            "SELECT l.id AS id, l.metric_snapshot_id AS metric_snapshot_id, l.label_name AS label_name, \
             l.unique_values AS unique_values, l.sample_values AS sample_values \
             FROM label_snapshots l \
             JOIN metric_snapshots m ON l.metric_snapshot_id = m.id \
             JOIN service_snapshots s ON m.service_snapshot_id = s.id \
             WHERE s.snapshot_id = ? AND s.service_name = ? AND m.metric_name = ? \
             ORDER BY l.label_name",
        )
        .bind(snapshot_id.get())
        .bind(service_name)
        .bind(metric_name)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .iter()
        .map(row_to_label)
        .collect()
    }
}
