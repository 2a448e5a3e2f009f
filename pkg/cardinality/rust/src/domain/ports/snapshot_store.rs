// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Repository port for the snapshot tree
//! This is an interface - implementations are in infrastructure layer

use crate::domain::{
    DomainError, LabelSnapshot, MetricSnapshot, MetricSnapshotId, NewLabelSnapshot,
    NewMetricSnapshot, NewServiceSnapshot, ServiceSnapshot, ServiceSnapshotId, Snapshot,
    SnapshotId, SnapshotSummary,
};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Append-only persistence for scan results.
///
/// Rows are final the moment a write returns. There are no update operations for
/// child rows; the root row is updated exactly once by `finalize_snapshot`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Create an empty, unfinalized snapshot row
    async fn create_snapshot(&self, collected_at: OffsetDateTime)
    -> Result<SnapshotId, DomainError>;

    /// Write the scan's totals. Fails with `InvalidState` if already finalized.
    async fn finalize_snapshot(
        &self,
        id: SnapshotId,
        summary: &SnapshotSummary,
    ) -> Result<(), DomainError>;

    async fn insert_service(
        &self,
        snapshot_id: SnapshotId,
        service: &NewServiceSnapshot,
    ) -> Result<ServiceSnapshotId, DomainError>;

    /// Write one metric row and its label rows as a single batch
    async fn insert_metric(
        &self,
        service_snapshot_id: ServiceSnapshotId,
        metric: &NewMetricSnapshot,
        labels: &[NewLabelSnapshot],
    ) -> Result<MetricSnapshotId, DomainError>;

    /// Delete one snapshot and every descendant row. Returns false if it did not exist.
    async fn delete_snapshot(&self, id: SnapshotId) -> Result<bool, DomainError>;

    /// Delete every snapshot collected strictly before `cutoff`, with descendants.
    /// Returns the number of snapshots removed.
    async fn delete_snapshots_before(&self, cutoff: OffsetDateTime) -> Result<u64, DomainError>;

    async fn get_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>, DomainError>;

    /// Most recent finalized snapshot
    async fn latest_snapshot(&self) -> Result<Option<Snapshot>, DomainError>;

    /// Most recent finalized snapshot collected at or before `at`
    async fn snapshot_at_or_before(
        &self,
        at: OffsetDateTime,
    ) -> Result<Option<Snapshot>, DomainError>;

    /// Snapshots, newest first, finalized or not
    async fn list_snapshots(&self, limit: u32) -> Result<Vec<Snapshot>, DomainError>;

    async fn list_services(
        &self,
        snapshot_id: SnapshotId,
    ) -> Result<Vec<ServiceSnapshot>, DomainError>;

    async fn list_metrics(
        &self,
        snapshot_id: SnapshotId,
        service_name: &str,
    ) -> Result<Vec<MetricSnapshot>, DomainError>;

    async fn list_labels(
        &self,
        snapshot_id: SnapshotId,
        service_name: &str,
        metric_name: &str,
    ) -> Result<Vec<LabelSnapshot>, DomainError>;
}
