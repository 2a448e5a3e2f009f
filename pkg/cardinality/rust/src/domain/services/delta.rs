// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Delta service
//! Compares the newest finalized snapshot against an older one to show which
//! services (or which metrics of a service) gained or lost series.

use crate::domain::ports::SnapshotStore;
use crate::domain::{CardinalityDelta, DeltaWindow, DomainError, Snapshot};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaReport {
    pub window: DeltaWindow,
    pub current: Snapshot,
    /// `None` when no finalized snapshot is old enough
    pub baseline: Option<Snapshot>,
    /// Largest absolute change first
    pub entries: Vec<CardinalityDelta>,
}

pub struct DeltaService {
    store: Arc<dyn SnapshotStore>,
}

impl DeltaService {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    pub async fn service_deltas(&self, window: DeltaWindow) -> Result<DeltaReport, DomainError> {
        let (current, baseline) = self.snapshots_for(window).await?;

        let now = self.service_counts(&current).await?;
        let before = match &baseline {
            Some(baseline) => self.service_counts(baseline).await?,
            None => BTreeMap::new(),
        };

        Ok(DeltaReport {
            window,
            current,
            baseline,
            entries: diff(now, before),
        })
    }

    pub async fn metric_deltas(
        &self,
        window: DeltaWindow,
        service_name: &str,
    ) -> Result<DeltaReport, DomainError> {
        let (current, baseline) = self.snapshots_for(window).await?;

        let now = self.metric_counts(&current, service_name).await?;
        let before = match &baseline {
            Some(baseline) => self.metric_counts(baseline, service_name).await?,
            None => BTreeMap::new(),
        };

        Ok(DeltaReport {
            window,
            current,
            baseline,
            entries: diff(now, before),
        })
    }

    async fn snapshots_for(
        &self,
        window: DeltaWindow,
    ) -> Result<(Snapshot, Option<Snapshot>), DomainError> {
        let current = self
            .store
            .latest_snapshot()
            .await?
            .ok_or_else(|| DomainError::SnapshotNotFound("no finalized snapshot".to_string()))?;

        let cutoff = current.collected_at - window.duration();
        let baseline = self.store.snapshot_at_or_before(cutoff).await?;
        debug!(
            window = ?window,
            current = %current.id,
            baseline = ?baseline.as_ref().map(|s| s.id.get()),
            "Resolved delta snapshots"
        );
        Ok((current, baseline))
    }

    async fn service_counts(&self, snapshot: &Snapshot) -> Result<BTreeMap<String, u64>, DomainError> {
        Ok(self
            .store
            .list_services(snapshot.id)
            .await?
            .into_iter()
            .map(|s| (s.service_name, s.total_series))
            .collect())
    }

    async fn metric_counts(
        &self,
        snapshot: &Snapshot,
        service_name: &str,
    ) -> Result<BTreeMap<String, u64>, DomainError> {
        Ok(self
            .store
            .list_metrics(snapshot.id, service_name)
            .await?
            .into_iter()
            .map(|m| (m.metric_name, m.series_count))
            .collect())
    }
}

fn diff(current: BTreeMap<String, u64>, mut previous: BTreeMap<String, u64>) -> Vec<CardinalityDelta> {
    let mut entries: Vec<CardinalityDelta> = current
        .into_iter()
        .map(|(name, count)| {
            let before = previous.remove(&name);
            CardinalityDelta::new(name, Some(count), before)
        })
        .collect();
    entries.extend(
        previous
            .into_iter()
            .map(|(name, count)| CardinalityDelta::new(name, None, Some(count))),
    );

    entries.sort_by(|a, b| {
        b.change
            .unsigned_abs()
            .cmp(&a.change.unsigned_abs())
            .then_with(|| a.name.cmp(&b.name))
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewMetricSnapshot, NewServiceSnapshot, SnapshotSummary};
    use crate::infrastructure::SqliteSnapshotStore;
    use std::time::Duration;
    use time::OffsetDateTime;
    use time::macros::datetime;

    fn counts(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
        pairs.iter().map(|(n, c)| (n.to_string(), *c)).collect()
    }

    async fn finalized_snapshot(
        store: &SqliteSnapshotStore,
        at: OffsetDateTime,
        services: &[(&str, u64)],
    ) -> Snapshot {
        let id = store.create_snapshot(at).await.unwrap();
        for (name, series) in services {
            let service_id = store
                .insert_service(
                    id,
                    &NewServiceSnapshot {
                        service_name: name.to_string(),
                        total_series: *series,
                        metric_count: 1,
                    },
                )
                .await
                .unwrap();
            store
                .insert_metric(
                    service_id,
                    &NewMetricSnapshot {
                        metric_name: "up".to_string(),
                        series_count: *series,
                        label_count: 0,
                    },
                    &[],
                )
                .await
                .unwrap();
        }
        store
            .finalize_snapshot(
                id,
                &SnapshotSummary {
                    scan_duration: Duration::from_secs(1),
                    total_services: services.len() as u64,
                    total_series: services.iter().map(|(_, s)| s).sum(),
                    service_errors: 0,
                    metric_errors: 0,
                },
            )
            .await
            .unwrap();
        store.get_snapshot(id).await.unwrap().unwrap()
    }

    #[test]
    fn test_diff_orders_by_absolute_change() {
        let entries = diff(
            counts(&[("api", 100), ("db", 40), ("new", 5)]),
            counts(&[("api", 90), ("db", 70), ("gone", 20)]),
        );

        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["db", "gone", "api", "new"]);
        assert_eq!(entries[0].change, -30);
        assert!(entries[1].is_removed());
        assert!(entries[3].is_new());
    }

    #[test]
    fn test_diff_ties_break_by_name() {
        let entries = diff(counts(&[("b", 10), ("a", 10)]), BTreeMap::new());
        assert_eq!(entries[0].name, "a");
        assert_eq!(entries[1].name, "b");
    }

    #[tokio::test]
    async fn test_no_snapshot_is_not_found() {
        let store = Arc::new(SqliteSnapshotStore::open_in_memory().await.unwrap());
        let delta = DeltaService::new(store);
        let err = delta.service_deltas(DeltaWindow::Day).await.unwrap_err();
        assert!(matches!(err, DomainError::SnapshotNotFound(_)));
    }

    #[tokio::test]
    async fn test_service_deltas_against_week_old_baseline() {
        let store = Arc::new(SqliteSnapshotStore::open_in_memory().await.unwrap());
        let old = finalized_snapshot(
            &store,
            datetime!(2026-03-01 00:00:00 UTC),
            &[("api", 100), ("batch", 10)],
        )
        .await;
        // Too recent to be a week-old baseline
        finalized_snapshot(
            &store,
            datetime!(2026-03-05 00:00:00 UTC),
            &[("api", 500)],
        )
        .await;
        finalized_snapshot(
            &store,
            datetime!(2026-03-08 00:00:00 UTC),
            &[("api", 130), ("search", 50)],
        )
        .await;

        let delta = DeltaService::new(store);
        let report = delta.service_deltas(DeltaWindow::Week).await.unwrap();

        assert_eq!(report.baseline.as_ref().map(|s| s.id), Some(old.id));
        let by_name: BTreeMap<_, _> = report
            .entries
            .iter()
            .map(|e| (e.name.as_str(), e.change))
            .collect();
        assert_eq!(by_name["search"], 50);
        assert_eq!(by_name["api"], 30);
        assert_eq!(by_name["batch"], -10);
    }

    #[tokio::test]
    async fn test_metric_deltas_without_baseline() {
        let store = Arc::new(SqliteSnapshotStore::open_in_memory().await.unwrap());
        finalized_snapshot(&store, datetime!(2026-03-08 00:00:00 UTC), &[("api", 42)]).await;

        let delta = DeltaService::new(store);
        let report = delta.metric_deltas(DeltaWindow::Month, "api").await.unwrap();

        assert!(report.baseline.is_none());
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].name, "up");
        assert_eq!(report.entries[0].previous, None);
        assert_eq!(report.entries[0].change, 42);
    }
}
