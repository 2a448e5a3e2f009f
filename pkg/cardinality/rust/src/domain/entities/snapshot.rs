// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Snapshot tree rows
//!
//! Snapshot → ServiceSnapshot → MetricSnapshot → LabelSnapshot. Every non-root row
//! has exactly one parent and is never modified after it is written. Only the
//! root Snapshot row is updated, once, when the scan is finalized.

use crate::domain::value_objects::{
    LabelCardinality, MetricCardinality, MetricSnapshotId, ServiceCardinality, ServiceSnapshotId,
    SnapshotId,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

/// One scan. Created empty at scan start and finalized at scan end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    /// Scan start, truncated to whole seconds
    #[serde(with = "time::serde::rfc3339")]
    pub collected_at: OffsetDateTime,
    pub scan_duration: Duration,
    pub total_services: u64,
    pub total_series: u64,
    pub service_errors: u64,
    pub metric_errors: u64,
    pub finalized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub id: ServiceSnapshotId,
    pub snapshot_id: SnapshotId,
    pub service_name: String,
    pub total_series: u64,
    pub metric_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub id: MetricSnapshotId,
    pub service_snapshot_id: ServiceSnapshotId,
    pub metric_name: String,
    pub series_count: u64,
    pub label_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSnapshot {
    pub id: i64,
    pub metric_snapshot_id: MetricSnapshotId,
    pub label_name: String,
    pub unique_values: u64,
    pub sample_values: Vec<String>,
}

/// Totals written to the root row when a scan finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub scan_duration: Duration,
    pub total_services: u64,
    pub total_series: u64,
    pub service_errors: u64,
    pub metric_errors: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewServiceSnapshot {
    pub service_name: String,
    pub total_series: u64,
    pub metric_count: u64,
}

impl NewServiceSnapshot {
    /// Counts come from the discovery calls, never from summing children.
    pub fn from_discovery(service: &ServiceCardinality, metrics: &[MetricCardinality]) -> Self {
        Self {
            service_name: service.name.clone(),
            total_series: service.series_count,
            metric_count: metrics.len() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMetricSnapshot {
    pub metric_name: String,
    pub series_count: u64,
    pub label_count: u64,
}

impl NewMetricSnapshot {
    pub fn from_discovery(metric: &MetricCardinality, labels: &[LabelCardinality]) -> Self {
        Self {
            metric_name: metric.name.clone(),
            series_count: metric.series_count,
            label_count: labels.len() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLabelSnapshot {
    pub label_name: String,
    pub unique_values: u64,
    pub sample_values: Vec<String>,
}

impl From<LabelCardinality> for NewLabelSnapshot {
    fn from(label: LabelCardinality) -> Self {
        Self {
            label_name: label.name,
            unique_values: label.unique_values,
            sample_values: label.sample_values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_counts_come_from_discovery() {
        let service = ServiceCardinality::new("checkout", 100);
        let metrics = vec![
            MetricCardinality::new("http_requests_total", 10),
            MetricCardinality::new("http_request_duration_seconds", 5),
        ];

        let row = NewServiceSnapshot::from_discovery(&service, &metrics);
        assert_eq!(row.service_name, "checkout");
        // Reported total, not 10 + 5
        assert_eq!(row.total_series, 100);
        assert_eq!(row.metric_count, 2);
    }

    #[test]
    fn test_metric_without_labels() {
        let metric = MetricCardinality::new("up", 3);
        let row = NewMetricSnapshot::from_discovery(&metric, &[]);
        assert_eq!(row.label_count, 0);
        assert_eq!(row.series_count, 3);
    }
}
