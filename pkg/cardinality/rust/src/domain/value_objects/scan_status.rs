// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Scan progress, outcome and scheduler status value objects

use crate::domain::value_objects::{ScanId, SnapshotId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;

/// Coarse stage of a running scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Starting,
    DiscoveringServices,
    /// Service-level metric enumeration and metric-level label fetches.
    /// Both levels interleave, so they share one phase and one counter pair.
    Collecting,
    Finalizing,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanPhase::Starting => "starting",
            ScanPhase::DiscoveringServices => "discovering_services",
            ScanPhase::Collecting => "collecting",
            ScanPhase::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

/// One progress report: (phase, completed, total, detail).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub completed: u64,
    pub total: u64,
    pub detail: String,
}

/// What started a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanTrigger {
    Scheduled,
    Manual,
}

impl fmt::Display for ScanTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanTrigger::Scheduled => f.write_str("scheduled"),
            ScanTrigger::Manual => f.write_str("manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Success,
    /// Completed, but some services or metrics failed
    PartialSuccess,
    Failed,
    Cancelled,
}

/// Totals of a scan that got past service discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub snapshot_id: SnapshotId,
    #[serde(with = "time::serde::rfc3339")]
    pub collected_at: OffsetDateTime,
    /// Services returned by discovery, including those that later failed
    pub total_services: u64,
    /// Sum of series over persisted services
    pub total_series: u64,
    pub services_persisted: u64,
    pub metrics_persisted: u64,
    pub service_errors: u64,
    pub metric_errors: u64,
    pub duration: Duration,
}

impl ScanSummary {
    pub fn error_count(&self) -> u64 {
        self.service_errors + self.metric_errors
    }

    pub fn outcome(&self) -> ScanOutcome {
        if self.error_count() == 0 {
            ScanOutcome::Success
        } else {
            ScanOutcome::PartialSuccess
        }
    }
}

/// Record of the previous scan, kept by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastScan {
    pub scan_id: ScanId,
    pub trigger: ScanTrigger,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub duration: Duration,
    pub outcome: ScanOutcome,
    /// Operator-facing message, set for failed and cancelled scans
    pub error: Option<String>,
    /// Totals of a scan that ran to completion. `None` for failed and cancelled
    /// scans; a cancelled scan's partial rows stay in the store unfinalized.
    pub summary: Option<ScanSummary>,
}

/// Scheduler status as seen by pollers. Always read and written whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub running: bool,
    pub current_scan: Option<ScanId>,
    pub current_trigger: Option<ScanTrigger>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_started_at: Option<OffsetDateTime>,
    pub progress: Option<ScanProgress>,
    pub last_scan: Option<LastScan>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_run_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(service_errors: u64, metric_errors: u64) -> ScanSummary {
        ScanSummary {
            snapshot_id: SnapshotId::new(1),
            collected_at: OffsetDateTime::UNIX_EPOCH,
            total_services: 3,
            total_series: 150,
            services_persisted: 2,
            metrics_persisted: 2,
            service_errors,
            metric_errors,
            duration: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_outcome() {
        assert_eq!(summary(0, 0).outcome(), ScanOutcome::Success);
        assert_eq!(summary(1, 0).outcome(), ScanOutcome::PartialSuccess);
        assert_eq!(summary(0, 4).outcome(), ScanOutcome::PartialSuccess);
        assert_eq!(summary(1, 4).error_count(), 5);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(ScanPhase::DiscoveringServices.to_string(), "discovering_services");
        assert_eq!(ScanPhase::Collecting.to_string(), "collecting");
    }

    #[test]
    fn test_status_serializes() {
        let status = ScanStatus {
            running: true,
            current_trigger: Some(ScanTrigger::Manual),
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["running"], true);
        assert_eq!(json["current_trigger"], "manual");
        assert!(json["next_run_at"].is_null());
    }
}
