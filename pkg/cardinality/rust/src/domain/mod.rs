// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

pub mod entities;
pub mod error;
pub mod ports;
pub mod services;
pub mod value_objects;

pub use entities::{
    LabelSnapshot, MetricSnapshot, NewLabelSnapshot, NewMetricSnapshot, NewServiceSnapshot,
    ServiceSnapshot, Snapshot, SnapshotSummary,
};
pub use error::{DomainError, Result, ScanError};
pub use services::{
    CollectorService, CollectorSettings, DeltaReport, DeltaService, SchedulerService,
    SchedulerSettings,
};
pub use value_objects::{
    CardinalityDelta, DeltaWindow, LabelCardinality, LastScan, MetricCardinality,
    MetricSnapshotId, ScanId, ScanOutcome, ScanPhase, ScanProgress, ScanStatus, ScanSummary,
    ScanTrigger, ServiceCardinality, ServiceSnapshotId, SnapshotId,
};
