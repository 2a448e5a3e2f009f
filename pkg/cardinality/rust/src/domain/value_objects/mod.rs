// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

pub mod cardinality;
pub mod delta;
pub mod ids;
pub mod scan_status;

pub use cardinality::{LabelCardinality, MetricCardinality, ServiceCardinality};
pub use delta::{CardinalityDelta, DeltaWindow};
pub use ids::{MetricSnapshotId, ScanId, ServiceSnapshotId, SnapshotId};
pub use scan_status::{
    LastScan, ScanOutcome, ScanPhase, ScanProgress, ScanStatus, ScanSummary, ScanTrigger,
};
