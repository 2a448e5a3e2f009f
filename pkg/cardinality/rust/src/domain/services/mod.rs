// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

pub mod collector;
pub mod delta;
pub mod scheduler;

pub use collector::{
    CollectorService, CollectorSettings, DEFAULT_CONCURRENCY, DEFAULT_SAMPLE_LIMIT,
    DEFAULT_SERVICE_TIMEOUT,
};
pub use delta::{DeltaReport, DeltaService};
pub use scheduler::{
    DEFAULT_RETENTION, DEFAULT_SCAN_INTERVAL, SchedulerService, SchedulerSettings,
};
