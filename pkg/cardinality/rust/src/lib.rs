// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Scheduled cardinality auditing for Prometheus-compatible backends.
//!
//! The auditor discovers every service exposed by a monitoring backend (via a
//! configurable identifying label), enumerates the metrics each service emits,
//! measures per-metric series counts and per-label value diversity, and keeps
//! the result as dated, append-only history.
//!
//! ## Architecture
//!
//! 1. **Discovery** (`domain::ports::DiscoveryClient`) - three read-only
//!    enumeration calls against the backend (services, metrics, labels).
//!    `infrastructure::PrometheusDiscoveryClient` speaks the Prometheus HTTP API.
//!
//! 2. **Snapshot store** (`domain::ports::SnapshotStore`) - the
//!    Snapshot → Service → Metric → Label tree with cascading delete.
//!    `infrastructure::SqliteSnapshotStore` persists it in SQLite.
//!
//! 3. **Collector** (`domain::services::CollectorService`) - one full scan,
//!    fanned out under a single shared permit pool.
//!
//! 4. **Scheduler** (`domain::services::SchedulerService`) - periodic and manual
//!    scans, single-flight, status, retention cleanup, graceful shutdown.

pub mod domain;
pub mod infrastructure;

pub use domain::{DomainError, Result, ScanError};
