// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

pub mod config;
pub mod migrations;
pub mod prometheus_client;
pub mod sqlite_store;

pub use config::Config;
pub use prometheus_client::{PrometheusDiscoveryClient, PrometheusSettings};
pub use sqlite_store::SqliteSnapshotStore;
