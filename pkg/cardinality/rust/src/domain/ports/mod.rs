// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

pub mod discovery_client;
pub mod progress_sink;
pub mod snapshot_store;

#[cfg(test)]
pub use discovery_client::MockDiscoveryClient;
pub use discovery_client::DiscoveryClient;
pub use progress_sink::{NoopProgressSink, ProgressSink};
pub use snapshot_store::SnapshotStore;
