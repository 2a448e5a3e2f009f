// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::domain::ScanProgress;

/// Receives scan progress. Called from many concurrent tasks.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: ScanProgress);
}

/// Sink that drops every report
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn report(&self, _progress: ScanProgress) {}
}
