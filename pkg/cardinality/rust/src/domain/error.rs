// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Domain-level errors
//! `DomainError` crosses every port; `ScanError` is what a scan reports as fatal.

use crate::domain::SnapshotId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    // Discovery errors
    #[error("Discovery query failed: {0}")]
    DiscoveryFailed(String),

    #[error("Monitoring backend rate-limited the request")]
    RateLimited,

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Snapshot '{0}' not found")]
    SnapshotNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Scheduling errors
    #[error("A scan is already running")]
    ScanAlreadyRunning,

    #[error("Operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;

/// Failures that abort a whole scan.
///
/// Everything below the root service-discovery call is degraded, not fatal,
/// and only shows up in the scan's error tally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("failed to create snapshot record: {0}")]
    SnapshotCreation(#[source] DomainError),

    #[error("service discovery failed for snapshot {snapshot_id}: {source}")]
    ServiceDiscovery {
        snapshot_id: SnapshotId,
        #[source]
        source: DomainError,
    },

    #[error("scan cancelled")]
    Cancelled { snapshot_id: Option<SnapshotId> },
}

impl ScanError {
    /// Operator-facing message. Never carries the raw backend or storage error.
    pub fn public_message(&self) -> &'static str {
        match self {
            ScanError::SnapshotCreation(_) => "could not create snapshot record",
            ScanError::ServiceDiscovery { .. } => "service discovery failed",
            ScanError::Cancelled { .. } => "scan cancelled",
        }
    }

    /// Snapshot row left behind by the failed scan, if one was created.
    pub fn snapshot_id(&self) -> Option<SnapshotId> {
        match self {
            ScanError::SnapshotCreation(_) => None,
            ScanError::ServiceDiscovery { snapshot_id, .. } => Some(*snapshot_id),
            ScanError::Cancelled { snapshot_id } => *snapshot_id,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanError::Cancelled { .. })
    }
}
