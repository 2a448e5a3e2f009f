// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Discovery results, one type per enumeration level

use serde::{Deserialize, Serialize};

/// A service and how many series carry its identifying label value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCardinality {
    pub name: String,
    pub series_count: u64,
}

/// A metric emitted by one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCardinality {
    pub name: String,
    pub series_count: u64,
}

/// Value diversity of one label on one metric.
///
/// `sample_values` is sorted and never longer than the requested sample limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCardinality {
    pub name: String,
    pub unique_values: u64,
    pub sample_values: Vec<String>,
}

impl ServiceCardinality {
    pub fn new(name: impl Into<String>, series_count: u64) -> Self {
        Self {
            name: name.into(),
            series_count,
        }
    }
}

impl MetricCardinality {
    pub fn new(name: impl Into<String>, series_count: u64) -> Self {
        Self {
            name: name.into(),
            series_count,
        }
    }
}
