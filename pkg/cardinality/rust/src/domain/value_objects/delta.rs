// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Comparison windows and per-name cardinality changes

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaWindow {
    Day,
    Week,
    Month,
}

impl DeltaWindow {
    pub fn days(&self) -> i64 {
        match self {
            DeltaWindow::Day => 1,
            DeltaWindow::Week => 7,
            DeltaWindow::Month => 30,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::days(self.days())
    }
}

impl FromStr for DeltaWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1d" | "day" => Ok(DeltaWindow::Day),
            "7d" | "week" => Ok(DeltaWindow::Week),
            "30d" | "month" => Ok(DeltaWindow::Month),
            other => Err(format!("unknown delta window: {other}")),
        }
    }
}

/// Series count of one service or metric in two snapshots.
///
/// `None` means the name is absent from that snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardinalityDelta {
    pub name: String,
    pub current: Option<u64>,
    pub previous: Option<u64>,
    pub change: i64,
}

impl CardinalityDelta {
    pub fn new(name: String, current: Option<u64>, previous: Option<u64>) -> Self {
        let change = current.unwrap_or(0) as i64 - previous.unwrap_or(0) as i64;
        Self {
            name,
            current,
            previous,
            change,
        }
    }

    pub fn is_new(&self) -> bool {
        self.current.is_some() && self.previous.is_none()
    }

    pub fn is_removed(&self) -> bool {
        self.current.is_none() && self.previous.is_some()
    }
}
