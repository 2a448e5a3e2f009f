// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Daemon configuration
//!
//! Read from a YAML file, then overridden by `DD_CARDINALITY_*` environment
//! variables. Every field has a default, so an empty or missing file is valid.

use super::prometheus_client::PrometheusSettings;
use crate::domain::DomainError;
use crate::domain::services::{CollectorSettings, SchedulerSettings};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const DEFAULT_PROMETHEUS_URL: &str = "http://localhost:9090";
const DEFAULT_IDENTIFYING_LABEL: &str = "service";
const DEFAULT_DB_PATH: &str = "/var/lib/datadog/cardinality/snapshots.db";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub prometheus: PrometheusConfig,
    pub collector: CollectorConfig,
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prometheus: PrometheusConfig::default(),
            collector: CollectorConfig::default(),
            scheduler: SchedulerConfig::default(),
            storage: StorageConfig::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    pub url: String,
    pub query_timeout_secs: u64,
    pub series_lookback_secs: u64,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PROMETHEUS_URL.to_string(),
            query_timeout_secs: 60,
            series_lookback_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub identifying_label: String,
    pub concurrency: usize,
    pub sample_values: usize,
    pub service_timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            identifying_label: DEFAULT_IDENTIFYING_LABEL.to_string(),
            concurrency: 5,
            sample_values: 10,
            service_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub retention_days: u64,
    pub run_on_startup: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60,
            retention_days: 90,
            run_on_startup: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

impl Config {
    /// Load from `path` (defaults when `None`), then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        // serde_yaml rejects an empty document for a struct
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).context("Invalid YAML configuration")
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("DD_CARDINALITY_PROMETHEUS_URL") {
            self.prometheus.url = url;
        }
        if let Ok(label) = env::var("DD_CARDINALITY_IDENTIFYING_LABEL") {
            self.collector.identifying_label = label;
        }
        if let Some(concurrency) = parse_env("DD_CARDINALITY_CONCURRENCY") {
            self.collector.concurrency = concurrency;
        }
        if let Ok(path) = env::var("DD_CARDINALITY_DB_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Ok(level) = env::var("DD_CARDINALITY_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let invalid = |reason: &str| Err(DomainError::InvalidConfiguration(reason.to_string()));

        if self.prometheus.url.trim().is_empty() {
            return invalid("prometheus.url must not be empty");
        }
        if !is_valid_label_name(&self.collector.identifying_label) {
            return invalid("collector.identifying_label must be a valid label name");
        }
        if self.collector.concurrency == 0 {
            return invalid("collector.concurrency must be at least 1");
        }
        if self.collector.sample_values == 0 {
            return invalid("collector.sample_values must be at least 1");
        }
        if self.collector.service_timeout_secs == 0 {
            return invalid("collector.service_timeout_secs must be at least 1");
        }
        if self.scheduler.interval_secs == 0 {
            return invalid("scheduler.interval_secs must be at least 1");
        }
        if self.scheduler.retention_days == 0 {
            return invalid("scheduler.retention_days must be at least 1");
        }
        Ok(())
    }

    pub fn prometheus_settings(&self) -> PrometheusSettings {
        PrometheusSettings {
            url: self.prometheus.url.clone(),
            query_timeout: Duration::from_secs(self.prometheus.query_timeout_secs),
            series_lookback: Duration::from_secs(self.prometheus.series_lookback_secs),
        }
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            identifying_label: self.collector.identifying_label.clone(),
            concurrency: self.collector.concurrency,
            sample_limit: self.collector.sample_values,
            service_timeout: Duration::from_secs(self.collector.service_timeout_secs),
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            interval: Duration::from_secs(self.scheduler.interval_secs),
            retention: Duration::from_secs(self.scheduler.retention_days * 24 * 60 * 60),
            run_on_startup: self.scheduler.run_on_startup,
        }
    }
}

fn parse_env<T: FromStr>(var_name: &str) -> Option<T> {
    let raw = env::var(var_name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = var_name, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`; the label is interpolated into PromQL unquoted
fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
