// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Prometheus HTTP API implementation of the DiscoveryClient port
//!
//! Services and metrics come from `count by` instant queries. Labels come from
//! the series endpoint over a short lookback window and are reduced locally.

use crate::domain::ports::DiscoveryClient;
use crate::domain::{DomainError, LabelCardinality, MetricCardinality, ServiceCardinality};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::{debug, warn};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SERIES_LOOKBACK: Duration = Duration::from_secs(300);

const METRIC_NAME_LABEL: &str = "__name__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrometheusSettings {
    /// Base URL, e.g. `http://prometheus:9090`
    pub url: String,
    pub query_timeout: Duration,
    /// How far back the series endpoint looks when enumerating label values
    pub series_lookback: Duration,
}

impl PrometheusSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            series_lookback: DEFAULT_SERIES_LOOKBACK,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VectorData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    metric: HashMap<String, String>,
    /// `[unix_time, "value"]`
    value: (f64, String),
}

#[derive(Clone)]
pub struct PrometheusDiscoveryClient {
    base_url: String,
    client: reqwest::Client,
    settings: PrometheusSettings,
}

impl PrometheusDiscoveryClient {
    pub fn new(settings: PrometheusSettings) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(settings.query_timeout)
            .build()
            .map_err(|e| {
                DomainError::InvalidConfiguration(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            client,
            settings,
        })
    }

    async fn instant_query(&self, query: &str) -> Result<Vec<VectorSample>, DomainError> {
        let data: VectorData = self.get("/api/v1/query", &[("query", query.to_string())]).await?;
        if data.result_type != "vector" {
            return Err(DomainError::DiscoveryFailed(format!(
                "expected vector result, got {}",
                data.result_type
            )));
        }
        Ok(data.result)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, DomainError> {
        let url = format!("{}{}", self.base_url, path);
        let started = Instant::now();

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| self.request_error(path, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DomainError::RateLimited);
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.request_error(path, e))?;
        debug!(
            path,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Prometheus request completed"
        );

        // Error responses still carry the standard envelope with the reason
        let parsed = serde_json::from_str::<ApiResponse<T>>(&body);
        if !status.is_success() {
            let reason = parsed
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| status.to_string());
            return Err(DomainError::DiscoveryFailed(format!(
                "{path} returned {}: {reason}",
                status.as_u16()
            )));
        }

        let parsed = parsed.map_err(|e| {
            DomainError::DiscoveryFailed(format!("invalid response from {path}: {e}"))
        })?;
        if parsed.status != "success" {
            return Err(DomainError::DiscoveryFailed(format!(
                "{path} failed ({}): {}",
                parsed.error_type.as_deref().unwrap_or("unknown"),
                parsed.error.as_deref().unwrap_or("no error message")
            )));
        }
        parsed
            .data
            .ok_or_else(|| DomainError::DiscoveryFailed(format!("{path} returned no data")))
    }

    fn request_error(&self, path: &str, e: reqwest::Error) -> DomainError {
        if e.is_timeout() {
            warn!(
                path,
                timeout_secs = self.settings.query_timeout.as_secs(),
                "Prometheus request timed out"
            );
            DomainError::Timeout(self.settings.query_timeout)
        } else {
            DomainError::DiscoveryFailed(format!("request to {path} failed: {e}"))
        }
    }
}

#[async_trait]
impl DiscoveryClient for PrometheusDiscoveryClient {
    async fn discover_services(
        &self,
        identifying_label: &str,
    ) -> Result<Vec<ServiceCardinality>, DomainError> {
        let samples = self
            .instant_query(&services_query(identifying_label))
            .await?;

        let mut services = Vec::with_capacity(samples.len());
        for sample in samples {
            let Some(name) = sample.metric.get(identifying_label).filter(|n| !n.is_empty()) else {
                continue;
            };
            services.push(ServiceCardinality::new(name.clone(), parse_count(&sample.value.1)?));
        }
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    async fn get_metrics_for_service(
        &self,
        identifying_label: &str,
        service_name: &str,
    ) -> Result<Vec<MetricCardinality>, DomainError> {
        let samples = self
            .instant_query(&metrics_query(identifying_label, service_name))
            .await?;

        let mut metrics = Vec::with_capacity(samples.len());
        for sample in samples {
            let Some(name) = sample.metric.get(METRIC_NAME_LABEL) else {
                continue;
            };
            metrics.push(MetricCardinality::new(name.clone(), parse_count(&sample.value.1)?));
        }
        metrics.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(metrics)
    }

    async fn get_labels_for_metric(
        &self,
        identifying_label: &str,
        service_name: &str,
        metric_name: &str,
        sample_limit: usize,
    ) -> Result<Vec<LabelCardinality>, DomainError> {
        let end = OffsetDateTime::now_utc();
        let start = end - self.settings.series_lookback;
        let params = [
            (
                "match[]",
                series_selector(identifying_label, service_name, metric_name),
            ),
            ("start", start.unix_timestamp().to_string()),
            ("end", end.unix_timestamp().to_string()),
        ];

        let series: Vec<HashMap<String, String>> = self.get("/api/v1/series", &params).await?;
        Ok(reduce_series(series, identifying_label, sample_limit))
    }
}

/// Escape a value for use inside a double-quoted PromQL string
pub fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

pub fn services_query(identifying_label: &str) -> String {
    format!("count by ({identifying_label}) ({{{identifying_label}!=\"\"}})")
}

pub fn metrics_query(identifying_label: &str, service_name: &str) -> String {
    format!(
        "count by (__name__) ({{{identifying_label}=\"{}\"}})",
        escape_label_value(service_name)
    )
}

pub fn series_selector(identifying_label: &str, service_name: &str, metric_name: &str) -> String {
    format!(
        "{{__name__=\"{}\",{identifying_label}=\"{}\"}}",
        escape_label_value(metric_name),
        escape_label_value(service_name)
    )
}

/// Collapse series label sets into per-label distinct counts.
///
/// Samples are the lexicographically smallest values, so repeated scans of
/// unchanged data produce identical rows.
pub fn reduce_series<I>(series: I, identifying_label: &str, sample_limit: usize) -> Vec<LabelCardinality>
where
    I: IntoIterator<Item = HashMap<String, String>>,
{
    let mut values: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for labels in series {
        for (name, value) in labels {
            if name == METRIC_NAME_LABEL || name == identifying_label {
                continue;
            }
            values.entry(name).or_default().insert(value);
        }
    }

    values
        .into_iter()
        .map(|(name, distinct)| LabelCardinality {
            name,
            unique_values: distinct.len() as u64,
            sample_values: distinct.into_iter().take(sample_limit).collect(),
        })
        .collect()
}

fn parse_count(raw: &str) -> Result<u64, DomainError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| DomainError::DiscoveryFailed(format!("invalid sample value: {raw}")))?;
    if !value.is_finite() || value < 0.0 {
        return Err(DomainError::DiscoveryFailed(format!(
            "invalid sample value: {raw}"
        )));
    }
    Ok(value.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(pairs: &[&[(&str, &str)]]) -> Vec<HashMap<String, String>> {
        pairs
            .iter()
            .map(|labels| {
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_query_builders() {
        assert_eq!(services_query("app"), r#"count by (app) ({app!=""})"#);
        assert_eq!(
            metrics_query("app", "checkout"),
            r#"count by (__name__) ({app="checkout"})"#
        );
        assert_eq!(
            series_selector("app", "checkout", "http_requests_total"),
            r#"{__name__="http_requests_total",app="checkout"}"#
        );
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(
            metrics_query("app", r#"we"ird"#),
            r#"count by (__name__) ({app="we\"ird"})"#
        );
    }

    #[test]
    fn test_reduce_series_excludes_name_and_identifying_label() {
        let reduced = reduce_series(
            series(&[
                &[("__name__", "up"), ("app", "api"), ("pod", "p2"), ("zone", "a")],
                &[("__name__", "up"), ("app", "api"), ("pod", "p1"), ("zone", "a")],
                &[("__name__", "up"), ("app", "api"), ("pod", "p3")],
            ]),
            "app",
            2,
        );

        let names: Vec<_> = reduced.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["pod", "zone"]);
        assert_eq!(reduced[0].unique_values, 3);
        assert_eq!(reduced[0].sample_values, vec!["p1", "p2"]);
        assert_eq!(reduced[1].unique_values, 1);
        assert_eq!(reduced[1].sample_values, vec!["a"]);
    }

    #[test]
    fn test_reduce_series_sample_is_order_independent() {
        let forward = series(&[&[("pod", "b")], &[("pod", "c")], &[("pod", "a")]]);
        let mut backward = forward.clone();
        backward.reverse();

        assert_eq!(
            reduce_series(forward, "app", 10),
            reduce_series(backward, "app", 10)
        );
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("42").unwrap(), 42);
        assert_eq!(parse_count("1e3").unwrap(), 1000);
        assert!(parse_count("NaN").is_err());
        assert!(parse_count("-1").is_err());
        assert!(parse_count("many").is_err());
    }

    #[test]
    fn test_vector_response_parses() {
        let body = r#"{
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    {"metric": {"app": "api"}, "value": [1709251200.123, "17"]}
                ]
            }
        }"#;
        let parsed: ApiResponse<VectorData> = serde_json::from_str(body).unwrap();
        let data = parsed.data.unwrap();
        assert_eq!(data.result[0].metric["app"], "api");
        assert_eq!(data.result[0].value.1, "17");
    }

    #[test]
    fn test_error_response_parses() {
        let body = r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#;
        let parsed: ApiResponse<VectorData> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.status, "error");
        assert!(parsed.data.is_none());
        assert_eq!(parsed.error.as_deref(), Some("parse error"));
    }
}
