// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Prometheus adapter against a stub HTTP API

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use dd_cardinality::domain::ports::{DiscoveryClient, NoopProgressSink, SnapshotStore};
use dd_cardinality::domain::services::{CollectorService, CollectorSettings};
use dd_cardinality::domain::{DomainError, ScanId};
use dd_cardinality::infrastructure::{
    PrometheusDiscoveryClient, PrometheusSettings, SqliteSnapshotStore,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct StubState {
    queries: Mutex<Vec<String>>,
    series_params: Mutex<Vec<HashMap<String, String>>>,
    series_calls: AtomicUsize,
}

fn vector(samples: Vec<Value>) -> Value {
    json!({
        "status": "success",
        "data": { "resultType": "vector", "result": samples }
    })
}

fn sample(label: &str, value: &str, count: &str) -> Value {
    json!({ "metric": { label: value }, "value": [1709251200.5, count] })
}

async fn query_handler(
    State(state): State<Arc<StubState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let query = params.get("query").cloned().unwrap_or_default();
    state.queries.lock().unwrap().push(query.clone());

    if query == r#"count by (app) ({app!=""})"# {
        // Deliberately unsorted
        return axum::Json(vector(vec![
            sample("app", "payments", "40"),
            sample("app", "checkout", "120"),
        ]))
        .into_response();
    }
    if query.contains(r#"app="checkout""#) {
        return axum::Json(vector(vec![
            sample("__name__", "http_requests_total", "100"),
            sample("__name__", "cache_hits_total", "20"),
        ]))
        .into_response();
    }
    if query.contains(r#"app="payments""#) {
        return axum::Json(vector(vec![sample("__name__", "charges_total", "40")]))
            .into_response();
    }
    if query.contains(r#"app="throttled""#) {
        return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
    }
    if query.contains(r#"app="slow""#) {
        tokio::time::sleep(Duration::from_secs(5)).await;
        return axum::Json(vector(vec![])).into_response();
    }
    if query.contains(r#"app="garbage""#) {
        return axum::Json(vector(vec![sample("__name__", "up", "not-a-number")]))
            .into_response();
    }
    if query.contains(r#"app="broken""#) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "status": "error",
                "errorType": "execution",
                "error": "query processing would load too many samples"
            })),
        )
            .into_response();
    }
    axum::Json(vector(vec![])).into_response()
}

async fn series_handler(
    State(state): State<Arc<StubState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.series_params.lock().unwrap().push(params.clone());
    let call = state.series_calls.fetch_add(1, Ordering::SeqCst);

    let mut series = vec![
        json!({"__name__": "http_requests_total", "app": "checkout", "method": "POST", "code": "500"}),
        json!({"__name__": "http_requests_total", "app": "checkout", "method": "GET", "code": "200"}),
        json!({"__name__": "http_requests_total", "app": "checkout", "method": "PUT", "code": "200"}),
        json!({"__name__": "http_requests_total", "app": "checkout", "method": "DELETE", "code": "404"}),
    ];
    // Alternate the order so callers can't rely on backend ordering
    if call % 2 == 1 {
        series.reverse();
    }
    axum::Json(json!({ "status": "success", "data": series })).into_response()
}

async fn start_stub() -> (SocketAddr, Arc<StubState>) {
    let state = Arc::new(StubState::default());
    let app = Router::new()
        .route("/api/v1/query", get(query_handler))
        .route("/api/v1/series", get(series_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn client(addr: SocketAddr) -> PrometheusDiscoveryClient {
    let mut settings = PrometheusSettings::new(format!("http://{addr}/"));
    settings.query_timeout = Duration::from_millis(500);
    PrometheusDiscoveryClient::new(settings).unwrap()
}

#[tokio::test]
async fn test_discover_services_sorted() {
    let (addr, state) = start_stub().await;
    let services = client(addr).discover_services("app").await.unwrap();

    let names: Vec<_> = services.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["checkout", "payments"]);
    assert_eq!(services[0].series_count, 120);
    assert_eq!(
        *state.queries.lock().unwrap(),
        vec![r#"count by (app) ({app!=""})"#.to_string()]
    );
}

#[tokio::test]
async fn test_metrics_for_service() {
    let (addr, _state) = start_stub().await;
    let metrics = client(addr)
        .get_metrics_for_service("app", "checkout")
        .await
        .unwrap();

    let names: Vec<_> = metrics.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["cache_hits_total", "http_requests_total"]);
    assert_eq!(metrics[1].series_count, 100);
}

#[tokio::test]
async fn test_service_name_is_escaped() {
    let (addr, state) = start_stub().await;
    let metrics = client(addr)
        .get_metrics_for_service("app", r#"we"ird\name"#)
        .await
        .unwrap();

    assert!(metrics.is_empty());
    let queries = state.queries.lock().unwrap();
    assert_eq!(
        queries[0],
        r#"count by (__name__) ({app="we\"ird\\name"})"#
    );
}

#[tokio::test]
async fn test_labels_are_reduced_and_deterministic() {
    let (addr, state) = start_stub().await;
    let client = client(addr);

    let first = client
        .get_labels_for_metric("app", "checkout", "http_requests_total", 2)
        .await
        .unwrap();
    let second = client
        .get_labels_for_metric("app", "checkout", "http_requests_total", 2)
        .await
        .unwrap();
    assert_eq!(first, second);

    let names: Vec<_> = first.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["code", "method"]);
    assert_eq!(first[0].unique_values, 3);
    assert_eq!(first[0].sample_values, vec!["200", "404"]);
    assert_eq!(first[1].unique_values, 4);
    assert_eq!(first[1].sample_values, vec!["DELETE", "GET"]);

    let params = state.series_params.lock().unwrap();
    assert_eq!(
        params[0]["match[]"],
        r#"{__name__="http_requests_total",app="checkout"}"#
    );
    let start: i64 = params[0]["start"].parse().unwrap();
    let end: i64 = params[0]["end"].parse().unwrap();
    assert_eq!(end - start, 300);
}

#[tokio::test]
async fn test_rate_limited() {
    let (addr, _state) = start_stub().await;
    let err = client(addr)
        .get_metrics_for_service("app", "throttled")
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::RateLimited);
}

#[tokio::test]
async fn test_client_timeout() {
    let (addr, _state) = start_stub().await;
    let err = client(addr)
        .get_metrics_for_service("app", "slow")
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::Timeout(Duration::from_millis(500)));
}

#[tokio::test]
async fn test_error_envelope_is_discovery_failure() {
    let (addr, _state) = start_stub().await;
    let err = client(addr)
        .get_metrics_for_service("app", "broken")
        .await
        .unwrap_err();
    match err {
        DomainError::DiscoveryFailed(message) => {
            assert!(message.contains("422"));
            assert!(message.contains("too many samples"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unparsable_value_is_discovery_failure() {
    let (addr, _state) = start_stub().await;
    let err = client(addr)
        .get_metrics_for_service("app", "garbage")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::DiscoveryFailed(_)));
}

#[tokio::test]
async fn test_unreachable_backend() {
    // Bind then drop to get a port with nothing listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(addr).discover_services("app").await.unwrap_err();
    assert!(matches!(err, DomainError::DiscoveryFailed(_)));
}

#[tokio::test]
async fn test_full_scan_over_http() {
    let (addr, _state) = start_stub().await;
    let store = Arc::new(SqliteSnapshotStore::open_in_memory().await.unwrap());
    let collector = CollectorService::new(
        Arc::new(client(addr)),
        store.clone(),
        CollectorSettings::new("app"),
    );

    let summary = collector
        .collect(
            ScanId::generate(),
            Arc::new(NoopProgressSink),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.total_services, 2);
    assert_eq!(summary.total_series, 160);
    assert_eq!(summary.metrics_persisted, 3);
    assert_eq!(summary.error_count(), 0);

    let labels = store
        .list_labels(summary.snapshot_id, "checkout", "http_requests_total")
        .await
        .unwrap();
    let names: Vec<_> = labels.iter().map(|l| l.label_name.as_str()).collect();
    assert_eq!(names, vec!["code", "method"]);
}
