// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Collector service
//! Runs one full scan: services → metrics → labels, with every backend call
//! gated by one shared permit pool.
//!
//! Only two failures abort a scan: creating the snapshot row and the root
//! service-discovery call. Anything below that is counted, logged, and leaves
//! the affected subtree absent or partial.

use crate::domain::ports::{DiscoveryClient, ProgressSink, SnapshotStore};
use crate::domain::{
    DomainError, MetricCardinality, NewLabelSnapshot, NewMetricSnapshot, NewServiceSnapshot,
    ScanError, ScanId, ScanPhase, ScanProgress, ScanSummary, ServiceCardinality,
    ServiceSnapshotId, SnapshotId, SnapshotSummary,
};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_SAMPLE_LIMIT: usize = 10;
pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorSettings {
    /// Label whose value names a service (e.g. `app`, `service`)
    pub identifying_label: String,
    /// Capacity of the permit pool shared by service- and metric-level calls
    pub concurrency: usize,
    /// Maximum example values kept per label
    pub sample_limit: usize,
    /// Ceiling for one service's metric enumeration
    pub service_timeout: Duration,
}

impl CollectorSettings {
    pub fn new(identifying_label: impl Into<String>) -> Self {
        Self {
            identifying_label: identifying_label.into(),
            concurrency: DEFAULT_CONCURRENCY,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            service_timeout: DEFAULT_SERVICE_TIMEOUT,
        }
    }
}

pub struct CollectorService {
    discovery: Arc<dyn DiscoveryClient>,
    store: Arc<dyn SnapshotStore>,
    settings: Arc<CollectorSettings>,
}

impl CollectorService {
    pub fn new(
        discovery: Arc<dyn DiscoveryClient>,
        store: Arc<dyn SnapshotStore>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            discovery,
            store,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    /// Run one full scan.
    ///
    /// Rows are committed as results arrive and are never rolled back, including
    /// when `cancel` fires mid-scan. A cancelled scan leaves its snapshot
    /// unfinalized, so finalized-only reads never see it, and returns
    /// `ScanError::Cancelled`.
    pub async fn collect(
        &self,
        scan_id: ScanId,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<ScanSummary, ScanError> {
        let started = Instant::now();
        let collected_at = truncate_to_seconds(OffsetDateTime::now_utc());
        let progress = ProgressTracker::new(progress);
        progress.phase(ScanPhase::Starting);

        // 1. Root row first, so the scan has a stable identifier even if it fails later
        let snapshot_id = self
            .store
            .create_snapshot(collected_at)
            .await
            .map_err(|e| {
                error!(scan_id = %scan_id, error = %e, "Failed to create snapshot");
                ScanError::SnapshotCreation(e)
            })?;

        info!(
            scan_id = %scan_id,
            snapshot_id = %snapshot_id,
            identifying_label = %self.settings.identifying_label,
            concurrency = self.settings.concurrency,
            "Scan started"
        );

        // 2. Root discovery; without a service list there is nothing coherent to persist
        progress.phase(ScanPhase::DiscoveringServices);
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled {
                snapshot_id: Some(snapshot_id),
            });
        }
        let services = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ScanError::Cancelled { snapshot_id: Some(snapshot_id) });
            }
            result = self.discovery.discover_services(&self.settings.identifying_label) => result,
        }
        .map_err(|source| {
            error!(
                scan_id = %scan_id,
                snapshot_id = %snapshot_id,
                error = %source,
                "Service discovery failed, aborting scan"
            );
            ScanError::ServiceDiscovery {
                snapshot_id,
                source,
            }
        })?;

        let total_services = services.len() as u64;
        info!(scan_id = %scan_id, services = total_services, "Discovered services");

        // 3-5. Fan out. One task per service, one per metric, one permit pool for both.
        let ctx = Arc::new(ScanContext {
            scan_id,
            snapshot_id,
            discovery: self.discovery.clone(),
            store: self.store.clone(),
            settings: self.settings.clone(),
            permits: Arc::new(Semaphore::new(self.settings.concurrency.max(1))),
            cancel: cancel.clone(),
            tally: ScanTally::default(),
            progress,
        });
        ctx.progress.start_collecting(total_services);

        let mut tasks = JoinSet::new();
        for service in services {
            let ctx = ctx.clone();
            tasks.spawn(async move { ctx.collect_service(service).await });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(scan_id = %scan_id, error = %e, "Service task panicked");
                ctx.tally.service_errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        let summary = ctx.tally.summary(
            snapshot_id,
            collected_at,
            total_services,
            started.elapsed(),
        );

        // Skipped services and metrics are not in the tally, so a cancelled
        // scan stays unfinalized and never becomes a delta baseline.
        if cancel.is_cancelled() {
            warn!(
                scan_id = %scan_id,
                snapshot_id = %snapshot_id,
                services_persisted = summary.services_persisted,
                metrics_persisted = summary.metrics_persisted,
                "Scan cancelled, keeping rows already written unfinalized"
            );
            return Err(ScanError::Cancelled {
                snapshot_id: Some(snapshot_id),
            });
        }

        // 6. Finalize with totals taken from the discovery calls
        ctx.progress.phase(ScanPhase::Finalizing);
        let totals = SnapshotSummary {
            scan_duration: summary.duration,
            total_services: summary.total_services,
            total_series: summary.total_series,
            service_errors: summary.service_errors,
            metric_errors: summary.metric_errors,
        };
        if let Err(e) = self.store.finalize_snapshot(snapshot_id, &totals).await {
            error!(
                scan_id = %scan_id,
                snapshot_id = %snapshot_id,
                error = %e,
                "Failed to finalize snapshot"
            );
        }

        info!(
            scan_id = %scan_id,
            snapshot_id = %snapshot_id,
            total_services = summary.total_services,
            total_series = summary.total_series,
            metrics = summary.metrics_persisted,
            service_errors = summary.service_errors,
            metric_errors = summary.metric_errors,
            duration_ms = summary.duration.as_millis() as u64,
            "Scan completed"
        );
        Ok(summary)
    }
}

/// Collected-at timestamps are whole seconds so snapshots line up across time windows.
pub(crate) fn truncate_to_seconds(at: OffsetDateTime) -> OffsetDateTime {
    at.replace_nanosecond(0).unwrap_or(at)
}

/// State shared by every task of one scan
struct ScanContext {
    scan_id: ScanId,
    snapshot_id: SnapshotId,
    discovery: Arc<dyn DiscoveryClient>,
    store: Arc<dyn SnapshotStore>,
    settings: Arc<CollectorSettings>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    tally: ScanTally,
    progress: ProgressTracker,
}

impl ScanContext {
    async fn collect_service(self: Arc<Self>, service: ServiceCardinality) {
        let Some(permit) = self.acquire_permit().await else {
            debug!(scan_id = %self.scan_id, service = %service.name, "Cancelled before start");
            return;
        };

        let timeout = self.settings.service_timeout;
        let result = self
            .until_cancelled(async {
                tokio::time::timeout(
                    timeout,
                    self.discovery
                        .get_metrics_for_service(&self.settings.identifying_label, &service.name),
                )
                .await
                .unwrap_or(Err(DomainError::Timeout(timeout)))
            })
            .await;

        // Give the permit back before fanning out, so metric work from all
        // services shares the pool instead of one service holding a slot throughout.
        drop(permit);

        let metrics = match result {
            Ok(metrics) => metrics,
            Err(DomainError::Cancelled) => return,
            Err(e) => {
                warn!(
                    scan_id = %self.scan_id,
                    service = %service.name,
                    error = %e,
                    "Metric discovery failed for service"
                );
                self.tally.service_errors.fetch_add(1, Ordering::Relaxed);
                self.progress.service_done();
                return;
            }
        };

        let row = NewServiceSnapshot::from_discovery(&service, &metrics);
        let service_snapshot_id = match self.store.insert_service(self.snapshot_id, &row).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    scan_id = %self.scan_id,
                    service = %service.name,
                    error = %e,
                    "Failed to persist service snapshot"
                );
                self.tally.service_errors.fetch_add(1, Ordering::Relaxed);
                self.progress.service_done();
                return;
            }
        };

        self.tally.services_persisted.fetch_add(1, Ordering::Relaxed);
        self.tally
            .total_series
            .fetch_add(service.series_count, Ordering::Relaxed);
        self.progress.add_metrics(metrics.len() as u64);
        self.progress.service_done();

        debug!(
            scan_id = %self.scan_id,
            service = %service.name,
            metrics = metrics.len(),
            "Service persisted, collecting labels"
        );

        let service_name: Arc<str> = Arc::from(service.name.as_str());
        let mut tasks = JoinSet::new();
        for metric in metrics {
            if self.cancel.is_cancelled() {
                break;
            }
            let ctx = self.clone();
            let service_name = service_name.clone();
            tasks.spawn(async move {
                ctx.collect_metric(service_snapshot_id, service_name, metric)
                    .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(
                    scan_id = %self.scan_id,
                    service = %service.name,
                    error = %e,
                    "Metric task panicked"
                );
                self.tally.metric_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn collect_metric(
        self: Arc<Self>,
        service_snapshot_id: ServiceSnapshotId,
        service_name: Arc<str>,
        metric: MetricCardinality,
    ) {
        let Some(permit) = self.acquire_permit().await else {
            return;
        };

        let result = self
            .until_cancelled(self.discovery.get_labels_for_metric(
                &self.settings.identifying_label,
                &service_name,
                &metric.name,
                self.settings.sample_limit,
            ))
            .await;
        drop(permit);

        // A failed label fetch still records the metric, with no labels
        let labels = match result {
            Ok(labels) => labels,
            Err(DomainError::Cancelled) => return,
            Err(e) => {
                warn!(
                    scan_id = %self.scan_id,
                    service = %service_name,
                    metric = %metric.name,
                    error = %e,
                    "Label discovery failed, recording metric without labels"
                );
                self.tally.metric_errors.fetch_add(1, Ordering::Relaxed);
                Vec::new()
            }
        };

        let row = NewMetricSnapshot::from_discovery(&metric, &labels);
        let labels: Vec<NewLabelSnapshot> = labels.into_iter().map(Into::into).collect();
        match self
            .store
            .insert_metric(service_snapshot_id, &row, &labels)
            .await
        {
            Ok(_) => {
                self.tally.metrics_persisted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(
                    scan_id = %self.scan_id,
                    service = %service_name,
                    metric = %metric.name,
                    error = %e,
                    "Failed to persist metric snapshot"
                );
                self.tally.metric_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.progress.metric_done();
    }

    /// `None` once the scan is cancelled
    async fn acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok(),
        }
    }

    async fn until_cancelled<T>(
        &self,
        call: impl Future<Output = Result<T, DomainError>>,
    ) -> Result<T, DomainError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DomainError::Cancelled),
            result = call => result,
        }
    }
}

#[derive(Default)]
struct ScanTally {
    total_series: AtomicU64,
    services_persisted: AtomicU64,
    metrics_persisted: AtomicU64,
    service_errors: AtomicU64,
    metric_errors: AtomicU64,
}

impl ScanTally {
    fn summary(
        &self,
        snapshot_id: SnapshotId,
        collected_at: OffsetDateTime,
        total_services: u64,
        duration: Duration,
    ) -> ScanSummary {
        ScanSummary {
            snapshot_id,
            collected_at,
            total_services,
            total_series: self.total_series.load(Ordering::Relaxed),
            services_persisted: self.services_persisted.load(Ordering::Relaxed),
            metrics_persisted: self.metrics_persisted.load(Ordering::Relaxed),
            service_errors: self.service_errors.load(Ordering::Relaxed),
            metric_errors: self.metric_errors.load(Ordering::Relaxed),
            duration,
        }
    }
}

#[derive(Default)]
struct ProgressCounters {
    phase: Option<ScanPhase>,
    services_done: u64,
    services_total: u64,
    metrics_done: u64,
    metrics_total: u64,
}

/// Serializes progress reports so the sink never sees counters go backwards
/// within a phase, whichever task reports.
struct ProgressTracker {
    sink: Arc<dyn ProgressSink>,
    counters: Mutex<ProgressCounters>,
}

impl ProgressTracker {
    fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            counters: Mutex::new(ProgressCounters::default()),
        }
    }

    fn phase(&self, phase: ScanPhase) {
        self.update(|c| c.phase = Some(phase));
    }

    fn start_collecting(&self, services: u64) {
        self.update(|c| {
            c.phase = Some(ScanPhase::Collecting);
            c.services_total = services;
        });
    }

    fn add_metrics(&self, metrics: u64) {
        self.update(|c| c.metrics_total += metrics);
    }

    fn service_done(&self) {
        self.update(|c| c.services_done += 1);
    }

    fn metric_done(&self) {
        self.update(|c| c.metrics_done += 1);
    }

    fn update(&self, apply: impl FnOnce(&mut ProgressCounters)) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut counters);

        let phase = counters.phase.unwrap_or(ScanPhase::Starting);
        let progress = match phase {
            ScanPhase::Collecting | ScanPhase::Finalizing => ScanProgress {
                phase,
                completed: counters.services_done + counters.metrics_done,
                total: counters.services_total + counters.metrics_total,
                detail: format!(
                    "{}/{} services, {}/{} metrics",
                    counters.services_done,
                    counters.services_total,
                    counters.metrics_done,
                    counters.metrics_total
                ),
            },
            ScanPhase::Starting | ScanPhase::DiscoveringServices => ScanProgress {
                phase,
                completed: 0,
                total: 0,
                detail: String::new(),
            },
        };
        // Reported under the lock: reports reach the sink in counter order
        self.sink.report(progress);
    }
}
