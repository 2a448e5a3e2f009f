// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Scheduler service
//! Owns when scans run: a periodic timer plus manual triggers, at most one scan
//! at a time, retention cleanup after every scan, and a graceful shutdown that
//! waits for the in-flight scan.

use crate::domain::ports::{ProgressSink, SnapshotStore};
use crate::domain::services::CollectorService;
use crate::domain::{
    DomainError, LastScan, ScanError, ScanId, ScanOutcome, ScanProgress, ScanStatus, ScanTrigger,
};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(90 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    /// Snapshots older than this are deleted after each scan
    pub retention: Duration,
    /// Start the first scan immediately instead of one interval after startup
    pub run_on_startup: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SCAN_INTERVAL,
            retention: DEFAULT_RETENTION,
            run_on_startup: false,
        }
    }
}

/// Status record behind one lock. Callers only ever see or write it whole.
#[derive(Default)]
struct StatusCell {
    inner: Mutex<ScanStatus>,
}

impl StatusCell {
    fn snapshot(&self) -> ScanStatus {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update<R>(&self, apply: impl FnOnce(&mut ScanStatus) -> R) -> R {
        let mut status = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut status)
    }
}

/// Mirrors collector progress into the scheduler status
struct StatusProgressSink {
    status: Arc<StatusCell>,
    scan_id: ScanId,
}

impl ProgressSink for StatusProgressSink {
    fn report(&self, progress: ScanProgress) {
        self.status.update(|status| {
            if status.current_scan == Some(self.scan_id) {
                status.progress = Some(progress);
            }
        });
    }
}

pub struct SchedulerService {
    collector: Arc<CollectorService>,
    store: Arc<dyn SnapshotStore>,
    settings: SchedulerSettings,
    status: Arc<StatusCell>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl SchedulerService {
    pub fn new(
        collector: Arc<CollectorService>,
        store: Arc<dyn SnapshotStore>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            collector,
            store,
            settings,
            status: Arc::new(StatusCell::default()),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Consistent copy of the whole status record
    pub fn status(&self) -> ScanStatus {
        self.status.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.status.update(|status| status.running)
    }

    /// Start the periodic timer. Scans run as background tasks.
    pub fn start(self: &Arc<Self>) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            retention_days = self.settings.retention.as_secs() / 86_400,
            run_on_startup = self.settings.run_on_startup,
            "Scheduler started"
        );
        let scheduler = self.clone();
        self.tasks.spawn(async move { scheduler.run_periodic().await });
    }

    /// Start a scan now and return without waiting for it.
    ///
    /// Rejected with `ScanAlreadyRunning` while another scan is in flight; the
    /// request is not queued. Poll `status()` to observe completion.
    pub fn trigger_scan(&self) -> Result<ScanId, DomainError> {
        match self.begin_scan(ScanTrigger::Manual) {
            Ok(scan_id) => {
                info!(scan_id = %scan_id, "Manual scan triggered");
                Ok(scan_id)
            }
            Err(e) => {
                debug!(error = %e, "Manual scan rejected");
                Err(e)
            }
        }
    }

    /// Delete snapshots older than the retention window
    pub async fn cleanup_expired(&self) -> Result<u64, DomainError> {
        cleanup_expired(self.store.as_ref(), self.settings.retention).await
    }

    /// Cancel the timer and any in-flight scan, then wait for both to stop.
    pub async fn shutdown(&self) {
        info!(
            scan_running = self.is_running(),
            "Scheduler shutting down"
        );
        // Cancelled under the status lock so no scan can start between this and close()
        self.status.update(|_| self.shutdown.cancel());
        self.tasks.close();
        self.tasks.wait().await;
        info!("Scheduler stopped");
    }

    async fn run_periodic(self: Arc<Self>) {
        let interval = self.settings.interval;
        let first = if self.settings.run_on_startup {
            Instant::now()
        } else {
            Instant::now() + interval
        };
        let mut ticker = tokio::time::interval_at(first, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.set_next_run(first);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Periodic scan timer stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.set_next_run(Instant::now() + interval);
                    match self.begin_scan(ScanTrigger::Scheduled) {
                        Ok(scan_id) => info!(scan_id = %scan_id, "Scheduled scan started"),
                        Err(DomainError::ScanAlreadyRunning) => {
                            info!("Previous scan still running, skipping scheduled scan");
                        }
                        Err(e) => warn!(error = %e, "Scheduled scan not started"),
                    }
                }
            }
        }

        self.status.update(|status| status.next_run_at = None);
    }

    fn set_next_run(&self, deadline: Instant) {
        let next = OffsetDateTime::now_utc() + deadline.saturating_duration_since(Instant::now());
        self.status.update(|status| status.next_run_at = Some(next));
    }

    /// Idle → Running and the spawn happen under the status lock, the same lock
    /// `shutdown` cancels under, so every accepted scan is on the tracker before it closes.
    fn begin_scan(&self, trigger: ScanTrigger) -> Result<ScanId, DomainError> {
        let scan_id = ScanId::generate();
        let started_at = OffsetDateTime::now_utc();
        self.status.update(|status| {
            if self.shutdown.is_cancelled() {
                return Err(DomainError::Cancelled);
            }
            if status.running {
                return Err(DomainError::ScanAlreadyRunning);
            }
            status.running = true;
            status.current_scan = Some(scan_id);
            status.current_trigger = Some(trigger);
            status.current_started_at = Some(started_at);
            status.progress = None;
            self.tasks
                .spawn(self.scan_task(scan_id, trigger, started_at));
            Ok(())
        })?;
        Ok(scan_id)
    }

    fn scan_task(
        &self,
        scan_id: ScanId,
        trigger: ScanTrigger,
        started_at: OffsetDateTime,
    ) -> impl Future<Output = ()> + Send + 'static {
        let collector = self.collector.clone();
        let store = self.store.clone();
        let status = self.status.clone();
        let retention = self.settings.retention;
        let cancel = self.shutdown.child_token();

        async move {
            let started = std::time::Instant::now();
            let sink = Arc::new(StatusProgressSink {
                status: status.clone(),
                scan_id,
            });

            // Run the body in its own task so a panic still returns us to Idle
            let scan_cancel = cancel.clone();
            let joined =
                tokio::spawn(async move { collector.collect(scan_id, sink, scan_cancel).await })
                    .await;

            let (outcome, error, summary) = match joined {
                Ok(Ok(summary)) => (summary.outcome(), None, Some(summary)),
                Ok(Err(e)) => (outcome_of(&e), Some(e.public_message().to_string()), None),
                Err(e) => {
                    error!(scan_id = %scan_id, error = %e, "Scan task aborted");
                    (
                        ScanOutcome::Failed,
                        Some("scan aborted unexpectedly".to_string()),
                        None,
                    )
                }
            };

            let last = LastScan {
                scan_id,
                trigger,
                started_at,
                duration: started.elapsed(),
                outcome,
                error,
                summary,
            };
            info!(
                scan_id = %scan_id,
                trigger = %trigger,
                outcome = ?last.outcome,
                duration_ms = last.duration.as_millis() as u64,
                "Scan finished"
            );

            // Running → Idle regardless of outcome
            status.update(|status| {
                status.running = false;
                status.current_scan = None;
                status.current_trigger = None;
                status.current_started_at = None;
                status.progress = None;
                status.last_scan = Some(last);
            });

            if cancel.is_cancelled() {
                debug!(scan_id = %scan_id, "Skipping retention cleanup during shutdown");
                return;
            }
            if let Err(e) = cleanup_expired(store.as_ref(), retention).await {
                warn!(scan_id = %scan_id, error = %e, "Retention cleanup failed");
            }
        }
    }
}

fn outcome_of(error: &ScanError) -> ScanOutcome {
    if error.is_cancelled() {
        ScanOutcome::Cancelled
    } else {
        ScanOutcome::Failed
    }
}

async fn cleanup_expired(store: &dyn SnapshotStore, retention: Duration) -> Result<u64, DomainError> {
    let cutoff = OffsetDateTime::now_utc() - retention;
    let deleted = store.delete_snapshots_before(cutoff).await?;
    if deleted > 0 {
        info!(deleted, cutoff = %cutoff, "Deleted expired snapshots");
    } else {
        debug!(cutoff = %cutoff, "No expired snapshots");
    }
    Ok(deleted)
}
