// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Cardinality auditor daemon
//!
//! Runs scheduled scans until SIGINT/SIGTERM, then waits for the in-flight scan
//! to stop before exiting.

use anyhow::{Context, Result};
use clap::Parser;
use dd_cardinality::domain::ports::NoopProgressSink;
use dd_cardinality::domain::services::{CollectorService, DeltaService, SchedulerService};
use dd_cardinality::domain::{DeltaWindow, ScanId};
use dd_cardinality::infrastructure::{Config, PrometheusDiscoveryClient, SqliteSnapshotStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Scheduled cardinality auditor for Prometheus-compatible backends
#[derive(Parser, Debug)]
#[command(name = "dd-cardinalityd")]
#[command(about = "Record per-service, per-metric and per-label cardinality over time")]
struct Args {
    /// YAML configuration file; defaults apply when omitted
    #[arg(short, long, env = "DD_CARDINALITY_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single scan, print its summary as JSON and exit
    #[arg(long)]
    once: bool,

    /// Print the service deltas for a window (1d, 7d, 30d) as JSON and exit
    #[arg(long, value_name = "WINDOW")]
    delta: Option<DeltaWindow>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    init_tracing(&config.log_level);
    config.validate().context("Invalid configuration")?;

    info!(
        prometheus = %config.prometheus.url,
        identifying_label = %config.collector.identifying_label,
        db = %config.storage.path.display(),
        "Starting cardinality auditor"
    );

    let store = Arc::new(
        SqliteSnapshotStore::open(&config.storage.path)
            .await
            .context("Failed to open snapshot store")?,
    );

    if let Some(window) = args.delta {
        let report = DeltaService::new(store.clone())
            .service_deltas(window)
            .await
            .context("Failed to compute deltas")?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        store.close().await;
        return Ok(());
    }

    let discovery = Arc::new(
        PrometheusDiscoveryClient::new(config.prometheus_settings())
            .context("Failed to create Prometheus client")?,
    );
    let collector = Arc::new(CollectorService::new(
        discovery,
        store.clone(),
        config.collector_settings(),
    ));
    let scheduler = Arc::new(SchedulerService::new(
        collector.clone(),
        store.clone(),
        config.scheduler_settings(),
    ));

    let result = if args.once {
        run_once(&collector, &scheduler).await
    } else {
        scheduler.start();
        wait_for_shutdown_signal().await?;
        scheduler.shutdown().await;
        Ok(())
    };

    store.close().await;
    info!("Cardinality auditor stopped");
    result
}

async fn run_once(collector: &CollectorService, scheduler: &SchedulerService) -> Result<()> {
    let cancel = CancellationToken::new();
    let scan_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT, cancelling scan");
            scan_cancel.cancel();
        }
    });

    let summary = match collector
        .collect(ScanId::generate(), Arc::new(NoopProgressSink), cancel)
        .await
    {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Scan failed");
            anyhow::bail!("scan failed: {}", e.public_message());
        }
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    scheduler
        .cleanup_expired()
        .await
        .context("Retention cleanup failed")?;
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn wait_for_shutdown_signal() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
    }
    Ok(())
}
