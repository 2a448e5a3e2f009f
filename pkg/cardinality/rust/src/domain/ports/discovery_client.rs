// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Discovery port toward the monitoring backend
//! This is an interface - the HTTP implementation lives in the infrastructure layer

use crate::domain::{DomainError, LabelCardinality, MetricCardinality, ServiceCardinality};
use async_trait::async_trait;

/// Read-only enumeration of services, metrics and labels.
///
/// Every call is independent: it may fail (timeout, rate limit, backend error)
/// without affecting sibling calls, and can be retried by the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Series count grouped by the identifying label's value.
    async fn discover_services(
        &self,
        identifying_label: &str,
    ) -> Result<Vec<ServiceCardinality>, DomainError>;

    /// Series count grouped by metric name, restricted to one service.
    async fn get_metrics_for_service(
        &self,
        identifying_label: &str,
        service: &str,
    ) -> Result<Vec<MetricCardinality>, DomainError>;

    /// Distinct-value count and a sorted sample (at most `sample_limit` values) for
    /// every label of one metric, excluding the identifying and metric-name labels.
    async fn get_labels_for_metric(
        &self,
        identifying_label: &str,
        service: &str,
        metric: &str,
        sample_limit: usize,
    ) -> Result<Vec<LabelCardinality>, DomainError>;
}
