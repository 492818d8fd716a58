//! Metrics sink implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::{Error, Result};

/// One aggregate computed over a whole batch at flush time. Derived, never
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetric {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub average_duration_ms: f64,
    pub total_errors: u64,
    pub total_retries: u64,
}

/// Destination for aggregated job metrics.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn publish(
        &self,
        namespace: &str,
        aggregated: &AggregatedMetric,
        timestamp: SystemTime,
    ) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Default no-op sink (metrics disabled).
pub struct NoopMetricsSink;

#[async_trait]
impl MetricsSink for NoopMetricsSink {
    async fn publish(&self, _: &str, _: &AggregatedMetric, _: SystemTime) -> Result<()> {
        Ok(())
    }
    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Emits each aggregate as a structured INFO event. Production default when
/// no external metrics backend is wired up.
pub struct TracingMetricsSink;

#[async_trait]
impl MetricsSink for TracingMetricsSink {
    async fn publish(
        &self,
        namespace: &str,
        aggregated: &AggregatedMetric,
        _timestamp: SystemTime,
    ) -> Result<()> {
        tracing::info!(
            namespace,
            total = aggregated.total_executions,
            successful = aggregated.successful_executions,
            failed = aggregated.failed_executions,
            avg_duration_ms = aggregated.average_duration_ms,
            errors = aggregated.total_errors,
            retries = aggregated.total_retries,
            "metrics batch flushed"
        );
        Ok(())
    }
    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// In-memory sink for tests: records publishes, optionally fails on demand.
pub struct InMemoryMetricsSink {
    published: Arc<RwLock<Vec<(String, AggregatedMetric)>>>,
    fail_publishes: RwLock<bool>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self {
            published: Arc::new(RwLock::new(Vec::new())),
            fail_publishes: RwLock::new(false),
        }
    }

    pub fn published(&self) -> Vec<(String, AggregatedMetric)> {
        self.published.read().unwrap().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.published.read().unwrap().len()
    }

    /// Make every subsequent publish fail with a transient error.
    pub fn set_failing(&self, failing: bool) {
        *self.fail_publishes.write().unwrap() = failing;
    }
}

impl Default for InMemoryMetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsSink {
    async fn publish(
        &self,
        namespace: &str,
        aggregated: &AggregatedMetric,
        _timestamp: SystemTime,
    ) -> Result<()> {
        if *self.fail_publishes.read().unwrap() {
            return Err(Error::transient("metrics backend unavailable"));
        }
        self.published
            .write()
            .unwrap()
            .push((namespace.to_string(), aggregated.clone()));
        Ok(())
    }
    fn name(&self) -> &'static str {
        "memory"
    }
}
