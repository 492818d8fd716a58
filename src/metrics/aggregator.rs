//! Batching metrics aggregator.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use super::sink::{AggregatedMetric, MetricsSink};

/// One job invocation's outcome, appended to the in-memory batch.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub duration_ms: u64,
    pub success: bool,
    pub error_count: u32,
    pub retry_count: u32,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Record count that triggers an immediate flush.
    pub batch_size: usize,
    /// Age of the batch beyond which the next record triggers a flush.
    pub batch_timeout: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_timeout: BATCH_TIMEOUT,
        }
    }
}

impl MetricsConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch-size flush threshold
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the batch-age flush threshold
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }
}

/// Fixed time threshold: a batch older than this is flushed by the next
/// record regardless of size.
pub const BATCH_TIMEOUT: Duration = Duration::from_secs(300);

struct BatchState {
    records: Vec<MetricRecord>,
    last_flush: Instant,
}

/// Accumulates per-invocation outcome records and flushes one aggregate per
/// batch to the sink.
///
/// `record` is best-effort and never fails the caller; a publish failure
/// drops the batch (logged, not retried) so memory stays bounded.
pub struct MetricsAggregator {
    config: MetricsConfig,
    sink: Arc<dyn MetricsSink>,
    state: Mutex<BatchState>,
}

impl MetricsAggregator {
    pub fn new(config: MetricsConfig, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            config,
            sink,
            state: Mutex::new(BatchState {
                records: Vec::new(),
                last_flush: Instant::now(),
            }),
        }
    }

    /// Append a record; flush synchronously when the size or age threshold is
    /// reached.
    pub async fn record(&self, metric: MetricRecord, namespace: &str) {
        let should_flush = {
            let mut state = self.state.lock().unwrap();
            state.records.push(metric);
            state.records.len() >= self.config.batch_size
                || state.last_flush.elapsed() > self.config.batch_timeout
        };
        if should_flush {
            self.flush(namespace).await;
        }
    }

    /// Aggregate the current batch into one sink call. Empty batch is a
    /// no-op. The batch is cleared and the flush clock reset even when the
    /// publish fails.
    pub async fn flush(&self, namespace: &str) {
        let batch = {
            let mut state = self.state.lock().unwrap();
            if state.records.is_empty() {
                return;
            }
            state.last_flush = Instant::now();
            std::mem::take(&mut state.records)
        };

        let aggregated = aggregate(&batch);
        if let Err(err) = self
            .sink
            .publish(namespace, &aggregated, SystemTime::now())
            .await
        {
            tracing::warn!(
                namespace,
                sink = self.sink.name(),
                dropped = batch.len(),
                error = %err,
                "metrics publish failed, batch dropped"
            );
        }
    }

    /// Hard reset: discard the batch without transmitting. Used by the
    /// lifecycle reset in case a previous invocation crashed mid-batch.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.records.clear();
        state.last_flush = Instant::now();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compute the aggregate over a non-empty batch.
fn aggregate(batch: &[MetricRecord]) -> AggregatedMetric {
    let total = batch.len() as u64;
    let successful = batch.iter().filter(|r| r.success).count() as u64;
    let duration_sum: u64 = batch.iter().map(|r| r.duration_ms).sum();
    AggregatedMetric {
        total_executions: total,
        successful_executions: successful,
        failed_executions: total - successful,
        average_duration_ms: duration_sum as f64 / total as f64,
        total_errors: batch.iter().map(|r| r.error_count as u64).sum(),
        total_retries: batch.iter().map(|r| r.retry_count as u64).sum(),
    }
}
