//! 指标模块：内存内批量聚合与可插拔指标发布端。
//!
//! # Metrics Module
//!
//! In-memory batching of per-invocation outcome records with one aggregate
//! published per batch, so a billed metrics backend sees one call instead of
//! one per invocation.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`MetricRecord`] | One invocation outcome |
//! | [`AggregatedMetric`] | Per-batch aggregate, derived at flush |
//! | [`MetricsAggregator`] | Batch + flush scheduling |
//! | [`MetricsSink`] | Trait for metric destinations |
//! | [`TracingMetricsSink`] | Structured-log sink (production default) |
//! | [`InMemoryMetricsSink`] | Recording sink for tests |
//!
//! Batches are ephemeral: a batch lost to process recycle or a failed
//! publish is an accepted loss, never retried or persisted.

mod aggregator;
mod sink;

pub use aggregator::{MetricRecord, MetricsAggregator, MetricsConfig, BATCH_TIMEOUT};
pub use sink::{AggregatedMetric, InMemoryMetricsSink, MetricsSink, NoopMetricsSink, TracingMetricsSink};
