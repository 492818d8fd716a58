//! 生命周期模块:调用间共享状态的防御性清理与环境健康诊断。
//!
//! # Lifecycle Module
//!
//! The execution environment reuses one process across sequential
//! invocations without guaranteed state reset. Every invocation therefore
//! starts with [`LifecycleManager::reset_for_new_invocation`] — an
//! idempotent, best-effort cleanup whose failures are reported and logged
//! but never propagated, so a cleanup defect can never block the job's
//! primary effect — and ends with
//! [`LifecycleManager::force_send_metrics`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::credentials::CredentialCache;
use crate::metrics::MetricsAggregator;
use crate::scm::SourceControl;

/// Advisory thresholds for [`LifecycleManager::validate_environment_health`].
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    pub max_resident_memory_bytes: u64,
    pub max_cache_entries: usize,
    pub max_uptime: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_resident_memory_bytes: 400 * 1024 * 1024,
            max_cache_entries: 50,
            max_uptime: Duration::from_secs(30 * 60),
        }
    }
}

/// Outcome of one cleanup step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Ok,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ResetStep {
    pub name: &'static str,
    pub outcome: StepOutcome,
}

/// What the reset attempted and how each step fared. Returned instead of a
/// silently-swallowed error so callers can log what actually happened.
#[derive(Debug, Clone, Default)]
pub struct ResetReport {
    pub steps: Vec<ResetStep>,
}

impl ResetReport {
    fn push(&mut self, name: &'static str, outcome: StepOutcome) {
        self.steps.push(ResetStep { name, outcome });
    }

    pub fn failures(&self) -> Vec<&ResetStep> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
            .collect()
    }

    pub fn all_ok(&self) -> bool {
        self.failures().is_empty()
    }
}

/// Advisory environment diagnostics; `valid == issues.is_empty()` but the
/// caller is not required to act on it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EnvironmentHealth {
    pub valid: bool,
    pub issues: Vec<String>,
}

/// Owns the per-process shared state reset between invocation reuses.
pub struct LifecycleManager {
    cache: Arc<CredentialCache>,
    aggregator: Arc<MetricsAggregator>,
    scm: Arc<dyn SourceControl>,
    thresholds: HealthThresholds,
    started_at: Instant,
}

impl LifecycleManager {
    pub fn new(
        cache: Arc<CredentialCache>,
        aggregator: Arc<MetricsAggregator>,
        scm: Arc<dyn SourceControl>,
    ) -> Self {
        Self::with_thresholds(cache, aggregator, scm, HealthThresholds::default())
    }

    pub fn with_thresholds(
        cache: Arc<CredentialCache>,
        aggregator: Arc<MetricsAggregator>,
        scm: Arc<dyn SourceControl>,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            cache,
            aggregator,
            scm,
            thresholds,
            started_at: Instant::now(),
        }
    }

    /// Reset shared state for a (possibly reused) execution environment.
    ///
    /// Each step is independently fault-tolerant; nothing here ever
    /// propagates. The metrics batch is discarded, not flushed: a batch
    /// surviving from a crashed invocation is not trusted.
    pub async fn reset_for_new_invocation(&self) -> ResetReport {
        let mut report = ResetReport::default();

        self.cache.clear(None);
        report.push("clear_credential_cache", StepOutcome::Ok);

        self.aggregator.clear();
        report.push("clear_metrics_batch", StepOutcome::Ok);

        if self.scm.checkout_exists().await {
            match self.scm.hard_reset_clean().await {
                Ok(()) => report.push("reset_checkout", StepOutcome::Ok),
                Err(err) => report.push("reset_checkout", StepOutcome::Failed(err.to_string())),
            }
        } else {
            report.push("reset_checkout", StepOutcome::Skipped);
        }

        for step in report.failures() {
            tracing::warn!(step = step.name, outcome = ?step.outcome, "lifecycle reset step failed");
        }
        report
    }

    /// End-of-invocation flush: send whatever is batched, regardless of
    /// thresholds. Publish failure is already swallowed by the aggregator.
    pub async fn force_send_metrics(&self, namespace: &str) {
        if !self.aggregator.is_empty() {
            self.aggregator.flush(namespace).await;
        }
    }

    /// Advisory health check over the reused process.
    pub fn validate_environment_health(&self) -> EnvironmentHealth {
        let mut issues = Vec::new();

        if let Some(rss) = resident_memory_bytes() {
            if rss > self.thresholds.max_resident_memory_bytes {
                issues.push(format!(
                    "resident memory {} MiB exceeds threshold {} MiB",
                    rss / (1024 * 1024),
                    self.thresholds.max_resident_memory_bytes / (1024 * 1024)
                ));
            }
        }

        let cache_size = self.cache.len();
        if cache_size > self.thresholds.max_cache_entries {
            issues.push(format!(
                "credential cache holds {cache_size} entries, threshold {}",
                self.thresholds.max_cache_entries
            ));
        }

        let uptime = self.started_at.elapsed();
        if uptime > self.thresholds.max_uptime {
            issues.push(format!(
                "process uptime {}s exceeds threshold {}s",
                uptime.as_secs(),
                self.thresholds.max_uptime.as_secs()
            ));
        }

        EnvironmentHealth {
            valid: issues.is_empty(),
            issues,
        }
    }
}

/// Resident set size of this process, where the platform exposes it.
#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes() -> Option<u64> {
    None
}
