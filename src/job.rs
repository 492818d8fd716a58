//! 任务模块:业务动作编排与可触发入口的结果映射。
//!
//! # Job Module
//!
//! [`JobRunner`] is the composition root: it owns the credential cache, the
//! metrics aggregator, the rate limiter and the lifecycle manager as
//! explicitly constructed service objects (no ambient singletons) and
//! threads them through one invocation:
//!
//! reset → rate-limit gate (callers with an identity only) → retry-wrapped
//! credential fetch → retry-wrapped file rewrite → retry-wrapped five-step
//! source-control sequence → metric record → forced metrics drain.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::credentials::{CredentialCache, CredentialStore};
use crate::lifecycle::{EnvironmentHealth, LifecycleManager};
use crate::metrics::{MetricRecord, MetricsAggregator, MetricsConfig, MetricsSink};
use crate::ratelimit::FixedWindowRateLimiter;
use crate::retry::executor;
use crate::rewrite;
use crate::scm::SourceControl;
use crate::{Error, Result};

/// One trigger of the job. Every field is optional; configuration defaults
/// fill the gaps.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TriggerRequest {
    pub file_path: Option<PathBuf>,
    pub new_content: Option<String>,
    pub commit_message: Option<String>,
    pub credential_key: Option<String>,
    /// Caller identity for rate limiting. Absent on the scheduled path.
    pub caller_id: Option<String>,
}

/// Successful-run payload returned to the entrypoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerPayload {
    pub invocation_id: String,
    pub file_path: PathBuf,
    pub commit_message: String,
    pub old_content: String,
    pub new_content: String,
    pub duration_ms: u64,
    pub retries: u32,
}

/// User-visible outcome of one trigger.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum TriggerOutcome {
    Success { payload: TriggerPayload },
    ClientError { message: String },
    Throttled,
    ServerError { message: String },
}

impl TriggerOutcome {
    /// HTTP-ish status code for the entrypoint surface.
    pub fn status_code(&self) -> u16 {
        match self {
            TriggerOutcome::Success { .. } => 200,
            TriggerOutcome::ClientError { .. } => 400,
            TriggerOutcome::Throttled => 429,
            TriggerOutcome::ServerError { .. } => 500,
        }
    }
}

/// Read-only aggregate health report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub credential_store_reachable: bool,
    pub environment: EnvironmentHealth,
    pub config_issues: Vec<String>,
    pub healthy: bool,
}

/// The job runtime for one process.
pub struct JobRunner {
    config: AppConfig,
    store: Arc<dyn CredentialStore>,
    cache: Arc<CredentialCache>,
    aggregator: Arc<MetricsAggregator>,
    limiter: FixedWindowRateLimiter,
    lifecycle: LifecycleManager,
    scm: Arc<dyn SourceControl>,
}

impl JobRunner {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn CredentialStore>,
        sink: Arc<dyn MetricsSink>,
        scm: Arc<dyn SourceControl>,
    ) -> Self {
        let cache = Arc::new(CredentialCache::with_retry(
            Arc::clone(&store),
            config.credential_retry.clone(),
        ));
        let aggregator = Arc::new(MetricsAggregator::new(
            MetricsConfig::new().with_batch_size(config.metrics_batch_size),
            sink,
        ));
        let lifecycle = LifecycleManager::new(
            Arc::clone(&cache),
            Arc::clone(&aggregator),
            Arc::clone(&scm),
        );
        Self {
            config,
            store,
            cache,
            aggregator,
            limiter: FixedWindowRateLimiter::new(),
            lifecycle,
            scm,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    pub fn aggregator(&self) -> &MetricsAggregator {
        &self.aggregator
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Execute one job invocation and map the result to a user-visible
    /// outcome. Internal failure detail stays in the logs.
    pub async fn run(&self, request: TriggerRequest) -> TriggerOutcome {
        let invocation_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        tracing::info!(invocation_id, "job invocation started");

        let report = self.lifecycle.reset_for_new_invocation().await;
        if !report.all_ok() {
            tracing::warn!(
                invocation_id,
                failures = report.failures().len(),
                "lifecycle reset reported failures, continuing"
            );
        }

        if let Some(caller) = request.caller_id.as_deref() {
            let allowed = self.limiter.allow(
                caller,
                self.config.rate_limit_max,
                self.config.rate_limit_window,
            );
            if !allowed {
                tracing::warn!(invocation_id, caller, "trigger throttled");
                return TriggerOutcome::Throttled;
            }
        }

        let params = match self.resolve(&request) {
            Ok(params) => params,
            Err(err) => {
                tracing::warn!(invocation_id, error = %err, "trigger rejected");
                return TriggerOutcome::ClientError {
                    message: err.to_string(),
                };
            }
        };

        let errors = AtomicU32::new(0);
        let retries = AtomicU32::new(0);
        let result = self.execute_business_action(&params, &errors, &retries).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let success = result.is_ok();
        self.aggregator
            .record(
                MetricRecord {
                    duration_ms,
                    success,
                    error_count: errors.load(Ordering::Relaxed),
                    retry_count: retries.load(Ordering::Relaxed),
                },
                &self.config.metrics_namespace,
            )
            .await;
        self.lifecycle
            .force_send_metrics(&self.config.metrics_namespace)
            .await;

        match result {
            Ok(outcome) => {
                tracing::info!(invocation_id, duration_ms, "job invocation succeeded");
                TriggerOutcome::Success {
                    payload: TriggerPayload {
                        invocation_id,
                        file_path: params.file_path,
                        commit_message: params.commit_message,
                        old_content: outcome.old_content,
                        new_content: outcome.new_content,
                        duration_ms,
                        retries: retries.load(Ordering::Relaxed),
                    },
                }
            }
            Err(err) => {
                tracing::error!(invocation_id, duration_ms, error = %err, "job invocation failed");
                map_failure(&err)
            }
        }
    }

    /// Read-only diagnostics; never performs the business action.
    pub async fn health(&self) -> HealthReport {
        let credential_store_reachable = self
            .store
            .fetch(&self.config.default_credential_key)
            .await
            .is_ok();
        let environment = self.lifecycle.validate_environment_health();
        let config_issues = self.config.completeness_issues();
        let healthy = credential_store_reachable && environment.valid && config_issues.is_empty();
        HealthReport {
            credential_store_reachable,
            environment,
            config_issues,
            healthy,
        }
    }

    fn resolve(&self, request: &TriggerRequest) -> Result<ResolvedParams> {
        let file_path = request
            .file_path
            .clone()
            .unwrap_or_else(|| self.config.default_file_path.clone());
        if file_path.is_absolute() || path_escapes(&file_path) {
            return Err(Error::invalid_request(
                "file path must be relative and stay inside the checkout",
            ));
        }

        let commit_message = request
            .commit_message
            .clone()
            .unwrap_or_else(|| self.config.default_commit_message.clone());
        if commit_message.trim().is_empty() {
            return Err(Error::invalid_request("commit message must not be empty"));
        }

        let credential_key = request
            .credential_key
            .clone()
            .unwrap_or_else(|| self.config.default_credential_key.clone());
        if credential_key.is_empty() {
            return Err(Error::invalid_request("credential key must not be empty"));
        }

        let new_content = request
            .new_content
            .clone()
            .unwrap_or_else(|| format!("updated at invocation {}", uuid::Uuid::new_v4()));

        Ok(ResolvedParams {
            file_path,
            new_content,
            commit_message,
            credential_key,
        })
    }

    async fn execute_business_action(
        &self,
        params: &ResolvedParams,
        errors: &AtomicU32,
        retries: &AtomicU32,
    ) -> Result<rewrite::RewriteOutcome> {
        let ttl = self.config.credential_ttl;

        // Retry for the store call lives inside the cache; a failure here is
        // already terminal.
        let bundle = match self.cache.get(&params.credential_key, ttl).await {
            Ok(bundle) => bundle,
            Err(err) => {
                errors.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
        };

        let target = self.config.workdir.join(&params.file_path);
        let outcome = {
            let attempts = AtomicU32::new(0);
            let result = executor::execute("file_rewrite", &self.config.file_retry, || {
                attempts.fetch_add(1, Ordering::Relaxed);
                rewrite::rewrite_file(&target, &params.new_content)
            })
            .await;
            settle_counters(&attempts, &result, errors, retries);
            result?
        };

        {
            let attempts = AtomicU32::new(0);
            let result = executor::execute("scm_sequence", &self.config.scm_retry, || {
                attempts.fetch_add(1, Ordering::Relaxed);
                self.scm_sequence(&bundle, &params.file_path, &params.commit_message)
            })
            .await;
            settle_counters(&attempts, &result, errors, retries);
            result?;
        }

        Ok(outcome)
    }

    /// The fixed five-step mutation sequence, retried as one operation.
    async fn scm_sequence(
        &self,
        bundle: &crate::credentials::CredentialBundle,
        file_path: &Path,
        commit_message: &str,
    ) -> Result<()> {
        self.scm.configure_identity(bundle).await?;
        self.scm.sync_or_clone(bundle).await?;
        self.scm.stage(file_path).await?;
        self.scm.commit(commit_message).await?;
        self.scm.push().await?;
        Ok(())
    }
}

struct ResolvedParams {
    file_path: PathBuf,
    new_content: String,
    commit_message: String,
    credential_key: String,
}

/// Fold one operation's attempt counter into the invocation totals.
fn settle_counters<T>(
    attempts: &AtomicU32,
    result: &Result<T>,
    errors: &AtomicU32,
    retries: &AtomicU32,
) {
    let made = attempts.load(Ordering::Relaxed);
    let failed_attempts = match result {
        Ok(_) => made.saturating_sub(1),
        Err(_) => made,
    };
    errors.fetch_add(failed_attempts, Ordering::Relaxed);
    retries.fetch_add(made.saturating_sub(1), Ordering::Relaxed);
}

/// Does a relative path climb out of its root?
fn path_escapes(path: &Path) -> bool {
    let mut depth: i32 = 0;
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            std::path::Component::Normal(_) => depth += 1,
            _ => {}
        }
    }
    false
}

/// Map a terminal failure to the entrypoint outcome without leaking internal
/// detail beyond a short message.
fn map_failure(err: &Error) -> TriggerOutcome {
    let permanent_request = match err {
        Error::InvalidRequest { .. } => true,
        Error::RetryExhausted {
            source: Some(inner),
            ..
        } => matches!(inner.as_ref(), Error::InvalidRequest { .. }),
        _ => false,
    };
    if permanent_request {
        TriggerOutcome::ClientError {
            message: err.to_string(),
        }
    } else {
        TriggerOutcome::ServerError {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeMode;
    use crate::credentials::{sample_payload, InMemoryCredentialStore};
    use crate::metrics::InMemoryMetricsSink;
    use crate::scm::{InMemorySourceControl, ScmCall};
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryCredentialStore>,
        sink: Arc<InMemoryMetricsSink>,
        scm: Arc<InMemorySourceControl>,
        runner: JobRunner,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        fixture_with(AppConfig::for_mode(RuntimeMode::Development))
    }

    fn fixture_with(mut config: AppConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        config.workdir = dir.path().to_path_buf();
        // Keep inter-attempt waits negligible in tests.
        config.scm_retry = config
            .scm_retry
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
            .with_jitter(false);

        let store = Arc::new(InMemoryCredentialStore::new());
        store.insert(&config.default_credential_key, sample_payload());
        let sink = Arc::new(InMemoryMetricsSink::new());
        let scm = Arc::new(InMemorySourceControl::new());
        let runner = JobRunner::new(
            config,
            store.clone() as Arc<dyn CredentialStore>,
            sink.clone() as Arc<dyn MetricsSink>,
            scm.clone() as Arc<dyn SourceControl>,
        );
        Fixture {
            store,
            sink,
            scm,
            runner,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_successful_run_executes_full_sequence() {
        let f = fixture();
        let outcome = f
            .runner
            .run(TriggerRequest {
                new_content: Some("fresh".into()),
                ..Default::default()
            })
            .await;

        match outcome {
            TriggerOutcome::Success { payload } => {
                assert_eq!(payload.new_content, "fresh");
                assert_eq!(payload.retries, 0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let calls = f.scm.calls();
        assert_eq!(
            calls,
            vec![
                ScmCall::ConfigureIdentity,
                ScmCall::SyncOrClone,
                ScmCall::Stage(f.runner.config().default_file_path.clone()),
                ScmCall::Commit(f.runner.config().default_commit_message.clone()),
                ScmCall::Push,
            ]
        );
        // Invocation drained its metrics on exit.
        assert_eq!(f.sink.publish_count(), 1);
        assert!(f.runner.aggregator().is_empty());
    }

    #[tokio::test]
    async fn test_transient_push_failure_is_retried() {
        let f = fixture();
        f.scm.fail_next_push(Error::transient("remote hung up"));

        let outcome = f
            .runner
            .run(TriggerRequest {
                new_content: Some("x".into()),
                ..Default::default()
            })
            .await;

        match outcome {
            TriggerOutcome::Success { payload } => assert_eq!(payload.retries, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
        // Two full sequences: the failed one and the successful retry.
        let pushes = f
            .scm
            .calls()
            .into_iter()
            .filter(|c| *c == ScmCall::Push)
            .count();
        assert_eq!(pushes, 2);
    }

    #[tokio::test]
    async fn test_invalid_path_maps_to_client_error() {
        let f = fixture();
        let outcome = f
            .runner
            .run(TriggerRequest {
                file_path: Some(PathBuf::from("../outside.txt")),
                ..Default::default()
            })
            .await;
        assert_eq!(outcome.status_code(), 400);
        assert!(f.scm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_credential_key_maps_to_server_error() {
        let f = fixture();
        let outcome = f
            .runner
            .run(TriggerRequest {
                credential_key: Some("nonexistent".into()),
                ..Default::default()
            })
            .await;
        // Surfaces as CredentialFetchFailed, a server-side condition.
        assert_eq!(outcome.status_code(), 500);
        assert!(f.store.fetch_count() >= 1);
    }

    #[tokio::test]
    async fn test_throttled_caller_gets_429() {
        let mut config = AppConfig::for_mode(RuntimeMode::Development);
        config.rate_limit_max = 2;
        config.rate_limit_window = Duration::from_secs(60);
        let f = fixture_with(config);

        let request = || TriggerRequest {
            caller_id: Some("ci-bot".into()),
            new_content: Some("x".into()),
            ..Default::default()
        };
        assert_eq!(f.runner.run(request()).await.status_code(), 200);
        assert_eq!(f.runner.run(request()).await.status_code(), 200);
        let outcome = f.runner.run(request()).await;
        assert!(matches!(outcome, TriggerOutcome::Throttled));
        assert_eq!(outcome.status_code(), 429);
    }

    #[tokio::test]
    async fn test_scheduled_path_skips_rate_limiting() {
        let mut config = AppConfig::for_mode(RuntimeMode::Development);
        config.rate_limit_max = 1;
        let f = fixture_with(config);

        for _ in 0..3 {
            let outcome = f.runner.run(TriggerRequest::default()).await;
            assert_eq!(outcome.status_code(), 200);
        }
    }

    #[tokio::test]
    async fn test_failure_still_records_metrics() {
        let mut config = AppConfig::for_mode(RuntimeMode::Development);
        config.scm_retry = config.scm_retry.with_max_attempts(1);
        let f = fixture_with(config);
        f.scm.fail_next_push(Error::transient("remote hung up"));

        let outcome = f.runner.run(TriggerRequest::default()).await;
        assert_eq!(outcome.status_code(), 500);

        let published = f.sink.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1.failed_executions, 1);
        assert!(published[0].1.total_errors >= 1);
    }

    #[tokio::test]
    async fn test_health_reports_store_reachability() {
        let f = fixture();
        let report = f.runner.health().await;
        assert!(report.credential_store_reachable);
        assert!(report.healthy);

        // No business action happened.
        assert!(f.scm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_health_unreachable_store() {
        let f = fixture();
        f.store.fail_next_fetch("secrets backend down");
        let report = f.runner.health().await;
        assert!(!report.credential_store_reachable);
        assert!(!report.healthy);
    }

    #[test]
    fn test_outcome_serialization_shape() {
        let outcome = TriggerOutcome::ClientError {
            message: "bad path".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "clientError");
        assert_eq!(json["message"], "bad path");
    }

    #[test]
    fn test_path_escape_detection() {
        assert!(path_escapes(Path::new("../outside.txt")));
        assert!(path_escapes(Path::new("a/../../outside.txt")));
        assert!(!path_escapes(Path::new("a/../inside.txt")));
        assert!(!path_escapes(Path::new("nested/dir/file.txt")));
    }
}
