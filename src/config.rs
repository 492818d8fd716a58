//! 配置模块:按运行模式分层的环境变量配置。
//!
//! # Configuration Module
//!
//! All runtime tuning comes from `COMMITFLOW_*` environment variables, with
//! defaults tiered by [`RuntimeMode`]. Development favors short TTLs and
//! small batches (fast feedback); production favors fewer billed calls.

use std::path::PathBuf;
use std::time::Duration;

use crate::logging::LogLevel;
use crate::retry::RetryPolicy;

/// Deployment tier controlling configuration defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    Development,
    Production,
}

impl RuntimeMode {
    /// Parse from `COMMITFLOW_MODE`; anything but "production" is development.
    pub fn from_env() -> Self {
        match std::env::var("COMMITFLOW_MODE").ok().as_deref() {
            Some("production") | Some("prod") => RuntimeMode::Production,
            _ => RuntimeMode::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, RuntimeMode::Production)
    }
}

/// Complete runtime configuration for one process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: RuntimeMode,
    pub log_level: LogLevel,

    pub credential_ttl: Duration,
    pub metrics_batch_size: usize,
    pub metrics_namespace: String,

    pub scm_retry: RetryPolicy,
    pub credential_retry: RetryPolicy,
    pub file_retry: RetryPolicy,

    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,

    /// Timeout applied to each external call (git subprocess step).
    pub call_timeout: Duration,

    pub workdir: PathBuf,
    pub default_file_path: PathBuf,
    pub default_commit_message: String,
    pub default_credential_key: String,
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse::<u64>().ok())
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|s| s.parse::<u32>().ok())
}

fn retry_policy_from_env(
    class: &str,
    default_attempts: u32,
    default_base: Duration,
    default_max: Duration,
) -> RetryPolicy {
    let attempts = env_u32(&format!("COMMITFLOW_{class}_MAX_ATTEMPTS")).unwrap_or(default_attempts);
    let base = env_u64(&format!("COMMITFLOW_{class}_BASE_DELAY_MS"))
        .map(Duration::from_millis)
        .unwrap_or(default_base);
    let max = env_u64(&format!("COMMITFLOW_{class}_MAX_DELAY_MS"))
        .map(Duration::from_millis)
        .unwrap_or(default_max);
    RetryPolicy::new()
        .with_max_attempts(attempts)
        .with_base_delay(base)
        .with_max_delay(max)
}

impl AppConfig {
    /// Load configuration from the environment, tiered by mode.
    pub fn from_env() -> Self {
        Self::for_mode(RuntimeMode::from_env())
    }

    /// Configuration for an explicit mode, env overrides applied on top.
    pub fn for_mode(mode: RuntimeMode) -> Self {
        let prod = mode.is_production();

        let log_level = std::env::var("COMMITFLOW_LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse::<LogLevel>().ok())
            .unwrap_or(if prod { LogLevel::Warn } else { LogLevel::Info });

        let credential_ttl = env_u64("COMMITFLOW_CREDENTIAL_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(if prod {
                Duration::from_secs(300)
            } else {
                Duration::from_secs(60)
            });

        let metrics_batch_size = env_u64("COMMITFLOW_METRICS_BATCH_SIZE")
            .map(|n| n.max(1) as usize)
            .unwrap_or(if prod { 20 } else { 5 });

        let scm_retry = retry_policy_from_env(
            "SCM",
            if prod { 3 } else { 2 },
            Duration::from_millis(500),
            Duration::from_secs(10),
        );
        let credential_retry = retry_policy_from_env(
            "CREDENTIAL",
            3,
            Duration::from_millis(200),
            Duration::from_secs(5),
        );
        let file_retry = retry_policy_from_env(
            "FILE",
            1,
            Duration::from_millis(100),
            Duration::from_millis(100),
        )
        .with_jitter(false);

        let rate_limit_max =
            env_u32("COMMITFLOW_RATE_LIMIT_MAX").unwrap_or(if prod { 10 } else { 100 });
        let rate_limit_window = env_u64("COMMITFLOW_RATE_LIMIT_WINDOW_SECS")
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        let call_timeout = env_u64("COMMITFLOW_CALL_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let workdir = std::env::var("COMMITFLOW_WORKDIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("commitflow-checkout"));
        let default_file_path = std::env::var("COMMITFLOW_FILE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("status.txt"));
        let default_commit_message = std::env::var("COMMITFLOW_COMMIT_MESSAGE")
            .unwrap_or_else(|_| "chore: scheduled status update".to_string());
        let default_credential_key = std::env::var("COMMITFLOW_CREDENTIAL_KEY")
            .unwrap_or_else(|_| "commitflow/deploy".to_string());
        let metrics_namespace = std::env::var("COMMITFLOW_METRICS_NAMESPACE")
            .unwrap_or_else(|_| "commitflow/job".to_string());

        Self {
            mode,
            log_level,
            credential_ttl,
            metrics_batch_size,
            metrics_namespace,
            scm_retry,
            credential_retry,
            file_retry,
            rate_limit_max,
            rate_limit_window,
            call_timeout,
            workdir,
            default_file_path,
            default_commit_message,
            default_credential_key,
        }
    }

    /// Configuration keys that must be resolvable for a healthy deployment.
    /// Used by the diagnostic endpoint, never enforced on the hot path.
    pub fn completeness_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.default_credential_key.is_empty() {
            issues.push("default credential key is empty".to_string());
        }
        if self.default_commit_message.is_empty() {
            issues.push("default commit message is empty".to_string());
        }
        if self.scm_retry.max_attempts == 0 {
            issues.push("scm retry policy permits zero attempts".to_string());
        }
        issues
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::for_mode(RuntimeMode::Development)
    }
}
