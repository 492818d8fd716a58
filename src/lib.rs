//! # commitflow
//!
//! 定时/触发式提交自动化任务的可靠性运行时:重试退避、凭证缓存、指标批量上报。
//!
//! Commitflow is a small operational automation job: on a schedule or via a
//! trigger it rewrites a text file, commits it to a git repository and pushes,
//! authenticating through a secrets store. Around that single business action
//! sits a reliability control plane built for a stateless, reused execution
//! environment with billed-by-the-call external dependencies.
//!
//! ## Core Philosophy
//!
//! - **Defensive reuse**: the process may serve many sequential invocations;
//!   every invocation starts from a lifecycle reset, not from trust
//! - **Retryability by variant**: whether a failure is retried is a property
//!   of its error variant, decided once at the collaborator boundary
//! - **Best-effort observability**: metrics and cleanup failures are logged
//!   and discarded, never allowed to block the job's primary effect
//! - **Explicit composition**: caches, batches and limiters are constructed
//!   service objects threaded through [`JobRunner`], never ambient singletons
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use commitflow::{AppConfig, JobRunner, TriggerRequest};
//! use commitflow::credentials::EnvCredentialStore;
//! use commitflow::metrics::TracingMetricsSink;
//! use commitflow::scm::GitCli;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::from_env();
//!     commitflow::logging::init(config.log_level);
//!
//!     let runner = JobRunner::new(
//!         config.clone(),
//!         Arc::new(EnvCredentialStore::new("COMMITFLOW_SECRET_JSON")),
//!         Arc::new(TracingMetricsSink),
//!         Arc::new(GitCli::new(&config.workdir, config.call_timeout)),
//!     );
//!
//!     let outcome = runner.run(TriggerRequest::default()).await;
//!     println!("{}", outcome.status_code());
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`retry`] | Backoff calculation and the generic retry executor |
//! | [`credentials`] | Secrets-store access and the TTL credential cache |
//! | [`metrics`] | Outcome batching and pluggable metric sinks |
//! | [`ratelimit`] | Fixed-window per-caller rate limiting |
//! | [`lifecycle`] | Between-invocation state reset and health diagnostics |
//! | [`scm`] | Git collaborator (five-step mutation sequence) |
//! | [`rewrite`] | File-rewrite collaborator |
//! | [`job`] | Composition root and entrypoint outcome mapping |
//! | [`config`] | Environment-tiered runtime configuration |
//! | [`logging`] | Log verbosity gate and tracing setup |

pub mod config;
pub mod credentials;
pub mod job;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod ratelimit;
pub mod retry;
pub mod rewrite;
pub mod scm;

// Re-export main types for convenience
pub use config::{AppConfig, RuntimeMode};
pub use job::{HealthReport, JobRunner, TriggerOutcome, TriggerRequest};
pub use lifecycle::LifecycleManager;
pub use retry::RetryPolicy;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::Error;
