//! 重试模块：指数退避计算与通用重试执行器。
//!
//! # Retry Module
//!
//! This module provides the retry engine used around every billed external
//! call the job makes: the backoff calculator and a generic async retry
//! executor.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RetryPolicy`] | Per-operation-class retry configuration |
//! | [`backoff::delay`] | Exponential backoff with optional jitter |
//! | [`executor::execute`] | Generic retry wrapper for fallible async operations |
//!
//! ## Example
//!
//! ```rust,no_run
//! use commitflow::retry::{executor, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn demo() -> commitflow::Result<()> {
//! let policy = RetryPolicy::new()
//!     .with_max_attempts(3)
//!     .with_base_delay(Duration::from_millis(200));
//!
//! let value = executor::execute("fetch", &policy, || async {
//!     Ok::<_, commitflow::Error>(1)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod executor;

pub use backoff::RetryPolicy;
