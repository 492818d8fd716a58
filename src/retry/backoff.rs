//! Backoff delay calculation.

use std::time::Duration;

/// Retry behavior for one operation class.
///
/// Immutable once constructed; the runtime builds one policy per operation
/// class (source-control, credential, file) from tiered configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts (not "extra retries"). Zero means the
    /// operation is never invoked.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Exponential growth factor per attempt, > 1.
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total attempt bound
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the first-attempt delay
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the delay ceiling
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the exponential growth factor (values <= 1 are clamped)
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier > 1.0 { multiplier } else { 1.0 + f64::EPSILON };
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Single-attempt policy (no retry), used for file operations.
    pub fn no_retry() -> Self {
        Self::new().with_max_attempts(1).with_jitter(false)
    }
}

/// Delay before re-attempting after failure number `attempt` (0-based).
///
/// `base_delay * multiplier^attempt`, capped at `max_delay`; with jitter the
/// result is scaled by a uniform factor in `[0.5, 1.0)`. Floored to whole
/// milliseconds. Pure aside from the jitter draw; see [`delay_with_factor`]
/// for the deterministic core.
pub fn delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let factor = if policy.jitter {
        use rand::Rng;
        0.5 + rand::thread_rng().gen::<f64>() / 2.0
    } else {
        1.0
    };
    delay_with_factor(attempt, policy, factor)
}

/// Deterministic delay calculation with an explicit jitter factor.
pub fn delay_with_factor(attempt: u32, policy: &RetryPolicy, factor: f64) -> Duration {
    let base_ms = policy.base_delay.as_millis() as f64;
    let cap_ms = policy.max_delay.as_millis() as f64;
    let raw_ms = (base_ms * policy.multiplier.powi(attempt as i32)).min(cap_ms);
    let jittered_ms = raw_ms * factor;
    Duration::from_millis(jittered_ms.floor() as u64)
}
