//! 限流模块:按调用方标识的固定窗口计数限流器。
//!
//! # Rate Limiting Module
//!
//! Fixed-window counter per caller identity, gating the triggerable
//! entrypoint. Intentionally simple: the counter resets entirely at window
//! boundaries, so bursts straddling a boundary are accepted. No sliding
//! window, no token bucket.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct RateLimitEntry {
    count: u32,
    window_reset_at: Instant,
}

/// Diagnostic view of one caller's current window.
#[derive(Debug, Clone)]
pub struct RateLimitSnapshot {
    pub count: u32,
    /// Remaining window time in ms, if a window is active.
    pub window_remaining_ms: Option<u64>,
}

/// Fixed-window rate limiter keyed by caller identity.
///
/// Entries live for the process lifetime; an expired window's entry is
/// replaced wholesale on the next call.
pub struct FixedWindowRateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl FixedWindowRateLimiter {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `identifier` may proceed under `max_requests` per `window`.
    pub fn allow(&self, identifier: &str, max_requests: u32, window: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();

        match entries.get_mut(identifier) {
            Some(entry) if now <= entry.window_reset_at => {
                if entry.count < max_requests {
                    entry.count += 1;
                    true
                } else {
                    tracing::warn!(identifier, count = entry.count, "rate limit exceeded");
                    false
                }
            }
            _ => {
                entries.insert(
                    identifier.to_string(),
                    RateLimitEntry {
                        count: 1,
                        window_reset_at: now + window,
                    },
                );
                max_requests > 0
            }
        }
    }

    pub fn snapshot(&self, identifier: &str) -> RateLimitSnapshot {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap();
        match entries.get(identifier) {
            Some(entry) => RateLimitSnapshot {
                count: entry.count,
                window_remaining_ms: if entry.window_reset_at > now {
                    Some((entry.window_reset_at - now).as_millis() as u64)
                } else {
                    None
                },
            },
            None => RateLimitSnapshot {
                count: 0,
                window_remaining_ms: None,
            },
        }
    }

    /// Drop all windows. Test hook; production windows expire on their own.
    pub fn reset(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn tracked_identities(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

impl Default for FixedWindowRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
