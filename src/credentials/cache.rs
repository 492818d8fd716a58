//! TTL-bounded credential cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::store::{CredentialBundle, CredentialStore};
use crate::retry::{executor, RetryPolicy};
use crate::{Error, Result};

struct CacheEntry {
    bundle: CredentialBundle,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_valid(&self) -> bool {
        self.stored_at.elapsed() < self.ttl
    }
}

/// Diagnostic view of the cache contents.
#[derive(Debug, Clone)]
pub struct CredentialCacheStats {
    pub size: usize,
    pub keys: Vec<String>,
    pub hits: u64,
    pub misses: u64,
}

/// Caches credential bundles per store key with a per-entry TTL.
///
/// Expired entries are replaced, never served; a failed refresh leaves any
/// stale entry in place (it stays unreadable) so the next call retries the
/// fetch. Two concurrent gets for the same expired key may both hit the store
/// (last write wins) — invocations are serialized per process, so
/// single-flight dedup is deliberately not implemented.
pub struct CredentialCache {
    store: Arc<dyn CredentialStore>,
    /// Applied to the store call itself. Above this boundary a fetch failure
    /// is permanent: the caller sees `CredentialFetchFailed` and does not
    /// retry again.
    retry: RetryPolicy,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

const REQUIRED_FIELDS: [&str; 4] = ["userEmail", "userName", "token", "repositoryUrl"];

impl CredentialCache {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_retry(store, RetryPolicy::no_retry())
    }

    pub fn with_retry(store: Arc<dyn CredentialStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the bundle for `key`, fetching from the store on miss or expiry.
    pub async fn get(&self, key: &str, ttl: Duration) -> Result<CredentialBundle> {
        if let Some(entry) = self.entries.read().unwrap().get(key) {
            if entry.is_valid() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "credential cache hit");
                return Ok(entry.bundle.clone());
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key, store = self.store.name(), "credential cache miss, fetching");

        let payload = executor::execute("credential_fetch", &self.retry, || self.store.fetch(key))
            .await
            .map_err(|err| Error::CredentialFetchFailed {
                key: key.to_string(),
                source: Box::new(err),
            })?;

        let bundle = validate_payload(&payload)?;
        self.entries.write().unwrap().insert(
            key.to_string(),
            CacheEntry {
                bundle: bundle.clone(),
                stored_at: Instant::now(),
                ttl,
            },
        );
        Ok(bundle)
    }

    /// Remove one entry, or all entries when `key` is `None`.
    pub fn clear(&self, key: Option<&str>) {
        let mut entries = self.entries.write().unwrap();
        match key {
            Some(k) => {
                entries.remove(k);
            }
            None => entries.clear(),
        }
    }

    pub fn stats(&self) -> CredentialCacheStats {
        let entries = self.entries.read().unwrap();
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        CredentialCacheStats {
            size: entries.len(),
            keys,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check every required field is a non-empty string, then deserialize.
fn validate_payload(payload: &serde_json::Value) -> Result<CredentialBundle> {
    for field in REQUIRED_FIELDS {
        let present = payload
            .get(field)
            .and_then(|v| v.as_str())
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if !present {
            return Err(Error::IncompleteCredential { field });
        }
    }
    let bundle: CredentialBundle = serde_json::from_value(payload.clone())?;
    Ok(bundle)
}
